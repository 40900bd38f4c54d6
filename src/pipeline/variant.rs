//! Pipeline variants: where search text lands and how it is cleaned.
use std::fmt;
use std::str::FromStr;

/// Where cleaned search text is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPlacement {
    /// Append to `reviews_summary`, separated by a blank line.
    MergeIntoReviews,
    /// Keep in `search_info`, its own prompt slot.
    Separate,
}

/// Line-level cleanup applied to raw search text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoiseFilter {
    KeepRaw,
    /// Drop every line containing the marker.
    StripLinesContaining(String),
}

impl NoiseFilter {
    pub fn apply(&self, raw: &str) -> String {
        match self {
            Self::KeepRaw => raw.to_string(),
            Self::StripLinesContaining(marker) if marker.is_empty() => raw.to_string(),
            Self::StripLinesContaining(marker) => raw
                .lines()
                .filter(|line| !line.contains(marker.as_str()))
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineVariant {
    pub placement: SearchPlacement,
    pub noise: NoiseFilter,
}

impl PipelineVariant {
    pub fn new(placement: SearchPlacement, noise: NoiseFilter) -> Self {
        Self { placement, noise }
    }
}

/// Named variant presets selectable from the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelinePreset {
    /// Merge search into reviews, keep raw text.
    V1,
    /// Separate search slot, keep raw text.
    V2,
    /// Separate search slot, strip noise lines.
    #[default]
    V3,
}

impl PipelinePreset {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
            Self::V3 => "v3",
        }
    }

    pub fn variant(self, noise_marker: &str) -> PipelineVariant {
        match self {
            Self::V1 => {
                PipelineVariant::new(SearchPlacement::MergeIntoReviews, NoiseFilter::KeepRaw)
            }
            Self::V2 => PipelineVariant::new(SearchPlacement::Separate, NoiseFilter::KeepRaw),
            Self::V3 => PipelineVariant::new(
                SearchPlacement::Separate,
                NoiseFilter::StripLinesContaining(noise_marker.to_string()),
            ),
        }
    }
}

impl fmt::Display for PipelinePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelinePreset {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "v1" => Ok(Self::V1),
            "v2" => Ok(Self::V2),
            "v3" => Ok(Self::V3),
            other => Err(format!("unknown pipeline preset {other:?} (expected v1, v2 or v3)")),
        }
    }
}
