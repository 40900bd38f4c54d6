//! Decision pipeline: decide-need-search, optional search, classify.
//!
//! One run walks `Start -> Decide -> [Search ->] Classify -> Done` over a
//! fresh [`PipelineState`]. Every step catches its own failures, records
//! them in the trace and degrades: a failed decision skips search, a failed
//! search leaves `search_info` empty, a failed classification yields the
//! [`GENERATION_FAILED`] verdict. Nothing escapes [`Pipeline::run`].
mod state;
mod variant;

pub use state::{
    OrganizationRecord, PipelineState, Route, Trace, TRACE_CLASSIFICATION_ERROR,
    TRACE_CLASSIFICATION_PROMPT, TRACE_CLASSIFICATION_RESPONSE, TRACE_NEED_SEARCH_DECISION,
    TRACE_NEED_SEARCH_ERROR, TRACE_ROUTE, TRACE_SEARCH_ERROR, TRACE_SEARCH_PROMPT,
    TRACE_SEARCH_QUERY, TRACE_SEARCH_RESULTS,
};
pub use variant::{NoiseFilter, PipelinePreset, PipelineVariant, SearchPlacement};

use crate::compose::compose_search_query;
use crate::llm::{GenerationSettings, TextGenerator, GENERATION_FAILED};
use crate::prompts::{PromptKind, PromptStore};
use crate::search::{is_failure_marker, WebSearch};
use anyhow::{anyhow, Result};

/// Token in the decide answer that selects the search branch.
const SEARCH_DECISION_TOKEN: &str = "YES";

/// Which steps a run includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineMode {
    /// Decide, optionally search, then classify.
    #[default]
    Agent,
    /// Classify only, without search context.
    Baseline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    Decide,
    Search,
    Classify,
    Done,
}

/// Runs rows through the stages. Shared read-only across worker threads.
pub struct Pipeline<'a> {
    generator: &'a dyn TextGenerator,
    search: &'a dyn WebSearch,
    prompts: &'a PromptStore,
    settings: GenerationSettings,
    variant: PipelineVariant,
    mode: PipelineMode,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        generator: &'a dyn TextGenerator,
        search: &'a dyn WebSearch,
        prompts: &'a PromptStore,
        settings: GenerationSettings,
        variant: PipelineVariant,
    ) -> Self {
        Self {
            generator,
            search,
            prompts,
            settings,
            variant,
            mode: PipelineMode::Agent,
        }
    }

    pub fn with_mode(mut self, mode: PipelineMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> PipelineMode {
        self.mode
    }

    pub fn variant(&self) -> &PipelineVariant {
        &self.variant
    }

    /// Transition function of the stage machine. `Done` is absorbing.
    pub fn next_stage(&self, stage: Stage, state: &PipelineState) -> Stage {
        match stage {
            Stage::Start => match self.mode {
                PipelineMode::Agent => Stage::Decide,
                PipelineMode::Baseline => Stage::Classify,
            },
            Stage::Decide => match state.route {
                Some(Route::Search) => Stage::Search,
                Some(Route::Classify) | None => Stage::Classify,
            },
            Stage::Search => Stage::Classify,
            Stage::Classify | Stage::Done => Stage::Done,
        }
    }

    /// Run one row to completion. The returned state always has a verdict.
    pub fn run(&self, state: PipelineState) -> PipelineState {
        let mut state = state;
        let mut stage = Stage::Start;
        while stage != Stage::Done {
            state = self.step(stage, state);
            stage = self.next_stage(stage, &state);
            tracing::trace!(?stage, "pipeline transition");
        }
        state
    }

    fn step(&self, stage: Stage, state: PipelineState) -> PipelineState {
        match stage {
            Stage::Start | Stage::Done => state,
            Stage::Decide => self.decide(state),
            Stage::Search => self.search_step(state),
            Stage::Classify => self.classify(state),
        }
    }

    fn decide(&self, mut state: PipelineState) -> PipelineState {
        let route = match self.ask_need_search(&mut state) {
            Ok(answer) => {
                let decision = answer.trim().to_uppercase();
                state
                    .trace
                    .record(TRACE_NEED_SEARCH_DECISION, decision.clone());
                if decision == GENERATION_FAILED {
                    state
                        .trace
                        .record(TRACE_NEED_SEARCH_ERROR, "text generation failed");
                }
                if decision.contains(SEARCH_DECISION_TOKEN) {
                    Route::Search
                } else {
                    Route::Classify
                }
            }
            Err(err) => {
                let detail = format!("{err:#}");
                tracing::warn!(error = %detail, "need-search decision failed; skipping search");
                state.trace.record(TRACE_NEED_SEARCH_ERROR, detail);
                Route::Classify
            }
        };
        state.trace.record(TRACE_ROUTE, route.as_str());
        state.route = Some(route);
        state
    }

    fn ask_need_search(&self, state: &mut PipelineState) -> Result<String> {
        if !self.generator.is_available() {
            return Err(anyhow!("text generator unavailable"));
        }
        let listing = &state.listing;
        let prompt = self.prompts.render(
            PromptKind::NeedSearch,
            &state.prompt_variant,
            &[
                ("query", &state.user_query),
                ("name", &listing.name),
                ("address", &listing.address),
                ("rubric", &listing.rubric),
                ("reviews", &listing.reviews_summary),
            ],
        )?;
        state.trace.record(TRACE_SEARCH_PROMPT, prompt.clone());
        self.generator.generate(&self.settings.request(&prompt))
    }

    fn search_step(&self, mut state: PipelineState) -> PipelineState {
        let listing = &state.listing;
        let query = compose_search_query(
            &listing.name,
            &listing.rubric,
            &listing.address,
            &state.user_query,
        );
        state.trace.record(TRACE_SEARCH_QUERY, query.clone());

        let outcome = self
            .search
            .search(&query, state.cache_enabled)
            .and_then(|raw| {
                if is_failure_marker(&raw) {
                    Err(anyhow!(raw))
                } else {
                    Ok(raw)
                }
            });
        match outcome {
            Ok(raw) => {
                let cleaned = self.variant.noise.apply(&raw);
                state.trace.record(TRACE_SEARCH_RESULTS, cleaned.clone());
                self.place_search_text(&mut state.listing, cleaned);
            }
            Err(err) => {
                let detail = format!("{err:#}");
                tracing::warn!(error = %detail, "search step failed; continuing without search");
                state.trace.record(TRACE_SEARCH_ERROR, detail);
                state.listing.search_info = Some(String::new());
            }
        }
        state
    }

    fn place_search_text(&self, listing: &mut OrganizationRecord, cleaned: String) {
        match self.variant.placement {
            SearchPlacement::Separate => listing.search_info = Some(cleaned),
            SearchPlacement::MergeIntoReviews => {
                if cleaned.is_empty() {
                    return;
                }
                listing.reviews_summary = format!("{}\n\n{}", listing.reviews_summary, cleaned)
                    .trim()
                    .to_string();
            }
        }
    }

    fn classify(&self, mut state: PipelineState) -> PipelineState {
        let verdict = match self.ask_classification(&mut state) {
            Ok(response) => {
                state
                    .trace
                    .record(TRACE_CLASSIFICATION_RESPONSE, response.clone());
                response
            }
            Err(err) => {
                let detail = format!("{err:#}");
                tracing::warn!(error = %detail, "classification failed");
                state.trace.record(TRACE_CLASSIFICATION_ERROR, detail);
                GENERATION_FAILED.to_string()
            }
        };
        state.verdict = Some(verdict);
        state
    }

    fn ask_classification(&self, state: &mut PipelineState) -> Result<String> {
        if !self.generator.is_available() {
            return Err(anyhow!("text generator unavailable"));
        }
        let listing = &state.listing;
        let search_info = listing
            .search_info
            .as_deref()
            .filter(|text| !is_failure_marker(text))
            .unwrap_or_default();
        let prompt = self.prompts.render(
            PromptKind::Classify,
            &state.prompt_variant,
            &[
                ("query", &state.user_query),
                ("name", &listing.name),
                ("address", &listing.address),
                ("rubric", &listing.rubric),
                ("reviews", &listing.reviews_summary),
                ("search_info", search_info),
            ],
        )?;
        state
            .trace
            .record(TRACE_CLASSIFICATION_PROMPT, prompt.clone());
        let response = self.generator.generate(&self.settings.request(&prompt))?;
        Ok(response.trim().to_string())
    }
}

#[cfg(test)]
mod tests;
