//! Search query composition from listing attributes.

/// First `;`-separated alias of a multi-valued organization name, trimmed.
pub fn extract_first_name(full_name: &str) -> &str {
    full_name.split(';').next().unwrap_or_default().trim()
}

/// Join the canonical name, rubric, address and user query with single spaces.
///
/// Empty or whitespace-only parts are skipped entirely.
pub fn compose_search_query(name: &str, rubric: &str, address: &str, user_query: &str) -> String {
    [extract_first_name(name), rubric, address, user_query]
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_name_is_first_segment_trimmed() {
        assert_eq!(extract_first_name("  Cafe A ; Cafe B;Cafe C"), "Cafe A");
        assert_eq!(extract_first_name("Solo"), "Solo");
        assert_eq!(extract_first_name(""), "");
        assert_eq!(extract_first_name(";Second"), "");
    }

    #[test]
    fn composes_all_parts_in_order() {
        assert_eq!(
            compose_search_query("Cafe A; Cafe B", "Coffee shop", "1 Main St", "breakfast spot"),
            "Cafe A Coffee shop 1 Main St breakfast spot"
        );
    }

    #[test]
    fn empty_parts_leave_no_stray_separators() {
        assert_eq!(compose_search_query("", "", "1 Main St", "q"), "1 Main St q");
        assert_eq!(compose_search_query("  ", " ", "", ""), "");
        assert_eq!(
            compose_search_query("; alias", "  Bakery ", "", " fresh bread "),
            "Bakery fresh bread"
        );
    }

    #[test]
    fn only_the_first_alias_reaches_the_query() {
        let query = compose_search_query("Alpha; Beta; Gamma", "Gym", "", "pool");
        assert_eq!(query, "Alpha Gym pool");
        assert!(!query.contains("Beta"));
    }
}
