pub const CLASSIFY_V1_TXT: &str = include_str!("../prompts/classify_v1.txt");
pub const NEED_SEARCH_V1_TXT: &str = include_str!("../prompts/need_search_v1.txt");

/// Templates installed by `lrel init`, keyed by file name.
pub const DEFAULT_PROMPT_FILES: [(&str, &str); 2] = [
    ("classify_v1.txt", CLASSIFY_V1_TXT),
    ("need_search_v1.txt", NEED_SEARCH_V1_TXT),
];
