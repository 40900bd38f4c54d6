use super::*;
use crate::config::LlmConfig;
use crate::llm::GenerationRequest;
use crate::search::{BackendState, CachedSearch, SearchBackend, ERROR_MARKER, STUB_MARKER};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

const NEED_SEARCH_TEMPLATE: &str =
    "NEED_SEARCH q={query} n={name} a={address} r={rubric} rv={reviews}";
const CLASSIFY_TEMPLATE: &str =
    "CLASSIFY q={query} n={name} a={address} r={rubric} rv={reviews} s={search_info}";

#[derive(Clone, Copy)]
enum Reply {
    Text(&'static str),
    Fail(&'static str),
}

impl Reply {
    fn produce(self) -> Result<String> {
        match self {
            Reply::Text(text) => Ok(text.to_string()),
            Reply::Fail(message) => Err(anyhow!("{message}")),
        }
    }
}

struct ScriptedGenerator {
    available: bool,
    decide: Reply,
    classify: Reply,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn new(decide: Reply, classify: Reply) -> Self {
        Self {
            available: true,
            decide,
            classify,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(Reply::Text("YES"), Reply::Text("RELEVANT_PLUS"))
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("lock prompts").clone()
    }

    fn classify_prompt(&self) -> String {
        self.prompts()
            .into_iter()
            .find(|prompt| prompt.starts_with("CLASSIFY"))
            .expect("classification prompt sent")
    }
}

impl TextGenerator for ScriptedGenerator {
    fn is_available(&self) -> bool {
        self.available
    }

    fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        self.prompts
            .lock()
            .expect("lock prompts")
            .push(request.user_prompt.to_string());
        if request.user_prompt.starts_with("NEED_SEARCH") {
            self.decide.produce()
        } else {
            self.classify.produce()
        }
    }
}

struct ScriptedSearch {
    reply: Reply,
    calls: AtomicUsize,
    queries: Mutex<Vec<(String, bool)>>,
}

impl ScriptedSearch {
    fn new(reply: Reply) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl WebSearch for ScriptedSearch {
    fn search(&self, query: &str, use_cache: bool) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries
            .lock()
            .expect("lock queries")
            .push((query.to_string(), use_cache));
        self.reply.produce()
    }
}

fn prompt_store() -> (TempDir, PromptStore) {
    let dir = tempfile::tempdir().expect("create temp dir");
    fs::write(dir.path().join("need_search_v1.txt"), NEED_SEARCH_TEMPLATE)
        .expect("write need_search template");
    fs::write(dir.path().join("classify_v1.txt"), CLASSIFY_TEMPLATE)
        .expect("write classify template");
    let store = PromptStore::new(dir.path().to_path_buf()).expect("build store");
    (dir, store)
}

fn settings() -> GenerationSettings {
    GenerationSettings::from_config(&LlmConfig::default())
}

fn row() -> PipelineState {
    PipelineState::new(
        "breakfast spot",
        OrganizationRecord {
            name: "Cafe A; Cafe B".to_string(),
            address: "1 Main St".to_string(),
            rubric: "Coffee shop".to_string(),
            reviews_summary: "Great pancakes".to_string(),
            search_info: None,
        },
        "v1",
        true,
    )
}

fn run_with(
    generator: &ScriptedGenerator,
    search: &dyn WebSearch,
    variant: PipelineVariant,
    mode: PipelineMode,
    state: PipelineState,
) -> PipelineState {
    let (_dir, store) = prompt_store();
    Pipeline::new(generator, search, &store, settings(), variant)
        .with_mode(mode)
        .run(state)
}

fn run_v3(generator: &ScriptedGenerator, search: &ScriptedSearch) -> PipelineState {
    run_with(
        generator,
        search,
        PipelinePreset::V3.variant("Missing:"),
        PipelineMode::Agent,
        row(),
    )
}

#[test]
fn decide_failure_routes_to_classify_without_search() {
    let generator = ScriptedGenerator::new(Reply::Fail("rate limited"), Reply::Text("IRRELEVANT"));
    let search = ScriptedSearch::new(Reply::Text("unused"));

    let state = run_v3(&generator, &search);

    assert_eq!(state.route, Some(Route::Classify));
    assert_eq!(state.trace.route(), Some(Route::Classify));
    assert!(state
        .trace
        .get_str(TRACE_NEED_SEARCH_ERROR)
        .is_some_and(|error| error.contains("rate limited")));
    assert_eq!(search.calls(), 0);
    assert!(!state.trace.contains_key(TRACE_SEARCH_QUERY));
    assert_eq!(state.verdict.as_deref(), Some("IRRELEVANT"));
}

#[test]
fn yes_decision_searches_then_classifies() {
    let generator =
        ScriptedGenerator::new(Reply::Text(" yes, search "), Reply::Text("RELEVANT_PLUS"));
    let search = ScriptedSearch::new(Reply::Text("Serves breakfast from 7am"));

    let state = run_v3(&generator, &search);

    assert_eq!(state.route, Some(Route::Search));
    assert_eq!(
        state.trace.get_str(TRACE_NEED_SEARCH_DECISION),
        Some("YES, SEARCH")
    );
    assert_eq!(
        search.queries.lock().expect("lock").as_slice(),
        &[(
            "Cafe A Coffee shop 1 Main St breakfast spot".to_string(),
            true
        )]
    );
    assert_eq!(
        state.listing.search_info.as_deref(),
        Some("Serves breakfast from 7am")
    );
    assert!(generator
        .classify_prompt()
        .ends_with("s=Serves breakfast from 7am"));
    assert_eq!(state.verdict.as_deref(), Some("RELEVANT_PLUS"));
    assert!(state.trace.contains_key(TRACE_SEARCH_PROMPT));
    assert!(state.trace.contains_key(TRACE_CLASSIFICATION_PROMPT));
}

#[test]
fn no_decision_skips_search_and_fills_placeholder() {
    let generator = ScriptedGenerator::new(Reply::Text("NO"), Reply::Text("IRRELEVANT"));
    let search = ScriptedSearch::new(Reply::Text("unused"));

    let state = run_v3(&generator, &search);

    assert_eq!(state.route, Some(Route::Classify));
    assert_eq!(search.calls(), 0);
    assert_eq!(state.listing.search_info, None);
    assert!(generator.classify_prompt().ends_with("s=—"));
    assert_eq!(
        state.trace.get_str(TRACE_CLASSIFICATION_RESPONSE),
        Some("IRRELEVANT")
    );
}

#[test]
fn search_failure_leaves_empty_info_and_still_classifies() {
    let generator = ScriptedGenerator::new(Reply::Text("YES"), Reply::Text("IRRELEVANT"));
    let search = ScriptedSearch::new(Reply::Fail("connection refused"));

    let state = run_v3(&generator, &search);

    assert_eq!(state.listing.search_info.as_deref(), Some(""));
    assert!(state
        .trace
        .get_str(TRACE_SEARCH_ERROR)
        .is_some_and(|error| error.contains("connection refused")));
    assert_eq!(state.verdict.as_deref(), Some("IRRELEVANT"));
    assert_eq!(state.route, Some(Route::Search));
}

#[test]
fn error_marker_never_reaches_classification_prompt() {
    let marker = "[ERROR] search failed for query: Cafe A";
    let generator = ScriptedGenerator::new(Reply::Text("YES"), Reply::Text("IRRELEVANT"));
    let search = ScriptedSearch::new(Reply::Text("[ERROR] search failed for query: Cafe A"));

    let state = run_v3(&generator, &search);

    assert_eq!(state.listing.search_info.as_deref(), Some(""));
    assert_eq!(state.trace.get_str(TRACE_SEARCH_ERROR), Some(marker));
    assert!(!state.trace.contains_key(TRACE_SEARCH_RESULTS));
    let prompt = generator.classify_prompt();
    assert!(!prompt.contains(ERROR_MARKER));
    assert!(prompt.ends_with("s=—"));
}

#[test]
fn stub_marker_is_suppressed_too() {
    let generator = ScriptedGenerator::new(Reply::Text("YES"), Reply::Text("IRRELEVANT"));
    let search = ScriptedSearch::new(Reply::Text("[STUB] search results for: q"));

    let state = run_v3(&generator, &search);

    assert_eq!(state.listing.search_info.as_deref(), Some(""));
    assert!(state
        .trace
        .get_str(TRACE_SEARCH_ERROR)
        .is_some_and(|error| error.starts_with(STUB_MARKER)));
    assert!(!generator.classify_prompt().contains(STUB_MARKER));
}

struct RefusingBackend;

impl SearchBackend for RefusingBackend {
    fn fetch(&self, _query: &str) -> Result<Vec<String>> {
        Err(anyhow!("connection refused"))
    }
}

#[test]
fn cached_search_backend_failure_is_recorded_as_search_error() {
    let cache_dir = tempfile::tempdir().expect("create cache dir");
    let search = CachedSearch::new(
        cache_dir.path().to_path_buf(),
        BackendState::Ready(Box::new(RefusingBackend)),
    );
    let generator = ScriptedGenerator::new(Reply::Text("YES"), Reply::Text("IRRELEVANT"));

    let state = run_with(
        &generator,
        &search,
        PipelinePreset::V3.variant("Missing:"),
        PipelineMode::Agent,
        row(),
    );

    assert_eq!(state.route, Some(Route::Search));
    assert_eq!(state.listing.search_info.as_deref(), Some(""));
    let error = state
        .trace
        .get_str(TRACE_SEARCH_ERROR)
        .expect("search error recorded");
    assert!(error.starts_with(ERROR_MARKER));
    assert!(error.contains("Cafe A Coffee shop 1 Main St breakfast spot"));
    assert!(!state.trace.contains_key(TRACE_SEARCH_RESULTS));
    assert!(generator.classify_prompt().ends_with("s=—"));
    assert_eq!(state.verdict.as_deref(), Some("IRRELEVANT"));
}

#[test]
fn noise_lines_are_stripped_before_classification() {
    let generator = ScriptedGenerator::new(Reply::Text("YES"), Reply::Text("RELEVANT_PLUS"));
    let search = ScriptedSearch::new(Reply::Text("Missing: x\nReal info here"));

    let state = run_v3(&generator, &search);

    assert_eq!(state.listing.search_info.as_deref(), Some("Real info here"));
    assert_eq!(
        state.trace.get_str(TRACE_SEARCH_RESULTS),
        Some("Real info here")
    );
    assert!(generator.classify_prompt().ends_with("s=Real info here"));
}

#[test]
fn keep_raw_variant_forwards_noise_lines() {
    let generator = ScriptedGenerator::new(Reply::Text("YES"), Reply::Text("RELEVANT_PLUS"));
    let search = ScriptedSearch::new(Reply::Text("Missing: x\nReal info here"));

    let state = run_with(
        &generator,
        &search,
        PipelinePreset::V2.variant("Missing:"),
        PipelineMode::Agent,
        row(),
    );

    assert_eq!(
        state.listing.search_info.as_deref(),
        Some("Missing: x\nReal info here")
    );
}

#[test]
fn merge_variant_appends_search_text_to_reviews() {
    let generator = ScriptedGenerator::new(Reply::Text("YES"), Reply::Text("RELEVANT_PLUS"));
    let search = ScriptedSearch::new(Reply::Text("Open 24/7"));

    let state = run_with(
        &generator,
        &search,
        PipelinePreset::V1.variant("Missing:"),
        PipelineMode::Agent,
        row(),
    );

    assert_eq!(state.listing.reviews_summary, "Great pancakes\n\nOpen 24/7");
    assert_eq!(state.listing.search_info, None);
    let prompt = generator.classify_prompt();
    assert!(prompt.contains("rv=Great pancakes\n\nOpen 24/7"));
    assert!(prompt.ends_with("s=—"));
}

#[test]
fn merge_variant_never_merges_markers() {
    let generator = ScriptedGenerator::new(Reply::Text("YES"), Reply::Text("IRRELEVANT"));
    let search = ScriptedSearch::new(Reply::Text("[ERROR] no search API key for query: q"));

    let state = run_with(
        &generator,
        &search,
        PipelinePreset::V1.variant("Missing:"),
        PipelineMode::Agent,
        row(),
    );

    assert_eq!(state.listing.reviews_summary, "Great pancakes");
    assert!(!generator.classify_prompt().contains(ERROR_MARKER));
}

#[test]
fn baseline_mode_classifies_without_deciding() {
    let generator = ScriptedGenerator::new(Reply::Text("YES"), Reply::Text("RELEVANT_PLUS"));
    let search = ScriptedSearch::new(Reply::Text("unused"));

    let state = run_with(
        &generator,
        &search,
        PipelineVariant::new(SearchPlacement::Separate, NoiseFilter::KeepRaw),
        PipelineMode::Baseline,
        row(),
    );

    assert_eq!(state.route, None);
    assert_eq!(generator.prompts().len(), 1);
    assert_eq!(search.calls(), 0);
    assert_eq!(state.verdict.as_deref(), Some("RELEVANT_PLUS"));
}

#[test]
fn unavailable_generator_still_sets_a_verdict() {
    let generator = ScriptedGenerator::unavailable();
    let search = ScriptedSearch::new(Reply::Text("unused"));

    let state = run_v3(&generator, &search);

    assert_eq!(state.route, Some(Route::Classify));
    assert_eq!(state.verdict.as_deref(), Some(GENERATION_FAILED));
    assert!(state.trace.contains_key(TRACE_NEED_SEARCH_ERROR));
    assert!(state.trace.contains_key(TRACE_CLASSIFICATION_ERROR));
    assert!(generator.prompts().is_empty());
}

#[test]
fn classification_failure_yields_sentinel_verdict() {
    let generator = ScriptedGenerator::new(Reply::Text("NO"), Reply::Fail("quota exceeded"));
    let search = ScriptedSearch::new(Reply::Text("unused"));

    let state = run_v3(&generator, &search);

    assert_eq!(state.verdict.as_deref(), Some(GENERATION_FAILED));
    assert!(state
        .trace
        .get_str(TRACE_CLASSIFICATION_ERROR)
        .is_some_and(|error| error.contains("quota exceeded")));
}

#[test]
fn sentinel_decision_is_recorded_as_error() {
    let generator = ScriptedGenerator::new(Reply::Text("ERROR"), Reply::Text("IRRELEVANT"));
    let search = ScriptedSearch::new(Reply::Text("unused"));

    let state = run_v3(&generator, &search);

    assert_eq!(state.route, Some(Route::Classify));
    assert!(state.trace.contains_key(TRACE_NEED_SEARCH_ERROR));
}

#[test]
fn missing_template_is_caught_in_both_steps() {
    let generator = ScriptedGenerator::new(Reply::Text("YES"), Reply::Text("RELEVANT_PLUS"));
    let search = ScriptedSearch::new(Reply::Text("unused"));
    let mut state = row();
    state.prompt_variant = "v9".to_string();

    let state = run_with(
        &generator,
        &search,
        PipelinePreset::V3.variant("Missing:"),
        PipelineMode::Agent,
        state,
    );

    assert!(state
        .trace
        .get_str(TRACE_NEED_SEARCH_ERROR)
        .is_some_and(|error| error.contains("prompt not found")));
    assert_eq!(state.verdict.as_deref(), Some(GENERATION_FAILED));
    assert_eq!(search.calls(), 0);
}

#[test]
fn stage_transitions_follow_route_and_mode() {
    let generator = ScriptedGenerator::new(Reply::Text("NO"), Reply::Text("IRRELEVANT"));
    let search = ScriptedSearch::new(Reply::Text("unused"));
    let (_dir, store) = prompt_store();
    let pipeline = Pipeline::new(
        &generator,
        &search,
        &store,
        settings(),
        PipelinePreset::V3.variant("Missing:"),
    );
    let mut state = row();

    assert_eq!(pipeline.next_stage(Stage::Start, &state), Stage::Decide);
    assert_eq!(pipeline.next_stage(Stage::Decide, &state), Stage::Classify);
    state.route = Some(Route::Search);
    assert_eq!(pipeline.next_stage(Stage::Decide, &state), Stage::Search);
    assert_eq!(pipeline.next_stage(Stage::Search, &state), Stage::Classify);
    assert_eq!(pipeline.next_stage(Stage::Classify, &state), Stage::Done);
    assert_eq!(pipeline.next_stage(Stage::Done, &state), Stage::Done);

    let baseline = pipeline.with_mode(PipelineMode::Baseline);
    assert_eq!(baseline.next_stage(Stage::Start, &state), Stage::Classify);
}
