use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn lrel(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_lrel"))
        .args(args)
        .current_dir(root)
        .env_remove("RUST_LOG")
        .env_remove("AGENT_PROMPT_VERSION")
        .env_remove("AGENT_USE_CACHE")
        .env_remove("TAVILY_API_KEY")
        .env("OPENAI_API_KEY", "sk-test")
        .output()
        .expect("run lrel")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn dataset_line(idx: usize, label: f64) -> String {
    json!({
        "text": format!("late breakfast {idx}"),
        "name": format!("Cafe {idx}; Cafe Alias"),
        "address": "1 Main St",
        "normalized_main_rubric_name_ru": "Cafe",
        "reviews_summarized": "Pancakes all day",
        "relevance_new": label,
    })
    .to_string()
}

fn write_dataset(root: &Path, labels: &[f64]) {
    let lines: Vec<_> = labels
        .iter()
        .enumerate()
        .map(|(idx, label)| dataset_line(idx, *label))
        .collect();
    fs::write(
        root.join("data/data_final_for_dls_new.jsonl"),
        lines.join("\n"),
    )
    .expect("write dataset");
}

#[test]
fn init_then_check_reports_missing_dataset_then_ok() {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let root = temp_dir.path();

    let init = lrel(root, &["init", "--root", "."]);
    assert!(init.status.success(), "init failed: {init:?}");
    assert!(stdout(&init).contains("wrote relevance.json"));

    let check = lrel(root, &["check", "--root", "."]);
    assert!(!check.status.success());
    assert!(stdout(&check).contains("issue: dataset not found"));

    write_dataset(root, &[1.0, 0.0]);
    let check = lrel(root, &["check", "--root", "."]);
    assert!(check.status.success(), "check failed: {check:?}");
    assert!(stdout(&check).trim_end().ends_with("ok"));
}

#[test]
fn eval_against_unreachable_backend_records_errors_and_writes_results() {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let root = temp_dir.path();
    assert!(lrel(root, &["init", "--root", "."]).status.success());
    fs::write(
        root.join("relevance.json"),
        json!({
            "llm": { "api_base": "http://127.0.0.1:9", "timeout_ms": 2000 },
            "search": { "enabled": false },
            "split": { "test_size": 2, "val_frac": 0.5 }
        })
        .to_string(),
    )
    .expect("write config");
    write_dataset(root, &[1.0, 0.0, 0.1, 1.0, 0.0]);

    let eval = lrel(
        root,
        &["eval", "--root", ".", "--delay-ms", "0", "--split", "test"],
    );
    assert!(eval.status.success(), "eval failed: {eval:?}");
    let text = stdout(&eval);
    assert!(text.contains("dataset loaded: train 1, val 1, test 2"));
    assert!(text.contains("test: no valid predictions"));
    assert!(text.contains("test errors: 2 of 2"));

    let results_dir = root.join("experiments/agent");
    let csv = fs::read_to_string(results_dir.join("agent_v1_test_predictions.csv"))
        .expect("read csv");
    assert!(csv.starts_with("text,name,address,"));
    assert_eq!(csv.lines().count(), 3);

    let summary: Value = serde_json::from_str(
        &fs::read_to_string(results_dir.join("agent_v1_test_summary.json"))
            .expect("read summary"),
    )
    .expect("parse summary");
    assert_eq!(summary["pipeline"], "v3");
    assert_eq!(summary["report"]["errors"], 2);
    assert_eq!(summary["report"]["accuracy"], Value::Null);

    let inspect = lrel(
        root,
        &[
            "inspect",
            "--results",
            "experiments/agent/agent_v1_test_predictions.jsonl",
            "--index",
            "1",
        ],
    );
    assert!(inspect.status.success(), "inspect failed: {inspect:?}");
    let text = stdout(&inspect);
    assert!(text.contains("query: late breakfast 1"));
    assert!(text.contains("response: ERROR"));
    assert!(text.contains("\"route\": \"classify\""));
}

#[test]
fn inspect_lists_mismatches() {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let root = temp_dir.path();
    let record = |index: usize, label: f64, predicted: f64| {
        json!({
            "index": index,
            "split": "val",
            "row": {
                "text": format!("query {index}"),
                "name": "Org",
                "address": "",
                "normalized_main_rubric_name_ru": "Cafe",
                "reviews_summarized": "",
                "label": label
            },
            "response": "IRRELEVANT",
            "predicted": predicted,
            "trace": { "route": "classify" }
        })
        .to_string()
    };
    let lines = [record(0, 1.0, 1.0), record(1, 1.0, 0.0), record(2, 0.0, -1.0)];
    fs::write(root.join("results.jsonl"), lines.join("\n")).expect("write results");

    let inspect = lrel(root, &["inspect", "--results", "results.jsonl", "--mismatches"]);
    assert!(inspect.status.success(), "inspect failed: {inspect:?}");
    let text = stdout(&inspect);
    assert!(text.starts_with("1\ttruth=1.0\tpred=0.0"));
    assert!(text.contains("1 mismatches of 3 rows"));
}
