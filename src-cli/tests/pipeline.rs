//! Full experiment run with deterministic in-process models.

use std::fs;

use pretty_assertions::assert_eq;
use ragbench_lib::{
    ask, build_index, chunk_files, create_eval_set, evaluate_retriever, generate_responses, judge_responses, search,
};
use rb_ai::embeddings::Embedder;
use rb_ai::judge::JUDGE_SYSTEM_PROMPT;
use rb_ai::llm::{Llm, Prompt};
use rb_core::config::Settings;
use rb_core::error::AppError;
use rb_core::experiment::ExperimentLayout;
use rb_core::jsonio::read_json;
use rb_core::records::{EvalItem, ResponseRecord};
use serde_json::json;

const KEYWORDS: [&str; 3] = ["leave", "carry", "backup"];

struct KeywordEmbedder;

impl Embedder for KeywordEmbedder {
    fn embed(&self, _model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        let lower = input.to_lowercase();
        let mut v: Vec<f32> = KEYWORDS.iter().map(|k| lower.matches(k).count() as f32).collect();
        v.push(0.01);
        Ok(v)
    }
}

/// Answers whichever stage is asking, based on the prompt it receives.
struct StageLlm;

impl Llm for StageLlm {
    fn generate(&self, _model: &str, prompt: &Prompt) -> Result<String, AppError> {
        if prompt.system.as_deref() == Some(JUDGE_SYSTEM_PROMPT) {
            return Ok(json!({
                "relevancy_score": 1, "correctness_score": 1, "context_alignment_score": 0.5,
                "citation_score": 1, "safety_score": 1, "feedback": "fine"
            })
            .to_string());
        }
        if prompt.user.starts_with("Context:") {
            let (_, first) = prompt
                .user
                .split_once("Source: ")
                .ok_or_else(|| AppError::new("LLM_REQUEST_FAILED", "no source"))?;
            let (id, rest) = first
                .split_once("\nContent: ")
                .ok_or_else(|| AppError::new("LLM_REQUEST_FAILED", "no content"))?;
            let quote = rest.lines().next().unwrap_or_default();
            return Ok(json!({"is_relevant": true, "answer": format!("See {id}."), "citation": {id: quote}}).to_string());
        }
        if prompt.user.contains("Leave_Policy_chunk_0") {
            return Ok(json!({"questions": [{
                "question": "How many days of annual leave?", "answer": "25 days.",
                "difficulty": "easy", "chunk_ids": ["Leave_Policy_chunk_0"]
            }]})
            .to_string());
        }
        Ok(json!([{
            "question": "When do backups run?", "answer": "Nightly at 2am.",
            "difficulty": "medium", "chunk_ids": ["Backups_chunk_0"]
        }])
        .to_string())
    }
}

fn settings() -> Settings {
    Settings::from_lookup(|_| None).expect("settings")
}

fn experiment(dir: &std::path::Path) -> ExperimentLayout {
    let leave = dir.join("Leave Policy.md");
    let backups = dir.join("Backups.md");
    fs::write(
        &leave,
        "# Leave\n\nAnnual leave is 25 days per year.\n\n## Carry over\n\nUp to 5 days carry over into the next year.\n",
    )
    .expect("write");
    fs::write(&backups, "# Backups\n\nBackups run nightly at 2am and are kept for 30 days.\n").expect("write");

    let layout = ExperimentLayout::new(dir.join("Experiments").join("001"));
    let chunked = chunk_files(&layout, &[leave, backups], 1600).expect("chunk");
    assert_eq!(chunked.chunk_count, 3);
    layout
}

#[test]
fn experiment_runs_from_markdown_to_judged_answers() {
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = experiment(dir.path());
    let s = settings();

    let indexed = build_index(&layout, &KeywordEmbedder, &s.embed_model).expect("index");
    assert_eq!(indexed.import.added, 3);
    assert!(indexed.status.ready);
    assert_eq!(indexed.status.dims, Some(4));

    let hits = search(&layout, &KeywordEmbedder, "backup schedule", 1, &[]).expect("search");
    assert_eq!(hits[0].chunk_id, "Backups_chunk_0");
    let filtered = search(&layout, &KeywordEmbedder, "leave", 3, &["Header 2=Carry over".to_string()]).expect("search");
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].chunk_id, "Leave_Policy_chunk_1");

    let answer = ask(&layout, &KeywordEmbedder, &StageLlm, &s, "How many days of annual leave?", 2).expect("ask");
    assert!(answer.is_relevant);
    assert_eq!(answer.retrieved_chunk_ids[0], "Leave_Policy_chunk_0");
    let cited = answer.cited_chunk_ids.expect("citations");
    assert_eq!(cited["Leave_Policy_chunk_0"], "Annual leave is 25 days per year.");

    let eval_set = create_eval_set(&layout, &StageLlm, &KeywordEmbedder, &s, 1, 20).expect("eval set");
    assert_eq!(eval_set.questions, 2);
    let items: Vec<EvalItem> = read_json(&layout.eval_set_path()).expect("read eval set");
    assert_eq!(items[0].chunk_ids, vec!["Leave_Policy_chunk_0", "Leave_Policy_chunk_1"]);
    assert_eq!(items[0].overlapping_chunks, vec!["Leave_Policy_chunk_0"]);
    assert_eq!(items[1].document, "Backups");

    let retriever = evaluate_retriever(&layout, &KeywordEmbedder, 1, None, None).expect("retriever eval");
    assert_eq!(retriever.summary.questions, 2);
    assert!((retriever.summary.mean_recall - 0.75).abs() < 1e-9);
    assert!((retriever.summary.hit_rate - 1.0).abs() < 1e-9);
    assert!(layout.retriever_results_path().exists());

    let generated = generate_responses(&layout, &KeywordEmbedder, &StageLlm, &s, 2, None, None).expect("generate");
    assert_eq!(generated.records, 2);
    assert_eq!(generated.answered, 2);
    let records: Vec<ResponseRecord> = read_json(&layout.responses_path()).expect("read responses");
    assert_eq!(records[1].retrieved_chunk_ids[0], "Backups_chunk_0");
    assert_eq!(records[1].ground_truth_answer, "Nightly at 2am.");

    let judged = judge_responses(&layout, &StageLlm, &s, None, None).expect("judge");
    assert_eq!(judged.evaluated, 2);
    assert_eq!(judged.skipped, 0);
    assert!((judged.average_scores.avg_context_alignment_score - 0.5).abs() < 1e-9);
    assert!(layout.judge_results_path().exists());
}

#[test]
fn stages_fail_cleanly_when_inputs_are_missing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = experiment(dir.path());
    let s = settings();

    let err = search(&layout, &KeywordEmbedder, "leave", 3, &[]).unwrap_err();
    assert_eq!(err.code, "INDEX_NOT_READY");

    let err = evaluate_retriever(&layout, &KeywordEmbedder, 5, None, None).unwrap_err();
    assert_eq!(err.code, "JSON_NOT_FOUND");

    let err = judge_responses(&layout, &StageLlm, &s, None, None).unwrap_err();
    assert_eq!(err.code, "JSON_NOT_FOUND");

    let err = search(&layout, &KeywordEmbedder, "leave", 3, &["no-equals".to_string()]).unwrap_err();
    assert_eq!(err.code, "CONFIG_INVALID");
}
