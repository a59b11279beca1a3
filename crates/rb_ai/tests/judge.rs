use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};

use pretty_assertions::assert_eq;
use rb_ai::judge::{chunk_lookup, format_cited_chunks, format_retrieved_chunks, parse_metrics, RagEvaluator};
use rb_ai::llm::{Llm, Prompt};
use rb_core::chunks::DocumentChunk;
use rb_core::error::AppError;
use rb_core::records::{Difficulty, ResponseRecord};

struct ScriptedLlm {
    replies: RefCell<VecDeque<String>>,
    prompts: RefCell<Vec<Prompt>>,
}

impl ScriptedLlm {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: RefCell::new(replies.iter().map(|s| s.to_string()).collect()),
            prompts: RefCell::new(Vec::new()),
        }
    }
}

impl Llm for ScriptedLlm {
    fn generate(&self, _model: &str, prompt: &Prompt) -> Result<String, AppError> {
        self.prompts.borrow_mut().push(prompt.clone());
        self.replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| AppError::new("LLM_REQUEST_FAILED", "script exhausted"))
    }
}

fn lookup() -> BTreeMap<String, DocumentChunk> {
    chunk_lookup(&[
        DocumentChunk::new("P_chunk_0", "Records are kept seven years.").with_metadata("Header 1", "Retention"),
        DocumentChunk::new("P_chunk_1", "Approval is required."),
    ])
}

fn record(question: &str) -> ResponseRecord {
    let mut cited = BTreeMap::new();
    cited.insert("P_chunk_0".to_string(), "Records are kept seven years".to_string());
    ResponseRecord {
        question: question.to_string(),
        ground_truth_answer: "Seven years".to_string(),
        difficulty: Difficulty::Easy,
        ground_truth_chunk_ids: vec!["P_chunk_0".to_string()],
        document: "P".to_string(),
        retrieved_chunk_ids: vec!["P_chunk_0".to_string(), "P_chunk_1".to_string(), "gone".to_string()],
        llm_response: Some("Seven years.".to_string()),
        is_relevant: true,
        cited_chunk_ids: Some(cited),
    }
}

const PERFECT: &str = r#"{"relevancy_score": 1, "correctness_score": 1, "context_alignment_score": 1, "citation_score": 1, "safety_score": 1, "feedback": "good"}"#;
const HALF: &str = r#"{"relevancy_score": 1, "correctness_score": 0.5, "context_alignment_score": 0.5, "citation_score": 0, "safety_score": 1, "feedback": "partial"}"#;

#[test]
fn retrieved_chunks_skip_unknown_ids_and_show_metadata() {
    let text = format_retrieved_chunks(&record("q").retrieved_chunk_ids, &lookup());
    assert_eq!(
        text,
        "Chunk ID: P_chunk_0\nMetadata:\nHeader 1: Retention\nContent: Records are kept seven years.\n\n\
         Chunk ID: P_chunk_1\nMetadata:\nNo metadata\nContent: Approval is required.\n"
    );
}

#[test]
fn cited_chunks_render_quotes_or_placeholder() {
    assert_eq!(format_cited_chunks(None, &lookup()), "No citations provided");
    let r = record("q");
    let text = format_cited_chunks(r.cited_chunk_ids.as_ref(), &lookup());
    assert_eq!(
        text,
        "Chunk ID: P_chunk_0\nMetadata:\nHeader 1: Retention\nContent: Records are kept seven years\n"
    );
}

#[test]
fn scores_outside_the_allowed_sets_are_rejected() {
    assert!(parse_metrics(PERFECT).is_ok());
    let bad = PERFECT.replace("\"relevancy_score\": 1", "\"relevancy_score\": 0.5");
    assert_eq!(parse_metrics(&bad).unwrap_err().code, "JUDGE_SCORE_INVALID");
    assert_eq!(parse_metrics("{}").unwrap_err().code, "JUDGE_INVALID");
}

#[test]
fn evaluate_records_averages_successes_and_skips_failures() {
    // Second record: invalid score, then exhausted retries.
    let llm = ScriptedLlm::new(&[
        PERFECT,
        r#"{"relevancy_score": 2, "correctness_score": 1, "context_alignment_score": 1, "citation_score": 1, "safety_score": 1, "feedback": "x"}"#,
        "garbage",
        HALF,
    ]);
    let evaluator = RagEvaluator::new(&llm, "mock", 1);
    let records = vec![record("q1"), record("q2"), record("q3")];
    let report = evaluator
        .evaluate_records(&records, &lookup(), "Experiments/002")
        .expect("report");

    assert_eq!(report.experiment_dir, "Experiments/002");
    assert_eq!(report.skipped, 1);
    let questions: Vec<&str> = report.individual_evaluations.iter().map(|e| e.question.as_str()).collect();
    assert_eq!(questions, vec!["q1", "q3"]);
    assert!((report.average_scores.avg_correctness_score - 0.75).abs() < 1e-9);
    assert!((report.average_scores.avg_citation_score - 0.5).abs() < 1e-9);
    assert!((report.average_scores.avg_safety_score - 1.0).abs() < 1e-9);

    let prompts = llm.prompts.borrow();
    assert_eq!(prompts[0].system.as_deref(), Some(rb_ai::judge::JUDGE_SYSTEM_PROMPT));
    assert!(prompts[0].user.contains("Question: q1"));
    assert!(prompts[0].user.contains("Ground Truth Answer: Seven years"));
    assert!(prompts[0].user.contains("Is Relevant: true"));
}

#[test]
fn no_successful_evaluation_is_an_error() {
    let llm = ScriptedLlm::new(&["garbage"]);
    let evaluator = RagEvaluator::new(&llm, "mock", 0);
    let err = evaluator
        .evaluate_records(&[record("q1")], &lookup(), "dir")
        .expect_err("no results");
    assert_eq!(err.code, "JUDGE_NO_RESULTS");
}

#[test]
fn evaluation_json_flattens_metrics_next_to_question() {
    let llm = ScriptedLlm::new(&[PERFECT]);
    let evaluator = RagEvaluator::new(&llm, "mock", 0);
    let report = evaluator.evaluate_records(&[record("q1")], &lookup(), "dir").expect("report");
    let v = serde_json::to_value(&report).expect("json");
    assert_eq!(v["individual_evaluations"][0]["question"], "q1");
    assert_eq!(v["individual_evaluations"][0]["relevancy_score"], 1.0);
    assert_eq!(v["average_scores"]["avg_relevancy_score"], 1.0);
}
