use std::cell::RefCell;
use std::collections::VecDeque;

use pretty_assertions::assert_eq;
use rb_ai::evalset::{format_document_chunks, merge_ground_truth, EvalSetGenerator, Reranker};
use rb_ai::llm::{Llm, Prompt};
use rb_core::chunks::DocumentChunk;
use rb_core::error::AppError;
use rb_core::records::Difficulty;

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

/// Scores a passage by how many query words it contains.
struct WordOverlapReranker;

impl Reranker for WordOverlapReranker {
    fn score(&self, query: &str, passage: &str) -> Result<f32, AppError> {
        let passage = passage.to_lowercase();
        Ok(query
            .to_lowercase()
            .split_whitespace()
            .filter(|w| passage.contains(w.trim_end_matches('?')))
            .count() as f32)
    }
}

fn chunks() -> Vec<DocumentChunk> {
    vec![
        DocumentChunk::new("POLICY_A_chunk_0", "Retention lasts seven years.").with_metadata("Header 1", "Retention"),
        DocumentChunk::new("POLICY_A_chunk_1", "Access requires approval."),
        DocumentChunk::new("GUIDE_chunk_0", "Backups run nightly."),
    ]
}

#[test]
fn format_groups_by_document_in_first_seen_order() {
    let docs = format_document_chunks(&chunks());
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].name, "POLICY_A");
    assert_eq!(docs[0].chunk_ids, vec!["POLICY_A_chunk_0", "POLICY_A_chunk_1"]);
    assert_eq!(
        docs[0].text,
        "POLICY_A:\n\n\
         ----x----\nchunk_id: POLICY_A_chunk_0\nchunk_content: Retention lasts seven years.\nmetadata:\n  Header 1: Retention\n\n\
         ----x----\nchunk_id: POLICY_A_chunk_1\nchunk_content: Access requires approval.\n\n"
    );
    assert_eq!(docs[1].name, "GUIDE");
}

#[test]
fn merge_puts_agreed_chunks_first_then_fills_from_reranker() {
    let scored = vec![
        ("c0".to_string(), 0.1),
        ("c1".to_string(), 0.9),
        ("c2".to_string(), 0.5),
        ("c3".to_string(), 0.7),
    ];
    let llm = vec!["c2".to_string(), "c9".to_string()];
    let (final_ids, overlapping) = merge_ground_truth(&llm, scored, 3);
    assert_eq!(overlapping, vec!["c2"]);
    assert_eq!(final_ids, vec!["c2", "c1", "c3"]);
}

#[test]
fn merge_only_counts_agreement_inside_the_top_ten() {
    let scored: Vec<(String, f32)> = (0..15).map(|i| (format!("c{i}"), 100.0 - i as f32)).collect();
    let llm = vec!["c12".to_string(), "c3".to_string()];
    let (final_ids, overlapping) = merge_ground_truth(&llm, scored, 20);
    assert_eq!(overlapping, vec!["c3"]);
    assert_eq!(final_ids.len(), 15);
    assert_eq!(final_ids[0], "c3");
    assert_eq!(final_ids[1], "c0");
}

#[test]
fn create_final_eval_set_generates_per_document_and_retries_bad_json() {
    let llm = ScriptedLlm::new(&[
        "not json at all",
        r#"{"questions": [{"question": "How long is retention?", "answer": "Seven years.", "difficulty": "easy", "chunk_ids": ["POLICY_A_chunk_0", "GUIDE_chunk_0"]}]}"#,
        r#"[{"question": "When do backups run?", "answer": "Nightly.", "difficulty": "medium", "chunk_ids": ["GUIDE_chunk_0"]}]"#,
    ]);
    let generator = EvalSetGenerator::new(&llm, "mock", &WordOverlapReranker, 2);
    let items = generator.create_final_eval_set(&chunks(), 1, 20).expect("eval set");

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].document, "POLICY_A");
    assert_eq!(items[0].difficulty, Difficulty::Easy);
    // The cross-document id is dropped; the agreed chunk leads.
    assert_eq!(items[0].overlapping_chunks, vec!["POLICY_A_chunk_0"]);
    assert_eq!(items[0].chunk_ids, vec!["POLICY_A_chunk_0", "POLICY_A_chunk_1"]);
    assert_eq!(items[1].document, "GUIDE");
    assert_eq!(items[1].chunk_ids, vec!["GUIDE_chunk_0"]);

    let prompts = llm.prompts.borrow();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[0].json_output);
    assert!(prompts[0].user.contains("exactly 1 questions"));
    assert!(prompts[1].user.contains("not json at all"));
}

#[test]
fn generation_failure_after_retries_is_reported() {
    let llm = ScriptedLlm::new(&["nope", "still nope"]);
    let generator = EvalSetGenerator::new(&llm, "mock", &WordOverlapReranker, 1);
    let err = generator.create_final_eval_set(&chunks(), 1, 20).expect_err("fails");
    assert_eq!(err.code, "EVALSET_GENERATION_FAILED");
    assert!(err.details.unwrap().contains("POLICY_A"));
}
