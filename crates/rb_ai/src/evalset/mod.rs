//! Synthetic evaluation set generation.
//!
//! For every source document the LLM writes question/answer pairs and names
//! the chunks it used. A reranker then scores every chunk of that document
//! against each question, and the final ground truth combines both opinions:
//! chunks both agree on come first, the reranker's best remaining picks fill
//! the rest.

use std::collections::{BTreeMap, BTreeSet};

use rb_core::chunks::{metadata_value_display, DocumentChunk};
use rb_core::error::AppError;
use rb_core::records::{Difficulty, EvalItem};
use serde::Deserialize;
use tracing::{info, warn};

use crate::llm::structured::{extract_json, generate_validated};
use crate::llm::{Llm, Prompt};

mod prompts;
mod rerank;

pub use rerank::{EmbeddingReranker, Reranker};

pub const DEFAULT_QUESTIONS_PER_DOC: usize = 10;
pub const DEFAULT_MAX_CHUNKS: usize = 20;
/// How many of the reranker's top chunks count when intersecting with the
/// LLM's own chunk picks.
pub const RERANK_AGREEMENT_WINDOW: usize = 10;

pub const CHUNK_SEPARATOR: &str = "----x----";

/// All chunks of one source document, rendered for the question prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedDocument {
    pub name: String,
    pub text: String,
    pub chunk_ids: Vec<String>,
}

/// Group chunks by document name (first-seen order) and render each group.
pub fn format_document_chunks(chunks: &[DocumentChunk]) -> Vec<FormattedDocument> {
    let mut docs: Vec<FormattedDocument> = Vec::new();
    let mut by_name: BTreeMap<String, usize> = BTreeMap::new();

    for chunk in chunks {
        let name = chunk.document_name();
        let idx = *by_name.entry(name.clone()).or_insert_with(|| {
            docs.push(FormattedDocument {
                text: format!("{name}:\n\n"),
                name,
                chunk_ids: Vec::new(),
            });
            docs.len() - 1
        });
        let doc = &mut docs[idx];

        doc.text.push_str(CHUNK_SEPARATOR);
        doc.text.push('\n');
        doc.text.push_str(&format!("chunk_id: {}\n", chunk.chunk_id));
        doc.text.push_str(&format!("chunk_content: {}\n", chunk.chunk_content));
        if !chunk.chunk_metadata.is_empty() {
            doc.text.push_str("metadata:\n");
            for (key, value) in chunk.chunk_metadata.iter() {
                doc.text
                    .push_str(&format!("  {key}: {}\n", metadata_value_display(value)));
            }
        }
        doc.text.push('\n');
        doc.chunk_ids.push(chunk.chunk_id.clone());
    }
    docs
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GeneratedQuestion {
    pub question: String,
    pub answer: String,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub chunk_ids: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QuestionsPayload {
    Wrapped { questions: Vec<GeneratedQuestion> },
    Bare(Vec<GeneratedQuestion>),
}

/// Parse the question generator's output. Chunk ids outside `allowed` are
/// dropped with a warning; an empty list or a blank question is an error.
pub fn parse_generated_questions(
    raw: &str,
    allowed: &BTreeSet<&str>,
) -> Result<Vec<GeneratedQuestion>, AppError> {
    let json = extract_json(raw)
        .ok_or_else(|| AppError::new("EVALSET_INVALID", "No JSON found in question response"))?;
    let payload: QuestionsPayload = serde_json::from_str(json).map_err(|e| {
        AppError::new("EVALSET_INVALID", "Question response has the wrong shape").with_details(e.to_string())
    })?;
    let mut questions = match payload {
        QuestionsPayload::Wrapped { questions } | QuestionsPayload::Bare(questions) => questions,
    };
    if questions.is_empty() {
        return Err(AppError::new("EVALSET_INVALID", "Question list is empty"));
    }
    for (i, q) in questions.iter_mut().enumerate() {
        if q.question.trim().is_empty() || q.answer.trim().is_empty() {
            return Err(AppError::new("EVALSET_INVALID", "Question and answer must be non-empty")
                .with_details(format!("index={i}")));
        }
        let before = q.chunk_ids.len();
        q.chunk_ids.retain(|id| allowed.contains(id.as_str()));
        if q.chunk_ids.len() != before {
            warn!(index = i, dropped = before - q.chunk_ids.len(), "question cited unknown chunk ids");
        }
    }
    Ok(questions)
}

/// Final ground truth for one question. `scored` is every chunk of the
/// question's document with its reranker score; `llm_ids` are the chunks the
/// generator named. Returns `(final_ids, overlapping_ids)`.
pub fn merge_ground_truth(
    llm_ids: &[String],
    mut scored: Vec<(String, f32)>,
    max_chunks: usize,
) -> (Vec<String>, Vec<String>) {
    // Stable: equal scores keep document order.
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let top: Vec<String> = scored.into_iter().take(max_chunks).map(|(id, _)| id).collect();

    let llm: BTreeSet<&str> = llm_ids.iter().map(String::as_str).collect();
    let overlapping: Vec<String> = top
        .iter()
        .take(RERANK_AGREEMENT_WINDOW)
        .filter(|id| llm.contains(id.as_str()))
        .cloned()
        .collect();

    let mut final_ids = overlapping.clone();
    for id in top.iter() {
        if final_ids.len() >= max_chunks {
            break;
        }
        if !final_ids.contains(id) {
            final_ids.push(id.clone());
        }
    }
    (final_ids, overlapping)
}

pub struct EvalSetGenerator<'a> {
    llm: &'a dyn Llm,
    model: String,
    reranker: &'a dyn Reranker,
    max_retries: u32,
}

impl<'a> EvalSetGenerator<'a> {
    pub fn new(llm: &'a dyn Llm, model: impl Into<String>, reranker: &'a dyn Reranker, max_retries: u32) -> Self {
        Self {
            llm,
            model: model.into(),
            reranker,
            max_retries,
        }
    }

    pub fn generate_questions(
        &self,
        doc: &FormattedDocument,
        num_questions: usize,
    ) -> Result<Vec<GeneratedQuestion>, AppError> {
        let allowed: BTreeSet<&str> = doc.chunk_ids.iter().map(String::as_str).collect();
        let prompt = Prompt::new(prompts::question_generation_prompt(num_questions, &doc.text)).json();
        generate_validated(self.llm, &self.model, &prompt, self.max_retries, |raw| {
            parse_generated_questions(raw, &allowed)
        })
        .map_err(|e| {
            AppError::new("EVALSET_GENERATION_FAILED", "Failed to generate questions")
                .with_details(format!("document={}; err={e}", doc.name))
                .with_retryable(e.retryable)
        })
    }

    pub fn create_final_eval_set(
        &self,
        chunks: &[DocumentChunk],
        questions_per_doc: usize,
        max_chunks: usize,
    ) -> Result<Vec<EvalItem>, AppError> {
        let content: BTreeMap<&str, &str> = chunks
            .iter()
            .map(|c| (c.chunk_id.as_str(), c.chunk_content.as_str()))
            .collect();

        let mut out = Vec::new();
        for doc in format_document_chunks(chunks) {
            info!(document = %doc.name, chunks = doc.chunk_ids.len(), "generating questions");
            let questions = self.generate_questions(&doc, questions_per_doc)?;

            for q in questions {
                let mut scored = Vec::with_capacity(doc.chunk_ids.len());
                for id in doc.chunk_ids.iter() {
                    let passage = content.get(id.as_str()).copied().unwrap_or_default();
                    let score = self.reranker.score(&q.question, passage).map_err(|e| {
                        AppError::new("EVALSET_RERANK_FAILED", "Failed to score chunk")
                            .with_details(format!("chunk_id={id}; err={e}"))
                            .with_retryable(e.retryable)
                    })?;
                    scored.push((id.clone(), score));
                }
                let (chunk_ids, overlapping_chunks) = merge_ground_truth(&q.chunk_ids, scored, max_chunks);
                out.push(EvalItem {
                    question: q.question,
                    answer: q.answer,
                    difficulty: q.difficulty,
                    chunk_ids,
                    document: doc.name.clone(),
                    overlapping_chunks,
                });
            }
        }
        info!(questions = out.len(), "evaluation set ready");
        Ok(out)
    }
}
