use std::collections::BTreeMap;

use rb_core::config::MissingChunkPolicy;
use rb_core::error::AppError;
use rb_core::records::{EvalItem, ResponseRecord};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::answer::AnswerWithCitation;
use crate::citation::CitationMap;
use crate::llm::structured::generate_validated;
use crate::llm::{Llm, Prompt};
use crate::retrieve::{Retriever, SearchHit};

mod prompts;

pub const DEFAULT_RESPONSE_K: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    pub llm_response: String,
    pub is_relevant: bool,
    pub cited_chunk_ids: Option<CitationMap>,
    pub retrieved_chunk_ids: Vec<String>,
}

pub fn format_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|h| format!("Source: {}\nContent: {}\n", h.chunk_id, h.content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_prompt(query: &str, context: &str) -> Prompt {
    Prompt::new(prompts::answer_user_prompt(query, context))
        .with_system(prompts::answer_system_prompt())
        .json()
}

/// Retrieve, answer with citations, and anchor the citations onto the
/// retrieved chunk text.
pub struct RagResponder<'a> {
    retriever: &'a dyn Retriever,
    llm: &'a dyn Llm,
    model: String,
    max_retries: u32,
    policy: MissingChunkPolicy,
}

impl<'a> RagResponder<'a> {
    pub fn new(retriever: &'a dyn Retriever, llm: &'a dyn Llm, model: impl Into<String>) -> Self {
        Self {
            retriever,
            llm,
            model: model.into(),
            max_retries: rb_core::config::DEFAULT_MAX_RETRIES,
            policy: MissingChunkPolicy::default(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Answers citing a chunk outside the retrieved set fail validation and
    /// are re-prompted, so by the time citations are resolved every cited id
    /// is present. The policy only guards that lookup.
    pub fn with_missing_chunk_policy(mut self, policy: MissingChunkPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn process_query(&self, query: &str, k: usize) -> Result<QueryResponse, AppError> {
        info!(%query, k, "answering query");
        let hits = self.retriever.search(query, k)?;

        let mut retrieved_chunk_ids: Vec<String> = Vec::with_capacity(hits.len());
        let mut retrieved: BTreeMap<String, String> = BTreeMap::new();
        for h in hits.iter() {
            if retrieved.insert(h.chunk_id.clone(), h.content.clone()).is_none() {
                retrieved_chunk_ids.push(h.chunk_id.clone());
            }
        }

        let prompt = build_prompt(query, &format_context(&hits));
        let answer = generate_validated(self.llm, &self.model, &prompt, self.max_retries, |raw| {
            AnswerWithCitation::from_llm_json(raw, &retrieved_chunk_ids).map_err(AppError::from)
        })?;

        let cited_chunk_ids = answer
            .process_citations_with_policy(&retrieved, self.policy)
            .map(|r| r.resolved);

        Ok(QueryResponse {
            llm_response: answer.answer().to_string(),
            is_relevant: answer.is_relevant(),
            cited_chunk_ids,
            retrieved_chunk_ids,
        })
    }

    /// One record per item, in input order. A failed item is logged and
    /// recorded as unanswered; it never aborts the batch.
    pub fn process_evaluation_set(&self, items: &[EvalItem], k: usize) -> Vec<ResponseRecord> {
        let total = items.len();
        let mut out = Vec::with_capacity(total);
        for (i, item) in items.iter().enumerate() {
            info!("processing question {}/{}", i + 1, total);
            let mut record = ResponseRecord::unanswered(item);
            match self.process_query(&item.question, k) {
                Ok(resp) => {
                    record.retrieved_chunk_ids = resp.retrieved_chunk_ids;
                    record.llm_response = Some(resp.llm_response);
                    record.is_relevant = resp.is_relevant;
                    record.cited_chunk_ids = resp.cited_chunk_ids;
                }
                Err(e) => {
                    warn!(question = %item.question, err = %e, "failed to answer question");
                }
            }
            out.push(record);
        }
        out
    }
}
