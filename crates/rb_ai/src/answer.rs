use std::collections::{BTreeMap, BTreeSet};

use rb_core::config::MissingChunkPolicy;
use rb_core::error::AppError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::citation::{self, CitationMap, CitationResolution};
use crate::llm::structured::extract_json;

/// The only answer allowed when the question is not covered by the context.
pub const CANNOT_HELP: &str = "I cannot help with that";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("answer must be '{CANNOT_HELP}' if query is not relevant")]
    IrrelevantAnswerText,
    #[error("citation must be null if query is not relevant")]
    IrrelevantWithCitation,
    #[error("citation must be provided if query is relevant")]
    MissingCitation,
    #[error("retrieved chunk ids must be provided for citation validation")]
    NoRetrievedChunks,
    #[error("cited chunk id {0} not found in retrieved chunks")]
    UnknownChunkId(String),
    #[error("response is not a valid answer object: {0}")]
    Malformed(String),
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::new("ANSWER_INVALID", "LLM answer failed validation").with_details(e.to_string())
    }
}

/// Shape the model is asked to return.
#[derive(Debug, Clone, Deserialize)]
struct RawAnswer {
    is_relevant: bool,
    answer: String,
    #[serde(default)]
    citation: Option<CitationMap>,
}

/// An LLM answer whose cross-field invariants have been checked. Only
/// constructible through [`AnswerWithCitation::new`] or
/// [`AnswerWithCitation::from_llm_json`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AnswerWithCitation {
    is_relevant: bool,
    answer: String,
    citation: Option<CitationMap>,
}

impl AnswerWithCitation {
    pub fn new(
        is_relevant: bool,
        answer: impl Into<String>,
        citation: Option<CitationMap>,
        retrieved_chunk_ids: &[String],
    ) -> Result<Self, ValidationError> {
        let answer = answer.into();
        if !is_relevant {
            if answer.trim() != CANNOT_HELP {
                return Err(ValidationError::IrrelevantAnswerText);
            }
            if citation.is_some() {
                return Err(ValidationError::IrrelevantWithCitation);
            }
            return Ok(Self {
                is_relevant,
                answer: CANNOT_HELP.to_string(),
                citation: None,
            });
        }

        let Some(citation) = citation else {
            return Err(ValidationError::MissingCitation);
        };
        if retrieved_chunk_ids.is_empty() {
            return Err(ValidationError::NoRetrievedChunks);
        }
        let allowed: BTreeSet<&str> = retrieved_chunk_ids.iter().map(String::as_str).collect();
        if let Some(bad) = citation.keys().find(|id| !allowed.contains(id.as_str())) {
            return Err(ValidationError::UnknownChunkId(bad.clone()));
        }

        Ok(Self {
            is_relevant,
            answer,
            citation: Some(citation),
        })
    }

    /// Parse and validate raw model output. Prose around the JSON object is ignored.
    pub fn from_llm_json(raw: &str, retrieved_chunk_ids: &[String]) -> Result<Self, ValidationError> {
        let json = extract_json(raw)
            .ok_or_else(|| ValidationError::Malformed("no JSON object in response".to_string()))?;
        let parsed: RawAnswer =
            serde_json::from_str(json).map_err(|e| ValidationError::Malformed(e.to_string()))?;
        Self::new(parsed.is_relevant, parsed.answer, parsed.citation, retrieved_chunk_ids)
    }

    pub fn is_relevant(&self) -> bool {
        self.is_relevant
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn citation(&self) -> Option<&CitationMap> {
        self.citation.as_ref()
    }

    /// Replace claimed quotes with exact spans of the retrieved chunks.
    pub fn process_citations(&self, retrieved_chunks: &BTreeMap<String, String>) -> Option<CitationMap> {
        citation::resolve(self.citation.as_ref()?, retrieved_chunks)
    }

    pub fn process_citations_with_policy(
        &self,
        retrieved_chunks: &BTreeMap<String, String>,
        policy: MissingChunkPolicy,
    ) -> Option<CitationResolution> {
        citation::resolve_with_policy(self.citation.as_ref()?, retrieved_chunks, policy)
    }
}
