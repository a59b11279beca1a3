use std::collections::BTreeMap;

use rb_core::chunks::{metadata_value_display, ChunkMetadata, DocumentChunk};
use rb_core::error::AppError;
use rb_core::records::{AverageScores, EvaluationMetrics, EvaluationReport, RecordEvaluation, ResponseRecord};
use tracing::{info, warn};

use crate::citation::CitationMap;
use crate::llm::structured::{extract_json, generate_validated};
use crate::llm::{Llm, Prompt};

mod prompts;

pub use prompts::JUDGE_SYSTEM_PROMPT;

/// `chunk_id -> chunk` over the experiment's chunk file.
pub fn chunk_lookup(chunks: &[DocumentChunk]) -> BTreeMap<String, DocumentChunk> {
    chunks.iter().map(|c| (c.chunk_id.clone(), c.clone())).collect()
}

fn metadata_block(metadata: Option<&ChunkMetadata>) -> String {
    match metadata {
        Some(m) if !m.is_empty() => m
            .iter()
            .map(|(k, v)| format!("{k}: {}", metadata_value_display(v)))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => "No metadata".to_string(),
    }
}

fn chunk_block(chunk_id: &str, metadata: Option<&ChunkMetadata>, content: &str) -> String {
    format!(
        "Chunk ID: {chunk_id}\nMetadata:\n{}\nContent: {content}\n",
        metadata_block(metadata)
    )
}

/// Render retrieved chunks for the judge. Ids missing from `lookup` are skipped.
pub fn format_retrieved_chunks(ids: &[String], lookup: &BTreeMap<String, DocumentChunk>) -> String {
    ids.iter()
        .filter_map(|id| lookup.get(id))
        .map(|c| chunk_block(&c.chunk_id, Some(&c.chunk_metadata), &c.chunk_content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render the resolved citations, with the cited chunk's metadata when known.
pub fn format_cited_chunks(cited: Option<&CitationMap>, lookup: &BTreeMap<String, DocumentChunk>) -> String {
    let Some(cited) = cited else {
        return "No citations provided".to_string();
    };
    cited
        .iter()
        .map(|(id, quote)| chunk_block(id, lookup.get(id).map(|c| &c.chunk_metadata), quote))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decode and range-check a judge response.
pub fn parse_metrics(raw: &str) -> Result<EvaluationMetrics, AppError> {
    let json = extract_json(raw)
        .ok_or_else(|| AppError::new("JUDGE_INVALID", "No JSON object in judge response"))?;
    let metrics: EvaluationMetrics = serde_json::from_str(json).map_err(|e| {
        AppError::new("JUDGE_INVALID", "Judge response has the wrong shape").with_details(e.to_string())
    })?;
    metrics.validate()?;
    Ok(metrics)
}

pub struct RagEvaluator<'a> {
    llm: &'a dyn Llm,
    model: String,
    max_retries: u32,
}

impl<'a> RagEvaluator<'a> {
    pub fn new(llm: &'a dyn Llm, model: impl Into<String>, max_retries: u32) -> Self {
        Self {
            llm,
            model: model.into(),
            max_retries,
        }
    }

    pub fn evaluate_response(
        &self,
        record: &ResponseRecord,
        lookup: &BTreeMap<String, DocumentChunk>,
    ) -> Result<EvaluationMetrics, AppError> {
        let retrieved = format_retrieved_chunks(&record.retrieved_chunk_ids, lookup);
        let cited = format_cited_chunks(record.cited_chunk_ids.as_ref(), lookup);
        let user = prompts::evaluation_prompt(&prompts::JudgeInput {
            question: &record.question,
            ground_truth_answer: &record.ground_truth_answer,
            llm_response: record.llm_response.as_deref().unwrap_or("None"),
            is_relevant: record.is_relevant,
            retrieved_chunks: &retrieved,
            cited_chunks: &cited,
        });
        let prompt = Prompt::new(user).with_system(JUDGE_SYSTEM_PROMPT).json();
        generate_validated(self.llm, &self.model, &prompt, self.max_retries, parse_metrics)
    }

    /// Judge every record. Failed records are logged and counted in
    /// `skipped`; at least one must succeed.
    pub fn evaluate_records(
        &self,
        records: &[ResponseRecord],
        lookup: &BTreeMap<String, DocumentChunk>,
        experiment_dir: &str,
    ) -> Result<EvaluationReport, AppError> {
        let mut evaluations = Vec::with_capacity(records.len());
        let mut skipped = 0usize;
        for record in records {
            info!(question = %record.question, "evaluating response");
            match self.evaluate_response(record, lookup) {
                Ok(metrics) => evaluations.push(RecordEvaluation {
                    question: record.question.clone(),
                    metrics,
                }),
                Err(e) => {
                    warn!(question = %record.question, err = %e, "evaluation failed; skipping");
                    skipped += 1;
                }
            }
        }

        let average_scores = AverageScores::from_metrics(evaluations.iter().map(|e| &e.metrics))
            .ok_or_else(|| {
                AppError::new("JUDGE_NO_RESULTS", "No response could be evaluated")
                    .with_details(format!("records={}; skipped={skipped}", records.len()))
            })?;

        Ok(EvaluationReport {
            experiment_dir: experiment_dir.to_string(),
            individual_evaluations: evaluations,
            average_scores,
            skipped,
        })
    }
}
