use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// One entry of `retriever_evaluation_set.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvalItem {
    pub question: String,
    pub answer: String,
    pub difficulty: Difficulty,
    /// Final ground truth: chunks agreed on by the generator and the
    /// reranker first, then the reranker's remaining top picks.
    pub chunk_ids: Vec<String>,
    pub document: String,
    #[serde(default)]
    pub overlapping_chunks: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrieverEvalResult {
    pub question: String,
    pub ground_truth: Vec<String>,
    pub retrieved_chunks: Vec<String>,
    pub overlapping_chunks: Vec<String>,
    pub total_overlap: usize,
    pub recall: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrieverEvalSummary {
    pub questions: usize,
    pub k: usize,
    pub mean_overlap: f64,
    pub mean_recall: f64,
    /// Share of questions with at least one ground-truth chunk retrieved.
    pub hit_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrieverEvalReport {
    pub summary: RetrieverEvalSummary,
    pub results: Vec<RetrieverEvalResult>,
}

/// One entry of `llm_responses_eval_set.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseRecord {
    pub question: String,
    pub ground_truth_answer: String,
    pub difficulty: Difficulty,
    pub ground_truth_chunk_ids: Vec<String>,
    pub document: String,
    #[serde(default)]
    pub retrieved_chunk_ids: Vec<String>,
    pub llm_response: Option<String>,
    #[serde(default)]
    pub is_relevant: bool,
    pub cited_chunk_ids: Option<BTreeMap<String, String>>,
}

impl ResponseRecord {
    /// A record for an eval item whose generation has not run (or failed).
    pub fn unanswered(item: &EvalItem) -> Self {
        Self {
            question: item.question.clone(),
            ground_truth_answer: item.answer.clone(),
            difficulty: item.difficulty,
            ground_truth_chunk_ids: item.chunk_ids.clone(),
            document: item.document.clone(),
            retrieved_chunk_ids: Vec::new(),
            llm_response: None,
            is_relevant: false,
            cited_chunk_ids: None,
        }
    }
}

pub const BINARY_SCORES: [f64; 2] = [0.0, 1.0];
pub const GRADED_SCORES: [f64; 3] = [0.0, 0.5, 1.0];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationMetrics {
    pub relevancy_score: f64,
    pub correctness_score: f64,
    pub context_alignment_score: f64,
    pub citation_score: f64,
    pub safety_score: f64,
    pub feedback: String,
}

impl EvaluationMetrics {
    /// Relevancy and safety are binary; the other scores allow a half mark.
    pub fn validate(&self) -> Result<(), AppError> {
        let checks: [(&str, f64, &[f64]); 5] = [
            ("relevancy_score", self.relevancy_score, &BINARY_SCORES),
            ("correctness_score", self.correctness_score, &GRADED_SCORES),
            ("context_alignment_score", self.context_alignment_score, &GRADED_SCORES),
            ("citation_score", self.citation_score, &GRADED_SCORES),
            ("safety_score", self.safety_score, &BINARY_SCORES),
        ];
        for (name, value, allowed) in checks {
            if !allowed.iter().any(|a| (a - value).abs() < 1e-9) {
                return Err(AppError::new("JUDGE_SCORE_INVALID", "Score outside allowed values")
                    .with_details(format!("{name}={value}; allowed={allowed:?}")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordEvaluation {
    pub question: String,
    #[serde(flatten)]
    pub metrics: EvaluationMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AverageScores {
    pub avg_relevancy_score: f64,
    pub avg_correctness_score: f64,
    pub avg_context_alignment_score: f64,
    pub avg_citation_score: f64,
    pub avg_safety_score: f64,
}

impl AverageScores {
    /// `None` when there is nothing to average.
    pub fn from_metrics<'a, I>(metrics: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a EvaluationMetrics>,
    {
        let mut n = 0usize;
        let mut sums = [0.0f64; 5];
        for m in metrics {
            n += 1;
            sums[0] += m.relevancy_score;
            sums[1] += m.correctness_score;
            sums[2] += m.context_alignment_score;
            sums[3] += m.citation_score;
            sums[4] += m.safety_score;
        }
        if n == 0 {
            return None;
        }
        let n = n as f64;
        Some(Self {
            avg_relevancy_score: sums[0] / n,
            avg_correctness_score: sums[1] / n,
            avg_context_alignment_score: sums[2] / n,
            avg_citation_score: sums[3] / n,
            avg_safety_score: sums[4] / n,
        })
    }

    pub fn as_pairs(&self) -> [(&'static str, f64); 5] {
        [
            ("avg_relevancy_score", self.avg_relevancy_score),
            ("avg_correctness_score", self.avg_correctness_score),
            ("avg_context_alignment_score", self.avg_context_alignment_score),
            ("avg_citation_score", self.avg_citation_score),
            ("avg_safety_score", self.avg_safety_score),
        ]
    }
}

/// Contents of `rag_evaluation_results.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationReport {
    pub experiment_dir: String,
    pub individual_evaluations: Vec<RecordEvaluation>,
    pub average_scores: AverageScores,
    #[serde(default)]
    pub skipped: usize,
}
