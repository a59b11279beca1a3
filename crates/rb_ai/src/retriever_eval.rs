use std::collections::BTreeSet;

use rb_core::error::AppError;
use rb_core::records::{EvalItem, RetrieverEvalReport, RetrieverEvalResult, RetrieverEvalSummary};
use tracing::info;

use crate::retrieve::Retriever;

pub const DEFAULT_EVAL_K: usize = 20;

pub fn evaluate_question(
    retriever: &dyn Retriever,
    question: &str,
    ground_truth: &[String],
    k: usize,
) -> Result<RetrieverEvalResult, AppError> {
    let retrieved: Vec<String> = retriever
        .search(question, k)?
        .into_iter()
        .map(|h| h.chunk_id)
        .collect();

    let got: BTreeSet<&str> = retrieved.iter().map(String::as_str).collect();
    let mut seen = BTreeSet::new();
    let overlapping: Vec<String> = ground_truth
        .iter()
        .filter(|id| got.contains(id.as_str()) && seen.insert(id.as_str()))
        .cloned()
        .collect();

    let distinct_truth = ground_truth.iter().collect::<BTreeSet<_>>().len();
    let recall = if distinct_truth == 0 {
        0.0
    } else {
        overlapping.len() as f64 / distinct_truth as f64
    };

    Ok(RetrieverEvalResult {
        question: question.to_string(),
        ground_truth: ground_truth.to_vec(),
        retrieved_chunks: retrieved,
        total_overlap: overlapping.len(),
        overlapping_chunks: overlapping,
        recall,
    })
}

pub fn evaluate_all(
    retriever: &dyn Retriever,
    items: &[EvalItem],
    k: usize,
) -> Result<RetrieverEvalReport, AppError> {
    let total = items.len();
    let mut results = Vec::with_capacity(total);
    for (i, item) in items.iter().enumerate() {
        info!("evaluating question {}/{}", i + 1, total);
        results.push(evaluate_question(retriever, &item.question, &item.chunk_ids, k)?);
    }
    let summary = summarize(&results, k);
    info!(
        mean_recall = summary.mean_recall,
        hit_rate = summary.hit_rate,
        "retriever evaluation finished"
    );
    Ok(RetrieverEvalReport { summary, results })
}

pub fn summarize(results: &[RetrieverEvalResult], k: usize) -> RetrieverEvalSummary {
    let n = results.len();
    if n == 0 {
        return RetrieverEvalSummary {
            questions: 0,
            k,
            mean_overlap: 0.0,
            mean_recall: 0.0,
            hit_rate: 0.0,
        };
    }
    let nf = n as f64;
    RetrieverEvalSummary {
        questions: n,
        k,
        mean_overlap: results.iter().map(|r| r.total_overlap as f64).sum::<f64>() / nf,
        mean_recall: results.iter().map(|r| r.recall).sum::<f64>() / nf,
        hit_rate: results.iter().filter(|r| r.total_overlap > 0).count() as f64 / nf,
    }
}
