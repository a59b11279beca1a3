use std::cell::RefCell;
use std::collections::HashMap;

use rb_core::error::AppError;

use crate::embeddings::Embedder;
use crate::retrieve::similarity::cosine;

/// Relevance of a passage to a query; higher is more relevant. Only the
/// ordering of scores for one query matters.
pub trait Reranker {
    fn score(&self, query: &str, passage: &str) -> Result<f32, AppError>;
}

/// Bi-encoder stand-in for a cross-encoder: cosine similarity of the query
/// and passage embeddings. Vectors are cached because every question of a
/// document is scored against the same passages.
pub struct EmbeddingReranker<'a> {
    embedder: &'a dyn Embedder,
    model: String,
    cache: RefCell<HashMap<String, Vec<f32>>>,
}

impl<'a> EmbeddingReranker<'a> {
    pub fn new(embedder: &'a dyn Embedder, model: impl Into<String>) -> Self {
        Self {
            embedder,
            model: model.into(),
            cache: RefCell::new(HashMap::new()),
        }
    }

    fn vector(&self, text: &str) -> Result<Vec<f32>, AppError> {
        if let Some(v) = self.cache.borrow().get(text) {
            return Ok(v.clone());
        }
        let v = self.embedder.embed(&self.model, text)?;
        self.cache.borrow_mut().insert(text.to_string(), v.clone());
        Ok(v)
    }
}

impl Reranker for EmbeddingReranker<'_> {
    fn score(&self, query: &str, passage: &str) -> Result<f32, AppError> {
        let q = self.vector(query)?;
        let p = self.vector(passage)?;
        if q.len() != p.len() {
            return Err(AppError::new("EVALSET_RERANK_FAILED", "Query and passage dims differ")
                .with_details(format!("query_dims={}; passage_dims={}", q.len(), p.len())));
        }
        Ok(cosine(&q, &p))
    }
}
