use std::time::Duration;

use rb_core::error::AppError;
use serde::Deserialize;
use serde_json::json;

use super::{bounded_input, Embedder};
use crate::openai::OpenAiClient;

#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: OpenAiClient,
}

impl OpenAiEmbedder {
    pub fn new(client: OpenAiClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl Embedder for OpenAiEmbedder {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        let body = json!({ "model": model, "input": [bounded_input(input)] });
        let raw = self
            .client
            .post_json("EMBED_FAILED", "/embeddings", body, Duration::from_secs(30))?;
        let resp: EmbeddingResponse = serde_json::from_value(raw).map_err(|e| {
            AppError::new("EMBED_FAILED", "Unexpected embeddings response shape")
                .with_details(e.to_string())
        })?;
        match resp.data.into_iter().next() {
            Some(d) if !d.embedding.is_empty() => Ok(d.embedding),
            _ => Err(AppError::new("EMBED_FAILED", "Embeddings response was empty")),
        }
    }
}
