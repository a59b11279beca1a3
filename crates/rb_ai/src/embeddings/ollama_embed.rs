use std::time::Duration;

use rb_core::error::AppError;
use serde::{Deserialize, Serialize};

use super::{bounded_input, Embedder};
use crate::ollama::OllamaClient;

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: OllamaClient,
}

impl OllamaEmbedder {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

impl Embedder for OllamaEmbedder {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        let url = format!("{}/api/embeddings", self.client.base_url());
        let req = EmbeddingsRequest {
            model,
            prompt: bounded_input(input),
        };
        let resp = ureq::post(&url).timeout(Duration::from_secs(30)).send_json(
            serde_json::to_value(req).map_err(|e| {
                AppError::new("EMBED_FAILED", "Failed to encode embeddings request")
                    .with_details(e.to_string())
            })?,
        );

        match resp {
            Ok(r) if r.status() == 200 => {
                let v: EmbeddingsResponse = r.into_json().map_err(|e| {
                    AppError::new("EMBED_FAILED", "Failed to decode embeddings response")
                        .with_details(e.to_string())
                })?;
                if v.embedding.is_empty() {
                    return Err(AppError::new("EMBED_FAILED", "Embeddings response was empty"));
                }
                Ok(v.embedding)
            }
            Ok(r) => Err(AppError::new("EMBED_FAILED", "Embeddings request failed")
                .with_details(format!("status={}", r.status()))),
            Err(e) => Err(AppError::new("EMBED_FAILED", "Failed to call embeddings endpoint")
                .with_details(e.to_string())
                .with_retryable(true)),
        }
    }
}
