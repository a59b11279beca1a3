use std::time::Duration;

use rb_core::error::AppError;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Llm, Prompt};
use crate::ollama::OllamaClient;

#[derive(Debug, Clone)]
pub struct OllamaLlm {
    client: OllamaClient,
    timeout: Duration,
}

impl OllamaLlm {
    pub fn new(client: OllamaClient) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl Llm for OllamaLlm {
    fn generate(&self, model: &str, prompt: &Prompt) -> Result<String, AppError> {
        let url = format!("{}/api/generate", self.client.base_url());
        let req = GenerateRequest {
            model,
            prompt: &prompt.user,
            system: prompt.system.as_deref(),
            format: prompt.json_output.then_some("json"),
            stream: false,
        };
        debug!(%model, json = prompt.json_output, "ollama generate");

        let resp = ureq::post(&url).timeout(self.timeout).send_json(
            serde_json::to_value(req).map_err(|e| {
                AppError::new("LLM_REQUEST_FAILED", "Failed to encode generate request")
                    .with_details(e.to_string())
            })?,
        );

        match resp {
            Ok(r) if r.status() == 200 => {
                let v: GenerateResponse = r.into_json().map_err(|e| {
                    AppError::new("LLM_REQUEST_FAILED", "Failed to decode generate response")
                        .with_details(e.to_string())
                })?;
                if v.response.trim().is_empty() {
                    return Err(AppError::new("LLM_EMPTY_RESPONSE", "Model response was empty")
                        .with_retryable(true));
                }
                Ok(v.response)
            }
            Ok(r) => Err(AppError::new("LLM_REQUEST_FAILED", "Generate request failed")
                .with_details(format!("status={}", r.status()))),
            Err(e) => Err(AppError::new("LLM_REQUEST_FAILED", "Failed to call generate endpoint")
                .with_details(e.to_string())
                .with_retryable(true)),
        }
    }
}
