use std::time::Duration;

use rb_core::error::AppError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::{Llm, Prompt};
use crate::openai::OpenAiClient;

#[derive(Debug, Clone)]
pub struct OpenAiLlm {
    client: OpenAiClient,
    timeout: Duration,
}

impl OpenAiLlm {
    pub fn new(client: OpenAiClient) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl Llm for OpenAiLlm {
    fn generate(&self, model: &str, prompt: &Prompt) -> Result<String, AppError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = prompt.system.as_deref() {
            messages.push(Message {
                role: "system",
                content: system,
            });
        }
        messages.push(Message {
            role: "user",
            content: &prompt.user,
        });

        let mut body = json!({ "model": model, "messages": messages });
        if prompt.json_output {
            body["response_format"] = json!({ "type": "json_object" });
        }
        debug!(%model, json = prompt.json_output, "openai chat completion");

        let raw = self
            .client
            .post_json("LLM_REQUEST_FAILED", "/chat/completions", body, self.timeout)?;
        let resp: ChatResponse = serde_json::from_value(raw).map_err(|e| {
            AppError::new("LLM_REQUEST_FAILED", "Unexpected chat completion shape")
                .with_details(e.to_string())
        })?;

        let content = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(AppError::new("LLM_EMPTY_RESPONSE", "Model response was empty")
                .with_retryable(true));
        }
        Ok(content)
    }
}
