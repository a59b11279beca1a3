use std::time::Duration;

use rb_core::error::AppError;
use serde::Deserialize;

/// Connection details for an OpenAI-compatible HTTP API.
#[derive(Clone)]
pub struct OpenAiClient {
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl OpenAiClient {
    pub fn new(api_key: &str, base_url: &str) -> Result<Self, AppError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(AppError::new("CONFIG_MISSING", "OpenAI API key must not be empty"));
        }
        let base_url = base_url.trim().trim_end_matches('/');
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(AppError::new("CONFIG_INVALID", "OpenAI base URL must be http(s)")
                .with_details(format!("base_url={base_url}")));
        }
        Ok(Self {
            api_key: api_key.to_string(),
            base_url: base_url.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST a JSON body to `{base_url}{path}` and return the decoded JSON
    /// response. Errors carry `code`; HTTP 429 and 5xx are retryable.
    pub(crate) fn post_json(
        &self,
        code: &str,
        path: &str,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, AppError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = ureq::post(&url)
            .timeout(timeout)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(body);

        match resp {
            Ok(r) => r.into_json().map_err(|e| {
                AppError::new(code, "Failed to decode OpenAI response").with_details(e.to_string())
            }),
            Err(ureq::Error::Status(status, r)) => {
                let body = r.into_string().unwrap_or_default();
                let detail = serde_json::from_str::<ErrorResponse>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                Err(AppError::new(code, "OpenAI request failed")
                    .with_details(format!("status={status}; err={detail}"))
                    .with_retryable(status == 429 || status >= 500))
            }
            Err(e) => Err(AppError::new(code, "Failed to call OpenAI endpoint")
                .with_details(e.to_string())
                .with_retryable(true)),
        }
    }
}
