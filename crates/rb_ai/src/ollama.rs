use std::time::Duration;

use rb_core::error::AppError;

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
}

impl OllamaClient {
    /// Create a client for Ollama. This is strictly limited to `127.0.0.1`.
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if !is_loopback_base_url(&base_url) {
            return Err(AppError::new(
                "CONFIG_INVALID",
                "Ollama base URL must be localhost (127.0.0.1)",
            )
            .with_details(format!("base_url={base_url}")));
        }
        Ok(Self { base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn health_check(&self) -> Result<(), AppError> {
        let url = format!("{}/api/tags", self.base_url);
        match ureq::get(&url).timeout(Duration::from_millis(800)).call() {
            Ok(r) if r.status() == 200 => Ok(()),
            Ok(r) => Err(AppError::new("LLM_UNHEALTHY", "Ollama health check failed")
                .with_details(format!("status={}", r.status()))),
            Err(e) => Err(AppError::new("LLM_UNREACHABLE", "Failed to reach Ollama on 127.0.0.1")
                .with_details(e.to_string())
                .with_retryable(true)),
        }
    }
}

/// `http://127.0.0.1` with an optional explicit port in 1..=65535 and no path.
fn is_loopback_base_url(url: &str) -> bool {
    let Some(rest) = url.strip_prefix("http://127.0.0.1") else {
        return false;
    };
    if rest.is_empty() {
        return true;
    }
    let Some(port) = rest.strip_prefix(':') else {
        return false;
    };
    !port.is_empty()
        && port.chars().all(|c| c.is_ascii_digit())
        && matches!(port.parse::<u32>(), Ok(p) if (1..=65535).contains(&p))
}

#[cfg(test)]
mod tests {
    use super::OllamaClient;

    #[test]
    fn enforces_loopback_only_base_url() {
        assert!(OllamaClient::new("http://127.0.0.1:11434").is_ok());
        assert!(OllamaClient::new("http://127.0.0.1").is_ok());
        assert_eq!(
            OllamaClient::new("http://127.0.0.1:11434/").unwrap().base_url(),
            "http://127.0.0.1:11434"
        );

        assert!(OllamaClient::new("http://localhost:11434").is_err());
        assert!(OllamaClient::new("http://0.0.0.0:11434").is_err());
        assert!(OllamaClient::new("https://example.com").is_err());
        assert!(OllamaClient::new("http://127.0.0.1.evil.com:11434").is_err());
        assert!(OllamaClient::new("http://127.0.0.1@evil.com:11434").is_err());
        assert!(OllamaClient::new("http://127.0.0.1:").is_err());
        assert!(OllamaClient::new("http://127.0.0.1:0").is_err());
        assert!(OllamaClient::new("http://127.0.0.1:99999").is_err());
        assert!(OllamaClient::new("http://127.0.0.1:11434/api").is_err());
    }

    #[test]
    fn rejected_url_is_a_config_error() {
        let err = OllamaClient::new("http://10.0.0.2:11434").unwrap_err();
        assert_eq!(err.code, "CONFIG_INVALID");
    }
}
