//! Runtime settings read from the process environment.
//!
//! `.env` loading happens once in the binary before [`Settings::from_env`]
//! is called; library code only ever receives a finished `Settings`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Ollama,
    OpenAi,
}

impl Provider {
    pub fn default_chat_model(self) -> &'static str {
        match self {
            Provider::Ollama => "llama3.1",
            Provider::OpenAi => "gpt-4o",
        }
    }

    pub fn default_embed_model(self) -> &'static str {
        match self {
            Provider::Ollama => "nomic-embed-text",
            Provider::OpenAi => "text-embedding-3-small",
        }
    }
}

impl FromStr for Provider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Provider::Ollama),
            "openai" | "open_ai" => Ok(Provider::OpenAi),
            other => Err(AppError::new("CONFIG_INVALID", "Unknown provider")
                .with_details(format!("provider={other}; expected ollama|openai"))),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provider::Ollama => "ollama",
            Provider::OpenAi => "openai",
        })
    }
}

/// What to do when an LLM cites a chunk id that was not among the retrieved
/// chunks handed to the citation matcher.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MissingChunkPolicy {
    /// Keep the claimed text as-is and log a warning.
    #[default]
    PassThrough,
    /// Drop the entry and report the id back to the caller.
    Reject,
}

impl FromStr for MissingChunkPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "pass_through" | "passthrough" => Ok(MissingChunkPolicy::PassThrough),
            "reject" => Ok(MissingChunkPolicy::Reject),
            other => Err(AppError::new("CONFIG_INVALID", "Unknown missing-citation policy")
                .with_details(format!("value={other}; expected pass_through|reject"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub provider: Provider,
    pub ollama_base_url: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub chat_model: String,
    pub embed_model: String,
    pub max_retries: u32,
    pub missing_chunk_policy: MissingChunkPolicy,
}

impl Settings {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build settings from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let provider = match get("RAGBENCH_PROVIDER") {
            Some(p) => p.parse()?,
            None => Provider::Ollama,
        };
        let max_retries = match get("RAGBENCH_MAX_RETRIES") {
            Some(v) => v.parse::<u32>().map_err(|e| {
                AppError::new("CONFIG_INVALID", "RAGBENCH_MAX_RETRIES must be a non-negative integer")
                    .with_details(format!("value={v}; err={e}"))
            })?,
            None => DEFAULT_MAX_RETRIES,
        };
        let missing_chunk_policy = match get("RAGBENCH_MISSING_CITATION") {
            Some(v) => v.parse()?,
            None => MissingChunkPolicy::default(),
        };

        Ok(Self {
            provider,
            ollama_base_url: get("OLLAMA_BASE_URL").unwrap_or_else(|| DEFAULT_OLLAMA_BASE_URL.to_string()),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            chat_model: get("RAGBENCH_CHAT_MODEL")
                .unwrap_or_else(|| provider.default_chat_model().to_string()),
            embed_model: get("RAGBENCH_EMBED_MODEL")
                .unwrap_or_else(|| provider.default_embed_model().to_string()),
            max_retries,
            missing_chunk_policy,
        })
    }

    /// Switch provider, resetting models that were still at the old provider's defaults.
    pub fn with_provider(mut self, provider: Provider) -> Self {
        if self.chat_model == self.provider.default_chat_model() {
            self.chat_model = provider.default_chat_model().to_string();
        }
        if self.embed_model == self.provider.default_embed_model() {
            self.embed_model = provider.default_embed_model().to_string();
        }
        self.provider = provider;
        self
    }

    pub fn require_openai_key(&self) -> Result<&str, AppError> {
        self.openai_api_key.as_deref().ok_or_else(|| {
            AppError::new("CONFIG_MISSING", "OPENAI_API_KEY is required for the openai provider")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_to_local_ollama() {
        let s = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(s.provider, Provider::Ollama);
        assert_eq!(s.ollama_base_url, DEFAULT_OLLAMA_BASE_URL);
        assert_eq!(s.chat_model, "llama3.1");
        assert_eq!(s.max_retries, 3);
        assert_eq!(s.missing_chunk_policy, MissingChunkPolicy::PassThrough);
        assert!(s.require_openai_key().is_err());
    }

    #[test]
    fn openai_provider_picks_openai_defaults() {
        let s = Settings::from_lookup(lookup(&[
            ("RAGBENCH_PROVIDER", "OpenAI"),
            ("OPENAI_API_KEY", "sk-test"),
            ("RAGBENCH_MISSING_CITATION", "reject"),
        ]))
        .unwrap();
        assert_eq!(s.provider, Provider::OpenAi);
        assert_eq!(s.chat_model, "gpt-4o");
        assert_eq!(s.embed_model, "text-embedding-3-small");
        assert_eq!(s.require_openai_key().unwrap(), "sk-test");
        assert_eq!(s.missing_chunk_policy, MissingChunkPolicy::Reject);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let err = Settings::from_lookup(lookup(&[("RAGBENCH_PROVIDER", "vertex")])).unwrap_err();
        assert_eq!(err.code, "CONFIG_INVALID");
        let err = Settings::from_lookup(lookup(&[("RAGBENCH_MAX_RETRIES", "-1")])).unwrap_err();
        assert_eq!(err.code, "CONFIG_INVALID");
    }

    #[test]
    fn with_provider_keeps_explicit_models() {
        let s = Settings::from_lookup(lookup(&[("RAGBENCH_CHAT_MODEL", "mistral")]))
            .unwrap()
            .with_provider(Provider::OpenAi);
        assert_eq!(s.chat_model, "mistral");
        assert_eq!(s.embed_model, "text-embedding-3-small");
    }
}
