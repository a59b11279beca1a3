use rb_ai::embeddings::{Embedder, OllamaEmbedder, OpenAiEmbedder};
use rb_ai::llm::{Llm, OllamaLlm, OpenAiLlm};
use rb_ai::ollama::OllamaClient;
use rb_ai::openai::OpenAiClient;
use rb_core::config::{Provider, Settings};
use rb_core::error::AppError;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub ok: bool,
    pub provider: String,
    pub message: String,
}

fn openai_client(settings: &Settings) -> Result<OpenAiClient, AppError> {
    OpenAiClient::new(settings.require_openai_key()?, &settings.openai_base_url)
}

pub fn build_llm(settings: &Settings) -> Result<Box<dyn Llm>, AppError> {
    debug!(provider = %settings.provider, model = %settings.chat_model, "building chat client");
    Ok(match settings.provider {
        Provider::Ollama => Box::new(OllamaLlm::new(OllamaClient::new(&settings.ollama_base_url)?)),
        Provider::OpenAi => Box::new(OpenAiLlm::new(openai_client(settings)?)),
    })
}

pub fn build_embedder(settings: &Settings) -> Result<Box<dyn Embedder>, AppError> {
    debug!(provider = %settings.provider, model = %settings.embed_model, "building embedding client");
    Ok(match settings.provider {
        Provider::Ollama => Box::new(OllamaEmbedder::new(OllamaClient::new(&settings.ollama_base_url)?)),
        Provider::OpenAi => Box::new(OpenAiEmbedder::new(openai_client(settings)?)),
    })
}

/// Ollama is probed over HTTP; for OpenAI only the local configuration is
/// checked so the command never spends tokens.
pub fn health_check(settings: &Settings) -> Result<HealthStatus, AppError> {
    let message = match settings.provider {
        Provider::Ollama => {
            let client = OllamaClient::new(&settings.ollama_base_url)?;
            client.health_check()?;
            format!("Ollama reachable at {}", client.base_url())
        }
        Provider::OpenAi => {
            let client = openai_client(settings)?;
            format!("OpenAI configured for {}", client.base_url())
        }
    };
    Ok(HealthStatus {
        ok: true,
        provider: settings.provider.to_string(),
        message,
    })
}
