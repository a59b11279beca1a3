use rb_core::error::AppError;

pub mod ollama_llm;
pub mod openai_llm;
pub mod structured;

pub use ollama_llm::OllamaLlm;
pub use openai_llm::OpenAiLlm;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: Option<String>,
    pub user: String,
    /// Ask the backend to constrain output to JSON.
    pub json_output: bool,
}

impl Prompt {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
            json_output: false,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn json(mut self) -> Self {
        self.json_output = true;
        self
    }
}

pub trait Llm {
    fn generate(&self, model: &str, prompt: &Prompt) -> Result<String, AppError>;
}
