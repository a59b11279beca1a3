use rb_core::error::AppError;

pub mod ollama_embed;
pub mod openai_embed;

pub use ollama_embed::OllamaEmbedder;
pub use openai_embed::OpenAiEmbedder;

/// Upper bound on the bytes sent to an embedding endpoint per input.
pub const MAX_EMBED_INPUT_BYTES: usize = 12_000;

pub trait Embedder {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError>;
}

/// Cut `input` to at most [`MAX_EMBED_INPUT_BYTES`], backing off to the
/// nearest char boundary.
pub fn bounded_input(input: &str) -> &str {
    if input.len() <= MAX_EMBED_INPUT_BYTES {
        return input;
    }
    let mut end = MAX_EMBED_INPUT_BYTES;
    while !input.is_char_boundary(end) {
        end -= 1;
    }
    &input[..end]
}
