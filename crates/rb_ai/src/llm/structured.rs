//! Structured output on top of a free-text [`Llm`].
//!
//! The model is asked for JSON; the caller supplies a parser that also
//! enforces any cross-field rules. A rejected response is fed back to the
//! model together with the rejection reason, so the next attempt can
//! correct itself.

use rb_core::error::AppError;
use tracing::{debug, warn};

use super::{Llm, Prompt};

/// Outermost JSON object or array in a model response. Whichever opening
/// bracket comes first decides the kind.
pub fn extract_json(response: &str) -> Option<&str> {
    let trimmed = response.trim();
    let obj = trimmed.find('{');
    let arr = trimmed.find('[');
    let (start, close) = match (obj, arr) {
        (Some(o), Some(a)) if a < o => (a, ']'),
        (Some(o), _) => (o, '}'),
        (None, Some(a)) => (a, ']'),
        (None, None) => return None,
    };
    let end = trimmed.rfind(close)?;
    (start < end).then(|| &trimmed[start..=end])
}

fn retry_prompt(base: &Prompt, previous: &str, reason: &str) -> Prompt {
    let mut p = base.clone();
    p.user = format!(
        "{}\n\nYour previous response was:\n{previous}\n\nIt was rejected: {reason}\nRespond again with corrected JSON only.",
        base.user
    );
    p
}

/// Call `llm` until `parse` accepts the output, allowing `max_retries`
/// attempts after the first. Retryable transport errors use the same budget;
/// other transport errors are returned immediately.
pub fn generate_validated<T, F>(
    llm: &dyn Llm,
    model: &str,
    prompt: &Prompt,
    max_retries: u32,
    parse: F,
) -> Result<T, AppError>
where
    F: Fn(&str) -> Result<T, AppError>,
{
    let mut current = prompt.clone();
    let mut last_err: Option<AppError> = None;

    for attempt in 0..=max_retries {
        let raw = match llm.generate(model, &current) {
            Ok(raw) => raw,
            Err(e) if e.retryable && attempt < max_retries => {
                warn!(attempt, code = %e.code, "model call failed; retrying");
                last_err = Some(e);
                continue;
            }
            Err(e) => return Err(e),
        };

        match parse(&raw) {
            Ok(v) => {
                debug!(attempt, "structured output accepted");
                return Ok(v);
            }
            Err(e) => {
                let reason = e.details.clone().unwrap_or_else(|| e.message.clone());
                warn!(attempt, %reason, "structured output rejected");
                current = retry_prompt(prompt, &raw, &reason);
                last_err = Some(e);
            }
        }
    }

    let last = last_err
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no attempts made".to_string());
    Err(
        AppError::new("LLM_VALIDATION_FAILED", "Model output failed validation after retries")
            .with_details(format!("attempts={}; last_err={last}", max_retries + 1)),
    )
}
