//! Citation anchoring.
//!
//! LLMs asked to quote a chunk verbatim often return a lightly reworded
//! quote: different casing, collapsed whitespace, an ellipsis in the middle.
//! [`anchor_quote`] maps such a claim back onto the exact text of the chunk
//! when a two-word prefix and a two-word suffix of the claim can both be
//! found in order; otherwise the claim is returned unchanged.

use std::collections::BTreeMap;

use rb_core::config::MissingChunkPolicy;
use tracing::{debug, warn};

/// Claims with fewer tokens than this are never refined; their two-word
/// anchors would overlap or match too loosely.
pub const MIN_ANCHOR_TOKENS: usize = 4;

/// chunk_id -> claimed (or resolved) quote.
pub type CitationMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CitationResolution {
    pub resolved: CitationMap,
    /// Cited chunk ids with no entry in the chunk lookup.
    pub missing: Vec<String>,
}

/// Resolve every claim against its chunk, keeping claims whose chunk is
/// missing. `None` when either input is empty.
pub fn resolve(claim: &CitationMap, chunks: &BTreeMap<String, String>) -> Option<CitationMap> {
    resolve_with_policy(claim, chunks, MissingChunkPolicy::PassThrough).map(|r| r.resolved)
}

pub fn resolve_with_policy(
    claim: &CitationMap,
    chunks: &BTreeMap<String, String>,
    policy: MissingChunkPolicy,
) -> Option<CitationResolution> {
    if claim.is_empty() || chunks.is_empty() {
        return None;
    }

    let mut out = CitationResolution::default();
    for (chunk_id, claimed) in claim {
        let Some(full) = chunks.get(chunk_id) else {
            out.missing.push(chunk_id.clone());
            match policy {
                MissingChunkPolicy::PassThrough => {
                    warn!(%chunk_id, "cited chunk not in lookup; keeping claimed text");
                    out.resolved.insert(chunk_id.clone(), claimed.clone());
                }
                MissingChunkPolicy::Reject => {
                    warn!(%chunk_id, "cited chunk not in lookup; dropping citation");
                }
            }
            continue;
        };
        out.resolved.insert(chunk_id.clone(), anchor_quote(claimed, full));
    }
    Some(out)
}

/// Best-effort exact quotation of `claimed` inside `full`.
pub fn anchor_quote(claimed: &str, full: &str) -> String {
    let claimed = claimed.trim();
    let chunk = Lowered::new(full);
    // Same per-char lowering on both sides; `str::to_lowercase` would turn a
    // word-final sigma into `ς` while the chunk keeps `σ`.
    let claim_lower = lowercase_chars(claimed);

    if chunk.lower.contains(&claim_lower) {
        return claimed.to_string();
    }

    let words: Vec<&str> = claim_lower.split_whitespace().collect();
    if words.len() < MIN_ANCHOR_TOKENS {
        return claimed.to_string();
    }
    let first_two = words[..2].join(" ");
    let last_two = words[words.len() - 2..].join(" ");

    match (chunk.lower.find(&first_two), chunk.lower.find(&last_two)) {
        (Some(start), Some(end)) if start < end => {
            let span = chunk.original_span(start, end + last_two.len());
            debug!(start, end, "anchored citation onto chunk text");
            span.to_string()
        }
        _ => claimed.to_string(),
    }
}

fn lowercase_chars(s: &str) -> String {
    s.chars().flat_map(char::to_lowercase).collect()
}

/// Lower-cased copy of a text that remembers, for each byte of the
/// lower-cased string, which char of the original produced it. Lower-casing
/// can change UTF-8 length, so offsets found in `lower` are not valid
/// offsets into the original.
struct Lowered<'a> {
    original: &'a str,
    lower: String,
    /// (start, end) byte range in `original` of the char behind each byte of `lower`.
    origin: Vec<(usize, usize)>,
}

impl<'a> Lowered<'a> {
    fn new(original: &'a str) -> Self {
        let mut lower = String::with_capacity(original.len());
        let mut origin = Vec::with_capacity(original.len());
        for (i, ch) in original.char_indices() {
            let range = (i, i + ch.len_utf8());
            for lc in ch.to_lowercase() {
                lower.push(lc);
                origin.extend(std::iter::repeat(range).take(lc.len_utf8()));
            }
        }
        Self {
            original,
            lower,
            origin,
        }
    }

    /// Original text covering `lower[start..end]`. `end` must be > `start`.
    fn original_span(&self, start: usize, end: usize) -> &'a str {
        let from = self.origin[start].0;
        let to = self.origin[end - 1].1;
        &self.original[from..to]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lowered_maps_multibyte_case_changes_back() {
        // 'İ' lower-cases to two chars ("i" + combining dot), growing the string.
        let text = "İstanbul Offices Are Open Daily";
        let l = Lowered::new(text);
        let start = l.lower.find("offices are").unwrap();
        let end = l.lower.find("open daily").unwrap() + "open daily".len();
        assert_eq!(l.original_span(start, end), "Offices Are Open Daily");
    }

    #[test]
    fn anchors_that_start_at_same_position_fall_back() {
        // "a b a b" -> prefix and suffix anchors are both "a b" at offset 0.
        let full = "a b c";
        assert_eq!(anchor_quote("A B A B", full), "A B A B");
    }

    #[test]
    fn whitespace_is_trimmed_before_matching() {
        assert_eq!(anchor_quote("  lazy dog \n", "the lazy dog"), "lazy dog");
    }
}
