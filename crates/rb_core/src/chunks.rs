//! The `document_chunks.json` input format.
//!
//! Chunk files come from several upstream splitters, so the loader accepts a
//! few spellings of the content field and either an explicit
//! `chunk_metadata` object or loose top-level metadata fields.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::AppError;
use crate::jsonio::write_json_pretty;

/// Content field names, in precedence order.
pub const CONTENT_FIELDS: [&str; 4] = ["text", "content", "body", "chunk_content"];

pub type ChunkMetadata = BTreeMap<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChunk {
    pub chunk_id: String,
    pub chunk_content: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub chunk_metadata: ChunkMetadata,
}

impl DocumentChunk {
    pub fn new(chunk_id: impl Into<String>, chunk_content: impl Into<String>) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            chunk_content: chunk_content.into(),
            chunk_metadata: ChunkMetadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.chunk_metadata.insert(key.into(), value.into());
        self
    }

    /// Name of the source document, derived from the chunk id.
    pub fn document_name(&self) -> String {
        document_name(&self.chunk_id)
    }
}

/// Chunk ids follow `<DOC_NAME>_chunk_<N>`; the document name is everything
/// before the last two `_`-separated segments. Ids with fewer than three
/// segments map to the empty name.
pub fn document_name(chunk_id: &str) -> String {
    let parts: Vec<&str> = chunk_id.split('_').collect();
    if parts.len() <= 2 {
        return String::new();
    }
    parts[..parts.len() - 2].join("_")
}

/// Render a metadata value the way it should appear in prompts: strings
/// verbatim, everything else as compact JSON.
pub fn metadata_value_display(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Validate one raw entry of a chunk file and normalize it.
pub fn validate_chunk(raw: &Value, idx: usize) -> Result<DocumentChunk, AppError> {
    let obj = raw.as_object().ok_or_else(|| {
        AppError::new("CHUNKS_INVALID", "Chunk is not a JSON object").with_details(format!("index={idx}"))
    })?;

    let content = CONTENT_FIELDS
        .iter()
        .find_map(|f| obj.get(*f))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            debug!(index = idx, chunk = %raw, "chunk without usable content");
            AppError::new("CHUNKS_INVALID", "Chunk is missing text content").with_details(format!(
                "index={idx}; tried fields: {}",
                CONTENT_FIELDS.join(", ")
            ))
        })?;

    let metadata = match obj.get("chunk_metadata") {
        Some(Value::Object(m)) => m.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Some(Value::Null) => ChunkMetadata::new(),
        Some(other) => {
            return Err(AppError::new("CHUNKS_INVALID", "chunk_metadata must be an object")
                .with_details(format!("index={idx}; got={other}")))
        }
        None => obj
            .iter()
            .filter(|(k, v)| {
                !v.is_null() && k.as_str() != "chunk_id" && !CONTENT_FIELDS.contains(&k.as_str())
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    };

    let chunk_id = match obj.get("chunk_id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => format!("chunk_{idx}"),
        Some(other) => other.to_string(),
    };

    Ok(DocumentChunk {
        chunk_id,
        chunk_content: content.to_string(),
        chunk_metadata: metadata,
    })
}

/// Parse the contents of a chunk file. The root must be a non-empty array and
/// chunk ids must be unique.
pub fn parse_document_chunks(raw: &str) -> Result<Vec<DocumentChunk>, AppError> {
    let root: Value = serde_json::from_str(raw).map_err(|e| {
        AppError::new("CHUNKS_INVALID", "Invalid JSON in chunks file").with_details(e.to_string())
    })?;
    let entries = root
        .as_array()
        .ok_or_else(|| AppError::new("CHUNKS_INVALID", "Document chunks must be a list"))?;
    if entries.is_empty() {
        return Err(AppError::new("CHUNKS_INVALID", "Document chunks list is empty"));
    }

    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.iter().enumerate() {
        let chunk = validate_chunk(entry, idx)?;
        if !seen.insert(chunk.chunk_id.clone()) {
            return Err(AppError::new("CHUNKS_INVALID", "Duplicate chunk_id in chunks file")
                .with_details(format!("index={idx}; chunk_id={}", chunk.chunk_id)));
        }
        out.push(chunk);
    }
    Ok(out)
}

pub fn load_document_chunks(path: &Path) -> Result<Vec<DocumentChunk>, AppError> {
    info!(path = %path.display(), "loading document chunks");
    if !path.exists() {
        return Err(AppError::new("CHUNKS_NOT_FOUND", "Document chunks file not found")
            .with_details(format!("path={}", path.display())));
    }
    let raw = std::fs::read_to_string(path).map_err(|e| {
        AppError::new("CHUNKS_INVALID", "Failed to read document chunks").with_path(path, e)
    })?;
    let chunks = parse_document_chunks(&raw).map_err(|e| {
        let details = match &e.details {
            Some(d) => format!("path={}; {d}", path.display()),
            None => format!("path={}", path.display()),
        };
        e.with_details(details)
    })?;

    info!(count = chunks.len(), "processed document chunks");
    if let Some(first) = chunks.first() {
        let preview: String = first.chunk_content.chars().take(100).collect();
        debug!(id = %first.chunk_id, metadata = ?first.chunk_metadata, "sample chunk: {preview}...");
    }
    Ok(chunks)
}

pub fn write_document_chunks(path: &Path, chunks: &[DocumentChunk]) -> Result<(), AppError> {
    write_json_pretty(path, chunks)
}

/// `chunk_id -> content` lookup over a chunk list.
pub fn content_lookup(chunks: &[DocumentChunk]) -> BTreeMap<String, String> {
    chunks
        .iter()
        .map(|c| (c.chunk_id.clone(), c.chunk_content.clone()))
        .collect()
}
