use rb_core::chunks::ChunkMetadata;
use serde::{Deserialize, Serialize};

/// A chunk as kept in the chunk store, with the hash the index uses to
/// detect changed content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredChunk {
    pub chunk_id: String,
    pub chunk_content: String,
    #[serde(default)]
    pub chunk_metadata: ChunkMetadata,
    pub content_sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportResult {
    pub chunk_count: u32,
    pub added: u32,
    pub changed: u32,
    pub removed: u32,
}
