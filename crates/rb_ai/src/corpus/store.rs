use std::collections::BTreeMap;
use std::path::PathBuf;

use rb_core::chunks::DocumentChunk;
use rb_core::error::AppError;
use rb_core::jsonio::{read_json_or_default, write_json_pretty};
use sha2::{Digest, Sha256};
use tracing::info;

use super::model::{ImportResult, StoredChunk};

/// On-disk copy of the experiment's chunks, keyed by chunk id.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    pub fn open(root: PathBuf) -> Self {
        Self { root }
    }

    fn chunks_path(&self) -> PathBuf {
        self.root.join("chunks.json")
    }

    fn read_all(&self) -> Result<BTreeMap<String, StoredChunk>, AppError> {
        read_json_or_default(&self.chunks_path()).map_err(|e| e.with_code("STORE_READ_FAILED"))
    }

    /// Replace the stored set with `chunks`. Ids must be unique.
    pub fn import(&self, chunks: &[DocumentChunk]) -> Result<ImportResult, AppError> {
        let previous = self.read_all()?;

        let mut next: BTreeMap<String, StoredChunk> = BTreeMap::new();
        let (mut added, mut changed) = (0u32, 0u32);
        for c in chunks {
            let stored = StoredChunk {
                chunk_id: c.chunk_id.clone(),
                chunk_content: c.chunk_content.clone(),
                chunk_metadata: c.chunk_metadata.clone(),
                content_sha256: sha256_hex(c.chunk_content.as_bytes()),
            };
            match previous.get(&c.chunk_id) {
                None => added += 1,
                Some(old) if old.content_sha256 != stored.content_sha256 => changed += 1,
                Some(_) => {}
            }
            if next.insert(c.chunk_id.clone(), stored).is_some() {
                return Err(AppError::new("STORE_IMPORT_FAILED", "Duplicate chunk_id in import")
                    .with_details(format!("chunk_id={}", c.chunk_id)));
            }
        }
        let removed = previous.keys().filter(|k| !next.contains_key(*k)).count() as u32;

        write_json_pretty(&self.chunks_path(), &next).map_err(|e| e.with_code("STORE_WRITE_FAILED"))?;

        let result = ImportResult {
            chunk_count: next.len() as u32,
            added,
            changed,
            removed,
        };
        info!(
            count = result.chunk_count,
            added, changed, removed, "chunk store updated"
        );
        Ok(result)
    }

    pub fn get(&self, chunk_id: &str) -> Result<StoredChunk, AppError> {
        self.read_all()?.remove(chunk_id).ok_or_else(|| {
            AppError::new("STORE_NOT_FOUND", "Chunk not found in store")
                .with_details(format!("chunk_id={chunk_id}"))
        })
    }

    /// All chunks, ordered by chunk id.
    pub fn list(&self) -> Result<Vec<StoredChunk>, AppError> {
        Ok(self.read_all()?.into_values().collect())
    }

    /// `chunk_id -> content` for every stored chunk.
    pub fn lookup(&self) -> Result<BTreeMap<String, String>, AppError> {
        Ok(self
            .read_all()?
            .into_iter()
            .map(|(id, c)| (id, c.chunk_content))
            .collect())
    }
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
