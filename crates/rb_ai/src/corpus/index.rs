use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use rb_core::error::AppError;
use rb_core::jsonio::{read_json, read_json_or_default, write_json_pretty};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::store::ChunkStore;
use crate::embeddings::Embedder;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexStatus {
    pub ready: bool,
    pub model: Option<String>,
    pub dims: Option<u32>,
    pub chunk_count: u32,
    #[serde(default)]
    pub chunks_total: u32,
    /// Chunks embedded by the most recent build.
    #[serde(default)]
    pub embedded_last_build: u32,
    pub updated_at: Option<String>,
}

/// Embedding vectors for the chunk store, rebuilt incrementally by content hash.
#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    pub fn open(root: PathBuf) -> Self {
        Self { root }
    }

    fn status_path(&self) -> PathBuf {
        self.root.join("index_status.json")
    }

    fn vectors_path(&self) -> PathBuf {
        self.root.join("index_vectors.json")
    }

    fn hashes_path(&self) -> PathBuf {
        self.root.join("index_hashes.json")
    }

    fn ensure_dirs(&self) -> Result<(), AppError> {
        fs::create_dir_all(&self.root).map_err(|e| {
            AppError::new("INDEX_BUILD_FAILED", "Failed to create index directory").with_path(&self.root, e)
        })
    }

    pub fn status(&self) -> Result<IndexStatus, AppError> {
        let path = self.status_path();
        if !path.exists() {
            return Ok(IndexStatus::default());
        }
        read_json(&path).map_err(|e| e.with_code("INDEX_READ_FAILED"))
    }

    pub fn read_vectors(&self) -> Result<BTreeMap<String, Vec<f32>>, AppError> {
        read_json_or_default(&self.vectors_path()).map_err(|e| e.with_code("INDEX_READ_FAILED"))
    }

    pub fn read_hashes(&self) -> Result<BTreeMap<String, String>, AppError> {
        read_json_or_default(&self.hashes_path()).map_err(|e| e.with_code("INDEX_READ_FAILED"))
    }

    pub fn build_with_embedder(
        &self,
        store: &ChunkStore,
        embedder: &dyn Embedder,
        model: &str,
        updated_at: &str,
    ) -> Result<IndexStatus, AppError> {
        self.ensure_dirs()?;

        let chunks = store.list()?;
        if chunks.is_empty() {
            return Err(AppError::new(
                "INDEX_NOT_READY",
                "No chunks available; import chunks before building the index",
            ));
        }

        let current = self.status()?;
        let compatible = current.ready && current.model.as_deref() == Some(model);
        if current.ready && !compatible {
            info!(old = ?current.model, new = %model, "embedding model changed; full rebuild");
        }

        let (mut vectors, mut hashes) = if compatible {
            (self.read_vectors()?, self.read_hashes()?)
        } else {
            (BTreeMap::new(), BTreeMap::new())
        };

        let wanted: BTreeSet<&str> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        vectors.retain(|k, _| wanted.contains(k.as_str()));
        hashes.retain(|k, _| wanted.contains(k.as_str()));

        let mut dims: Option<u32> = if compatible { current.dims } else { None };
        let mut embedded = 0u32;

        // `list` is ordered by chunk id, so embedding order is deterministic.
        for chunk in chunks.iter() {
            let fresh = hashes.get(&chunk.chunk_id) == Some(&chunk.content_sha256)
                && vectors.contains_key(&chunk.chunk_id);
            if fresh {
                continue;
            }
            let v = embedder.embed(model, &chunk.chunk_content).map_err(|e| {
                AppError::new("EMBED_FAILED", "Failed to compute embeddings")
                    .with_details(format!("chunk_id={}; err={}", chunk.chunk_id, e))
                    .with_retryable(e.retryable)
            })?;
            let this_dims = v.len() as u32;
            match dims {
                Some(d) if d != this_dims => {
                    return Err(AppError::new(
                        "INDEX_BUILD_FAILED",
                        "Embedding dimension mismatch across chunks",
                    )
                    .with_details(format!(
                        "expected={d}; got={this_dims}; chunk_id={}",
                        chunk.chunk_id
                    )));
                }
                Some(_) => {}
                None => dims = Some(this_dims),
            }
            debug!(chunk_id = %chunk.chunk_id, dims = this_dims, "embedded chunk");
            vectors.insert(chunk.chunk_id.clone(), v);
            hashes.insert(chunk.chunk_id.clone(), chunk.content_sha256.clone());
            embedded += 1;
        }

        // Only written once every embedding succeeded.
        write_json_pretty(&self.vectors_path(), &vectors).map_err(|e| e.with_code("INDEX_BUILD_FAILED"))?;
        write_json_pretty(&self.hashes_path(), &hashes).map_err(|e| e.with_code("INDEX_BUILD_FAILED"))?;

        let status = IndexStatus {
            ready: true,
            model: Some(model.to_string()),
            dims,
            chunk_count: vectors.len() as u32,
            chunks_total: chunks.len() as u32,
            embedded_last_build: embedded,
            updated_at: Some(updated_at.to_string()),
        };
        write_json_pretty(&self.status_path(), &status).map_err(|e| e.with_code("INDEX_BUILD_FAILED"))?;
        info!(
            chunks = status.chunk_count,
            embedded,
            dims = ?status.dims,
            "index built"
        );
        Ok(status)
    }
}
