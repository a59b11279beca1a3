use std::collections::BTreeMap;

use rb_core::chunks::{metadata_value_display, ChunkMetadata};
use rb_core::error::AppError;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::corpus::{ChunkStore, IndexStore};
use crate::embeddings::Embedder;

pub mod similarity;

pub const MAX_K: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub chunk_id: String,
    pub content: String,
    pub score: f32,
    /// 1-based position in the result list.
    pub rank: usize,
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

pub trait Retriever {
    fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, AppError>;
}

/// Dense retrieval over the chunk store's embedding index.
pub struct EmbeddingRetriever<'a> {
    store: &'a ChunkStore,
    index: &'a IndexStore,
    embedder: &'a dyn Embedder,
}

impl<'a> EmbeddingRetriever<'a> {
    pub fn new(store: &'a ChunkStore, index: &'a IndexStore, embedder: &'a dyn Embedder) -> Self {
        Self {
            store,
            index,
            embedder,
        }
    }
}

impl Retriever for EmbeddingRetriever<'_> {
    fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, AppError> {
        let q = query.trim();
        if q.is_empty() {
            return Err(AppError::new("RETRIEVAL_FAILED", "Query must not be empty"));
        }
        let k = k.clamp(1, MAX_K);

        let st = self.index.status()?;
        if !st.ready {
            return Err(AppError::new(
                "INDEX_NOT_READY",
                "Index not ready; build the index before querying",
            ));
        }
        let model = st
            .model
            .ok_or_else(|| AppError::new("INDEX_NOT_READY", "Index status missing model"))?;
        let dims = st
            .dims
            .ok_or_else(|| AppError::new("INDEX_NOT_READY", "Index status missing dims"))?;

        let qv = self.embedder.embed(&model, q)?;
        if qv.len() as u32 != dims {
            return Err(AppError::new(
                "RETRIEVAL_FAILED",
                "Query embedding dims do not match index dims",
            )
            .with_details(format!("index_dims={dims}; query_dims={}", qv.len())));
        }

        let vectors = self.index.read_vectors()?;
        if vectors.is_empty() {
            return Err(AppError::new("INDEX_NOT_READY", "Index vectors missing; rebuild index"));
        }

        let qnorm = similarity::l2_norm(&qv);
        if qnorm == 0.0 {
            return Err(AppError::new("RETRIEVAL_FAILED", "Query embedding norm is zero"));
        }

        let mut scored: Vec<(String, f32)> = Vec::with_capacity(vectors.len());
        for (chunk_id, v) in vectors.iter() {
            if v.len() as u32 != dims {
                return Err(AppError::new("RETRIEVAL_FAILED", "Index vector dims mismatch")
                    .with_details(format!("chunk_id={chunk_id}; expected={dims}; got={}", v.len())));
            }
            let vnorm = similarity::l2_norm(v);
            if vnorm == 0.0 {
                continue;
            }
            scored.push((chunk_id.clone(), similarity::cosine_similarity(&qv, v, qnorm, vnorm)));
        }

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);

        let mut hits = Vec::with_capacity(scored.len());
        for (i, (chunk_id, score)) in scored.into_iter().enumerate() {
            let chunk = self.store.get(&chunk_id)?;
            hits.push(SearchHit {
                chunk_id,
                content: chunk.chunk_content,
                score,
                rank: i + 1,
                metadata: chunk.chunk_metadata,
            });
        }
        debug!(k, returned = hits.len(), "retrieval finished");
        Ok(hits)
    }
}

/// Keep hits whose metadata has every filter key with an equal value.
/// Non-string metadata values compare by their JSON rendering.
pub fn filter_by_metadata(hits: Vec<SearchHit>, filters: &BTreeMap<String, String>) -> Vec<SearchHit> {
    if filters.is_empty() {
        return hits;
    }
    hits.into_iter()
        .filter(|h| {
            filters.iter().all(|(key, want)| {
                h.metadata
                    .get(key)
                    .is_some_and(|v| metadata_value_display(v) == *want)
            })
        })
        .collect()
}

/// Parse `KEY=VALUE` filter arguments. Keys and values are trimmed.
pub fn parse_filters<S: AsRef<str>>(args: &[S]) -> Result<BTreeMap<String, String>, AppError> {
    let mut out = BTreeMap::new();
    for raw in args {
        let raw = raw.as_ref();
        let (k, v) = raw.split_once('=').ok_or_else(|| {
            AppError::new("CONFIG_INVALID", "Metadata filter must be KEY=VALUE")
                .with_details(format!("filter={raw}"))
        })?;
        let (k, v) = (k.trim(), v.trim());
        if k.is_empty() || v.is_empty() {
            return Err(AppError::new("CONFIG_INVALID", "Metadata filter key and value must be non-empty")
                .with_details(format!("filter={raw}")));
        }
        out.insert(k.to_string(), v.to_string());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hit(id: &str, meta: &[(&str, serde_json::Value)]) -> SearchHit {
        SearchHit {
            chunk_id: id.to_string(),
            content: String::new(),
            score: 0.0,
            rank: 1,
            metadata: meta.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        }
    }

    #[test]
    fn filter_requires_every_key() {
        let hits = vec![
            hit("a", &[("Header 1", json!("Intro")), ("Header 2", json!("Scope"))]),
            hit("b", &[("Header 1", json!("Intro"))]),
            hit("c", &[("Header 1", json!("Other")), ("page", json!(3))]),
        ];
        let f = parse_filters(&["Header 1=Intro", "Header 2 = Scope"]).unwrap();
        let kept: Vec<String> = filter_by_metadata(hits.clone(), &f).into_iter().map(|h| h.chunk_id).collect();
        assert_eq!(kept, vec!["a"]);

        let f = parse_filters(&["page=3"]).unwrap();
        assert_eq!(filter_by_metadata(hits.clone(), &f).len(), 1);
        assert_eq!(filter_by_metadata(hits, &BTreeMap::new()).len(), 3);
    }

    #[test]
    fn bad_filters_are_config_errors() {
        assert_eq!(parse_filters(&["novalue"]).unwrap_err().code, "CONFIG_INVALID");
        assert_eq!(parse_filters(&["=x"]).unwrap_err().code, "CONFIG_INVALID");
    }
}
