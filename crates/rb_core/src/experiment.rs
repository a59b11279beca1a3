use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AppError;

pub const CHUNKS_FILE: &str = "document_chunks.json";
pub const EVAL_SET_FILE: &str = "retriever_evaluation_set.json";
pub const RETRIEVER_RESULTS_FILE: &str = "retriever_evaluation_results.json";
pub const RESPONSES_FILE: &str = "llm_responses_eval_set.json";
pub const JUDGE_RESULTS_FILE: &str = "rag_evaluation_results.json";

/// File layout of one experiment directory. Every pipeline stage reads the
/// previous stage's output from here and writes its own next to it.
#[derive(Debug, Clone)]
pub struct ExperimentLayout {
    root: PathBuf,
}

impl ExperimentLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    pub fn chunks_path(&self) -> PathBuf {
        self.root.join(CHUNKS_FILE)
    }

    pub fn eval_set_path(&self) -> PathBuf {
        self.root.join(EVAL_SET_FILE)
    }

    pub fn retriever_results_path(&self) -> PathBuf {
        self.root.join(RETRIEVER_RESULTS_FILE)
    }

    pub fn responses_path(&self) -> PathBuf {
        self.root.join(RESPONSES_FILE)
    }

    pub fn judge_results_path(&self) -> PathBuf {
        self.root.join(JUDGE_RESULTS_FILE)
    }

    /// Chunk store and embedding index live under here.
    pub fn index_dir(&self) -> PathBuf {
        self.root.join("index")
    }

    pub fn ensure_dirs(&self) -> Result<(), AppError> {
        fs::create_dir_all(&self.root).map_err(|e| {
            AppError::new("EXPERIMENT_DIR_FAILED", "Failed to create experiment directory")
                .with_path(&self.root, e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_rooted_in_experiment_dir() {
        let layout = ExperimentLayout::new("Experiments/002");
        assert_eq!(layout.chunks_path(), PathBuf::from("Experiments/002/document_chunks.json"));
        assert_eq!(layout.index_dir(), PathBuf::from("Experiments/002/index"));
        assert!(layout.responses_path().ends_with(RESPONSES_FILE));
    }
}
