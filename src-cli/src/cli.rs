use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rb_ai::corpus::chunking::DEFAULT_MAX_CHARS;
use rb_ai::evalset::{DEFAULT_MAX_CHUNKS, DEFAULT_QUESTIONS_PER_DOC};
use rb_ai::respond::DEFAULT_RESPONSE_K;
use rb_ai::retriever_eval::DEFAULT_EVAL_K;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_COMMIT_HASH"), ")");

/// Build, query and grade retrieval-augmented generation experiments.
#[derive(Parser, Debug)]
#[command(name = "ragbench", version = VERSION, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Model provider: ollama or openai
    #[arg(long, global = true)]
    pub provider: Option<String>,

    /// Chat model used for generation and judging
    #[arg(long, global = true)]
    pub chat_model: Option<String>,

    /// Embedding model used for indexing and reranking
    #[arg(long, global = true)]
    pub embed_model: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Split markdown files into document_chunks.json
    Chunk {
        dir: PathBuf,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long, default_value_t = DEFAULT_MAX_CHARS)]
        max_chars: usize,
    },
    /// Import chunks and build the embedding index
    Index { dir: PathBuf },
    /// Print the top-k chunks for a query
    Query {
        dir: PathBuf,
        query: String,
        #[arg(long, default_value_t = DEFAULT_RESPONSE_K)]
        k: usize,
        /// Keep hits whose metadata KEY equals VALUE (repeatable)
        #[arg(long = "filter", value_name = "KEY=VALUE")]
        filters: Vec<String>,
    },
    /// Answer a question with citations
    Ask {
        dir: PathBuf,
        query: String,
        #[arg(long, default_value_t = DEFAULT_RESPONSE_K)]
        k: usize,
    },
    /// Generate the retriever evaluation set
    EvalSet {
        dir: PathBuf,
        #[arg(long, default_value_t = DEFAULT_QUESTIONS_PER_DOC)]
        questions: usize,
        #[arg(long, default_value_t = DEFAULT_MAX_CHUNKS)]
        max_chunks: usize,
    },
    /// Measure retriever recall against the evaluation set
    EvalRetriever {
        dir: PathBuf,
        #[arg(long, default_value_t = DEFAULT_EVAL_K)]
        k: usize,
        #[arg(long)]
        eval_set: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Answer every evaluation question
    Generate {
        dir: PathBuf,
        #[arg(long, default_value_t = DEFAULT_RESPONSE_K)]
        k: usize,
        #[arg(long)]
        eval_set: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Grade generated answers with the judge model
    Judge {
        dir: PathBuf,
        #[arg(long)]
        responses: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Check that the configured provider is usable
    Health,
}
