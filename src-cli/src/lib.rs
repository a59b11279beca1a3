use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use rb_ai::corpus::chunking::{chunk_markdown, document_name_for_path};
use rb_ai::corpus::{ChunkStore, ImportResult, IndexStatus, IndexStore};
use rb_ai::embeddings::Embedder;
use rb_ai::evalset::{EmbeddingReranker, EvalSetGenerator};
use rb_ai::judge::{chunk_lookup, RagEvaluator};
use rb_ai::llm::Llm;
use rb_ai::respond::{QueryResponse, RagResponder};
use rb_ai::retrieve::{filter_by_metadata, parse_filters, EmbeddingRetriever, Retriever, SearchHit};
use rb_ai::retriever_eval::evaluate_all;
use rb_core::chunks::{load_document_chunks, write_document_chunks, DocumentChunk};
use rb_core::config::Settings;
use rb_core::error::AppError;
use rb_core::experiment::ExperimentLayout;
use rb_core::jsonio::{read_json, write_json_pretty};
use rb_core::records::{AverageScores, EvalItem, ResponseRecord, RetrieverEvalSummary};
use serde::Serialize;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::info;

pub mod cli;
pub mod providers;

use cli::{Cli, Command};

#[derive(Debug, Serialize)]
pub struct ChunkResponse {
    pub path: String,
    pub documents: Vec<String>,
    pub chunk_count: usize,
}

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub import: ImportResult,
    pub status: IndexStatus,
}

#[derive(Debug, Serialize)]
pub struct EvalSetResponse {
    pub path: String,
    pub questions: usize,
}

#[derive(Debug, Serialize)]
pub struct RetrieverEvalResponse {
    pub path: String,
    pub summary: RetrieverEvalSummary,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub path: String,
    pub records: usize,
    pub answered: usize,
}

#[derive(Debug, Serialize)]
pub struct JudgeResponse {
    pub path: String,
    pub evaluated: usize,
    pub skipped: usize,
    pub average_scores: AverageScores,
}

fn now_rfc3339_utc() -> Result<String, AppError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| AppError::new("TIME_FORMAT_FAILED", "Failed to format time").with_details(e.to_string()))
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Exit status for a failed command: 1 for problems the user can fix in
/// their input or configuration, 2 for everything else.
pub fn exit_code(err: &AppError) -> u8 {
    if err.has_prefix("CONFIG_") || err.has_prefix("CHUNKS_") {
        1
    } else {
        2
    }
}

/// Apply global CLI flags on top of environment settings.
pub fn apply_overrides(mut settings: Settings, cli: &Cli) -> Result<Settings, AppError> {
    if let Some(p) = cli.provider.as_deref() {
        settings = settings.with_provider(p.parse()?);
    }
    if let Some(m) = cli.chat_model.as_deref() {
        settings.chat_model = m.to_string();
    }
    if let Some(m) = cli.embed_model.as_deref() {
        settings.embed_model = m.to_string();
    }
    Ok(settings)
}

pub fn chunk_files(layout: &ExperimentLayout, files: &[PathBuf], max_chars: usize) -> Result<ChunkResponse, AppError> {
    let mut chunks: Vec<DocumentChunk> = Vec::new();
    let mut documents = Vec::with_capacity(files.len());
    for file in files {
        let text = fs::read_to_string(file).map_err(|e| {
            AppError::new("CHUNKS_SOURCE_FAILED", "Failed to read source document").with_path(file, e)
        })?;
        let name = document_name_for_path(file);
        let doc_chunks = chunk_markdown(&name, &text, max_chars);
        info!(document = %name, chunks = doc_chunks.len(), "chunked document");
        chunks.extend(doc_chunks);
        documents.push(name);
    }

    let mut seen = BTreeSet::new();
    for name in &documents {
        if !seen.insert(name.as_str()) {
            return Err(AppError::new("CHUNKS_INVALID", "Two source files map to the same document name")
                .with_details(format!("document={name}")));
        }
    }
    if chunks.is_empty() {
        return Err(AppError::new("CHUNKS_INVALID", "Source documents produced no chunks"));
    }

    layout.ensure_dirs()?;
    let path = layout.chunks_path();
    write_document_chunks(&path, &chunks)?;
    Ok(ChunkResponse {
        path: path_string(&path),
        documents,
        chunk_count: chunks.len(),
    })
}

pub fn build_index(layout: &ExperimentLayout, embedder: &dyn Embedder, model: &str) -> Result<IndexResponse, AppError> {
    let chunks = load_document_chunks(&layout.chunks_path())?;
    let store = ChunkStore::open(layout.index_dir());
    let import = store.import(&chunks)?;
    info!(added = import.added, changed = import.changed, removed = import.removed, "imported chunks");

    let index = IndexStore::open(layout.index_dir());
    let status = index.build_with_embedder(&store, embedder, model, &now_rfc3339_utc()?)?;
    Ok(IndexResponse { import, status })
}

pub fn search(
    layout: &ExperimentLayout,
    embedder: &dyn Embedder,
    query: &str,
    k: usize,
    filters: &[String],
) -> Result<Vec<SearchHit>, AppError> {
    let filters = parse_filters(filters)?;
    let store = ChunkStore::open(layout.index_dir());
    let index = IndexStore::open(layout.index_dir());
    let hits = EmbeddingRetriever::new(&store, &index, embedder).search(query, k)?;
    Ok(filter_by_metadata(hits, &filters))
}

pub fn ask(
    layout: &ExperimentLayout,
    embedder: &dyn Embedder,
    llm: &dyn Llm,
    settings: &Settings,
    query: &str,
    k: usize,
) -> Result<QueryResponse, AppError> {
    let store = ChunkStore::open(layout.index_dir());
    let index = IndexStore::open(layout.index_dir());
    let retriever = EmbeddingRetriever::new(&store, &index, embedder);
    RagResponder::new(&retriever, llm, settings.chat_model.as_str())
        .with_max_retries(settings.max_retries)
        .with_missing_chunk_policy(settings.missing_chunk_policy)
        .process_query(query, k)
}

pub fn create_eval_set(
    layout: &ExperimentLayout,
    llm: &dyn Llm,
    embedder: &dyn Embedder,
    settings: &Settings,
    questions_per_doc: usize,
    max_chunks: usize,
) -> Result<EvalSetResponse, AppError> {
    let chunks = load_document_chunks(&layout.chunks_path())?;
    let reranker = EmbeddingReranker::new(embedder, settings.embed_model.as_str());
    let generator = EvalSetGenerator::new(llm, settings.chat_model.as_str(), &reranker, settings.max_retries);
    let items = generator.create_final_eval_set(&chunks, questions_per_doc, max_chunks)?;

    let path = layout.eval_set_path();
    write_json_pretty(&path, &items)?;
    info!(questions = items.len(), path = %path.display(), "saved evaluation set");
    Ok(EvalSetResponse {
        path: path_string(&path),
        questions: items.len(),
    })
}

pub fn evaluate_retriever(
    layout: &ExperimentLayout,
    embedder: &dyn Embedder,
    k: usize,
    eval_set: Option<&Path>,
    output: Option<&Path>,
) -> Result<RetrieverEvalResponse, AppError> {
    let eval_path = eval_set.map(Path::to_path_buf).unwrap_or_else(|| layout.eval_set_path());
    let items: Vec<EvalItem> = read_json(&eval_path)?;

    let store = ChunkStore::open(layout.index_dir());
    let index = IndexStore::open(layout.index_dir());
    let retriever = EmbeddingRetriever::new(&store, &index, embedder);
    let report = evaluate_all(&retriever, &items, k)?;

    let path = output.map(Path::to_path_buf).unwrap_or_else(|| layout.retriever_results_path());
    write_json_pretty(&path, &report)?;
    Ok(RetrieverEvalResponse {
        path: path_string(&path),
        summary: report.summary,
    })
}

pub fn generate_responses(
    layout: &ExperimentLayout,
    embedder: &dyn Embedder,
    llm: &dyn Llm,
    settings: &Settings,
    k: usize,
    eval_set: Option<&Path>,
    output: Option<&Path>,
) -> Result<GenerateResponse, AppError> {
    let eval_path = eval_set.map(Path::to_path_buf).unwrap_or_else(|| layout.eval_set_path());
    let items: Vec<EvalItem> = read_json(&eval_path)?;

    let store = ChunkStore::open(layout.index_dir());
    let index = IndexStore::open(layout.index_dir());
    let retriever = EmbeddingRetriever::new(&store, &index, embedder);
    let records = RagResponder::new(&retriever, llm, settings.chat_model.as_str())
        .with_max_retries(settings.max_retries)
        .with_missing_chunk_policy(settings.missing_chunk_policy)
        .process_evaluation_set(&items, k);

    let path = output.map(Path::to_path_buf).unwrap_or_else(|| layout.responses_path());
    write_json_pretty(&path, &records)?;
    let answered = records.iter().filter(|r| r.llm_response.is_some()).count();
    info!(records = records.len(), answered, path = %path.display(), "saved responses");
    Ok(GenerateResponse {
        path: path_string(&path),
        records: records.len(),
        answered,
    })
}

pub fn judge_responses(
    layout: &ExperimentLayout,
    llm: &dyn Llm,
    settings: &Settings,
    responses: Option<&Path>,
    output: Option<&Path>,
) -> Result<JudgeResponse, AppError> {
    let responses_path = responses.map(Path::to_path_buf).unwrap_or_else(|| layout.responses_path());
    let records: Vec<ResponseRecord> = read_json(&responses_path)?;
    let lookup = chunk_lookup(&load_document_chunks(&layout.chunks_path())?);

    let evaluator = RagEvaluator::new(llm, settings.chat_model.as_str(), settings.max_retries);
    let report = evaluator.evaluate_records(&records, &lookup, &path_string(layout.root()))?;

    let path = output.map(Path::to_path_buf).unwrap_or_else(|| layout.judge_results_path());
    write_json_pretty(&path, &report)?;
    for (name, score) in report.average_scores.as_pairs() {
        info!("{name}: {score:.2}");
    }
    Ok(JudgeResponse {
        path: path_string(&path),
        evaluated: report.individual_evaluations.len(),
        skipped: report.skipped,
        average_scores: report.average_scores,
    })
}

fn to_value<T: Serialize>(value: T) -> Result<Value, AppError> {
    serde_json::to_value(value)
        .map_err(|e| AppError::new("OUTPUT_ENCODE_FAILED", "Failed to encode command output").with_details(e.to_string()))
}

/// Run one parsed command and return its JSON result.
pub fn run(cli: Cli, settings: Settings) -> Result<Value, AppError> {
    let settings = apply_overrides(settings, &cli)?;
    match cli.command {
        Command::Chunk { dir, files, max_chars } => to_value(chunk_files(&ExperimentLayout::new(dir), &files, max_chars)?),
        Command::Index { dir } => {
            let embedder = providers::build_embedder(&settings)?;
            to_value(build_index(&ExperimentLayout::new(dir), embedder.as_ref(), &settings.embed_model)?)
        }
        Command::Query { dir, query, k, filters } => {
            let embedder = providers::build_embedder(&settings)?;
            to_value(search(&ExperimentLayout::new(dir), embedder.as_ref(), &query, k, &filters)?)
        }
        Command::Ask { dir, query, k } => {
            let embedder = providers::build_embedder(&settings)?;
            let llm = providers::build_llm(&settings)?;
            to_value(ask(&ExperimentLayout::new(dir), embedder.as_ref(), llm.as_ref(), &settings, &query, k)?)
        }
        Command::EvalSet { dir, questions, max_chunks } => {
            let embedder = providers::build_embedder(&settings)?;
            let llm = providers::build_llm(&settings)?;
            to_value(create_eval_set(
                &ExperimentLayout::new(dir),
                llm.as_ref(),
                embedder.as_ref(),
                &settings,
                questions,
                max_chunks,
            )?)
        }
        Command::EvalRetriever { dir, k, eval_set, output } => {
            let embedder = providers::build_embedder(&settings)?;
            to_value(evaluate_retriever(
                &ExperimentLayout::new(dir),
                embedder.as_ref(),
                k,
                eval_set.as_deref(),
                output.as_deref(),
            )?)
        }
        Command::Generate { dir, k, eval_set, output } => {
            let embedder = providers::build_embedder(&settings)?;
            let llm = providers::build_llm(&settings)?;
            to_value(generate_responses(
                &ExperimentLayout::new(dir),
                embedder.as_ref(),
                llm.as_ref(),
                &settings,
                k,
                eval_set.as_deref(),
                output.as_deref(),
            )?)
        }
        Command::Judge { dir, responses, output } => {
            let llm = providers::build_llm(&settings)?;
            to_value(judge_responses(
                &ExperimentLayout::new(dir),
                llm.as_ref(),
                &settings,
                responses.as_deref(),
                output.as_deref(),
            )?)
        }
        Command::Health => to_value(providers::health_check(&settings)?),
    }
}
