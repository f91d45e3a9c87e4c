//! Command implementations for the Halberd CLI.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::analysis::analyzer::KeywordAnalyzer;
use crate::cache::backend::CacheBackend;
use crate::cache::file::{FileCache, FileCacheConfig};
use crate::cache::registry::CacheRegistry;
use crate::cache::tiered::model_dir_name;
use crate::cli::args::{CacheArgs, CacheCommand, Command, HalberdArgs, KeywordArgs, SearchArgs};
use crate::cli::output::{
    CacheClearReport, CacheStatsReport, HybridSearchReport, KeywordRow, KeywordSearchReport, ModelCacheReport,
    format_result,
};
use crate::config::HalberdConfig;
use crate::document::Document;
use crate::embedding::cached::CachedEmbedder;
use crate::embedding::hashing::HashingEmbedder;
use crate::error::{HalberdError, Result};
use crate::hybrid::engine::HybridEngine;
use crate::lexical::index::KeywordIndex;
use crate::metrics::MetricsCollector;
use crate::resilience::registry::CircuitBreakerRegistry;
use crate::resilience::retry::RetryPolicy;
use crate::vector::store::FlatVectorStore;

/// Execute a CLI command and print its report to stdout.
pub fn execute_command(args: HalberdArgs) -> Result<()> {
    println!("{}", run_command(&args)?);
    Ok(())
}

/// Execute a CLI command and render its report in the selected output format.
pub fn run_command(args: &HalberdArgs) -> Result<String> {
    let config = load_config(args.config.as_deref())?;
    let format = args.output_format;
    match &args.command {
        Command::Keyword(keyword_args) => format_result(&keyword_search(keyword_args, &config)?, format),
        Command::Search(search_args) => format_result(&hybrid_search(search_args, config)?, format),
        Command::Cache(CacheCommand::Stats(cache_args)) => format_result(&cache_stats(cache_args, &config)?, format),
        Command::Cache(CacheCommand::Clear(cache_args)) => format_result(&cache_clear(cache_args, &config)?, format),
    }
}

/// Load the configuration file, or the defaults when none is given.
pub fn load_config(path: Option<&Path>) -> Result<HalberdConfig> {
    match path {
        Some(path) => HalberdConfig::from_file(path),
        None => Ok(HalberdConfig::default()),
    }
}

/// Read documents from `path`.
///
/// `.jsonl` files hold one JSON document (`{"content": ..., "id"?: ..., "metadata"?: {...}}`)
/// per non-empty line. Any other file is read as text and split into
/// paragraphs at blank lines; each paragraph gets the id `<file name>#<n>`.
pub fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let text = fs::read_to_string(path)
        .map_err(|e| HalberdError::invalid_argument(format!("cannot read {}: {e}", path.display())))?;

    if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("jsonl")) {
        return text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str::<Document>(line).map_err(|e| {
                    HalberdError::invalid_argument(format!("{}:{}: {e}", path.display(), n + 1))
                })
            })
            .collect();
    }

    let source = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(split_paragraphs(&text)
        .into_iter()
        .enumerate()
        .map(|(n, paragraph)| {
            Document::new(paragraph)
                .with_id(format!("{source}#{n}"))
                .with_metadata("source", source.clone())
                .with_metadata("paragraph", n.to_string())
        })
        .collect())
}

/// Split `text` at blank lines into trimmed, non-empty paragraphs.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }
    paragraphs
}

/// BM25-only search over the documents in `args`.
pub fn keyword_search(args: &KeywordArgs, config: &HalberdConfig) -> Result<KeywordSearchReport> {
    let documents = load_documents(&args.documents)?;
    let index = KeywordIndex::with_config(config.bm25, Arc::new(KeywordAnalyzer::new()?));
    let fitted = index.fit(&documents);
    let stats = fitted.stats();

    let hits = fitted
        .search(&args.query, args.k)
        .into_iter()
        .enumerate()
        .map(|(i, hit)| KeywordRow {
            rank: i + 1,
            ordinal: hit.ordinal,
            score: hit.score,
            id: documents[hit.ordinal].id.clone(),
            content: documents[hit.ordinal].content.clone(),
        })
        .collect();

    Ok(KeywordSearchReport {
        query: args.query.clone(),
        corpus_size: stats.corpus_size,
        vocabulary_size: stats.vocabulary_size,
        hits,
    })
}

/// Hybrid search over the documents in `args`, embedding with the hashing
/// embedder behind the tiered cache and the resilience policies.
pub fn hybrid_search(args: &SearchArgs, mut config: HalberdConfig) -> Result<HybridSearchReport> {
    if let Some(alpha) = args.alpha {
        config.hybrid.alpha = alpha;
    }
    if let Some(dimension) = args.dimension {
        config.embedding.dimension = dimension;
    }
    if let Some(dir) = &args.cache_dir {
        config.cache.l2.directory = dir.clone();
    }
    config.validate()?;

    let documents = load_documents(&args.documents)?;

    let metrics = MetricsCollector::shared();
    let breakers = CircuitBreakerRegistry::new().with_metrics(Arc::clone(&metrics));
    let registry = CacheRegistry::new(config.cache.clone()).with_metrics(Arc::clone(&metrics));
    let embedder = CachedEmbedder::from_registry(HashingEmbedder::new(config.embedding.dimension)?, &registry)?
        .with_retry(
            RetryPolicy::<HalberdError>::transient(config.retry.embedding.clone())
                .with_circuit_breaker(breakers.get_or_create("embedding", config.circuit_breaker.clone()))
                .with_metrics(Arc::clone(&metrics)),
        );
    let store = FlatVectorStore::new(embedder).with_retry(
        RetryPolicy::<HalberdError>::transient(config.retry.vector_store.clone())
            .with_circuit_breaker(breakers.get_or_create("vector_store", config.circuit_breaker.clone()))
            .with_metrics(Arc::clone(&metrics)),
    );
    store.add_documents(&documents)?;

    let engine = HybridEngine::new(store, config.hybrid.clone())?
        .with_keyword_settings(config.bm25, Arc::new(KeywordAnalyzer::new()?))
        .with_metrics(Arc::clone(&metrics));
    let corpus_size = documents.len();
    engine.index(documents);

    let results = engine.search(
        &args.query,
        args.k.unwrap_or(config.hybrid.default_k),
        args.semantic_k.unwrap_or(config.hybrid.semantic_k),
        args.keyword_k.unwrap_or(config.hybrid.keyword_k),
    )?;

    Ok(HybridSearchReport {
        query: args.query.clone(),
        corpus_size,
        results,
        cache: engine.searcher().embedder().cache().stats(),
        metrics: args.metrics.then(|| metrics.snapshot()),
    })
}

/// Model cache directories selected by `args`, as `(model, path)` pairs.
fn model_directories(args: &CacheArgs, root: &Path) -> Result<Vec<(String, PathBuf)>> {
    if let Some(model) = &args.model {
        let name = model_dir_name(model);
        let path = root.join(&name);
        return Ok(if path.is_dir() { vec![(name, path)] } else { Vec::new() });
    }
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut dirs: Vec<(String, PathBuf)> = fs::read_dir(root)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            Some((name, path))
        })
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn open_model_cache(path: PathBuf, config: &HalberdConfig) -> Result<FileCache<Vec<f32>>> {
    FileCache::new(FileCacheConfig {
        directory: path,
        default_ttl: config.cache.l2.default_ttl,
    })
}

fn cache_root(args: &CacheArgs, config: &HalberdConfig) -> PathBuf {
    args.cache_dir
        .clone()
        .unwrap_or_else(|| config.cache.l2.directory.clone())
}

/// Per-model entry counts and sizes of the on-disk embedding cache.
pub fn cache_stats(args: &CacheArgs, config: &HalberdConfig) -> Result<CacheStatsReport> {
    let root = cache_root(args, config);
    let mut models = Vec::new();
    for (model, path) in model_directories(args, &root)? {
        let cache = open_model_cache(path.clone(), config)?;
        let bytes = fs::read_dir(&path)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "cache"))
            .filter_map(|entry| entry.metadata().ok())
            .map(|meta| meta.len())
            .sum();
        models.push(ModelCacheReport {
            model,
            entries: cache.stats().size,
            bytes,
        });
    }

    Ok(CacheStatsReport {
        directory: root.display().to_string(),
        models,
    })
}

/// Delete the on-disk embedding cache of one or every model.
pub fn cache_clear(args: &CacheArgs, config: &HalberdConfig) -> Result<CacheClearReport> {
    let root = cache_root(args, config);
    let mut removed = 0;
    let mut models = Vec::new();
    for (model, path) in model_directories(args, &root)? {
        let cache = open_model_cache(path, config)?;
        removed += cache.stats().size;
        cache.clear();
        models.push(model);
    }
    tracing::info!(event = "cli.cache.cleared", removed, directory = %root.display(), "embedding cache cleared");

    Ok(CacheClearReport {
        directory: root.display().to_string(),
        models,
        removed,
    })
}
