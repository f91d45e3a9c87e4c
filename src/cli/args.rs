//! Command line argument parsing for the Halberd CLI using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Halberd - hybrid BM25 + semantic retrieval over local documents
#[derive(Parser, Debug, Clone)]
#[command(name = "halberd")]
#[command(about = "Hybrid BM25 + semantic retrieval with a tiered embedding cache")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct HalberdArgs {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors (overrides verbose)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum, default_value = "human", global = true)]
    pub output_format: OutputFormat,

    /// JSON configuration file
    #[arg(short, long, value_name = "FILE", env = "HALBERD_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl HalberdArgs {
    /// `tracing` level implied by `-q` and `-v`.
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// BM25-only search over a document file
    Keyword(KeywordArgs),

    /// Hybrid (BM25 + semantic) search over a document file
    Search(SearchArgs),

    /// Inspect or clear the on-disk embedding cache
    #[command(subcommand)]
    Cache(CacheCommand),
}

/// Arguments for keyword search
#[derive(Args, Debug, Clone)]
pub struct KeywordArgs {
    /// Documents: .jsonl (one document per line) or text (blank-line separated paragraphs)
    #[arg(value_name = "DOCS")]
    pub documents: PathBuf,

    /// Query string
    #[arg(value_name = "QUERY")]
    pub query: String,

    /// Maximum number of results
    #[arg(short, long, default_value = "5")]
    pub k: usize,
}

/// Arguments for hybrid search
#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Documents: .jsonl (one document per line) or text (blank-line separated paragraphs)
    #[arg(value_name = "DOCS")]
    pub documents: PathBuf,

    /// Query string
    #[arg(value_name = "QUERY")]
    pub query: String,

    /// Maximum number of results (default: hybrid.default_k)
    #[arg(short, long)]
    pub k: Option<usize>,

    /// Semantic candidates (default: hybrid.semantic_k)
    #[arg(long)]
    pub semantic_k: Option<usize>,

    /// Keyword candidates (default: hybrid.keyword_k)
    #[arg(long)]
    pub keyword_k: Option<usize>,

    /// Weight of the semantic list in [0, 1] (default: hybrid.alpha)
    #[arg(long)]
    pub alpha: Option<f64>,

    /// Dimension of the hashing embedder (default: embedding.dimension)
    #[arg(long)]
    pub dimension: Option<usize>,

    /// Embedding cache directory (default: cache.l2.directory)
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Include retry, circuit breaker, cache and search metrics in the report
    #[arg(long)]
    pub metrics: bool,
}

/// Cache subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum CacheCommand {
    /// Show per-model entry counts and sizes
    Stats(CacheArgs),

    /// Delete cached embeddings
    Clear(CacheArgs),
}

/// Arguments shared by the cache subcommands
#[derive(Args, Debug, Clone)]
pub struct CacheArgs {
    /// Restrict to one model identifier
    #[arg(long)]
    pub model: Option<String>,

    /// Embedding cache directory (default: cache.l2.directory)
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

/// Output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human readable text
    Human,
    /// JSON
    Json,
}
