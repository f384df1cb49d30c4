use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::{
    config::{IsolationMode, Overrides},
    ingestion::WORKER_SUBCOMMAND,
    retrieval::{DEFAULT_K, DEFAULT_RERANK_K},
};

#[derive(Debug, Parser)]
#[command(
    name = "ragbert",
    about = "Index document folders and search them with ColBERT retrieval and reranking"
)]
pub struct Cli {
    /// Directory holding built indexes (default: .ragbert)
    #[arg(long, global = true)]
    pub index_root: Option<PathBuf>,

    /// Override the ColBERT model ID or local model path
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Number of ingestion workers
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Where files are normalized: `process` or `thread`
    #[arg(long, global = true, value_parser = parse_isolation)]
    pub isolation: Option<IsolationMode>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            model_name: self.model.clone(),
            index_root: self.index_root.clone(),
            max_workers: self.workers,
            isolation: self.isolation,
        }
    }
}

fn parse_isolation(raw: &str) -> Result<IsolationMode, String> {
    raw.parse().map_err(|e: crate::error::Error| e.to_string())
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ingest a directory of documents and build a named index
    Index(IndexArgs),
    /// Search an index with a single query
    Search(SearchArgs),
    /// Search an index with every query in a file
    BatchSearch(BatchSearchArgs),
    /// Normalize one file and print its records as JSON
    #[command(name = WORKER_SUBCOMMAND, hide = true)]
    NormalizeWorker {
        path: PathBuf,
    },
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Index --

#[derive(Debug, Parser)]
pub struct IndexArgs {
    /// Directory to ingest recursively
    pub input_directory: PathBuf,
    /// Name of the index to create or replace
    pub index_name: String,
}

// -- Search --

/// Options shared by `search` and `batch-search`.
#[derive(Debug, Clone, clap::Args)]
pub struct QueryOptions {
    /// Number of results to return
    #[arg(short = 'k', long, default_value_t = DEFAULT_K)]
    pub k: usize,

    /// Number of candidates retrieved before reranking
    #[arg(long, default_value_t = DEFAULT_RERANK_K)]
    pub rerank_k: usize,

    /// Also write the full results to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,

    /// Reuse results of identical earlier queries
    #[arg(long)]
    pub cache: bool,
}

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// Index name or path to an index directory
    pub index: String,

    /// The search query
    pub query: String,

    #[command(flatten)]
    pub options: QueryOptions,
}

#[derive(Debug, Parser)]
pub struct BatchSearchArgs {
    /// Index name or path to an index directory
    pub index: String,

    /// File with one query per line
    pub query_file: PathBuf,

    #[command(flatten)]
    pub options: QueryOptions,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "ragbert",
            &mut std::io::stdout(),
        );
    }
}
