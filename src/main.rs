use std::{
    io::IsTerminal,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
    time::UNIX_EPOCH,
};

use clap::Parser;
use ragbert::{
    backend::RetrievalBackend,
    cache::{DiskCache, cached_retrieve_and_rerank},
    cli::{BatchSearchArgs, Cli, Command, IndexArgs, QueryOptions, SearchArgs},
    colbert::{ColbertBackend, ColbertIndex, INDEX_FILE},
    config::Settings,
    error::Result,
    index_builder::build_index,
    ingestion::{Ingestor, run_worker},
    readers::ReaderRegistry,
    report,
    retrieval::{SearchResult, retrieve_and_rerank_batch},
};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("RAGBERT_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Command::NormalizeWorker { path } => {
            let registry = ReaderRegistry::with_defaults();
            return run_worker(&registry, path, std::io::stdout().lock());
        }
        Command::Completions(args) => {
            args.generate();
            return Ok(());
        }
        _ => {}
    }

    let settings = Settings::from_env(&cli.overrides())?;

    match &cli.command {
        Command::Index(args) => cmd_index(&settings, args),
        Command::Search(args) => cmd_search(&settings, args),
        Command::BatchSearch(args) => cmd_batch_search(&settings, args),
        Command::NormalizeWorker { .. } | Command::Completions(_) => Ok(()),
    }
}

fn cmd_index(settings: &Settings, args: &IndexArgs) -> Result<()> {
    let registry = Arc::new(ReaderRegistry::with_defaults());
    let ingestor = Ingestor::from_settings(settings, registry)?
        .with_progress(std::io::stderr().is_terminal());

    let batch = ingestor.ingest(&args.input_directory)?;
    let path = build_index(
        &ColbertBackend::new(),
        &batch,
        &args.index_name,
        &settings.model_name,
        settings,
    )?;

    println!("Index created at: {}", path.display());
    Ok(())
}

fn cmd_search(settings: &Settings, args: &SearchArgs) -> Result<()> {
    let (path, index) = open_index(settings, &args.index)?;
    let queries = vec![args.query.clone()];
    let results = run_queries(settings, &path, &index, &queries, &args.options)?;

    if let Some(output) = &args.options.output {
        let empty = Vec::new();
        let first = results.first().unwrap_or(&empty);
        report::write_report(output, &args.query, first)?;
        eprintln!("Full results written to: {}", output.display());
    }

    print_results(&queries, &results, args.options.json)
}

fn cmd_batch_search(settings: &Settings, args: &BatchSearchArgs) -> Result<()> {
    let queries = report::read_queries(&args.query_file)?;
    let (path, index) = open_index(settings, &args.index)?;
    let results = run_queries(settings, &path, &index, &queries, &args.options)?;

    if let Some(output) = &args.options.output {
        report::write_batch_report(output, &queries, &results)?;
        eprintln!("Full results written to: {}", output.display());
    }

    print_results(&queries, &results, args.options.json)
}

fn open_index(
    settings: &Settings,
    reference: &str,
) -> Result<(PathBuf, ColbertIndex)> {
    let path = settings.data_dir().resolve_index(reference)?;
    let index = ColbertBackend::new().load(&path)?;
    Ok((path, index))
}

fn run_queries(
    settings: &Settings,
    path: &Path,
    index: &ColbertIndex,
    queries: &[String],
    options: &QueryOptions,
) -> Result<Vec<Vec<SearchResult>>> {
    if !options.cache {
        return retrieve_and_rerank_batch(index, queries, options.k, options.rerank_k);
    }

    let cache = DiskCache::open_in(&settings.cache_dir)?;
    let index_id = index_identity(path)?;
    let model = index.model_name()?;

    queries
        .iter()
        .map(|query| {
            cached_retrieve_and_rerank(
                &cache,
                index,
                &index_id,
                &model,
                query,
                options.k,
                options.rerank_k,
            )
        })
        .collect()
}

/// The index path plus the time it was last built, so rebuilt indexes
/// never hit results cached for an older build.
fn index_identity(path: &Path) -> Result<String> {
    let canonical = std::fs::canonicalize(path)?;
    let built = std::fs::metadata(path.join(INDEX_FILE))?
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    Ok(format!("{}@{built}", canonical.display()))
}

fn print_results(
    queries: &[String],
    results: &[Vec<SearchResult>],
    json: bool,
) -> Result<()> {
    if json {
        println!("{}", report::to_json(queries, results)?);
        return Ok(());
    }

    for (i, (query, query_results)) in queries.iter().zip(results).enumerate() {
        if i > 0 {
            println!();
        }
        print!("{}", report::format_table(query, query_results));
    }
    Ok(())
}

