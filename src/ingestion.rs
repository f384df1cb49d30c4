use std::{
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use kdam::{Bar, BarExt, tqdm};
use rayon::prelude::*;
use tracing::{debug, error, info};

use crate::{
    config::{IsolationMode, Settings},
    error::{Error, Result},
    normalize::{RecordBatch, normalize},
    readers::ReaderRegistry,
    walker::discover_files,
};

/// Hidden subcommand a process-isolated worker is started with:
/// `<program> normalize-worker <path>`. The worker prints the file's
/// [`RecordBatch`] as JSON on stdout.
pub const WORKER_SUBCOMMAND: &str = "normalize-worker";

/// Where a single file gets normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Isolation {
    /// On the pool thread itself.
    Thread,
    /// In a child process running `program`.
    Process { program: PathBuf },
}

impl Isolation {
    /// Process isolation re-executes the current binary as the worker.
    pub fn from_mode(mode: IsolationMode) -> Result<Self> {
        match mode {
            IsolationMode::Thread => Ok(Self::Thread),
            IsolationMode::Process => Ok(Self::Process {
                program: std::env::current_exe()?,
            }),
        }
    }
}

/// Normalizes a directory tree across a bounded worker pool.
#[derive(Debug, Clone)]
pub struct Ingestor {
    registry: Arc<ReaderRegistry>,
    workers: usize,
    isolation: Isolation,
    show_progress: bool,
}

impl Ingestor {
    /// A worker process always reads with [`ReaderRegistry::with_defaults`],
    /// so [`Isolation::Process`] only accepts a built-in registry; ingesting
    /// with a customized one fails with [`Error::Config`]. Use
    /// [`Isolation::Thread`] to normalize with custom readers.
    pub fn new(
        registry: Arc<ReaderRegistry>,
        workers: usize,
        isolation: Isolation,
    ) -> Self {
        Self {
            registry,
            workers: workers.max(1),
            isolation,
            show_progress: false,
        }
    }

    pub fn from_settings(
        settings: &Settings,
        registry: Arc<ReaderRegistry>,
    ) -> Result<Self> {
        Ok(Self::new(
            registry,
            settings.max_workers,
            Isolation::from_mode(settings.isolation)?,
        ))
    }

    /// Draw a progress bar on stderr while ingesting.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Normalize every file under `directory` and concatenate the results
    /// in enumeration order.
    ///
    /// Only a missing or unreadable `directory` is an error; files that fail
    /// to normalize contribute no records. A customized registry combined
    /// with process isolation is rejected before any file is read.
    pub fn ingest(&self, directory: &Path) -> Result<RecordBatch> {
        if matches!(self.isolation, Isolation::Process { .. })
            && !self.registry.is_builtin()
        {
            return Err(Error::Config(
                "process isolation only supports the built-in readers; \
                 use thread isolation with a custom reader registry"
                    .to_string(),
            ));
        }

        let files = discover_files(directory)?;
        info!(
            directory = %directory.display(),
            files = files.len(),
            workers = self.workers,
            "starting ingestion"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("ragbert-ingest-{i}"))
            .build()
            .map_err(|e| {
                Error::Config(format!("cannot start worker pool: {e}"))
            })?;

        let progress = Progress::new(files.len(), self.show_progress);

        // `collect` keeps submission order regardless of completion order.
        let batches: Vec<RecordBatch> = pool.install(|| {
            files
                .par_iter()
                .map(|file| {
                    let batch = self.process(&file.path);
                    progress.advance(&file.path);
                    batch
                })
                .collect()
        });
        progress.finish();

        let mut aggregated = RecordBatch::new();
        for batch in batches {
            aggregated.extend(batch);
        }

        info!(records = aggregated.len(), "processed documents");
        Ok(aggregated)
    }

    fn process(&self, path: &Path) -> RecordBatch {
        match &self.isolation {
            Isolation::Thread => normalize(&self.registry, path),
            Isolation::Process { program } => {
                match spawn_worker(program, path) {
                    Ok(batch) => batch,
                    Err(e) => {
                        error!(path = %path.display(), "worker failed: {e}");
                        RecordBatch::new()
                    }
                }
            }
        }
    }
}

fn spawn_worker(program: &Path, path: &Path) -> Result<RecordBatch> {
    let output = Command::new(program)
        .arg(WORKER_SUBCOMMAND)
        .arg(path)
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .output()?;

    if !output.status.success() {
        return Err(Error::file_read(
            path,
            format!("worker exited with {}", output.status),
        ));
    }

    Ok(serde_json::from_slice(&output.stdout)?)
}

/// Worker side of process isolation: normalize `path` and write the batch
/// as JSON to `out`.
pub fn run_worker(
    registry: &ReaderRegistry,
    path: &Path,
    mut out: impl Write,
) -> Result<()> {
    let batch = normalize(registry, path);
    serde_json::to_writer(&mut out, &batch)?;
    out.flush()?;
    Ok(())
}

struct Progress {
    bar: Option<Mutex<Bar>>,
    done: AtomicUsize,
    total: usize,
}

impl Progress {
    fn new(total: usize, show: bool) -> Self {
        let bar = show.then(|| {
            Mutex::new(tqdm!(
                total = total,
                desc = "Processing files",
                unit = " files"
            ))
        });
        Self {
            bar,
            done: AtomicUsize::new(0),
            total,
        }
    }

    fn advance(&self, path: &Path) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(done, total = self.total, path = %path.display(), "file done");

        if let Some(bar) = &self.bar
            && let Ok(mut bar) = bar.lock()
        {
            let _ = bar.update(1);
        }
    }

    fn finish(&self) {
        if let Some(bar) = &self.bar
            && let Ok(mut bar) = bar.lock()
        {
            let _ = bar.refresh();
            eprintln!();
        }
    }
}
