//! Runtime settings, resolved once at startup and passed down by reference.
//!
//! Values come from, in order of priority: explicit overrides (CLI flags),
//! `RAGBERT_*` environment variables, then built-in defaults.

use std::{path::PathBuf, str::FromStr};

use crate::{
    data_dir::DataDir,
    error::{Error, Result},
};

pub const DEFAULT_MODEL_ID: &str = "lightonai/GTE-ModernColBERT-v1";
pub const DEFAULT_INDEX_ROOT: &str = ".ragbert";
pub const DEFAULT_BATCH_SIZE: usize = 1000;

pub const MODEL_ENV_VAR: &str = "RAGBERT_MODEL_NAME";
pub const INDEX_ROOT_ENV_VAR: &str = "RAGBERT_INDEX_ROOT";
pub const BATCH_SIZE_ENV_VAR: &str = "RAGBERT_BATCH_SIZE";
pub const MAX_WORKERS_ENV_VAR: &str = "RAGBERT_MAX_WORKERS";
pub const CACHE_DIR_ENV_VAR: &str = "RAGBERT_CACHE_DIR";
pub const ISOLATION_ENV_VAR: &str = "RAGBERT_ISOLATION";

/// How ingestion workers are isolated from the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationMode {
    /// One child process per file; a crash only loses that file.
    #[default]
    Process,
    /// Pool threads with panics caught.
    Thread,
}

impl FromStr for IsolationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "process" => Ok(Self::Process),
            "thread" => Ok(Self::Thread),
            other => Err(Error::Config(format!(
                "unknown isolation mode '{other}' (expected 'process' or 'thread')"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// ColBERT model ID (HuggingFace) or local model path.
    pub model_name: String,
    /// Project-local root under which indexes are stored.
    pub index_root: PathBuf,
    /// Encoding batch size used while building an index.
    pub batch_size: usize,
    /// Size of the ingestion worker pool.
    pub max_workers: usize,
    pub cache_dir: PathBuf,
    pub isolation: IsolationMode,
}

/// Explicit overrides, usually taken from command-line flags.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub model_name: Option<String>,
    pub index_root: Option<PathBuf>,
    pub max_workers: Option<usize>,
    pub isolation: Option<IsolationMode>,
}

impl Settings {
    /// Resolve settings from the process environment.
    pub fn from_env(overrides: &Overrides) -> Result<Self> {
        Self::resolve(overrides, |key| std::env::var(key).ok())
    }

    /// Resolve settings using `lookup` in place of the environment.
    pub fn resolve(
        overrides: &Overrides,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let model_name = overrides
            .model_name
            .clone()
            .or_else(|| lookup(MODEL_ENV_VAR))
            .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string());

        let index_root = overrides
            .index_root
            .clone()
            .or_else(|| lookup(INDEX_ROOT_ENV_VAR).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INDEX_ROOT));

        let batch_size = match lookup(BATCH_SIZE_ENV_VAR) {
            Some(raw) => parse_positive(BATCH_SIZE_ENV_VAR, &raw)?,
            None => DEFAULT_BATCH_SIZE,
        };

        let max_workers = match overrides.max_workers {
            Some(n) if n == 0 => {
                return Err(Error::Config(
                    "worker count must be at least 1".into(),
                ));
            }
            Some(n) => n,
            None => match lookup(MAX_WORKERS_ENV_VAR) {
                Some(raw) => parse_positive(MAX_WORKERS_ENV_VAR, &raw)?,
                None => default_workers(),
            },
        };

        let cache_dir = match lookup(CACHE_DIR_ENV_VAR) {
            Some(dir) => PathBuf::from(dir),
            None => xdg::BaseDirectories::with_prefix("ragbert")
                .get_cache_home()
                .unwrap_or_else(|| index_root.join("cache")),
        };

        let isolation = match overrides.isolation {
            Some(mode) => mode,
            None => match lookup(ISOLATION_ENV_VAR) {
                Some(raw) => raw.parse()?,
                None => IsolationMode::default(),
            },
        };

        Ok(Self {
            model_name,
            index_root,
            batch_size,
            max_workers,
            cache_dir,
            isolation,
        })
    }

    pub fn data_dir(&self) -> DataDir {
        DataDir::new(&self.index_root)
    }
}

fn parse_positive(var: &str, raw: &str) -> Result<usize> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::Config(format!(
            "{var} must be a positive integer, got '{raw}'"
        ))),
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(
        pairs: &[(&str, &str)],
    ) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let settings =
            Settings::resolve(&Overrides::default(), lookup_from(&[])).unwrap();

        assert_eq!(settings.model_name, DEFAULT_MODEL_ID);
        assert_eq!(settings.index_root, PathBuf::from(DEFAULT_INDEX_ROOT));
        assert_eq!(settings.batch_size, DEFAULT_BATCH_SIZE);
        assert!(settings.max_workers >= 1);
        assert_eq!(settings.isolation, IsolationMode::Process);
    }

    #[test]
    fn environment_values_are_used() {
        let lookup = lookup_from(&[
            (MODEL_ENV_VAR, "custom/model"),
            (INDEX_ROOT_ENV_VAR, "/tmp/idx"),
            (BATCH_SIZE_ENV_VAR, "32"),
            (MAX_WORKERS_ENV_VAR, "3"),
            (CACHE_DIR_ENV_VAR, "/tmp/cache"),
            (ISOLATION_ENV_VAR, "thread"),
        ]);
        let settings = Settings::resolve(&Overrides::default(), lookup).unwrap();

        assert_eq!(settings.model_name, "custom/model");
        assert_eq!(settings.index_root, PathBuf::from("/tmp/idx"));
        assert_eq!(settings.batch_size, 32);
        assert_eq!(settings.max_workers, 3);
        assert_eq!(settings.cache_dir, PathBuf::from("/tmp/cache"));
        assert_eq!(settings.isolation, IsolationMode::Thread);
    }

    #[test]
    fn overrides_beat_environment() {
        let lookup = lookup_from(&[
            (MODEL_ENV_VAR, "env/model"),
            (MAX_WORKERS_ENV_VAR, "3"),
            (ISOLATION_ENV_VAR, "thread"),
        ]);
        let overrides = Overrides {
            model_name: Some("flag/model".into()),
            index_root: Some(PathBuf::from("flag-root")),
            max_workers: Some(7),
            isolation: Some(IsolationMode::Process),
        };
        let settings = Settings::resolve(&overrides, lookup).unwrap();

        assert_eq!(settings.model_name, "flag/model");
        assert_eq!(settings.index_root, PathBuf::from("flag-root"));
        assert_eq!(settings.max_workers, 7);
        assert_eq!(settings.isolation, IsolationMode::Process);
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        for raw in ["0", "-1", "lots"] {
            let err = Settings::resolve(
                &Overrides::default(),
                lookup_from(&[(BATCH_SIZE_ENV_VAR, raw)]),
            )
            .unwrap_err();
            assert!(err.to_string().contains(BATCH_SIZE_ENV_VAR));
        }
    }

    #[test]
    fn zero_worker_override_is_rejected() {
        let overrides = Overrides {
            max_workers: Some(0),
            ..Overrides::default()
        };
        assert!(Settings::resolve(&overrides, lookup_from(&[])).is_err());
    }

    #[test]
    fn isolation_mode_parsing() {
        assert_eq!(
            "Process".parse::<IsolationMode>().unwrap(),
            IsolationMode::Process
        );
        assert_eq!(
            " thread ".parse::<IsolationMode>().unwrap(),
            IsolationMode::Thread
        );
        assert!("fork".parse::<IsolationMode>().is_err());
    }
}
