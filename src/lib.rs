//! ragbert - index folders of mixed documents and search them with ColBERT
//! late-interaction retrieval followed by reranking.
//!
//! Ingestion walks a directory, normalizes every supported file (PDF, CSV,
//! Excel, Word, HTML, JSON, JSON Lines, plain text) into records across a
//! bounded worker pool, and hands the aggregate to a [`RetrievalBackend`].
//! Queries over-fetch candidates from the built index, rerank them, and keep
//! the best `k`.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ragbert::{
//!     ColbertBackend, Ingestor, ReaderRegistry, RetrievalBackend, Settings,
//!     config::Overrides, index_builder::build_index, retrieval::retrieve_and_rerank,
//! };
//!
//! let settings = Settings::from_env(&Overrides::default()).unwrap();
//! let registry = Arc::new(ReaderRegistry::with_defaults());
//! let batch = Ingestor::from_settings(&settings, registry)
//!     .unwrap()
//!     .ingest("./docs".as_ref())
//!     .unwrap();
//!
//! let backend = ColbertBackend::new();
//! let path =
//!     build_index(&backend, &batch, "docs", &settings.model_name, &settings).unwrap();
//!
//! let index = backend.load(&path).unwrap();
//! for r in retrieve_and_rerank(&index, "rust programming", 10, 100).unwrap() {
//!     println!("{}. [{:.3}] {}", r.rank, r.score, r.content);
//! }
//! ```

pub mod backend;
pub mod cache;
pub mod chunking;
pub mod cli;
pub mod colbert;
pub mod config;
pub mod data_dir;
pub mod embedding;
pub mod error;
pub mod index_builder;
pub mod index_store;
pub mod ingestion;
pub mod model_manager;
pub mod normalize;
pub mod readers;
pub mod report;
pub mod retrieval;
pub mod walker;

pub use backend::{RetrievalBackend, SearchIndex};
pub use colbert::{ColbertBackend, ColbertIndex};
pub use config::Settings;
pub use data_dir::DataDir;
pub use error::{Error, Result};
pub use ingestion::Ingestor;
pub use model_manager::ModelManager;
pub use normalize::RecordBatch;
pub use readers::ReaderRegistry;
pub use retrieval::SearchResult;
