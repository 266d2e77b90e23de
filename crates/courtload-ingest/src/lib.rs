//! Courtload Ingest Library
//!
//! Streaming loader for CourtListener bulk CSV exports.
//!
//! The exports are not well-formed CSV: quoted text contains bare newlines,
//! backslash-escaped quotes and unbalanced quotes, and rows routinely point
//! at parents that are not in the database. The pipeline is:
//!
//! - [`parser`]: a chunked scanner that finds record boundaries by quote state
//!   plus a per-kind record signature, and a forgiving field decoder
//! - [`mapper`]: header-driven mapping of fields onto typed [`entities`]
//! - [`ingestor`]: batched inserts that repair foreign-key violations with
//!   placeholder rows ([`resolver`]) and retry once
//! - [`quarantine`]: a CSV of every rejected row with its reason
//!
//! Table layouts, conflict policies and placeholder shapes live in [`schema`].
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use courtload_ingest::pipeline::{open_input, IngestPipeline, PipelineOptions};
//! use courtload_ingest::resolver::PlaceholderCache;
//! use courtload_ingest::schema::EntityKind;
//! use courtload_ingest::store::PgStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let input = open_input(Path::new("citations.csv.gz"))?;
//!     let mut pipeline =
//!         IngestPipeline::new(input, EntityKind::Citation, PipelineOptions::default())?;
//!
//!     let mut store = PgStore::connect(
//!         "postgresql://localhost/courtlistener",
//!         std::time::Duration::from_secs(10),
//!     )
//!     .await?;
//!     let summary = pipeline
//!         .run(&mut store, &mut PlaceholderCache::new(), None)
//!         .await?;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod entities;
pub mod error;
pub mod ingestor;
pub mod mapper;
pub mod parser;
pub mod pipeline;
pub mod quarantine;
pub mod resolver;
pub mod schema;
pub mod store;

pub use config::{ConfigOverrides, IngestConfig};
pub use entities::TypedRecord;
pub use error::{IngestError, Result, RowError};
pub use ingestor::{BatchIngestor, BatchReport, RecordOutcome, RejectReason};
pub use pipeline::{IngestPipeline, PipelineOptions, RunSummary};
pub use resolver::PlaceholderCache;
pub use schema::EntityKind;
pub use store::{MemoryStore, PgStore, RecordStore};
