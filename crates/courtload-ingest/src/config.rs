//! Configuration management

use std::time::Duration;

use anyhow::Context;
use courtload_common::env;
use serde::{Deserialize, Serialize};

use crate::ingestor::DEFAULT_FAILURE_SAMPLES;
use crate::parser::DEFAULT_CHUNK_BYTES;
use crate::pipeline::{PipelineOptions, DEFAULT_BATCH_RECORDS};

// ============================================================================
// Ingestion Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/courtlistener";

/// Default number of records shown in parse-only mode.
pub const DEFAULT_PARSE_LIMIT: usize = 100;

/// Default database connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Largest accepted read window (256 MiB).
pub const MAX_CHUNK_BYTES: usize = 256 * 1024 * 1024;

/// Ingestion configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    pub database_url: String,
    pub chunk_bytes: usize,
    pub batch_records: usize,
    pub parse_limit: usize,
    pub connect_timeout_secs: u64,
    /// Seed the placeholder cache with every existing parent key before loading
    pub preload_keys: bool,
    pub failure_samples: usize,
}

impl IngestConfig {
    /// Load configuration from `.env`, the environment and defaults.
    ///
    /// Not validated yet; command-line overrides may still replace any value.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = IngestConfig {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            chunk_bytes: env::parse_or("COURTLOAD_CHUNK_BYTES", DEFAULT_CHUNK_BYTES)?,
            batch_records: env::parse_or("COURTLOAD_BATCH_RECORDS", DEFAULT_BATCH_RECORDS)?,
            parse_limit: env::parse_or("COURTLOAD_PARSE_LIMIT", DEFAULT_PARSE_LIMIT)?,
            connect_timeout_secs: env::parse_or(
                "COURTLOAD_CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )?,
            preload_keys: env::flag("COURTLOAD_PRELOAD_KEYS", false)?,
            failure_samples: env::parse_or("COURTLOAD_FAILURE_SAMPLES", DEFAULT_FAILURE_SAMPLES)?,
        };

        Ok(config)
    }

    /// Apply command-line overrides, then validate the result
    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> anyhow::Result<Self> {
        if let Some(url) = &overrides.database_url {
            self.database_url = url.clone();
        }
        if let Some(limit) = overrides.parse_limit {
            self.parse_limit = limit;
        }
        if let Some(batch) = overrides.batch_records {
            self.batch_records = batch;
        }
        if let Some(chunk) = overrides.chunk_bytes {
            self.chunk_bytes = chunk;
        }
        self.preload_keys |= overrides.preload_keys;

        self.validate().context("Invalid ingestion configuration")?;
        Ok(self)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.trim().is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.chunk_bytes == 0 {
            anyhow::bail!("Chunk size must be greater than 0");
        }

        if self.chunk_bytes > MAX_CHUNK_BYTES {
            anyhow::bail!(
                "Chunk size ({}) cannot be greater than {} bytes",
                self.chunk_bytes,
                MAX_CHUNK_BYTES
            );
        }

        if self.batch_records == 0 {
            anyhow::bail!("Batch size must be greater than 0");
        }

        if self.connect_timeout_secs == 0 {
            anyhow::bail!("Connect timeout must be greater than 0");
        }

        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            chunk_bytes: self.chunk_bytes,
            batch_records: self.batch_records,
            failure_samples: self.failure_samples,
        }
    }
}

/// Values given on the command line; they take precedence over the environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub parse_limit: Option<usize>,
    pub batch_records: Option<usize>,
    pub chunk_bytes: Option<usize>,
    pub preload_keys: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            batch_records: DEFAULT_BATCH_RECORDS,
            parse_limit: DEFAULT_PARSE_LIMIT,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            preload_keys: false,
            failure_samples: DEFAULT_FAILURE_SAMPLES,
        }
    }
}
