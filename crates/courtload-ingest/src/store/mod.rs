//! The relational store as seen by the loader
//!
//! Every operation is individually transactional: a failure on one record
//! leaves no trace that could affect the records after it.

pub mod memory;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::entities::TypedRecord;
use crate::schema::EntityKind;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Constraint class reported by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    ForeignKey,
    NotNull,
    Unique,
    Check,
    Other,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ViolationKind::ForeignKey => "foreign key",
            ViolationKind::NotNull => "not-null",
            ViolationKind::Unique => "unique",
            ViolationKind::Check => "check",
            ViolationKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// A rejected statement, with the store's own diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub kind: ViolationKind,
    /// Implicated column, when the store names one
    pub column: Option<String>,
    pub constraint: Option<String>,
    pub message: String,
}

impl Violation {
    pub fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            column: None,
            constraint: None,
            message: message.into(),
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{}", .0.message)]
    Violation(Violation),

    /// The connection is gone; nothing further can succeed
    #[error("{0}")]
    Connection(String),

    #[error("{0}")]
    Other(String),
}

impl StoreError {
    pub fn is_connection(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

/// Operations the loader needs from the destination database
#[async_trait]
pub trait RecordStore: Send {
    /// Insert, resolving key conflicts with the kind's conflict policy
    async fn insert_or_update(&mut self, record: &TypedRecord) -> Result<(), StoreError>;

    async fn exists(&mut self, kind: EntityKind, key: i64) -> Result<bool, StoreError>;

    /// Insert the kind's placeholder row for `key` unless a row already exists.
    /// Rows it references must already exist.
    async fn create_placeholder(&mut self, kind: EntityKind, key: i64) -> Result<(), StoreError>;

    /// Create `rows` as placeholders with integrity checks suspended.
    ///
    /// Idempotent, and safe when several runs attempt it at once.
    async fn ensure_bootstrap(&mut self, rows: &[(EntityKind, i64)]) -> Result<(), StoreError>;

    /// Every key currently present for `kind`, used to warm the cache
    async fn known_keys(&mut self, _kind: EntityKind) -> Result<Vec<i64>, StoreError> {
        Ok(Vec::new())
    }
}
