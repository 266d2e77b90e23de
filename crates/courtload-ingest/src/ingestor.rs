//! Batch ingestion with placeholder resolution
//!
//! Each record goes through: attempt, then on a foreign-key violation resolve
//! the missing references and retry exactly once. Every other outcome is a
//! rejection with a reason. A severed connection rejects the rest of the batch
//! and stops it.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::entities::TypedRecord;
use crate::error::RowError;
use crate::resolver::{PlaceholderCache, PlaceholderResolver};
use crate::store::{RecordStore, StoreError, Violation, ViolationKind};

/// Default number of failure messages kept per batch
pub const DEFAULT_FAILURE_SAMPLES: usize = 5;

/// Terminal state of one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Committed,
    /// Committed on the retry after creating `placeholders` rows
    ResolvedAndRetried { placeholders: usize },
    Rejected(RejectReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Constraint violation other than a foreign key, verbatim from the store
    Violation(Violation),
    /// The retry after resolving references still failed; `placeholders` is
    /// how many rows the resolution created, possibly none
    RetryFailed { placeholders: usize, message: String },
    /// The missing reference could not be synthesized
    PlaceholderFailed { column: String, message: String },
    Connection(String),
    Malformed(RowError),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Violation(v) if v.kind == ViolationKind::Unique => {
                write!(f, "Duplicate key violation: {}", v.message)
            },
            RejectReason::Violation(v) => write!(f, "DB error: {}", v.message),
            RejectReason::RetryFailed {
                placeholders: 0,
                message,
            } => write!(f, "FK violation, no placeholder needed but retry failed: {}", message),
            RejectReason::RetryFailed { message, .. } => {
                write!(f, "FK violation, placeholder created but retry failed: {}", message)
            },
            RejectReason::PlaceholderFailed { column, message } => {
                write!(f, "FK violation on {}, could not create placeholder: {}", column, message)
            },
            RejectReason::Connection(message) => write!(f, "Connection error: {}", message),
            RejectReason::Malformed(err) => write!(f, "Malformed row: {}", err),
        }
    }
}

/// What was rejected: a typed record, or the fields of a row that never mapped
#[derive(Debug, Clone, PartialEq)]
pub enum RejectedItem {
    Typed(TypedRecord),
    Unparsed(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RejectionEntry {
    pub item: RejectedItem,
    pub reason: RejectReason,
}

/// Store failures by class
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ViolationCounts {
    pub foreign_key: usize,
    pub not_null: usize,
    pub unique: usize,
    /// Check constraints and anything unclassified
    pub other: usize,
    pub connection: usize,
}

impl ViolationCounts {
    fn record(&mut self, kind: ViolationKind) {
        match kind {
            ViolationKind::ForeignKey => self.foreign_key += 1,
            ViolationKind::NotNull => self.not_null += 1,
            ViolationKind::Unique => self.unique += 1,
            ViolationKind::Check | ViolationKind::Other => self.other += 1,
        }
    }

    pub fn add(&mut self, other: &ViolationCounts) {
        self.foreign_key += other.foreign_key;
        self.not_null += other.not_null;
        self.unique += other.unique;
        self.other += other.other;
        self.connection += other.connection;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureSample {
    pub key: i64,
    pub message: String,
}

/// Operator-facing statistics; nothing branches on them
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub attempted: usize,
    pub inserted: usize,
    pub rejected: usize,
    pub violations: ViolationCounts,
    pub retried: usize,
    pub placeholders_created: usize,
    pub failure_samples: Vec<FailureSample>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub stats: BatchStats,
    pub rejections: Vec<RejectionEntry>,
    /// Set when a connection failure cut the batch short
    pub aborted: Option<String>,
}

impl BatchReport {
    pub fn inserted(&self) -> usize {
        self.stats.inserted
    }

    pub fn rejected(&self) -> usize {
        self.stats.rejected
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }
}

/// Inserts batches of typed records into a store
///
/// Holds the store and the run's placeholder cache for as long as it lives;
/// create one per run so the resolver's bootstrap happens only once.
pub struct BatchIngestor<'a, S: RecordStore + ?Sized> {
    store: &'a mut S,
    cache: &'a mut PlaceholderCache,
    resolver: PlaceholderResolver,
    failure_samples: usize,
}

impl<'a, S: RecordStore + ?Sized> BatchIngestor<'a, S> {
    pub fn new(store: &'a mut S, cache: &'a mut PlaceholderCache) -> Self {
        Self {
            store,
            cache,
            resolver: PlaceholderResolver::new(),
            failure_samples: DEFAULT_FAILURE_SAMPLES,
        }
    }

    pub fn with_failure_samples(mut self, failure_samples: usize) -> Self {
        self.failure_samples = failure_samples;
        self
    }

    pub fn resolver(&self) -> &PlaceholderResolver {
        &self.resolver
    }

    /// Insert `records` in order.
    ///
    /// Returns per-record rejections and batch statistics. Never fails: store
    /// problems are rejections, and a lost connection is reported through
    /// [`BatchReport::aborted`].
    pub async fn ingest_batch(&mut self, records: Vec<TypedRecord>) -> BatchReport {
        let mut report = BatchReport::default();
        let mut records = records.into_iter();

        while let Some(record) = records.next() {
            report.stats.attempted += 1;
            match self.ingest_record(&record, &mut report.stats).await {
                RecordOutcome::Committed | RecordOutcome::ResolvedAndRetried { .. } => {
                    report.stats.inserted += 1;
                },
                RecordOutcome::Rejected(RejectReason::Connection(message)) => {
                    self.reject(&mut report, record, RejectReason::Connection(message.clone()));
                    for rest in records.by_ref() {
                        self.reject(&mut report, rest, RejectReason::Connection(message.clone()));
                    }
                    report.aborted = Some(message);
                    break;
                },
                RecordOutcome::Rejected(reason) => self.reject(&mut report, record, reason),
            }
        }

        let stats = &report.stats;
        info!(
            attempted = stats.attempted,
            inserted = stats.inserted,
            rejected = stats.rejected,
            fk_violations = stats.violations.foreign_key,
            not_null_violations = stats.violations.not_null,
            unique_violations = stats.violations.unique,
            other_violations = stats.violations.other,
            retried = stats.retried,
            placeholders = stats.placeholders_created,
            "Batch complete"
        );
        report
    }

    /// Run one record through attempt, resolve and retry
    pub async fn ingest_record(
        &mut self,
        record: &TypedRecord,
        stats: &mut BatchStats,
    ) -> RecordOutcome {
        let violation = match self.store.insert_or_update(record).await {
            Ok(()) => return RecordOutcome::Committed,
            Err(StoreError::Violation(violation)) => violation,
            Err(StoreError::Connection(message)) => {
                stats.violations.connection += 1;
                return RecordOutcome::Rejected(RejectReason::Connection(message));
            },
            Err(StoreError::Other(message)) => {
                stats.violations.other += 1;
                return RecordOutcome::Rejected(RejectReason::Violation(Violation::new(
                    ViolationKind::Other,
                    message,
                )));
            },
        };

        stats.violations.record(violation.kind);
        if violation.kind != ViolationKind::ForeignKey {
            return RecordOutcome::Rejected(RejectReason::Violation(violation));
        }

        debug!(
            kind = %record.kind(),
            key = record.key(),
            column = ?violation.column,
            "Foreign key violation, resolving references"
        );
        let placeholders = match self
            .resolver
            .resolve(&mut *self.store, self.cache, record, violation.column.as_deref())
            .await
        {
            Ok(created) => created,
            Err(e) if e.is_connection() => {
                stats.violations.connection += 1;
                return RecordOutcome::Rejected(RejectReason::Connection(e.to_string()));
            },
            Err(e) => {
                return RecordOutcome::Rejected(RejectReason::PlaceholderFailed {
                    column: violation.column.unwrap_or_else(|| "unknown column".to_string()),
                    message: e.to_string(),
                });
            },
        };
        stats.placeholders_created += placeholders;
        stats.retried += 1;

        match self.store.insert_or_update(record).await {
            Ok(()) => RecordOutcome::ResolvedAndRetried { placeholders },
            Err(StoreError::Connection(message)) => {
                stats.violations.connection += 1;
                RecordOutcome::Rejected(RejectReason::Connection(message))
            },
            Err(e) => {
                match &e {
                    StoreError::Violation(v) => stats.violations.record(v.kind),
                    _ => stats.violations.other += 1,
                }
                RecordOutcome::Rejected(RejectReason::RetryFailed {
                    placeholders,
                    message: e.to_string(),
                })
            },
        }
    }

    fn reject(&self, report: &mut BatchReport, record: TypedRecord, reason: RejectReason) {
        warn!(
            kind = %record.kind(),
            key = record.key(),
            reason = %reason,
            "Record rejected"
        );
        report.stats.rejected += 1;
        if report.stats.failure_samples.len() < self.failure_samples {
            report.stats.failure_samples.push(FailureSample {
                key: record.key(),
                message: reason.to_string(),
            });
        }
        report.rejections.push(RejectionEntry {
            item: RejectedItem::Typed(record),
            reason,
        });
    }
}
