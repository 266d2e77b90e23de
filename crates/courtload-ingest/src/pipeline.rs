//! End-to-end driver: input stream to store
//!
//! Reads batches of raw records, maps them, hands the typed records to a
//! [`BatchIngestor`] and sends every rejection, malformed rows included, to
//! the quarantine sink. Only an unreadable input or a lost store connection
//! ends a run early.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Instant;

use flate2::read::GzDecoder;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::entities::{preview, TypedRecord};
use crate::error::{IngestError, Result};
use crate::ingestor::{
    BatchIngestor, BatchReport, BatchStats, FailureSample, RejectReason, RejectedItem,
    RejectionEntry, ViolationCounts, DEFAULT_FAILURE_SAMPLES,
};
use crate::mapper::RecordMapper;
use crate::parser::{Header, RawRecord, RecordScanner, DEFAULT_CHUNK_BYTES};
use crate::quarantine::QuarantineSink;
use crate::resolver::{PlaceholderCache, PlaceholderResolver};
use crate::schema::EntityKind;
use crate::store::RecordStore;

/// Default number of records per batch
pub const DEFAULT_BATCH_RECORDS: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub chunk_bytes: usize,
    pub batch_records: usize,
    pub failure_samples: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            batch_records: DEFAULT_BATCH_RECORDS,
            failure_samples: DEFAULT_FAILURE_SAMPLES,
        }
    }
}

/// Totals for one run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub kind: EntityKind,
    pub batches: usize,
    pub raw_records: usize,
    pub parsed: usize,
    pub malformed: usize,
    pub inserted: usize,
    /// Records the store refused; malformed rows are counted separately
    pub rejected: usize,
    pub retried: usize,
    pub placeholders_created: usize,
    pub violations: ViolationCounts,
    /// Keys placeholders were created for, per referenced kind
    pub placeholder_keys: BTreeMap<EntityKind, Vec<i64>>,
    pub failure_samples: Vec<FailureSample>,
    pub elapsed_secs: f64,
    pub aborted: Option<String>,
}

impl RunSummary {
    fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            batches: 0,
            raw_records: 0,
            parsed: 0,
            malformed: 0,
            inserted: 0,
            rejected: 0,
            retried: 0,
            placeholders_created: 0,
            violations: ViolationCounts::default(),
            placeholder_keys: BTreeMap::new(),
            failure_samples: Vec::new(),
            elapsed_secs: 0.0,
            aborted: None,
        }
    }

    fn absorb(&mut self, stats: &BatchStats, sample_limit: usize) {
        self.inserted += stats.inserted;
        self.rejected += stats.rejected;
        self.retried += stats.retried;
        self.placeholders_created += stats.placeholders_created;
        self.violations.add(&stats.violations);
        let room = sample_limit.saturating_sub(self.failure_samples.len());
        self.failure_samples
            .extend(stats.failure_samples.iter().take(room).cloned());
    }

    fn finalize(&mut self, resolver: &PlaceholderResolver, started: Instant) {
        self.placeholder_keys = resolver
            .created()
            .iter()
            .map(|(kind, keys)| (*kind, keys.iter().copied().collect()))
            .collect();
        self.elapsed_secs = started.elapsed().as_secs_f64();
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Kind:                 {}", self.kind)?;
        writeln!(f, "Batches:              {}", self.batches)?;
        writeln!(f, "Records read:         {}", self.raw_records)?;
        writeln!(f, "Malformed:            {}", self.malformed)?;
        writeln!(f, "Inserted:             {}", self.inserted)?;
        writeln!(f, "Rejected:             {}", self.rejected)?;
        writeln!(f, "Retried:              {}", self.retried)?;
        writeln!(f, "Placeholders created: {}", self.placeholders_created)?;
        writeln!(
            f,
            "Violations:           fk={} not_null={} unique={} other={} connection={}",
            self.violations.foreign_key,
            self.violations.not_null,
            self.violations.unique,
            self.violations.other,
            self.violations.connection
        )?;
        for (kind, keys) in &self.placeholder_keys {
            writeln!(f, "Placeholder {:<9} {} keys", format!("{}:", kind), keys.len())?;
        }
        for sample in &self.failure_samples {
            writeln!(f, "Sample failure {}: {}", sample.key, sample.message)?;
        }
        if let Some(reason) = &self.aborted {
            writeln!(f, "Aborted:              {}", reason)?;
        }
        write!(f, "Elapsed:              {:.2}s", self.elapsed_secs)
    }
}

/// Result of a parse-only run
#[derive(Debug, Default)]
pub struct ParseReport {
    pub records: Vec<TypedRecord>,
    pub raw_records: usize,
    pub malformed: usize,
}

pub struct IngestPipeline<R> {
    scanner: RecordScanner<R>,
    mapper: RecordMapper,
    options: PipelineOptions,
    finished: bool,
}

impl<R: Read> IngestPipeline<R> {
    /// Open a stream of `kind` records and read its header.
    pub fn new(reader: R, kind: EntityKind, options: PipelineOptions) -> Result<Self> {
        let signature = kind.schema().signature.ok_or_else(|| {
            IngestError::Config(format!("{} records are not loaded from exports", kind))
        })?;
        if options.batch_records == 0 {
            return Err(IngestError::Config("batch size must be at least 1".to_string()));
        }

        let mut scanner = RecordScanner::new(reader, signature, options.chunk_bytes);
        let header = scanner
            .header()?
            .map(Header::from_record)
            .ok_or(IngestError::MissingHeader)?;
        debug!(kind = %kind, columns = header.len(), "Read header");

        Ok(Self {
            scanner,
            mapper: RecordMapper::new(kind, header),
            options,
            finished: false,
        })
    }

    pub fn kind(&self) -> EntityKind {
        self.mapper.kind()
    }

    pub fn header(&self) -> &Header {
        self.mapper.header()
    }

    /// Up to `max` raw records; empty once the input is exhausted.
    ///
    /// The unterminated tail of the input is always returned as a final
    /// record, after every complete one.
    pub fn next_records(&mut self, max: usize) -> Result<Vec<RawRecord>> {
        if self.finished {
            return Ok(Vec::new());
        }
        let batch = self.scanner.next_batch(max)?;
        if !batch.is_empty() {
            return Ok(batch);
        }
        self.finished = true;
        Ok(self.scanner.finish().into_iter().collect())
    }

    /// Load the whole stream into `store`.
    ///
    /// Rejections go to `sink` after each batch. A lost connection ends the
    /// run with [`IngestError::Connection`] once that batch's rejections are
    /// written; batches committed before it stay committed.
    pub async fn run<S: RecordStore + ?Sized>(
        &mut self,
        store: &mut S,
        cache: &mut PlaceholderCache,
        mut sink: Option<&mut QuarantineSink>,
    ) -> Result<RunSummary> {
        let started = Instant::now();
        let mut summary = RunSummary::new(self.kind());
        let mut ingestor =
            BatchIngestor::new(store, cache).with_failure_samples(self.options.failure_samples);

        info!(kind = %self.kind(), batch_records = self.options.batch_records, "Starting ingestion");

        loop {
            let raw = self.next_records(self.options.batch_records)?;
            if raw.is_empty() {
                break;
            }
            summary.batches += 1;
            summary.raw_records += raw.len();

            let (records, malformed) = self.map_records(raw);
            summary.parsed += records.len();
            summary.malformed += malformed.len();

            let report = if records.is_empty() {
                BatchReport::default()
            } else {
                ingestor.ingest_batch(records).await
            };
            summary.absorb(&report.stats, self.options.failure_samples);

            if let Some(sink) = sink.as_deref_mut() {
                sink.write_all(&malformed)?;
                sink.write_all(&report.rejections)?;
                sink.flush()?;
            }

            if let Some(message) = report.aborted {
                summary.aborted = Some(message.clone());
                summary.finalize(ingestor.resolver(), started);
                error!(
                    batches = summary.batches,
                    inserted = summary.inserted,
                    rejected = summary.rejected,
                    error = %message,
                    "Store connection lost, aborting run"
                );
                return Err(IngestError::Connection(message));
            }
        }

        summary.finalize(ingestor.resolver(), started);
        info!(
            kind = %summary.kind,
            batches = summary.batches,
            inserted = summary.inserted,
            rejected = summary.rejected,
            malformed = summary.malformed,
            placeholders = summary.placeholders_created,
            elapsed_secs = summary.elapsed_secs,
            "Ingestion complete"
        );
        Ok(summary)
    }

    /// Scan, decode and map up to `limit` records without touching a store
    pub fn parse_only(&mut self, limit: usize) -> Result<ParseReport> {
        let mut report = ParseReport::default();
        while report.records.len() < limit {
            let want = (limit - report.records.len()).min(self.options.batch_records);
            let raw = self.next_records(want)?;
            if raw.is_empty() {
                break;
            }
            report.raw_records += raw.len();
            let (records, malformed) = self.map_records(raw);
            report.malformed += malformed.len();
            report.records.extend(records);
        }
        info!(
            parsed = report.records.len(),
            malformed = report.malformed,
            "Parse-only run complete"
        );
        Ok(report)
    }

    fn map_records(&self, raw: Vec<RawRecord>) -> (Vec<TypedRecord>, Vec<RejectionEntry>) {
        let mut records = Vec::with_capacity(raw.len());
        let mut malformed = Vec::new();

        for record in raw {
            let fields = record.fields();
            match self.mapper.map(&fields) {
                Ok(typed) => records.push(typed),
                Err(e) => {
                    warn!(
                        kind = %self.kind(),
                        reason = %e,
                        record = %preview(&record.text()),
                        "Skipping malformed row"
                    );
                    malformed.push(RejectionEntry {
                        item: RejectedItem::Unparsed(fields),
                        reason: RejectReason::Malformed(e),
                    });
                },
            }
        }

        (records, malformed)
    }
}

/// Open an export for reading; `.gz` files are decompressed on the fly
pub fn open_input(path: &Path) -> Result<Box<dyn Read + Send>> {
    let file = File::open(path).map_err(|source| IngestError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let compressed = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
    if compressed {
        debug!(path = %path.display(), "Decompressing gzip input");
        Ok(Box::new(BufReader::new(GzDecoder::new(BufReader::new(file)))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}
