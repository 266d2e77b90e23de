//! Quarantine output for rejected records
//!
//! A CSV file in the input's own convention: the input header plus a `reason`
//! column, then one line per rejected record. Quotes are doubled, and fields
//! are quoted only when they need it, so a fixed file can be fed back in.
//!
//! Every line has exactly one field per header column before the reason.
//! Short rows are padded with empty fields; the surplus fields of a long row
//! are joined back into the last column with the commas they were split on.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use csv::{QuoteStyle, WriterBuilder};
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::ingestor::{RejectedItem, RejectionEntry};
use crate::parser::Header;

pub const REASON_COLUMN: &str = "reason";

pub struct QuarantineSink {
    writer: csv::Writer<Box<dyn Write + Send>>,
    columns: Vec<String>,
    written: usize,
}

impl QuarantineSink {
    pub fn create(path: &Path, header: &Header) -> Result<Self> {
        let file = File::create(path).map_err(|source| IngestError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Writing rejected records");
        Self::from_writer(Box::new(BufWriter::new(file)), header)
    }

    pub fn from_writer(writer: Box<dyn Write + Send>, header: &Header) -> Result<Self> {
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Necessary)
            .from_writer(writer);
        writer.write_record(
            header
                .columns()
                .iter()
                .map(String::as_str)
                .chain([REASON_COLUMN]),
        )?;

        Ok(Self {
            writer,
            columns: header.columns().to_vec(),
            written: 0,
        })
    }

    /// Typed records are rendered by header column; unparsed rows keep
    /// their decoded fields, fitted to the header width.
    pub fn write(&mut self, entry: &RejectionEntry) -> Result<()> {
        let fields: Vec<String> = match &entry.item {
            RejectedItem::Typed(record) => self
                .columns
                .iter()
                .map(|column| record.render_column(column))
                .collect(),
            RejectedItem::Unparsed(fields) => fit_to_width(fields, self.columns.len()),
        };
        let reason = entry.reason.to_string();

        self.writer.write_record(
            fields
                .iter()
                .map(String::as_str)
                .chain([reason.as_str()]),
        )?;
        self.written += 1;
        Ok(())
    }

    pub fn write_all<'e>(
        &mut self,
        entries: impl IntoIterator<Item = &'e RejectionEntry>,
    ) -> Result<()> {
        for entry in entries {
            self.write(entry)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Rejections written so far
    pub fn written(&self) -> usize {
        self.written
    }
}

fn fit_to_width(fields: &[String], width: usize) -> Vec<String> {
    if fields.len() <= width {
        let mut fitted = fields.to_vec();
        fitted.resize(width, String::new());
        return fitted;
    }
    let keep = width.saturating_sub(1);
    let mut fitted = fields[..keep].to_vec();
    fitted.push(fields[keep..].join(","));
    fitted
}
