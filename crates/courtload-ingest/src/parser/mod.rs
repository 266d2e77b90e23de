//! Turning a byte stream into field lists
//!
//! - [`scanner`]: splits the stream into logical records
//! - [`signature`]: decides which line breaks are record boundaries
//! - [`decoder`]: splits one logical record into fields
//! - [`header`]: the column-name table built from the first record

pub mod decoder;
pub mod header;
pub mod scanner;
pub mod signature;

use std::borrow::Cow;
use std::fmt;

pub use decoder::decode_fields;
pub use header::Header;
pub use scanner::{RecordScanner, DEFAULT_CHUNK_BYTES};
pub use signature::{RecordSignature, SignatureMatch, SignatureMatcher};

/// One logical record exactly as it appeared in the input, minus its trailing
/// line break. May contain embedded line breaks.
#[derive(Clone, PartialEq, Eq)]
pub struct RawRecord(Vec<u8>);

impl RawRecord {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Strip trailing CR/LF; `None` if nothing but whitespace remains.
    pub fn trimmed(bytes: &[u8]) -> Option<Self> {
        let end = bytes
            .iter()
            .rposition(|b| !matches!(b, b'\n' | b'\r'))
            .map_or(0, |p| p + 1);
        let body = &bytes[..end];
        if body.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            Some(Self(body.to_vec()))
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The record as text; invalid UTF-8 sequences are replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    pub fn fields(&self) -> Vec<String> {
        decode_fields(&self.text())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for RawRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.text();
        let preview: String = text.chars().take(80).collect();
        if preview.len() < text.len() {
            write!(f, "RawRecord({:?}...)", preview)
        } else {
            write!(f, "RawRecord({:?})", preview)
        }
    }
}
