//! Chunked record scanner
//!
//! Reads the input in fixed-size windows and splits it into logical records
//! without holding more than the unconsumed tail in memory. A record ends at a
//! line break that is outside a quoted span *and* is followed by the record
//! signature for the entity kind being loaded.
//!
//! The scanner keeps its quote state and scan position across windows, and any
//! decision that depends on bytes not yet read is postponed until they arrive.
//! The sequence of records is therefore the same for every chunk size.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use tracing::{debug, trace};

use super::signature::{RecordSignature, SignatureMatch, SignatureMatcher};
use super::RawRecord;

/// Default window size
pub const DEFAULT_CHUNK_BYTES: usize = 1024 * 1024;

/// Streaming splitter of an input into [`RawRecord`]s
pub struct RecordScanner<R, M = RecordSignature> {
    reader: R,
    matcher: M,
    chunk: Vec<u8>,
    /// Unconsumed input; always starts at the beginning of a record
    buffer: Vec<u8>,
    /// Bytes of `buffer` before this offset have been scanned
    scan_pos: usize,
    in_quotes: bool,
    header: Option<RawRecord>,
    header_seen: bool,
    ready: VecDeque<RawRecord>,
    eof: bool,
    bytes_read: u64,
}

impl<R: Read, M: SignatureMatcher> RecordScanner<R, M> {
    pub fn new(reader: R, matcher: M, chunk_bytes: usize) -> Self {
        Self {
            reader,
            matcher,
            chunk: vec![0; chunk_bytes.max(1)],
            buffer: Vec::new(),
            scan_pos: 0,
            in_quotes: false,
            header: None,
            header_seen: false,
            ready: VecDeque::new(),
            eof: false,
            bytes_read: 0,
        }
    }

    /// The first logical record of the stream, read on first use.
    ///
    /// The header ends at the first line break outside quotes; no signature is
    /// required. Returns `None` for an empty input.
    pub fn header(&mut self) -> std::io::Result<Option<&RawRecord>> {
        while !self.header_seen && !self.eof {
            self.fill()?;
        }
        if !self.header_seen {
            // Header-only input without a trailing newline
            self.header_seen = true;
            self.header = self.take_leftover();
        }
        Ok(self.header.as_ref())
    }

    /// Up to `max_records` complete records.
    ///
    /// An empty result means the stream is exhausted. The unterminated tail is
    /// not included; call [`finish`](Self::finish) to take it.
    pub fn next_batch(&mut self, max_records: usize) -> std::io::Result<Vec<RawRecord>> {
        self.header()?;
        while self.ready.len() < max_records && !self.eof {
            self.fill()?;
        }
        let take = max_records.min(self.ready.len());
        Ok(self.ready.drain(..take).collect())
    }

    /// Take whatever follows the last accepted boundary as a final record.
    ///
    /// Only meaningful once [`next_batch`](Self::next_batch) has returned an
    /// empty batch. Empty or whitespace-only tails yield `None`.
    pub fn finish(&mut self) -> Option<RawRecord> {
        if !self.eof || !self.ready.is_empty() {
            return None;
        }
        self.take_leftover()
    }

    /// True once the input has hit end-of-stream and every complete record
    /// has been handed out.
    pub fn is_exhausted(&self) -> bool {
        self.eof && self.ready.is_empty()
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Bytes carried over to the next window
    pub fn leftover_len(&self) -> usize {
        self.buffer.len()
    }

    fn fill(&mut self) -> std::io::Result<()> {
        let n = loop {
            match self.reader.read(&mut self.chunk) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };

        if n == 0 {
            debug!(bytes_read = self.bytes_read, "End of input reached");
            self.eof = true;
        } else {
            self.bytes_read += n as u64;
            self.buffer.extend_from_slice(&self.chunk[..n]);
        }
        self.scan();
        Ok(())
    }

    fn scan(&mut self) {
        let buf = &self.buffer;
        let len = buf.len();
        let eof = self.eof;
        let mut record_start = 0;
        let mut i = self.scan_pos;
        let mut boundaries = Vec::new();

        while i < len {
            match buf[i] {
                b'\\' => {
                    if i + 1 == len && !eof {
                        break;
                    }
                    if buf.get(i + 1) == Some(&b'"') {
                        i += 2;
                        continue;
                    }
                },
                // Inside a span `""` is a literal; every other quote toggles
                b'"' if self.in_quotes => match buf.get(i + 1) {
                    None if !eof => break,
                    Some(b'"') => {
                        i += 2;
                        continue;
                    },
                    _ => self.in_quotes = false,
                },
                b'"' => self.in_quotes = true,
                b'\n' if !self.in_quotes => {
                    let accepted = if self.header_seen || !boundaries.is_empty() {
                        match self.matcher.check(buf, i + 1, eof) {
                            SignatureMatch::Match => true,
                            SignatureMatch::NoMatch => false,
                            SignatureMatch::NeedMore => break,
                        }
                    } else {
                        true
                    };
                    if accepted {
                        boundaries.push((record_start, i));
                        record_start = i + 1;
                    }
                },
                _ => {},
            }
            i += 1;
        }

        if boundaries.is_empty() {
            self.scan_pos = i;
            return;
        }

        trace!(records = boundaries.len(), "Accepted record boundaries");
        let mut emitted = boundaries.into_iter();
        if !self.header_seen {
            if let Some((start, end)) = emitted.next() {
                self.header = RawRecord::trimmed(&self.buffer[start..end]);
                self.header_seen = true;
            }
        }
        for (start, end) in emitted {
            if let Some(record) = RawRecord::trimmed(&self.buffer[start..end]) {
                self.ready.push_back(record);
            }
        }

        self.buffer.drain(..record_start);
        self.scan_pos = i - record_start;
    }

    fn take_leftover(&mut self) -> Option<RawRecord> {
        let tail = std::mem::take(&mut self.buffer);
        self.scan_pos = 0;
        self.in_quotes = false;
        RawRecord::trimmed(&tail)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn scan_all(input: &str, chunk: usize, signature: RecordSignature) -> (String, Vec<String>) {
        let mut scanner = RecordScanner::new(input.as_bytes(), signature, chunk);
        let header = scanner
            .header()
            .unwrap()
            .map(|h| h.text().into_owned())
            .unwrap_or_default();
        let mut records = Vec::new();
        loop {
            let batch = scanner.next_batch(2).unwrap();
            if batch.is_empty() {
                break;
            }
            records.extend(batch.into_iter().map(|r| r.text().into_owned()));
        }
        records.extend(scanner.finish().map(|r| r.text().into_owned()));
        (header, records)
    }

    #[test]
    fn test_splits_simple_lines() {
        let input = "id,name\n1,a\n2,b\n3,c\n";
        let (header, records) = scan_all(input, 4, RecordSignature::Key);
        assert_eq!(header, "id,name");
        assert_eq!(records, vec!["1,a", "2,b", "3,c"]);
    }

    #[test]
    fn test_newline_without_signature_is_not_a_boundary() {
        let input = "id,date,text\n1,2020-01-01,first\nline\n2,2020-01-02,second\n";
        let (_, records) = scan_all(input, 7, RecordSignature::KeyThenDate { skip: 0 });
        assert_eq!(records, vec!["1,2020-01-01,first\nline", "2,2020-01-02,second"]);
    }

    #[test]
    fn test_signature_inside_quotes_is_not_a_boundary() {
        let input = "id,date,text\n1,2020-01-01,\"body\n123,2020-01-01,still body\"\n2,2020-01-02,x\n";
        let (_, records) = scan_all(input, 3, RecordSignature::KeyThenDate { skip: 0 });
        assert_eq!(records.len(), 2);
        assert!(records[0].contains("123,2020-01-01,still body"));
    }

    #[test]
    fn test_trailing_record_needs_finish() {
        let input = "id,v\n1,a\n2,b";
        let mut scanner = RecordScanner::new(input.as_bytes(), RecordSignature::Key, 1024);
        let batch = scanner.next_batch(10).unwrap();
        assert_eq!(batch.len(), 1);
        assert!(scanner.next_batch(10).unwrap().is_empty());
        assert!(scanner.is_exhausted());
        assert_eq!(scanner.finish().unwrap().text(), "2,b");
        assert!(scanner.finish().is_none());
    }

    #[test]
    fn test_blank_records_are_dropped() {
        let input = "id,v\r\n1,a\r\n\r\n2,b\r\n\r\n";
        let (header, records) = scan_all(input, 5, RecordSignature::Key);
        assert_eq!(header, "id,v");
        assert_eq!(records, vec!["1,a", "2,b"]);
    }

    #[test]
    fn test_header_only_and_empty_input() {
        let mut scanner = RecordScanner::new("id,v".as_bytes(), RecordSignature::Key, 2);
        assert_eq!(scanner.header().unwrap().unwrap().text(), "id,v");
        assert!(scanner.next_batch(5).unwrap().is_empty());
        assert!(scanner.finish().is_none());

        let mut scanner = RecordScanner::new("".as_bytes(), RecordSignature::Key, 2);
        assert!(scanner.header().unwrap().is_none());
    }

    #[test]
    fn test_quote_at_window_edge_waits_for_next_window() {
        // A closing quote split from its comma by the window edge
        let input = "id,t\n1,\"a\"\",\"\n2,x\n";
        for chunk in 1..input.len() {
            let (_, records) = scan_all(input, chunk, RecordSignature::Key);
            assert_eq!(records, vec!["1,\"a\"\",\"", "2,x"], "chunk size {}", chunk);
        }
    }

    #[test]
    fn test_quotes_inside_unquoted_field_toggle() {
        let input = "id,date,text\n1,2020-01-01,He said \"hi\" loudly\n\
                     2,2020-01-02,\"the \"best\" case\"\n3,2020-01-03,third\n";
        for chunk in [1, 2, 5, 4096] {
            let (_, records) = scan_all(input, chunk, RecordSignature::KeyThenDate { skip: 0 });
            assert_eq!(
                records,
                vec![
                    "1,2020-01-01,He said \"hi\" loudly",
                    "2,2020-01-02,\"the \"best\" case\"",
                    "3,2020-01-03,third",
                ],
                "chunk size {}",
                chunk
            );
        }
    }

    #[test]
    fn test_odd_quote_spans_until_next_quote() {
        // The inch mark in record 1 opens a span that record 2's closes
        let input = "id,date,text\n1,2020-01-01,5\" tall\n2,2020-01-02,a 6\" shelf\n3,2020-01-03,x\n";
        let (_, records) = scan_all(input, 3, RecordSignature::KeyThenDate { skip: 0 });
        assert_eq!(
            records,
            vec!["1,2020-01-01,5\" tall\n2,2020-01-02,a 6\" shelf", "3,2020-01-03,x"]
        );
    }

    #[test]
    fn test_record_larger_than_window() {
        let body = "y".repeat(10_000);
        let input = format!("id,t\n1,{}\n2,z\n", body);
        let mut scanner = RecordScanner::new(input.as_bytes(), RecordSignature::Key, 64);
        let batch = scanner.next_batch(1).unwrap();
        assert_eq!(batch[0].len(), body.len() + 2);
        assert!(scanner.leftover_len() < 64 + 8);
    }
}
