//! Record boundary signatures
//!
//! A line break outside quotes is only a candidate boundary. The scanner asks a
//! [`SignatureMatcher`] whether the bytes after it look like the start of a
//! record of the expected kind before accepting it.

/// Result of checking a candidate boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureMatch {
    Match,
    NoMatch,
    /// The window ends before a decision can be made
    NeedMore,
}

/// Decides whether `window[at..]` starts a new record.
///
/// `at_eof` tells the matcher that no more bytes will follow the window, so it
/// must answer `Match` or `NoMatch`.
pub trait SignatureMatcher {
    fn check(&self, window: &[u8], at: usize, at_eof: bool) -> SignatureMatch;
}

impl<F> SignatureMatcher for F
where
    F: Fn(&[u8], usize, bool) -> SignatureMatch,
{
    fn check(&self, window: &[u8], at: usize, at_eof: bool) -> SignatureMatch {
        self(window, at, at_eof)
    }
}

/// Fields skipped before the date are short; a candidate that needs more than
/// this many bytes to reach its date is rejected.
pub const MAX_SIGNATURE_SPAN: usize = 4096;

/// Structural prefix shared by every record of one entity kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSignature {
    /// Optionally quoted integer key followed by a comma
    Key,
    /// Key, then `skip` arbitrary fields, then a `YYYY-MM-DD` value
    KeyThenDate { skip: usize },
}

impl SignatureMatcher for RecordSignature {
    fn check(&self, window: &[u8], at: usize, at_eof: bool) -> SignatureMatch {
        let undecided = if at_eof {
            SignatureMatch::NoMatch
        } else {
            SignatureMatch::NeedMore
        };
        let end = window.len().min(at.saturating_add(MAX_SIGNATURE_SPAN));
        let truncated = end < window.len();
        // Running out inside the span limit means we need more bytes; running
        // out at the limit means the candidate is too long to be a boundary.
        let exhausted = if truncated {
            SignatureMatch::NoMatch
        } else {
            undecided
        };
        let bytes = &window[..end];

        let mut pos = match match_key(bytes, at) {
            Step::At(pos) => pos,
            Step::Fail => return SignatureMatch::NoMatch,
            Step::Short => return exhausted,
        };

        let skip = match self {
            RecordSignature::Key => return SignatureMatch::Match,
            RecordSignature::KeyThenDate { skip } => *skip,
        };

        for _ in 0..skip {
            pos = match skip_field(bytes, pos) {
                Some(next) => next,
                None => return exhausted,
            };
        }

        match match_date(bytes, pos) {
            Step::At(_) => SignatureMatch::Match,
            Step::Fail => SignatureMatch::NoMatch,
            Step::Short => exhausted,
        }
    }
}

enum Step {
    At(usize),
    Fail,
    Short,
}

/// `"123",` or `123,`
fn match_key(bytes: &[u8], mut pos: usize) -> Step {
    let quoted = match bytes.get(pos) {
        None => return Step::Short,
        Some(b'"') => {
            pos += 1;
            true
        },
        Some(_) => false,
    };

    let digits_start = pos;
    while bytes.get(pos).is_some_and(u8::is_ascii_digit) {
        pos += 1;
    }
    if pos >= bytes.len() {
        return Step::Short;
    }
    if pos == digits_start {
        return Step::Fail;
    }

    if quoted {
        if bytes[pos] != b'"' {
            return Step::Fail;
        }
        pos += 1;
    }

    match bytes.get(pos) {
        None => Step::Short,
        Some(b',') => Step::At(pos + 1),
        Some(_) => Step::Fail,
    }
}

/// Position just past the comma ending the field at `pos`, or `None` when the
/// bytes run out first.
fn skip_field(bytes: &[u8], mut pos: usize) -> Option<usize> {
    let mut in_quotes = false;
    while let Some(&b) = bytes.get(pos) {
        match b {
            b'"' if in_quotes && bytes.get(pos + 1) == Some(&b'"') => pos += 1,
            b'"' => in_quotes = !in_quotes,
            b',' if !in_quotes => return Some(pos + 1),
            _ => {},
        }
        pos += 1;
    }
    None
}

/// Optionally quoted `YYYY-MM-DD`
fn match_date(bytes: &[u8], mut pos: usize) -> Step {
    match bytes.get(pos) {
        None => return Step::Short,
        Some(b'"') => pos += 1,
        Some(_) => {},
    }

    const SHAPE: &[u8; 10] = b"dddd-dd-dd";
    for (offset, expected) in SHAPE.iter().enumerate() {
        let Some(&b) = bytes.get(pos + offset) else {
            return Step::Short;
        };
        let ok = match expected {
            b'd' => b.is_ascii_digit(),
            _ => b == *expected,
        };
        if !ok {
            return Step::Fail;
        }
    }
    Step::At(pos + SHAPE.len())
}
