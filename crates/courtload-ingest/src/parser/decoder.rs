//! Field decoder for one logical record
//!
//! The exports mix two quote-escape conventions and contain stray quotes, so
//! decoding never fails. The rules, in order:
//!
//! - `\"` is always a literal quote
//! - inside a quoted span, `""` is a literal quote
//! - inside a quoted span, a quote closes the span only when followed by a
//!   comma or the end of the record; anywhere else it is kept as a literal
//! - outside a quoted span, a quote opens one and a comma ends the field
//!
//! The last field is emitted at end of input even if a quoted span is still
//! open.

/// Split a logical record into its fields.
pub fn decode_fields(record: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = record.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            },
            '"' if in_quotes => match chars.peek() {
                Some('"') => {
                    chars.next();
                    current.push('"');
                },
                Some(',') | None => in_quotes = false,
                Some(_) => current.push('"'),
            },
            '"' => in_quotes = true,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }

    fields.push(current);
    fields
}
