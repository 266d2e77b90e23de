//! Column-name table for one stream

use std::collections::HashMap;

use super::{decode_fields, RawRecord};

/// Ordered column names with a name -> position index.
///
/// Built once from the first record of a stream and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    columns: Vec<String>,
    index: HashMap<String, usize>,
}

impl Header {
    pub fn from_record(record: &RawRecord) -> Self {
        Self::from_columns(decode_fields(&record.text()))
    }

    /// Names are trimmed and a leading byte-order mark is dropped. When a name
    /// repeats, lookups resolve to its first position.
    pub fn from_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let columns: Vec<String> = columns
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let name = name.as_ref().trim();
                let name = if i == 0 {
                    name.trim_start_matches('\u{feff}')
                } else {
                    name
                };
                name.to_string()
            })
            .collect();

        let mut index = HashMap::with_capacity(columns.len());
        for (position, name) in columns.iter().enumerate() {
            index.entry(name.clone()).or_insert(position);
        }

        Self { columns, index }
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_from_record() {
        let header = Header::from_record(&RawRecord::new("\u{feff}id, date_created ,\"value\""));
        assert_eq!(header.columns(), ["id", "date_created", "value"]);
        assert_eq!(header.position("id"), Some(0));
        assert_eq!(header.position("value"), Some(2));
        assert_eq!(header.position("missing"), None);
    }

    #[test]
    fn test_duplicate_names_resolve_to_first() {
        let header = Header::from_columns(["id", "x", "x"]);
        assert_eq!(header.len(), 3);
        assert_eq!(header.position("x"), Some(1));
    }
}
