//! Mapping decoded field lists onto typed records
//!
//! Columns are looked up by header name, so exports with extra, missing or
//! reordered columns still load. Missing or unparsable values fall back to a
//! default, except for the mandatory columns declared in the schema, which
//! must be present and well-formed or the whole row is rejected.

use chrono::NaiveDate;

use crate::entities::TypedRecord;
use crate::error::RowError;
use crate::parser::Header;
use crate::schema::{EntityKind, MandatoryType};

/// Maps field lists of one entity kind against one stream's header
#[derive(Debug, Clone)]
pub struct RecordMapper {
    kind: EntityKind,
    header: Header,
}

impl RecordMapper {
    pub fn new(kind: EntityKind, header: Header) -> Self {
        Self { kind, header }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Validate the row shape and mandatory columns, then build the record.
    pub fn map(&self, fields: &[String]) -> Result<TypedRecord, RowError> {
        if fields.len() > self.header.len() {
            return Err(RowError::TooManyColumns {
                expected: self.header.len(),
                found: fields.len(),
            });
        }

        let row = Row::new(&self.header, fields);
        for mandatory in self.kind.schema().mandatory {
            row.check_mandatory(mandatory.column, mandatory.ty)?;
        }

        TypedRecord::from_row(self.kind, &row)
    }
}

/// One decoded row viewed through its header
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    header: &'a Header,
    fields: &'a [String],
}

impl<'a> Row<'a> {
    pub fn new(header: &'a Header, fields: &'a [String]) -> Self {
        Self { header, fields }
    }

    /// Raw value, or `None` when the header lacks the column or the row is
    /// too short to reach it.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let position = self.header.position(column)?;
        self.fields.get(position).map(String::as_str)
    }

    /// Text value; absent columns become the empty string
    pub fn text(&self, column: &str) -> String {
        self.get(column).unwrap_or_default().to_string()
    }

    /// Text value; absent or blank columns become `None`
    pub fn opt_text(&self, column: &str) -> Option<String> {
        self.get(column)
            .filter(|v| !v.trim().is_empty())
            .map(str::to_string)
    }

    pub fn opt_int(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(|v| v.trim().parse().ok())
    }

    pub fn int_or(&self, column: &str, default: i64) -> i64 {
        self.opt_int(column).unwrap_or(default)
    }

    pub fn float_or(&self, column: &str, default: f64) -> f64 {
        self.get(column)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Accepts the spellings PostgreSQL exports use (`t`, `true`, `1`, ...)
    pub fn bool_or(&self, column: &str, default: bool) -> bool {
        match self.get(column).map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if matches!(v.as_str(), "t" | "true" | "1" | "yes" | "y") => true,
            Some(v) if matches!(v.as_str(), "f" | "false" | "0" | "no" | "n") => false,
            _ => default,
        }
    }

    pub fn required_int(&self, column: &str) -> Result<i64, RowError> {
        let value = self.required(column)?;
        value.parse().map_err(|_| RowError::InvalidValue {
            column: column.to_string(),
            value: value.to_string(),
            expected: MandatoryType::Integer.describe(),
        })
    }

    pub fn required_text(&self, column: &str) -> Result<String, RowError> {
        self.required(column).map(str::to_string)
    }

    /// A date or timestamp; the original text is kept for the store to parse.
    pub fn required_date(&self, column: &str) -> Result<String, RowError> {
        let value = self.required(column)?;
        let date_part = value.get(..10).unwrap_or(value);
        NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| RowError::InvalidValue {
            column: column.to_string(),
            value: value.to_string(),
            expected: MandatoryType::Date.describe(),
        })?;
        Ok(value.to_string())
    }

    fn check_mandatory(&self, column: &str, ty: MandatoryType) -> Result<(), RowError> {
        match ty {
            MandatoryType::Integer => self.required_int(column).map(drop),
            MandatoryType::Text => self.required_text(column).map(drop),
            MandatoryType::Date => self.required_date(column).map(drop),
        }
    }

    fn required(&self, column: &str) -> Result<&'a str, RowError> {
        let value = self
            .get(column)
            .ok_or_else(|| RowError::MissingColumn(column.to_string()))?
            .trim();
        if value.is_empty() {
            return Err(RowError::EmptyColumn(column.to_string()));
        }
        Ok(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn fields(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_row_lookups_by_name() {
        let header = Header::from_columns(["id", "flag", "score", "note"]);
        let values = fields(&["12", "t", "0.5"]);
        let row = Row::new(&header, &values);

        assert_eq!(row.required_int("id").unwrap(), 12);
        assert!(row.bool_or("flag", false));
        assert_eq!(row.float_or("score", 1.0), 0.5);
        // Row is shorter than the header: absent, not an error
        assert_eq!(row.get("note"), None);
        assert_eq!(row.opt_text("note"), None);
        assert_eq!(row.text("note"), "");
        assert_eq!(row.int_or("not_in_header", 7), 7);
    }

    #[test]
    fn test_blank_optional_text_is_none() {
        let header = Header::from_columns(["id", "slug"]);
        let values = fields(&["1", "   "]);
        let row = Row::new(&header, &values);
        assert_eq!(row.opt_text("slug"), None);
        assert_eq!(row.text("slug"), "   ");
    }

    #[test]
    fn test_coercion_failures_fall_back() {
        let header = Header::from_columns(["id", "depth", "blocked"]);
        let values = fields(&["1", "deep", "maybe"]);
        let row = Row::new(&header, &values);
        assert_eq!(row.int_or("depth", 1), 1);
        assert_eq!(row.opt_int("depth"), None);
        assert!(!row.bool_or("blocked", false));
    }

    #[test]
    fn test_required_errors() {
        let header = Header::from_columns(["id", "date_created"]);
        let values = fields(&["x", ""]);
        let row = Row::new(&header, &values);

        assert!(matches!(row.required_int("id"), Err(RowError::InvalidValue { .. })));
        assert_eq!(
            row.required_date("date_created"),
            Err(RowError::EmptyColumn("date_created".to_string()))
        );
        assert_eq!(
            row.required_text("cluster_id"),
            Err(RowError::MissingColumn("cluster_id".to_string()))
        );
    }

    #[test]
    fn test_required_date_accepts_timestamps() {
        let header = Header::from_columns(["d"]);
        let values = fields(&["2020-01-31 12:00:00+00"]);
        let row = Row::new(&header, &values);
        assert_eq!(row.required_date("d").unwrap(), "2020-01-31 12:00:00+00");

        let values = fields(&["2020-02-31"]);
        let row = Row::new(&header, &values);
        assert!(row.required_date("d").is_err());
    }

    #[test]
    fn test_mapper_rejects_too_many_columns() {
        let header = Header::from_columns(["id", "opinion_id", "person_id"]);
        let mapper = RecordMapper::new(EntityKind::JoinedBy, header);
        let err = mapper.map(&fields(&["1", "2", "3", "4"])).unwrap_err();
        assert_eq!(err, RowError::TooManyColumns { expected: 3, found: 4 });
    }

    #[test]
    fn test_mapper_checks_mandatory_columns_first() {
        let header = Header::from_columns(["id", "opinion_id", "person_id"]);
        let mapper = RecordMapper::new(EntityKind::JoinedBy, header);
        let err = mapper.map(&fields(&["1", "", "3"])).unwrap_err();
        assert_eq!(err, RowError::EmptyColumn("opinion_id".to_string()));

        let record = mapper.map(&fields(&["1", "2", "3"])).unwrap();
        assert_eq!(record.kind(), EntityKind::JoinedBy);
        assert_eq!(record.key(), 1);
    }
}
