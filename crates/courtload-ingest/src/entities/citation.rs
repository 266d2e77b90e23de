use std::fmt;

use super::Entity;
use crate::error::RowError;
use crate::mapper::Row;
use crate::schema::{EntityKind, SqlValue};

/// A row of `search_citation`: a reporter citation for a cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    pub id: i64,
    pub volume: i64,
    pub reporter: String,
    pub page: String,
    pub citation_type: i64,
    pub cluster_id: i64,
}

impl Entity for Citation {
    const KIND: EntityKind = EntityKind::Citation;

    fn from_row(row: &Row<'_>) -> Result<Self, RowError> {
        Ok(Self {
            id: row.required_int("id")?,
            volume: row.required_int("volume")?,
            reporter: row.required_text("reporter")?,
            page: row.required_text("page")?,
            citation_type: row.int_or("type", 0),
            cluster_id: row.required_int("cluster_id")?,
        })
    }

    fn key(&self) -> i64 {
        self.id
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Int(Some(self.id)),
            SqlValue::Int(Some(self.volume)),
            SqlValue::text(&self.reporter),
            SqlValue::text(&self.page),
            SqlValue::Int(Some(self.citation_type)),
            SqlValue::Int(Some(self.cluster_id)),
        ]
    }
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Citation{{id={}, {} {} {}, type={}, cluster_id={}}}",
            self.id, self.volume, self.reporter, self.page, self.citation_type, self.cluster_id
        )
    }
}
