use std::fmt;

use super::Entity;
use crate::error::RowError;
use crate::mapper::Row;
use crate::schema::{EntityKind, SqlValue};

/// A row of `search_opinionscited`: one opinion citing another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpinionCited {
    pub id: i64,
    /// How many times the citing opinion cites the cited one
    pub depth: i64,
    pub cited_opinion_id: i64,
    pub citing_opinion_id: i64,
}

impl Entity for OpinionCited {
    const KIND: EntityKind = EntityKind::Cited;

    fn from_row(row: &Row<'_>) -> Result<Self, RowError> {
        Ok(Self {
            id: row.required_int("id")?,
            depth: row.int_or("depth", 1),
            cited_opinion_id: row.required_int("cited_opinion_id")?,
            citing_opinion_id: row.required_int("citing_opinion_id")?,
        })
    }

    fn key(&self) -> i64 {
        self.id
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Int(Some(self.id)),
            SqlValue::Int(Some(self.depth)),
            SqlValue::Int(Some(self.cited_opinion_id)),
            SqlValue::Int(Some(self.citing_opinion_id)),
        ]
    }
}

impl fmt::Display for OpinionCited {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OpinionCited{{id={}, depth={}, cited={}, citing={}}}",
            self.id, self.depth, self.cited_opinion_id, self.citing_opinion_id
        )
    }
}
