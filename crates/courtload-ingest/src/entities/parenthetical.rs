use std::fmt;

use super::{preview, Entity};
use crate::error::RowError;
use crate::mapper::Row;
use crate::schema::{EntityKind, SqlValue};

/// A row of `search_parenthetical`
#[derive(Debug, Clone, PartialEq)]
pub struct Parenthetical {
    pub id: i64,
    pub text: String,
    pub score: f64,
    pub described_opinion_id: i64,
    pub describing_opinion_id: i64,
    pub group_id: i64,
}

impl Entity for Parenthetical {
    const KIND: EntityKind = EntityKind::Parenthetical;

    fn from_row(row: &Row<'_>) -> Result<Self, RowError> {
        Ok(Self {
            id: row.required_int("id")?,
            text: row.text("text"),
            score: row.float_or("score", 0.0),
            described_opinion_id: row.required_int("described_opinion_id")?,
            describing_opinion_id: row.required_int("describing_opinion_id")?,
            group_id: row.required_int("group_id")?,
        })
    }

    fn key(&self) -> i64 {
        self.id
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Int(Some(self.id)),
            SqlValue::text(&self.text),
            SqlValue::Float(Some(self.score)),
            SqlValue::Int(Some(self.described_opinion_id)),
            SqlValue::Int(Some(self.describing_opinion_id)),
            SqlValue::Int(Some(self.group_id)),
        ]
    }
}

impl fmt::Display for Parenthetical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Parenthetical{{id={}, score={}, described_opinion_id={}, describing_opinion_id={}, group_id={}, text=\"{}\"}}",
            self.id,
            self.score,
            self.described_opinion_id,
            self.describing_opinion_id,
            self.group_id,
            preview(&self.text)
        )
    }
}
