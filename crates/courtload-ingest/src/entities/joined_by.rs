use std::fmt;

use super::Entity;
use crate::error::RowError;
use crate::mapper::Row;
use crate::schema::{EntityKind, SqlValue};

/// A row of `search_opinion_joined_by`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpinionJoinedBy {
    pub id: i64,
    pub opinion_id: i64,
    pub person_id: i64,
}

impl Entity for OpinionJoinedBy {
    const KIND: EntityKind = EntityKind::JoinedBy;

    fn from_row(row: &Row<'_>) -> Result<Self, RowError> {
        Ok(Self {
            id: row.required_int("id")?,
            opinion_id: row.required_int("opinion_id")?,
            person_id: row.required_int("person_id")?,
        })
    }

    fn key(&self) -> i64 {
        self.id
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Int(Some(self.id)),
            SqlValue::Int(Some(self.opinion_id)),
            SqlValue::Int(Some(self.person_id)),
        ]
    }
}

impl fmt::Display for OpinionJoinedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OpinionJoinedBy{{id={}, opinion_id={}, person_id={}}}",
            self.id, self.opinion_id, self.person_id
        )
    }
}
