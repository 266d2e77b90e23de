use std::fmt;

use super::Entity;
use crate::error::RowError;
use crate::mapper::Row;
use crate::schema::{EntityKind, SqlValue};

/// A row of `search_opinioncluster_panel`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterPanel {
    pub id: i64,
    pub opinioncluster_id: i64,
    pub person_id: i64,
}

impl Entity for ClusterPanel {
    const KIND: EntityKind = EntityKind::Panel;

    fn from_row(row: &Row<'_>) -> Result<Self, RowError> {
        Ok(Self {
            id: row.required_int("id")?,
            opinioncluster_id: row.required_int("opinioncluster_id")?,
            person_id: row.required_int("person_id")?,
        })
    }

    fn key(&self) -> i64 {
        self.id
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Int(Some(self.id)),
            SqlValue::Int(Some(self.opinioncluster_id)),
            SqlValue::Int(Some(self.person_id)),
        ]
    }
}

impl fmt::Display for ClusterPanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ClusterPanel{{id={}, opinioncluster_id={}, person_id={}}}",
            self.id, self.opinioncluster_id, self.person_id
        )
    }
}
