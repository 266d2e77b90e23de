//! Typed records, one struct per export kind
//!
//! Each struct knows how to build itself from a [`Row`] and how to produce its
//! insert parameters in the column order of its [`EntitySchema`].
//!
//! [`EntitySchema`]: crate::schema::EntitySchema

mod citation;
mod cited;
mod cluster;
mod joined_by;
mod opinion;
mod panel;
mod parenthetical;

use std::fmt;

pub use citation::Citation;
pub use cited::OpinionCited;
pub use cluster::OpinionCluster;
pub use joined_by::OpinionJoinedBy;
pub use opinion::Opinion;
pub use panel::ClusterPanel;
pub use parenthetical::Parenthetical;

use crate::error::RowError;
use crate::mapper::Row;
use crate::schema::{EntityKind, SqlValue};

/// Conversion between decoded rows and store parameters
pub trait Entity: Sized {
    const KIND: EntityKind;

    fn from_row(row: &Row<'_>) -> Result<Self, RowError>;

    fn key(&self) -> i64;

    /// Insert parameters, one per schema column, in schema order
    fn values(&self) -> Vec<SqlValue>;
}

/// A record of any ingestable kind
#[derive(Debug, Clone, PartialEq)]
pub enum TypedRecord {
    Opinion(Opinion),
    Cluster(OpinionCluster),
    Panel(ClusterPanel),
    Cited(OpinionCited),
    JoinedBy(OpinionJoinedBy),
    Parenthetical(Parenthetical),
    Citation(Citation),
}

macro_rules! each_record {
    ($record:expr, $inner:ident => $body:expr) => {
        match $record {
            TypedRecord::Opinion($inner) => $body,
            TypedRecord::Cluster($inner) => $body,
            TypedRecord::Panel($inner) => $body,
            TypedRecord::Cited($inner) => $body,
            TypedRecord::JoinedBy($inner) => $body,
            TypedRecord::Parenthetical($inner) => $body,
            TypedRecord::Citation($inner) => $body,
        }
    };
}

impl TypedRecord {
    pub fn from_row(kind: EntityKind, row: &Row<'_>) -> Result<Self, RowError> {
        Ok(match kind {
            EntityKind::Opinion => TypedRecord::Opinion(Opinion::from_row(row)?),
            EntityKind::Cluster => TypedRecord::Cluster(OpinionCluster::from_row(row)?),
            EntityKind::Panel => TypedRecord::Panel(ClusterPanel::from_row(row)?),
            EntityKind::Cited => TypedRecord::Cited(OpinionCited::from_row(row)?),
            EntityKind::JoinedBy => TypedRecord::JoinedBy(OpinionJoinedBy::from_row(row)?),
            EntityKind::Parenthetical => TypedRecord::Parenthetical(Parenthetical::from_row(row)?),
            EntityKind::Citation => TypedRecord::Citation(Citation::from_row(row)?),
            EntityKind::ParentheticalGroup => return Err(RowError::UnsupportedKind(kind)),
        })
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            TypedRecord::Opinion(_) => Opinion::KIND,
            TypedRecord::Cluster(_) => OpinionCluster::KIND,
            TypedRecord::Panel(_) => ClusterPanel::KIND,
            TypedRecord::Cited(_) => OpinionCited::KIND,
            TypedRecord::JoinedBy(_) => OpinionJoinedBy::KIND,
            TypedRecord::Parenthetical(_) => Parenthetical::KIND,
            TypedRecord::Citation(_) => Citation::KIND,
        }
    }

    pub fn key(&self) -> i64 {
        each_record!(self, r => r.key())
    }

    pub fn values(&self) -> Vec<SqlValue> {
        each_record!(self, r => r.values())
    }

    /// Value of a named schema column
    pub fn value(&self, column: &str) -> Option<SqlValue> {
        let index = self.kind().schema().column_index(column)?;
        self.values().into_iter().nth(index)
    }

    /// Integer value of a foreign-key column, `None` when NULL or unknown
    pub fn reference(&self, column: &str) -> Option<i64> {
        self.value(column).and_then(|v| v.as_int())
    }

    /// Field text for quarantine output; columns outside the schema are empty
    pub fn render_column(&self, column: &str) -> String {
        self.value(column).map(|v| v.render()).unwrap_or_default()
    }
}

impl fmt::Display for TypedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        each_record!(self, r => fmt::Display::fmt(r, f))
    }
}

const PREVIEW_CHARS: usize = 50;

/// Long text shortened for log lines
pub(crate) fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn opt<T: fmt::Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "null".to_string())
}
