//! Declarative descriptors for every table the loader touches
//!
//! One [`EntitySchema`] per [`EntityKind`] carries everything the generic
//! machinery needs: the insert column order and SQL types, the conflict
//! policy, which columns a row is rejected over, which columns are foreign
//! keys and the minimal row to synthesize when something references a key
//! that does not exist yet.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::parser::RecordSignature;

/// The CourtListener tables handled by the loader
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Opinion,
    Cluster,
    Panel,
    Cited,
    JoinedBy,
    Parenthetical,
    Citation,
    /// Only ever created as a placeholder
    #[value(skip)]
    ParentheticalGroup,
}

impl EntityKind {
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Opinion,
        EntityKind::Cluster,
        EntityKind::Panel,
        EntityKind::Cited,
        EntityKind::JoinedBy,
        EntityKind::Parenthetical,
        EntityKind::Citation,
        EntityKind::ParentheticalGroup,
    ];

    pub fn schema(self) -> &'static EntitySchema {
        match self {
            EntityKind::Opinion => &OPINION,
            EntityKind::Cluster => &CLUSTER,
            EntityKind::Panel => &PANEL,
            EntityKind::Cited => &CITED,
            EntityKind::JoinedBy => &JOINED_BY,
            EntityKind::Parenthetical => &PARENTHETICAL,
            EntityKind::Citation => &CITATION,
            EntityKind::ParentheticalGroup => &PARENTHETICAL_GROUP,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Opinion => "opinion",
            EntityKind::Cluster => "cluster",
            EntityKind::Panel => "panel",
            EntityKind::Cited => "cited",
            EntityKind::JoinedBy => "joined-by",
            EntityKind::Parenthetical => "parenthetical",
            EntityKind::Citation => "citation",
            EntityKind::ParentheticalGroup => "parenthetical-group",
        }
    }

    /// Whether export files of this kind can be loaded
    pub fn is_ingestable(self) -> bool {
        self.schema().signature.is_some()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A bound parameter for one column
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(Option<i64>),
    Float(Option<f64>),
    Bool(bool),
    Text(Option<String>),
}

impl SqlValue {
    pub fn text(value: impl Into<String>) -> Self {
        SqlValue::Text(Some(value.into()))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => *v,
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(
            self,
            SqlValue::Int(None) | SqlValue::Float(None) | SqlValue::Text(None)
        )
    }

    /// CSV rendering; NULL becomes an empty field
    pub fn render(&self) -> String {
        match self {
            SqlValue::Int(v) => v.map(|v| v.to_string()).unwrap_or_default(),
            SqlValue::Float(v) => v.map(|v| v.to_string()).unwrap_or_default(),
            SqlValue::Bool(v) => if *v { "true" } else { "false" }.to_string(),
            SqlValue::Text(v) => v.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Double,
    Boolean,
    Text,
    Timestamp,
    Date,
}

impl SqlType {
    /// Cast applied to the bound parameter
    pub fn cast(self) -> &'static str {
        match self {
            SqlType::Integer => "integer",
            SqlType::Double => "double precision",
            SqlType::Boolean => "boolean",
            SqlType::Text => "text",
            SqlType::Timestamp => "timestamptz",
            SqlType::Date => "date",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: SqlType,
}

const fn col(name: &'static str, sql_type: SqlType) -> Column {
    Column { name, sql_type }
}

/// What happens when an insert hits an existing row
#[derive(Debug, Clone, Copy)]
pub enum ConflictPolicy {
    /// Upsert: overwrite `update` columns of the row matching `target`
    Update {
        target: &'static [&'static str],
        update: &'static [&'static str],
    },
    /// Keep the existing row
    Ignore { target: &'static [&'static str] },
    /// Duplicates are an error
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MandatoryType {
    Integer,
    Text,
    /// `YYYY-MM-DD`, optionally followed by a time part
    Date,
}

impl MandatoryType {
    pub fn describe(self) -> &'static str {
        match self {
            MandatoryType::Integer => "integer",
            MandatoryType::Text => "text value",
            MandatoryType::Date => "date",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Mandatory {
    pub column: &'static str,
    pub ty: MandatoryType,
}

const fn must(column: &'static str, ty: MandatoryType) -> Mandatory {
    Mandatory { column, ty }
}

/// Target of a foreign key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference {
    /// A table this loader can synthesize placeholders for
    Entity(EntityKind),
    /// A table outside the loader's reach; violations cannot be repaired
    External(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct ForeignKey {
    pub column: &'static str,
    pub references: Reference,
}

const fn fk(column: &'static str, kind: EntityKind) -> ForeignKey {
    ForeignKey {
        column,
        references: Reference::Entity(kind),
    }
}

const fn external(column: &'static str, table: &'static str) -> ForeignKey {
    ForeignKey {
        column,
        references: Reference::External(table),
    }
}

/// Value of one NOT NULL column in a placeholder row
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaceholderValue {
    /// The missing key itself
    Key,
    /// Prefix followed by the key, for columns with a unique constraint
    KeyText(&'static str),
    Now,
    Text(&'static str),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(&'static str),
    /// Reference to another row that must exist first
    Ref(EntityKind, i64),
}

/// Minimal row satisfying every NOT NULL constraint of a table
#[derive(Debug, Clone, Copy)]
pub struct PlaceholderShape {
    pub values: &'static [(&'static str, PlaceholderValue)],
    /// Rows created together with integrity checks off before the first
    /// placeholder of this kind. Breaks reference cycles between shapes.
    pub bootstrap: Option<&'static [(EntityKind, i64)]>,
}

impl PlaceholderShape {
    pub fn dependencies(&self) -> impl Iterator<Item = (EntityKind, i64)> + '_ {
        self.values.iter().filter_map(|(_, value)| match value {
            PlaceholderValue::Ref(kind, key) => Some((*kind, *key)),
            _ => None,
        })
    }
}

/// Everything the loader knows about one table
#[derive(Debug)]
pub struct EntitySchema {
    pub kind: EntityKind,
    pub table: &'static str,
    pub key_column: &'static str,
    /// Insert order; typed records produce values in this order
    pub columns: &'static [Column],
    pub conflict: ConflictPolicy,
    pub mandatory: &'static [Mandatory],
    pub foreign_keys: &'static [ForeignKey],
    pub placeholder: Option<PlaceholderShape>,
    /// `None` for tables that are never loaded from an export
    pub signature: Option<RecordSignature>,
}

impl EntitySchema {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn foreign_key(&self, column: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }
}

use EntityKind as K;
use MandatoryType as M;
use PlaceholderValue as P;
use SqlType as T;

const PEOPLE: &str = "people_db_person";
const DOCKETS: &str = "search_docket";

/// Placeholder clusters, opinions, groups and parentheticals hang off these rows
const BOOTSTRAP_ROWS: &[(EntityKind, i64)] = &[
    (K::Cluster, 1),
    (K::Opinion, 1),
    (K::ParentheticalGroup, 1),
    (K::Parenthetical, 1),
];

static OPINION: EntitySchema = EntitySchema {
    kind: K::Opinion,
    table: "search_opinion",
    key_column: "id",
    columns: &[
        col("id", T::Integer),
        col("date_created", T::Timestamp),
        col("date_modified", T::Timestamp),
        col("type", T::Text),
        col("sha1", T::Text),
        col("download_url", T::Text),
        col("local_path", T::Text),
        col("plain_text", T::Text),
        col("html", T::Text),
        col("html_lawbox", T::Text),
        col("html_columbia", T::Text),
        col("html_with_citations", T::Text),
        col("extracted_by_ocr", T::Boolean),
        col("author_id", T::Integer),
        col("cluster_id", T::Integer),
        col("per_curiam", T::Boolean),
        col("page_count", T::Integer),
        col("author_str", T::Text),
        col("joined_by_str", T::Text),
        col("xml_harvard", T::Text),
        col("html_anon_2020", T::Text),
        col("ordering_key", T::Integer),
        col("main_version_id", T::Integer),
    ],
    conflict: ConflictPolicy::Reject,
    mandatory: &[must("id", M::Integer), must("date_created", M::Date)],
    foreign_keys: &[fk("cluster_id", K::Cluster), external("author_id", PEOPLE)],
    placeholder: Some(PlaceholderShape {
        values: &[
            ("id", P::Key),
            ("date_created", P::Now),
            ("date_modified", P::Now),
            ("type", P::Text("010")),
            ("sha1", P::KeyText("PLACEHOLDER_")),
            ("local_path", P::Text("")),
            ("plain_text", P::Text("")),
            ("html", P::Text("")),
            ("html_lawbox", P::Text("")),
            ("html_columbia", P::Text("")),
            ("html_with_citations", P::Text("")),
            ("extracted_by_ocr", P::Bool(false)),
            ("cluster_id", P::Ref(K::Cluster, 1)),
            ("per_curiam", P::Bool(false)),
            ("author_str", P::Text("")),
            ("joined_by_str", P::Text("")),
            ("xml_harvard", P::Text("")),
            ("html_anon_2020", P::Text("")),
        ],
        bootstrap: None,
    }),
    signature: Some(RecordSignature::KeyThenDate { skip: 0 }),
};

static CLUSTER: EntitySchema = EntitySchema {
    kind: K::Cluster,
    table: "search_opinioncluster",
    key_column: "id",
    columns: &[
        col("id", T::Integer),
        col("judges", T::Text),
        col("date_created", T::Timestamp),
        col("date_modified", T::Timestamp),
        col("date_filed", T::Date),
        col("slug", T::Text),
        col("case_name_short", T::Text),
        col("case_name", T::Text),
        col("case_name_full", T::Text),
        col("scdb_id", T::Text),
        col("source", T::Text),
        col("procedural_history", T::Text),
        col("attorneys", T::Text),
        col("nature_of_suit", T::Text),
        col("posture", T::Text),
        col("syllabus", T::Text),
        col("citation_count", T::Integer),
        col("precedential_status", T::Text),
        col("date_blocked", T::Date),
        col("blocked", T::Boolean),
        col("docket_id", T::Integer),
        col("scdb_decision_direction", T::Integer),
        col("scdb_votes_majority", T::Integer),
        col("scdb_votes_minority", T::Integer),
        col("date_filed_is_approximate", T::Boolean),
        col("correction", T::Text),
        col("cross_reference", T::Text),
        col("disposition", T::Text),
        col("filepath_json_harvard", T::Text),
        col("headnotes", T::Text),
        col("history", T::Text),
        col("other_dates", T::Text),
        col("summary", T::Text),
        col("arguments", T::Text),
        col("headmatter", T::Text),
        col("filepath_pdf_harvard", T::Text),
    ],
    conflict: ConflictPolicy::Ignore { target: &["id"] },
    mandatory: &[must("id", M::Integer), must("date_filed", M::Date)],
    foreign_keys: &[external("docket_id", DOCKETS)],
    placeholder: Some(PlaceholderShape {
        values: &[
            ("id", P::Key),
            ("judges", P::Text("PLACEHOLDER")),
            ("date_created", P::Now),
            ("date_modified", P::Now),
            ("date_filed", P::Date("1900-01-01")),
            ("case_name_short", P::Text("PLACEHOLDER")),
            ("case_name", P::Text("PLACEHOLDER")),
            ("case_name_full", P::Text("PLACEHOLDER")),
            ("scdb_id", P::Text("")),
            ("source", P::Text("R")),
            ("procedural_history", P::Text("")),
            ("attorneys", P::Text("")),
            ("nature_of_suit", P::Text("")),
            ("posture", P::Text("")),
            ("syllabus", P::Text("")),
            ("citation_count", P::Int(0)),
            ("precedential_status", P::Text("Unknown")),
            ("blocked", P::Bool(false)),
            ("docket_id", P::Int(1)),
            ("date_filed_is_approximate", P::Bool(false)),
            ("correction", P::Text("")),
            ("cross_reference", P::Text("")),
            ("disposition", P::Text("")),
            ("filepath_json_harvard", P::Text("")),
            ("headnotes", P::Text("")),
            ("history", P::Text("")),
            ("other_dates", P::Text("")),
            ("summary", P::Text("")),
            ("arguments", P::Text("")),
            ("headmatter", P::Text("")),
            ("filepath_pdf_harvard", P::Text("")),
        ],
        bootstrap: None,
    }),
    // id, date_created, date_modified, judges, then date_filed
    signature: Some(RecordSignature::KeyThenDate { skip: 3 }),
};

static PANEL: EntitySchema = EntitySchema {
    kind: K::Panel,
    table: "search_opinioncluster_panel",
    key_column: "id",
    columns: &[
        col("id", T::Integer),
        col("opinioncluster_id", T::Integer),
        col("person_id", T::Integer),
    ],
    conflict: ConflictPolicy::Update {
        target: &["opinioncluster_id", "person_id"],
        update: &["id"],
    },
    mandatory: &[
        must("id", M::Integer),
        must("opinioncluster_id", M::Integer),
        must("person_id", M::Integer),
    ],
    foreign_keys: &[fk("opinioncluster_id", K::Cluster), external("person_id", PEOPLE)],
    placeholder: None,
    signature: Some(RecordSignature::Key),
};

static CITED: EntitySchema = EntitySchema {
    kind: K::Cited,
    table: "search_opinionscited",
    key_column: "id",
    columns: &[
        col("id", T::Integer),
        col("depth", T::Integer),
        col("cited_opinion_id", T::Integer),
        col("citing_opinion_id", T::Integer),
    ],
    conflict: ConflictPolicy::Update {
        target: &["id"],
        update: &["depth"],
    },
    mandatory: &[
        must("id", M::Integer),
        must("cited_opinion_id", M::Integer),
        must("citing_opinion_id", M::Integer),
    ],
    foreign_keys: &[
        fk("cited_opinion_id", K::Opinion),
        fk("citing_opinion_id", K::Opinion),
    ],
    placeholder: None,
    signature: Some(RecordSignature::Key),
};

static JOINED_BY: EntitySchema = EntitySchema {
    kind: K::JoinedBy,
    table: "search_opinion_joined_by",
    key_column: "id",
    columns: &[
        col("id", T::Integer),
        col("opinion_id", T::Integer),
        col("person_id", T::Integer),
    ],
    conflict: ConflictPolicy::Update {
        target: &["opinion_id", "person_id"],
        update: &["id"],
    },
    mandatory: &[
        must("id", M::Integer),
        must("opinion_id", M::Integer),
        must("person_id", M::Integer),
    ],
    foreign_keys: &[fk("opinion_id", K::Opinion), external("person_id", PEOPLE)],
    placeholder: None,
    signature: Some(RecordSignature::Key),
};

static PARENTHETICAL: EntitySchema = EntitySchema {
    kind: K::Parenthetical,
    table: "search_parenthetical",
    key_column: "id",
    columns: &[
        col("id", T::Integer),
        col("text", T::Text),
        col("score", T::Double),
        col("described_opinion_id", T::Integer),
        col("describing_opinion_id", T::Integer),
        col("group_id", T::Integer),
    ],
    conflict: ConflictPolicy::Update {
        target: &["id"],
        update: &[
            "text",
            "score",
            "described_opinion_id",
            "describing_opinion_id",
            "group_id",
        ],
    },
    mandatory: &[
        must("id", M::Integer),
        must("described_opinion_id", M::Integer),
        must("describing_opinion_id", M::Integer),
        must("group_id", M::Integer),
    ],
    foreign_keys: &[
        fk("described_opinion_id", K::Opinion),
        fk("describing_opinion_id", K::Opinion),
        fk("group_id", K::ParentheticalGroup),
    ],
    placeholder: Some(PlaceholderShape {
        values: &[
            ("id", P::Key),
            ("text", P::Text("PLACEHOLDER")),
            ("score", P::Float(0.0)),
            ("described_opinion_id", P::Ref(K::Opinion, 1)),
            ("describing_opinion_id", P::Ref(K::Opinion, 1)),
            ("group_id", P::Ref(K::ParentheticalGroup, 1)),
        ],
        bootstrap: Some(BOOTSTRAP_ROWS),
    }),
    signature: Some(RecordSignature::Key),
};

static CITATION: EntitySchema = EntitySchema {
    kind: K::Citation,
    table: "search_citation",
    key_column: "id",
    columns: &[
        col("id", T::Integer),
        col("volume", T::Integer),
        col("reporter", T::Text),
        col("page", T::Text),
        col("type", T::Integer),
        col("cluster_id", T::Integer),
    ],
    conflict: ConflictPolicy::Update {
        target: &["cluster_id", "volume", "reporter", "page"],
        update: &["id", "type"],
    },
    mandatory: &[
        must("id", M::Integer),
        must("volume", M::Integer),
        must("reporter", M::Text),
        must("page", M::Text),
        must("cluster_id", M::Integer),
    ],
    foreign_keys: &[fk("cluster_id", K::Cluster)],
    placeholder: None,
    signature: Some(RecordSignature::Key),
};

static PARENTHETICAL_GROUP: EntitySchema = EntitySchema {
    kind: K::ParentheticalGroup,
    table: "search_parentheticalgroup",
    key_column: "id",
    columns: &[
        col("id", T::Integer),
        col("score", T::Double),
        col("size", T::Integer),
        col("opinion_id", T::Integer),
        col("representative_id", T::Integer),
    ],
    conflict: ConflictPolicy::Ignore { target: &["id"] },
    mandatory: &[must("id", M::Integer)],
    foreign_keys: &[
        fk("opinion_id", K::Opinion),
        fk("representative_id", K::Parenthetical),
    ],
    placeholder: Some(PlaceholderShape {
        values: &[
            ("id", P::Key),
            ("score", P::Float(0.0)),
            ("size", P::Int(0)),
            ("opinion_id", P::Ref(K::Opinion, 1)),
            ("representative_id", P::Ref(K::Parenthetical, 1)),
        ],
        bootstrap: Some(BOOTSTRAP_ROWS),
    }),
    signature: None,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_kinds_match() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.schema().kind, kind, "{}", kind);
        }
    }

    #[test]
    fn test_schema_columns_are_consistent() {
        for kind in EntityKind::ALL {
            let schema = kind.schema();
            assert!(schema.column_index(schema.key_column).is_some(), "{}", kind);
            for m in schema.mandatory {
                assert!(schema.column_index(m.column).is_some(), "{}.{}", kind, m.column);
            }
            for fk in schema.foreign_keys {
                assert!(schema.column_index(fk.column).is_some(), "{}.{}", kind, fk.column);
            }
            if let ConflictPolicy::Update { target, update } = schema.conflict {
                for name in target.iter().chain(update) {
                    assert!(schema.column_index(name).is_some(), "{}.{}", kind, name);
                }
            }
            if let Some(shape) = &schema.placeholder {
                for (name, _) in shape.values {
                    assert!(schema.column_index(name).is_some(), "{}.{}", kind, name);
                }
            }
        }
    }

    #[test]
    fn test_placeholder_references_have_shapes() {
        for kind in EntityKind::ALL {
            for fk in kind.schema().foreign_keys {
                if let Reference::Entity(target) = fk.references {
                    assert!(
                        target.schema().placeholder.is_some(),
                        "{}.{} references {} which has no placeholder",
                        kind,
                        fk.column,
                        target
                    );
                }
            }
        }
    }

    #[test]
    fn test_only_the_group_is_not_ingestable() {
        let not_ingestable: Vec<_> = EntityKind::ALL
            .into_iter()
            .filter(|k| !k.is_ingestable())
            .collect();
        assert_eq!(not_ingestable, vec![EntityKind::ParentheticalGroup]);
    }

    #[test]
    fn test_sql_value_render() {
        assert_eq!(SqlValue::Int(Some(5)).render(), "5");
        assert_eq!(SqlValue::Int(None).render(), "");
        assert_eq!(SqlValue::Bool(true).render(), "true");
        assert_eq!(SqlValue::text("a").render(), "a");
        assert!(SqlValue::Text(None).is_null());
        assert!(!SqlValue::Bool(false).is_null());
    }
}
