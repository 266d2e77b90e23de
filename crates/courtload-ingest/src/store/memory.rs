//! In-process store for tests and dry runs
//!
//! Enforces the same rules the database does for the loader's purposes:
//! primary keys, the conflict policy of each kind, and foreign keys between
//! the tables in the catalogue. References to tables outside the catalogue
//! are not checked. Every call is counted, and failures can be injected.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;

use super::{RecordStore, StoreError, Violation, ViolationKind};
use crate::entities::TypedRecord;
use crate::schema::{
    ConflictPolicy, EntityKind, EntitySchema, PlaceholderValue, Reference, SqlType, SqlValue,
};

pub type Table = BTreeMap<i64, Vec<SqlValue>>;

/// Number of calls made to each store operation
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub inserts: usize,
    pub exists: usize,
    pub placeholders: usize,
    pub bootstraps: usize,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: HashMap<EntityKind, Table>,
    calls: CallCounts,
    placeholder_log: Vec<(EntityKind, i64)>,
    operations: usize,
    sever_after: Option<usize>,
    failures: HashMap<(EntityKind, i64), Violation>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add placeholder-shaped rows directly, bypassing every check and counter
    pub fn with_rows(mut self, kind: EntityKind, keys: impl IntoIterator<Item = i64>) -> Self {
        for key in keys {
            let row = placeholder_row(kind.schema(), key);
            self.tables.entry(kind).or_default().insert(key, row);
        }
        self
    }

    /// Fail every operation after the first `operations` with a connection error
    pub fn sever_after(mut self, operations: usize) -> Self {
        self.sever_after = Some(operations);
        self
    }

    /// Make every insert of `kind`/`key` fail with `violation`
    pub fn fail_key(mut self, kind: EntityKind, key: i64, violation: Violation) -> Self {
        self.failures.insert((kind, key), violation);
        self
    }

    pub fn contains(&self, kind: EntityKind, key: i64) -> bool {
        self.tables
            .get(&kind)
            .is_some_and(|table| table.contains_key(&key))
    }

    pub fn row(&self, kind: EntityKind, key: i64) -> Option<&[SqlValue]> {
        self.tables.get(&kind)?.get(&key).map(Vec::as_slice)
    }

    pub fn row_count(&self, kind: EntityKind) -> usize {
        self.tables.get(&kind).map_or(0, BTreeMap::len)
    }

    pub fn calls(&self) -> CallCounts {
        self.calls
    }

    /// Every `create_placeholder` call, in order
    pub fn placeholder_log(&self) -> &[(EntityKind, i64)] {
        &self.placeholder_log
    }

    pub fn placeholder_calls_for(&self, kind: EntityKind, key: i64) -> usize {
        self.placeholder_log
            .iter()
            .filter(|entry| **entry == (kind, key))
            .count()
    }

    /// Copy of all table contents, for before/after comparisons
    pub fn snapshot(&self) -> BTreeMap<EntityKind, Table> {
        self.tables
            .iter()
            .filter(|(_, table)| !table.is_empty())
            .map(|(kind, table)| (*kind, table.clone()))
            .collect()
    }

    fn tick(&mut self) -> Result<(), StoreError> {
        self.operations += 1;
        match self.sever_after {
            Some(limit) if self.operations > limit => Err(StoreError::Connection(
                "server closed the connection unexpectedly".to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn check_references(
        &self,
        schema: &EntitySchema,
        values: &[SqlValue],
    ) -> Result<(), StoreError> {
        for fk in schema.foreign_keys {
            let Reference::Entity(target) = fk.references else {
                continue;
            };
            let Some(index) = schema.column_index(fk.column) else {
                continue;
            };
            let Some(value) = values.get(index).and_then(SqlValue::as_int) else {
                continue;
            };
            if !self.contains(target, value) {
                let constraint = format!("{}_{}_fk", schema.table, fk.column);
                return Err(StoreError::Violation(
                    Violation::new(
                        ViolationKind::ForeignKey,
                        format!(
                            "insert or update on table \"{}\" violates foreign key constraint \"{}\"",
                            schema.table, constraint
                        ),
                    )
                    .with_column(fk.column)
                    .with_constraint(constraint),
                ));
            }
        }
        Ok(())
    }

    fn upsert(
        &mut self,
        schema: &EntitySchema,
        key: i64,
        values: Vec<SqlValue>,
    ) -> Result<(), StoreError> {
        let table = self.tables.entry(schema.kind).or_default();

        match schema.conflict {
            ConflictPolicy::Update { target, update } => {
                if let Some(existing) = find_by_target(schema, table, target, &values) {
                    let mut row = table.get(&existing).cloned().unwrap_or_default();
                    for column in update {
                        if let Some(index) = schema.column_index(column) {
                            if let (Some(slot), Some(value)) =
                                (row.get_mut(index), values.get(index))
                            {
                                *slot = value.clone();
                            }
                        }
                    }
                    let new_key = schema
                        .column_index(schema.key_column)
                        .and_then(|index| row.get(index))
                        .and_then(SqlValue::as_int)
                        .unwrap_or(existing);
                    if new_key != existing && table.contains_key(&new_key) {
                        return Err(duplicate_key(schema, new_key));
                    }
                    table.remove(&existing);
                    table.insert(new_key, row);
                    return Ok(());
                }
            },
            ConflictPolicy::Ignore { target } => {
                if find_by_target(schema, table, target, &values).is_some() {
                    return Ok(());
                }
            },
            ConflictPolicy::Reject => {},
        }

        if table.contains_key(&key) {
            return Err(duplicate_key(schema, key));
        }
        table.insert(key, values);
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_or_update(&mut self, record: &TypedRecord) -> Result<(), StoreError> {
        self.tick()?;
        self.calls.inserts += 1;

        let kind = record.kind();
        if let Some(violation) = self.failures.get(&(kind, record.key())) {
            return Err(StoreError::Violation(violation.clone()));
        }

        let schema = kind.schema();
        let values = record.values();
        self.check_references(schema, &values)?;
        self.upsert(schema, record.key(), values)
    }

    async fn exists(&mut self, kind: EntityKind, key: i64) -> Result<bool, StoreError> {
        self.tick()?;
        self.calls.exists += 1;
        Ok(self.contains(kind, key))
    }

    async fn create_placeholder(&mut self, kind: EntityKind, key: i64) -> Result<(), StoreError> {
        self.tick()?;
        self.calls.placeholders += 1;
        self.placeholder_log.push((kind, key));

        let schema = kind.schema();
        if schema.placeholder.is_none() {
            return Err(StoreError::Other(format!("{} has no placeholder shape", kind)));
        }
        if self.contains(kind, key) {
            return Ok(());
        }

        let row = placeholder_row(schema, key);
        self.check_references(schema, &row)?;
        self.tables.entry(kind).or_default().insert(key, row);
        Ok(())
    }

    async fn ensure_bootstrap(&mut self, rows: &[(EntityKind, i64)]) -> Result<(), StoreError> {
        self.tick()?;
        self.calls.bootstraps += 1;
        for &(kind, key) in rows {
            let table = self.tables.entry(kind).or_default();
            if !table.contains_key(&key) {
                table.insert(key, placeholder_row(kind.schema(), key));
            }
        }
        Ok(())
    }

    async fn known_keys(&mut self, kind: EntityKind) -> Result<Vec<i64>, StoreError> {
        self.tick()?;
        Ok(self
            .tables
            .get(&kind)
            .map(|table| table.keys().copied().collect())
            .unwrap_or_default())
    }
}

fn duplicate_key(schema: &EntitySchema, key: i64) -> StoreError {
    let constraint = format!("{}_pkey", schema.table);
    StoreError::Violation(
        Violation::new(
            ViolationKind::Unique,
            format!(
                "duplicate key value violates unique constraint \"{}\" (Key ({})=({}) already exists.)",
                constraint, schema.key_column, key
            ),
        )
        .with_column(schema.key_column)
        .with_constraint(constraint),
    )
}

fn find_by_target(
    schema: &EntitySchema,
    table: &Table,
    target: &[&str],
    values: &[SqlValue],
) -> Option<i64> {
    let indexes: Vec<usize> = target
        .iter()
        .filter_map(|column| schema.column_index(column))
        .collect();
    table.iter().find_map(|(key, row)| {
        indexes
            .iter()
            .all(|&i| row.get(i) == values.get(i))
            .then_some(*key)
    })
}

/// Row for `key` built from the kind's placeholder shape; columns the shape
/// leaves out are NULL (or false)
fn placeholder_row(schema: &EntitySchema, key: i64) -> Vec<SqlValue> {
    let mut row: Vec<SqlValue> = schema
        .columns
        .iter()
        .map(|column| match column.sql_type {
            SqlType::Integer => SqlValue::Int(None),
            SqlType::Double => SqlValue::Float(None),
            SqlType::Boolean => SqlValue::Bool(false),
            SqlType::Text | SqlType::Timestamp | SqlType::Date => SqlValue::Text(None),
        })
        .collect();

    if let Some(index) = schema.column_index(schema.key_column) {
        row[index] = SqlValue::Int(Some(key));
    }

    let Some(shape) = &schema.placeholder else {
        return row;
    };
    for (column, value) in shape.values {
        let Some(index) = schema.column_index(column) else {
            continue;
        };
        row[index] = match *value {
            PlaceholderValue::Key => SqlValue::Int(Some(key)),
            PlaceholderValue::KeyText(prefix) => SqlValue::text(format!("{}{}", prefix, key)),
            PlaceholderValue::Now => SqlValue::text("now"),
            PlaceholderValue::Text(text) | PlaceholderValue::Date(text) => SqlValue::text(text),
            PlaceholderValue::Int(v) => SqlValue::Int(Some(v)),
            PlaceholderValue::Float(v) => SqlValue::Float(Some(v)),
            PlaceholderValue::Bool(v) => SqlValue::Bool(v),
            PlaceholderValue::Ref(_, target) => SqlValue::Int(Some(target)),
        };
    }
    row
}
