//! Placeholder synthesis for unresolved references
//!
//! When a record is rejected for pointing at a row that does not exist yet,
//! the resolver creates a minimal stand-in row for the missing key (and,
//! first, for anything that stand-in itself references) so the record can be
//! retried.
//!
//! What happens when the real row arrives later depends on the conflict
//! policy of its kind. Opinions reject the conflict, so the real row is
//! reported as a duplicate key and the placeholder stays. Clusters ignore a
//! conflicting id, which also keeps the placeholder. Parentheticals update on
//! conflict and overwrite it. Parenthetical groups are never loaded from a
//! file and exist only as placeholders.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use thiserror::Error;
use tracing::{debug, info};

use crate::entities::TypedRecord;
use crate::schema::{EntityKind, Reference};
use crate::store::{RecordStore, StoreError};

/// Keys known to exist in the store, per kind.
///
/// Lives for the whole run so each key is checked or created at most once.
/// An entry can be stale only if rows are deleted behind the loader's back;
/// the resolver evicts a key whenever the store reports it missing.
#[derive(Debug, Default, Clone)]
pub struct PlaceholderCache {
    known: HashMap<EntityKind, HashSet<i64>>,
}

impl PlaceholderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache pre-populated with existing keys
    pub fn seeded(entries: impl IntoIterator<Item = (EntityKind, i64)>) -> Self {
        let mut cache = Self::new();
        for (kind, key) in entries {
            cache.insert(kind, key);
        }
        cache
    }

    pub fn contains(&self, kind: EntityKind, key: i64) -> bool {
        self.known.get(&kind).is_some_and(|keys| keys.contains(&key))
    }

    /// Returns `true` if the key was not known before
    pub fn insert(&mut self, kind: EntityKind, key: i64) -> bool {
        self.known.entry(kind).or_default().insert(key)
    }

    pub fn evict(&mut self, kind: EntityKind, key: i64) -> bool {
        self.known
            .get_mut(&kind)
            .is_some_and(|keys| keys.remove(&key))
    }

    pub fn extend(&mut self, kind: EntityKind, keys: impl IntoIterator<Item = i64>) {
        self.known.entry(kind).or_default().extend(keys);
    }

    pub fn len(&self) -> usize {
        self.known.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The missing row lives in a table the loader cannot write to
    #[error("'{column}' references {table}, which cannot be synthesized")]
    Unresolvable { column: String, table: &'static str },

    #[error("{0} has no placeholder shape")]
    NoShape(EntityKind),

    #[error("placeholder for {kind} {key} depends on itself")]
    Cycle { kind: EntityKind, key: i64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ResolveError {
    pub fn is_connection(&self) -> bool {
        matches!(self, ResolveError::Store(e) if e.is_connection())
    }
}

/// Creates placeholders and remembers what it created
#[derive(Debug, Default)]
pub struct PlaceholderResolver {
    bootstrapped: bool,
    created: BTreeMap<EntityKind, BTreeSet<i64>>,
}

impl PlaceholderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys placeholders were created for during this run
    pub fn created(&self) -> &BTreeMap<EntityKind, BTreeSet<i64>> {
        &self.created
    }

    pub fn created_count(&self) -> usize {
        self.created.values().map(BTreeSet::len).sum()
    }

    /// Make every reference of `record` resolvable.
    ///
    /// `diagnosed` is the column the store named in its violation. That
    /// reference is created even if the cache claims it exists. The record's
    /// other references are checked against the cache, then the store, and
    /// created only when missing. Returns the number of placeholders created.
    pub async fn resolve<S: RecordStore + ?Sized>(
        &mut self,
        store: &mut S,
        cache: &mut PlaceholderCache,
        record: &TypedRecord,
        diagnosed: Option<&str>,
    ) -> Result<usize, ResolveError> {
        let schema = record.kind().schema();
        let diagnosed = diagnosed.and_then(|column| schema.foreign_key(column));
        let mut created = 0;

        if let Some(fk) = diagnosed {
            match fk.references {
                Reference::External(table) => {
                    return Err(ResolveError::Unresolvable {
                        column: fk.column.to_string(),
                        table,
                    });
                },
                Reference::Entity(target) => {
                    if let Some(key) = record.reference(fk.column) {
                        cache.evict(target, key);
                        created += self.ensure(store, cache, target, key, true).await?;
                    }
                },
            }
        }

        for fk in schema.foreign_keys {
            if diagnosed.is_some_and(|d| d.column == fk.column) {
                continue;
            }
            let Reference::Entity(target) = fk.references else {
                continue;
            };
            let Some(key) = record.reference(fk.column) else {
                continue;
            };
            created += self.ensure(store, cache, target, key, false).await?;
        }

        Ok(created)
    }

    async fn ensure<S: RecordStore + ?Sized>(
        &mut self,
        store: &mut S,
        cache: &mut PlaceholderCache,
        kind: EntityKind,
        key: i64,
        force: bool,
    ) -> Result<usize, ResolveError> {
        if !force {
            if cache.contains(kind, key) {
                return Ok(0);
            }
            if store.exists(kind, key).await? {
                cache.insert(kind, key);
                return Ok(0);
            }
        }

        self.bootstrap(store, cache, kind).await?;
        let plan = plan(cache, kind, key)?;

        let mut created = 0;
        for (i, &(dep_kind, dep_key)) in plan.iter().enumerate() {
            let is_target = i + 1 == plan.len();
            if !is_target && store.exists(dep_kind, dep_key).await? {
                cache.insert(dep_kind, dep_key);
                continue;
            }
            store.create_placeholder(dep_kind, dep_key).await?;
            cache.insert(dep_kind, dep_key);
            self.created.entry(dep_kind).or_default().insert(dep_key);
            debug!(kind = %dep_kind, key = dep_key, "Created placeholder");
            created += 1;
        }
        Ok(created)
    }

    /// Run the bootstrap of any shape reachable from `kind`, once per run
    async fn bootstrap<S: RecordStore + ?Sized>(
        &mut self,
        store: &mut S,
        cache: &mut PlaceholderCache,
        kind: EntityKind,
    ) -> Result<(), ResolveError> {
        if self.bootstrapped {
            return Ok(());
        }
        let Some(rows) = reachable(kind)
            .into_iter()
            .find_map(|k| k.schema().placeholder.as_ref().and_then(|s| s.bootstrap))
        else {
            return Ok(());
        };

        store.ensure_bootstrap(rows).await?;
        for &(kind, key) in rows {
            cache.insert(kind, key);
        }
        self.bootstrapped = true;
        info!(rows = rows.len(), "Placeholder bootstrap rows ensured");
        Ok(())
    }
}

/// Kinds whose placeholders a placeholder of `kind` may need, `kind` included
fn reachable(kind: EntityKind) -> Vec<EntityKind> {
    let mut seen = vec![kind];
    let mut queue = VecDeque::from([kind]);
    while let Some(current) = queue.pop_front() {
        let Some(shape) = &current.schema().placeholder else {
            continue;
        };
        for (dep, _) in shape.dependencies() {
            if !seen.contains(&dep) {
                seen.push(dep);
                queue.push_back(dep);
            }
        }
    }
    seen
}

/// Rows to create, dependencies first and the requested row last.
/// Rows already in the cache are left out.
fn plan(
    cache: &PlaceholderCache,
    kind: EntityKind,
    key: i64,
) -> Result<Vec<(EntityKind, i64)>, ResolveError> {
    let mut order = Vec::new();
    let mut visiting = HashSet::new();
    let mut done = HashSet::new();
    let mut stack = vec![(kind, key, false)];

    while let Some((kind, key, expanded)) = stack.pop() {
        let node = (kind, key);
        if expanded {
            visiting.remove(&node);
            done.insert(node);
            order.push(node);
            continue;
        }
        if done.contains(&node) {
            continue;
        }
        if !visiting.insert(node) {
            return Err(ResolveError::Cycle { kind, key });
        }

        let shape = kind
            .schema()
            .placeholder
            .as_ref()
            .ok_or(ResolveError::NoShape(kind))?;
        stack.push((kind, key, true));
        for dep in shape.dependencies() {
            if cache.contains(dep.0, dep.1) || done.contains(&dep) {
                continue;
            }
            if visiting.contains(&dep) {
                return Err(ResolveError::Cycle {
                    kind: dep.0,
                    key: dep.1,
                });
            }
            stack.push((dep.0, dep.1, false));
        }
    }

    Ok(order)
}
