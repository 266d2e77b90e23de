//! PostgreSQL store
//!
//! One connection for the whole run. Each operation runs in its own
//! transaction with constraints forced to IMMEDIATE, so a violation surfaces
//! on the failing statement with its diagnostic and rolls back only that
//! record. Statements are generated from the schema catalogue once at connect
//! time.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use sqlx::postgres::{PgArguments, PgConnection, PgDatabaseError};
use sqlx::query::Query;
use sqlx::{Connection, Postgres};
use tracing::{debug, info, warn};

use super::{RecordStore, StoreError, Violation, ViolationKind};
use crate::entities::TypedRecord;
use crate::schema::{ConflictPolicy, EntityKind, EntitySchema, PlaceholderValue, SqlValue};

/// Advisory lock serialising bootstrap across concurrent runs
pub const BOOTSTRAP_LOCK_ID: i64 = 0x636f_7572_746c_6f61;

pub struct PgStore {
    conn: PgConnection,
    inserts: HashMap<EntityKind, String>,
    placeholders: HashMap<EntityKind, String>,
    classifier: ErrorClassifier,
}

impl PgStore {
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, StoreError> {
        debug!(timeout_secs = timeout.as_secs(), "Connecting to database");
        let conn = tokio::time::timeout(timeout, PgConnection::connect(url))
            .await
            .map_err(|_| {
                StoreError::Connection(format!(
                    "timed out after {}s connecting to the database",
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let mut inserts = HashMap::new();
        let mut placeholders = HashMap::new();
        for kind in EntityKind::ALL {
            let schema = kind.schema();
            inserts.insert(kind, insert_sql(schema));
            if let Some(sql) = placeholder_sql(schema) {
                placeholders.insert(kind, sql);
            }
        }

        info!("Connected to database");
        Ok(Self {
            conn,
            inserts,
            placeholders,
            classifier: ErrorClassifier::new()?,
        })
    }

    /// Close the connection, logging rather than failing on error
    pub async fn close(self) {
        if let Err(e) = self.conn.close().await {
            warn!(error = %e, "Failed to close database connection cleanly");
        }
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn insert_or_update(&mut self, record: &TypedRecord) -> Result<(), StoreError> {
        let kind = record.kind();
        let sql = self
            .inserts
            .get(&kind)
            .ok_or_else(|| StoreError::Other(format!("no insert statement for {}", kind)))?;
        let classifier = &self.classifier;

        let mut tx = self.conn.begin().await.map_err(|e| classifier.classify(e))?;
        sqlx::query("SET CONSTRAINTS ALL IMMEDIATE")
            .execute(&mut *tx)
            .await
            .map_err(|e| classifier.classify(e))?;

        let query = record
            .values()
            .into_iter()
            .fold(sqlx::query(sql.as_str()), bind_value);
        query
            .execute(&mut *tx)
            .await
            .map_err(|e| classifier.classify(e))?;

        tx.commit().await.map_err(|e| classifier.classify(e))
    }

    async fn exists(&mut self, kind: EntityKind, key: i64) -> Result<bool, StoreError> {
        let schema = kind.schema();
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE {} = $1)",
            schema.table, schema.key_column
        );
        sqlx::query_scalar::<_, bool>(&sql)
            .bind(key)
            .fetch_one(&mut self.conn)
            .await
            .map_err(|e| self.classifier.classify(e))
    }

    async fn create_placeholder(&mut self, kind: EntityKind, key: i64) -> Result<(), StoreError> {
        let sql = self
            .placeholders
            .get(&kind)
            .ok_or_else(|| StoreError::Other(format!("{} has no placeholder shape", kind)))?;
        let classifier = &self.classifier;

        let mut tx = self.conn.begin().await.map_err(|e| classifier.classify(e))?;
        sqlx::query("SET CONSTRAINTS ALL IMMEDIATE")
            .execute(&mut *tx)
            .await
            .map_err(|e| classifier.classify(e))?;
        sqlx::query(sql.as_str())
            .bind(key)
            .execute(&mut *tx)
            .await
            .map_err(|e| classifier.classify(e))?;
        tx.commit().await.map_err(|e| classifier.classify(e))?;

        debug!(kind = %kind, key, "Placeholder row ensured");
        Ok(())
    }

    /// Needs a role allowed to set `session_replication_role`.
    async fn ensure_bootstrap(&mut self, rows: &[(EntityKind, i64)]) -> Result<(), StoreError> {
        let placeholders = &self.placeholders;
        let classifier = &self.classifier;

        let mut tx = self.conn.begin().await.map_err(|e| classifier.classify(e))?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(BOOTSTRAP_LOCK_ID)
            .execute(&mut *tx)
            .await
            .map_err(|e| classifier.classify(e))?;
        // Triggers, including FK checks, are skipped until commit
        sqlx::query("SET LOCAL session_replication_role = replica")
            .execute(&mut *tx)
            .await
            .map_err(|e| classifier.classify(e))?;

        for &(kind, key) in rows {
            let sql = placeholders
                .get(&kind)
                .ok_or_else(|| StoreError::Other(format!("{} has no placeholder shape", kind)))?;
            sqlx::query(sql.as_str())
                .bind(key)
                .execute(&mut *tx)
                .await
                .map_err(|e| classifier.classify(e))?;
        }

        tx.commit().await.map_err(|e| classifier.classify(e))?;
        info!(rows = rows.len(), "Bootstrap rows ensured");
        Ok(())
    }

    async fn known_keys(&mut self, kind: EntityKind) -> Result<Vec<i64>, StoreError> {
        let schema = kind.schema();
        let sql = format!("SELECT {}::bigint FROM {}", schema.key_column, schema.table);
        sqlx::query_scalar::<_, i64>(&sql)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| self.classifier.classify(e))
    }
}

fn bind_value(
    query: Query<'_, Postgres, PgArguments>,
    value: SqlValue,
) -> Query<'_, Postgres, PgArguments> {
    match value {
        SqlValue::Int(v) => query.bind(v),
        SqlValue::Float(v) => query.bind(v),
        SqlValue::Bool(v) => query.bind(v),
        SqlValue::Text(v) => query.bind(v),
    }
}

/// `INSERT ... VALUES ($1::integer, ...)` plus the kind's conflict clause
pub fn insert_sql(schema: &EntitySchema) -> String {
    let columns: Vec<&str> = schema.columns.iter().map(|c| c.name).collect();
    let params: Vec<String> = schema
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("${}::{}", i + 1, c.sql_type.cast()))
        .collect();

    let conflict = match schema.conflict {
        ConflictPolicy::Update { target, update } => {
            let assignments: Vec<String> = update
                .iter()
                .map(|c| format!("{c} = EXCLUDED.{c}"))
                .collect();
            format!(
                " ON CONFLICT ({}) DO UPDATE SET {}",
                target.join(", "),
                assignments.join(", ")
            )
        },
        ConflictPolicy::Ignore { target } => {
            format!(" ON CONFLICT ({}) DO NOTHING", target.join(", "))
        },
        ConflictPolicy::Reject => String::new(),
    };

    format!(
        "INSERT INTO {} ({}) VALUES ({}){}",
        schema.table,
        columns.join(", "),
        params.join(", "),
        conflict
    )
}

/// Insert-if-absent for the kind's placeholder shape; `$1` is the key
pub fn placeholder_sql(schema: &EntitySchema) -> Option<String> {
    let shape = schema.placeholder.as_ref()?;
    let columns: Vec<&str> = shape.values.iter().map(|(name, _)| *name).collect();
    let values: Vec<String> = shape
        .values
        .iter()
        .map(|(_, value)| match *value {
            PlaceholderValue::Key => "$1".to_string(),
            PlaceholderValue::KeyText(prefix) => format!("{} || $1::text", literal(prefix)),
            PlaceholderValue::Now => "NOW()".to_string(),
            PlaceholderValue::Text(text) => literal(text),
            PlaceholderValue::Int(v) => v.to_string(),
            PlaceholderValue::Float(v) => format!("{:?}::double precision", v),
            PlaceholderValue::Bool(v) => if v { "TRUE" } else { "FALSE" }.to_string(),
            PlaceholderValue::Date(date) => format!("{}::date", literal(date)),
            PlaceholderValue::Ref(_, key) => key.to_string(),
        })
        .collect();

    Some(format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO NOTHING",
        schema.table,
        columns.join(", "),
        values.join(", "),
        schema.key_column
    ))
}

fn literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Maps sqlx errors onto [`StoreError`]
struct ErrorClassifier {
    fk_detail: Regex,
}

impl ErrorClassifier {
    fn new() -> Result<Self, StoreError> {
        let fk_detail = Regex::new(r#"Key \((?P<column>[^)]+)\)=\(.*\) is not present in table"#)
            .map_err(|e| StoreError::Other(format!("invalid detail pattern: {}", e)))?;
        Ok(Self { fk_detail })
    }

    /// Column named in a foreign-key violation detail
    fn fk_column(&self, detail: &str) -> Option<String> {
        self.fk_detail
            .captures(detail)
            .and_then(|caps| caps.name("column"))
            .map(|m| m.as_str().to_string())
    }

    fn classify(&self, err: sqlx::Error) -> StoreError {
        let db = match err {
            sqlx::Error::Database(db) => db,
            other if is_connection_error(&other) => return StoreError::Connection(other.to_string()),
            other => return StoreError::Other(other.to_string()),
        };

        let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
        // Class 08 is connection exceptions; 57P0x is server shutdown
        if code.starts_with("08") || code.starts_with("57P0") {
            return StoreError::Connection(db.message().to_string());
        }

        let kind = match code.as_str() {
            "23503" => ViolationKind::ForeignKey,
            "23502" => ViolationKind::NotNull,
            "23505" => ViolationKind::Unique,
            "23514" => ViolationKind::Check,
            _ => ViolationKind::Other,
        };

        let pg = db.try_downcast_ref::<PgDatabaseError>();
        let detail = pg.and_then(PgDatabaseError::detail);
        let column = match kind {
            ViolationKind::ForeignKey => detail.and_then(|d| self.fk_column(d)),
            _ => pg.and_then(PgDatabaseError::column).map(str::to_string),
        };
        let message = match detail {
            Some(detail) => format!("{} ({})", db.message(), detail),
            None => db.message().to_string(),
        };

        StoreError::Violation(Violation {
            kind,
            column,
            constraint: db.constraint().map(str::to_string),
            message,
        })
    }
}

fn is_connection_error(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}
