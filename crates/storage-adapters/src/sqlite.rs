//! # SQLite document store
//!
//! All six collections share one `documents` table holding JSON bodies,
//! partitioned by the deployment namespace. Filters compile to
//! `json_extract` expressions so the expression indexes created by the
//! migrations can serve them; increments and patches run as single UPDATE
//! statements inside the caller's transaction.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use domains::store::{Collection, Filter, Query, SortOrder};
use domains::{DocumentStore, StoreError, StoreTransaction};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, Transaction};
use tracing::info;

#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
    namespace: String,
}

impl SqliteDocumentStore {
    /// Opens (creating if needed) the database at `url` and runs migrations.
    /// `sqlite::memory:` is supported for tests; it is pinned to a single
    /// connection because every in-memory connection is its own database.
    pub async fn connect(url: &str, namespace: &str) -> anyhow::Result<Self> {
        let in_memory = url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 8 })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!(url, namespace, "sqlite document store ready");

        Ok(Self { pool, namespace: namespace.to_string() })
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn decode(body: &str) -> Result<Value, StoreError> {
    Ok(serde_json::from_str(body)?)
}

/// `json_extract` expression for a top-level field. Field names are spliced
/// into the SQL text (so expression indexes match), hence the whitelist.
fn json_field(field: &str) -> Result<String, StoreError> {
    if field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StoreError::InvalidQuery(format!("unsupported field name {field:?}")));
    }
    Ok(format!("json_extract(body, '$.{field}')"))
}

fn push_value(qb: &mut QueryBuilder<'_, Sqlite>, value: &Value) -> Result<(), StoreError> {
    match value {
        Value::String(s) => {
            qb.push_bind(s.clone());
        }
        // json_extract yields 1/0 for JSON booleans.
        Value::Bool(b) => {
            qb.push_bind(i64::from(*b));
        }
        Value::Number(n) => match n.as_i64() {
            Some(i) => {
                qb.push_bind(i);
            }
            None => {
                qb.push_bind(n.as_f64().unwrap_or_default());
            }
        },
        other => return Err(StoreError::InvalidQuery(format!("cannot compare against {other}"))),
    }
    Ok(())
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &Filter) -> Result<(), StoreError> {
    match filter {
        Filter::Eq(field, value) => {
            let expr = json_field(field)?;
            if value.is_null() {
                qb.push(format!("{expr} IS NULL"));
            } else {
                qb.push(format!("{expr} = "));
                push_value(qb, value)?;
            }
        }
        Filter::Ne(field, value) => {
            let expr = json_field(field)?;
            qb.push(format!("({expr} IS NULL OR {expr} != "));
            push_value(qb, value)?;
            qb.push(")");
        }
        Filter::Gte(field, value) => {
            let expr = json_field(field)?;
            let kinds = match value {
                Value::Number(_) => "('integer', 'real')",
                Value::String(_) => "('text')",
                other => return Err(StoreError::InvalidQuery(format!("cannot range over {other}"))),
            };
            qb.push(format!("(json_type(body, '$.{field}') IN {kinds} AND {expr} >= "));
            push_value(qb, value)?;
            qb.push(")");
        }
        Filter::In(field, values) => {
            if values.is_empty() {
                qb.push("0");
                return Ok(());
            }
            let expr = json_field(field)?;
            qb.push(format!("{expr} IN ("));
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                push_value(qb, value)?;
            }
            qb.push(")");
        }
        Filter::Prefix(field, prefix) => {
            let expr = json_field(field)?;
            qb.push(format!("substr({expr}, 1, length("));
            qb.push_bind(prefix.clone());
            qb.push(")) = ");
            qb.push_bind(prefix.clone());
        }
        Filter::Missing(field) => {
            json_field(field)?;
            qb.push(format!("json_type(body, '$.{field}') IS NULL"));
        }
        Filter::And(parts) | Filter::Or(parts) => {
            let (joiner, empty) = if matches!(filter, Filter::And(_)) { (" AND ", "1") } else { (" OR ", "0") };
            if parts.is_empty() {
                qb.push(empty);
                return Ok(());
            }
            qb.push("(");
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    qb.push(joiner);
                }
                push_filter(qb, part)?;
            }
            qb.push(")");
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        // Take the write lock up front: concurrent writers then queue on
        // busy_timeout instead of failing when a read lock is upgraded.
        sqlx::query("UPDATE documents SET id = id WHERE 0")
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        Ok(Box::new(SqliteTransaction { tx, namespace: self.namespace.clone() }))
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError> {
        let body: Option<String> =
            sqlx::query_scalar("SELECT body FROM documents WHERE namespace = ? AND collection = ? AND id = ?")
                .bind(&self.namespace)
                .bind(collection.as_str())
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
        body.as_deref().map(decode).transpose()
    }

    async fn query(&self, collection: Collection, query: &Query) -> Result<Vec<Value>, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT body FROM documents WHERE namespace = ");
        qb.push_bind(self.namespace.clone())
            .push(" AND collection = ")
            .push_bind(collection.as_str())
            .push(" AND ");
        push_filter(&mut qb, &query.filter)?;

        if let Some((field, order)) = &query.order_by {
            let direction = match order {
                SortOrder::Asc => "ASC",
                SortOrder::Desc => "DESC",
            };
            qb.push(format!(" ORDER BY {} {direction}", json_field(field)?));
        }
        qb.push(" LIMIT ")
            .push_bind(query.limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX)))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.skip).unwrap_or(i64::MAX));

        let bodies = qb.build_query_scalar::<String>().fetch_all(&self.pool).await.map_err(backend)?;
        bodies.iter().map(|b| decode(b)).collect()
    }
}

struct SqliteTransaction {
    tx: Transaction<'static, Sqlite>,
    namespace: String,
}

impl SqliteTransaction {
    fn missing(collection: Collection, id: &str) -> StoreError {
        StoreError::Missing { collection, id: id.to_string() }
    }
}

#[async_trait]
impl StoreTransaction for SqliteTransaction {
    async fn get(&mut self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError> {
        let body: Option<String> =
            sqlx::query_scalar("SELECT body FROM documents WHERE namespace = ? AND collection = ? AND id = ?")
                .bind(&self.namespace)
                .bind(collection.as_str())
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(backend)?;
        body.as_deref().map(decode).transpose()
    }

    async fn insert(&mut self, collection: Collection, id: &str, doc: Value) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO documents (namespace, collection, id, body) VALUES (?, ?, ?, ?)")
            .bind(&self.namespace)
            .bind(collection.as_str())
            .bind(id)
            .bind(doc.to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(|err| match err.as_database_error() {
                Some(db) if db.is_unique_violation() => StoreError::Duplicate { collection, id: id.to_string() },
                _ => backend(err),
            })?;
        Ok(())
    }

    async fn replace(&mut self, collection: Collection, id: &str, doc: Value) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE documents SET body = ? WHERE namespace = ? AND collection = ? AND id = ?")
            .bind(doc.to_string())
            .bind(&self.namespace)
            .bind(collection.as_str())
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(Self::missing(collection, id));
        }
        Ok(())
    }

    async fn patch(&mut self, collection: Collection, id: &str, patch: Value) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE documents SET body = json_patch(body, ?) WHERE namespace = ? AND collection = ? AND id = ?")
                .bind(patch.to_string())
                .bind(&self.namespace)
                .bind(collection.as_str())
                .bind(id)
                .execute(&mut *self.tx)
                .await
                .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(Self::missing(collection, id));
        }
        Ok(())
    }

    async fn increment(
        &mut self,
        collection: Collection,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<(), StoreError> {
        let expr = json_field(field)?;
        let sql = format!(
            "UPDATE documents SET body = json_set(body, '$.{field}', COALESCE({expr}, 0) + ?) \
             WHERE namespace = ? AND collection = ? AND id = ?"
        );
        let result = sqlx::query(&sql)
            .bind(delta)
            .bind(&self.namespace)
            .bind(collection.as_str())
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(Self::missing(collection, id));
        }
        Ok(())
    }

    async fn delete(&mut self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE namespace = ? AND collection = ? AND id = ?")
            .bind(&self.namespace)
            .bind(collection.as_str())
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(Self::missing(collection, id));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(backend)
    }
}
