use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use std::collections::HashSet;
use std::time::Duration;

use crate::domain::errors::StoreError;
use crate::domain::ports::{BatchOp, KeyValueStore};

// Database time is the single expiry clock for every process.
const NOW: &str = "EXTRACT(EPOCH FROM now())::BIGINT";

// PostgreSQL-backed shared store: string values in `kv_strings`, set members in `kv_sets`.
#[derive(Clone)]
pub struct PostgresStore {
    pub db: PgPool,
}

impl PostgresStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Decode(_) | sqlx::Error::ColumnDecode { .. } | sqlx::Error::TypeNotFound { .. } => {
            StoreError::Serialization(err.to_string())
        }
        other => StoreError::Unavailable(other.to_string()),
    }
}

fn ttl_seconds(ttl: Duration) -> i64 {
    ttl.as_secs().max(1) as i64
}

async fn apply_op(conn: &mut PgConnection, op: &BatchOp) -> Result<(), sqlx::Error> {
    match op {
        BatchOp::Set { key, value } => {
            sqlx::query(
                r#"
                INSERT INTO kv_strings (key, value, expires_at)
                VALUES ($1, $2, NULL)
                ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, expires_at = NULL
                "#,
            )
            .bind(key)
            .bind(value)
            .execute(&mut *conn)
            .await?;
        }
        BatchOp::SetIfPresent { key, value } => {
            sqlx::query("UPDATE kv_strings SET value = $2, expires_at = NULL WHERE key = $1")
                .bind(key)
                .bind(value)
                .execute(&mut *conn)
                .await?;
        }
        BatchOp::Delete { key } => {
            sqlx::query("DELETE FROM kv_strings WHERE key = $1")
                .bind(key)
                .execute(&mut *conn)
                .await?;
            sqlx::query("DELETE FROM kv_sets WHERE key = $1")
                .bind(key)
                .execute(&mut *conn)
                .await?;
        }
        BatchOp::SetAdd { key, member } => {
            sqlx::query("INSERT INTO kv_sets (key, member) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(key)
                .bind(member)
                .execute(&mut *conn)
                .await?;
        }
        BatchOp::SetRemove { key, member } => {
            sqlx::query("DELETE FROM kv_sets WHERE key = $1 AND member = $2")
                .bind(key)
                .bind(member)
                .execute(&mut *conn)
                .await?;
        }
        BatchOp::Increment { key, by } => {
            increment(conn, key, *by).await?;
        }
        BatchOp::SetRemoveIfEmpty { key, member, guard } => {
            sqlx::query(
                r#"
                DELETE FROM kv_sets
                WHERE key = $1 AND member = $2
                  AND NOT EXISTS (SELECT 1 FROM kv_sets WHERE key = $3)
                "#,
            )
            .bind(key)
            .bind(member)
            .bind(guard)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

// Set keys a batch must serialize on: every emptiness guard, and every set it adds to
// (an add to a guarded set must not slip past a concurrent emptiness check).
fn serialized_keys(ops: &[BatchOp]) -> Vec<String> {
    let mut keys: Vec<String> = ops
        .iter()
        .filter_map(|op| match op {
            BatchOp::SetRemoveIfEmpty { guard, .. } => Some(guard.clone()),
            BatchOp::SetAdd { key, .. } => Some(key.clone()),
            _ => None,
        })
        .collect();
    keys.sort();
    keys.dedup();
    keys
}

// Transaction-scoped advisory locks, taken in hash order so concurrent batches cannot deadlock.
async fn lock_keys(conn: &mut PgConnection, keys: &[String]) -> Result<(), sqlx::Error> {
    if keys.is_empty() {
        return Ok(());
    }
    sqlx::query(
        r#"
        SELECT pg_advisory_xact_lock(h)
        FROM (SELECT DISTINCT hashtext(k) AS h FROM unnest($1::TEXT[]) AS k ORDER BY h) AS locks
        "#,
    )
    .bind(keys)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn increment(conn: &mut PgConnection, key: &str, by: i64) -> Result<i64, sqlx::Error> {
    let value: String = sqlx::query_scalar(
        r#"
        INSERT INTO kv_strings (key, value, expires_at)
        VALUES ($1, $2::BIGINT::TEXT, NULL)
        ON CONFLICT (key) DO UPDATE
            SET value = (kv_strings.value::BIGINT + $2::BIGINT)::TEXT, expires_at = NULL
        RETURNING value
        "#,
    )
    .bind(key)
    .bind(by)
    .fetch_one(&mut *conn)
    .await?;

    value.parse::<i64>().map_err(|err| sqlx::Error::Decode(Box::new(err)))
}

#[async_trait]
impl KeyValueStore for PostgresStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        sqlx::query_scalar(&format!(
            "SELECT value FROM kv_strings WHERE key = $1 AND (expires_at IS NULL OR expires_at > {NOW})"
        ))
        .bind(key)
        .fetch_optional(&self.db)
        .await
        .map_err(map_sqlx_error)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.db.acquire().await.map_err(map_sqlx_error)?;
        apply_op(
            &mut conn,
            &BatchOp::Set {
                key: key.to_string(),
                value: value.to_string(),
            },
        )
        .await
        .map_err(map_sqlx_error)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let strings = sqlx::query("DELETE FROM kv_strings WHERE key = $1")
            .bind(key)
            .execute(&self.db)
            .await
            .map_err(map_sqlx_error)?;
        let sets = sqlx::query("DELETE FROM kv_sets WHERE key = $1")
            .bind(key)
            .execute(&self.db)
            .await
            .map_err(map_sqlx_error)?;
        Ok(strings.rows_affected() + sets.rows_affected() > 0)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let result =
            sqlx::query("INSERT INTO kv_sets (key, member) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(key)
                .bind(member)
                .execute(&self.db)
                .await
                .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM kv_sets WHERE key = $1 AND member = $2")
            .bind(key)
            .bind(member)
            .execute(&self.db)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_members(&self, key: &str) -> Result<HashSet<String>, StoreError> {
        let members: Vec<String> = sqlx::query_scalar("SELECT member FROM kv_sets WHERE key = $1")
            .bind(key)
            .fetch_all(&self.db)
            .await
            .map_err(map_sqlx_error)?;
        Ok(members.into_iter().collect())
    }

    async fn set_len(&self, key: &str) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kv_sets WHERE key = $1")
            .bind(key)
            .fetch_one(&self.db)
            .await
            .map_err(map_sqlx_error)?;
        Ok(count.max(0) as usize)
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64, StoreError> {
        let mut conn = self.db.acquire().await.map_err(map_sqlx_error)?;
        increment(&mut conn, key, by).await.map_err(map_sqlx_error)
    }

    async fn set_if_absent_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        // The conflicting row is only taken over once its lease has expired.
        let result = sqlx::query(&format!(
            r#"
            INSERT INTO kv_strings (key, value, expires_at)
            VALUES ($1, $2, {NOW} + $3)
            ON CONFLICT (key) DO UPDATE
                SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
                WHERE kv_strings.expires_at IS NOT NULL AND kv_strings.expires_at <= {NOW}
            "#
        ))
        .bind(key)
        .bind(value)
        .bind(ttl_seconds(ttl))
        .execute(&self.db)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn refresh_expiry_if_equals(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE kv_strings SET expires_at = {NOW} + $3
            WHERE key = $1 AND value = $2 AND (expires_at IS NULL OR expires_at > {NOW})
            "#
        ))
        .bind(key)
        .bind(expected)
        .bind(ttl_seconds(ttl))
        .execute(&self.db)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(&format!(
            "DELETE FROM kv_strings WHERE key = $1 AND value = $2 AND (expires_at IS NULL OR expires_at > {NOW})"
        ))
        .bind(key)
        .bind(expected)
        .execute(&self.db)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn count_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM kv_strings WHERE starts_with(key, $1) AND (expires_at IS NULL OR expires_at > {NOW})"
        ))
        .bind(prefix)
        .fetch_one(&self.db)
        .await
        .map_err(map_sqlx_error)?;
        Ok(count.max(0) as usize)
    }

    async fn execute_batch(&self, ops: Vec<BatchOp>) -> Result<(), StoreError> {
        let mut tx = self.db.begin().await.map_err(map_sqlx_error)?;
        if let Err(err) = lock_keys(&mut tx, &serialized_keys(&ops)).await {
            return Err(StoreError::TransactionAborted(err.to_string()));
        }
        for op in &ops {
            if let Err(err) = apply_op(&mut tx, op).await {
                // Dropping the transaction rolls it back.
                return Err(StoreError::TransactionAborted(err.to_string()));
            }
        }
        tx.commit()
            .await
            .map_err(|err| StoreError::TransactionAborted(err.to_string()))
    }
}
