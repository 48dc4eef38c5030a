//! Reference [`KvStore`](super::KvStore) adapter backed by a single
//! PostgreSQL table, grounded in the audit repository's pool-plus-`initialize`
//! pattern.

use super::KvStore;
use crate::database::DatabasePool;
use crate::error::Result;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

pub struct PostgresKvStore {
    pool: PgPool,
    table_name: String,
}

impl PostgresKvStore {
    pub fn new(pool: &DatabasePool) -> Self {
        Self {
            pool: pool.pool.clone(),
            table_name: "kv_entries".to_string(),
        }
    }

    pub async fn initialize(&self) -> Result<()> {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                namespace VARCHAR(255) NOT NULL,
                key VARCHAR(255) NOT NULL,
                value BYTEA NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (namespace, key)
            );

            CREATE INDEX IF NOT EXISTS idx_{}_namespace ON {} (namespace);
            "#,
            self.table_name, self.table_name, self.table_name,
        );

        sqlx::query(&sql).execute(&self.pool).await?;
        info!("kv table '{}' initialized", self.table_name);
        Ok(())
    }
}

#[async_trait]
impl KvStore for PostgresKvStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let sql = format!("SELECT value FROM {} WHERE namespace = $1 AND key = $2", self.table_name);
        let row = sqlx::query(&sql)
            .bind(namespace)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get::<Vec<u8>, _>("value")))
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> Result<()> {
        let sql = format!(
            r#"
            INSERT INTO {} (namespace, key, value, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (namespace, key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#,
            self.table_name
        );

        sqlx::query(&sql).bind(namespace).bind(key).bind(value).execute(&self.pool).await?;
        debug!("set kv entry {}/{}", namespace, key);
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE namespace = $1 AND key = $2", self.table_name);
        sqlx::query(&sql).bind(namespace).bind(key).execute(&self.pool).await?;
        Ok(())
    }

    async fn list_by_namespace(&self, namespace: &str) -> Result<Vec<String>> {
        let sql = format!("SELECT key FROM {} WHERE namespace = $1", self.table_name);
        let rows = sqlx::query(&sql).bind(namespace).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>("key")).collect())
    }
}
