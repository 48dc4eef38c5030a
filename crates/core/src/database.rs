//! # Database Pool
//!
//! A single shared PostgreSQL connection pool backing the reference
//! `PostgresKvStore` adapter (see [`crate::persistence::kv_postgres`]). The
//! erasure engine itself has no durable-storage requirements beyond what its
//! pluggable persistence ports demand (§4.C), so this is deliberately a thin
//! wrapper rather than a multi-tenant pool manager.

use crate::{config::DatabaseConfig, error::Result};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

#[derive(Clone)]
pub struct DatabasePool {
    pub pool: PgPool,
}

impl DatabasePool {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("initializing database pool");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await?;

        info!("database pool initialized");

        Ok(Self { pool })
    }

    pub async fn check_health(&self) -> Result<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
