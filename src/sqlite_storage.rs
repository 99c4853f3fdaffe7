//! SQLite-backed [`LocalStorage`].
//!
//! One row per key in the `local_storage` table; values are opaque strings
//! (the hybrid store keeps JSON documents in them).

use anyhow::Result;
use async_trait::async_trait;
use policy_sim_core::store::LocalStorage;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::{db, migrate};

pub struct SqliteLocalStorage {
    pool: SqlitePool,
}

impl SqliteLocalStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `[local].path`, creating the schema if needed.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::ensure_schema(&pool).await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl LocalStorage for SqliteLocalStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM local_storage WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO local_storage (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM local_storage WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
