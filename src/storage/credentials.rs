use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::cli::config::CredentialSettings;

/// One browser cookie as stored in the credential table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub secure: Option<bool>,
    #[serde(default)]
    pub expiry: Option<i64>,
}

/// Durable storage for per-user platform session cookies
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Most recent cookie set for a user, if any
    async fn fetch_latest(&self, user_id: i64) -> Result<Option<Vec<StoredCookie>>>;

    /// Persist the cookie set for a user, returning the row id
    async fn persist(&self, user_id: i64, cookies: &[StoredCookie]) -> Result<i64>;
}

/// Postgres-backed credential store, one row per user
pub struct PgCredentialStore {
    pool: PgPool,
    table: String,
}

impl PgCredentialStore {
    /// Connect and make sure the cookie table exists
    pub async fn connect(settings: &CredentialSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&settings.database_url)
            .await
            .context("Failed to connect to credential database")?;

        let store = Self {
            pool,
            table: settings.table.clone(),
        };
        store.ensure_table().await?;
        Ok(store)
    }

    async fn ensure_table(&self) -> Result<()> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = $1)",
        )
        .bind(&self.table)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check credential table")?;

        if !exists {
            info!("creating credential table {}", self.table);
            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id BIGSERIAL PRIMARY KEY,
                    user_id BIGINT NOT NULL UNIQUE,
                    cookies JSONB NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )",
                self.table
            ))
            .execute(&self.pool)
            .await
            .context("Failed to create credential table")?;
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn fetch_latest(&self, user_id: i64) -> Result<Option<Vec<StoredCookie>>> {
        let row = sqlx::query(&format!(
            "SELECT cookies FROM {} WHERE user_id = $1 ORDER BY created_at DESC LIMIT 1",
            self.table
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch stored credentials")?;

        match row {
            Some(row) => {
                let value: serde_json::Value = row
                    .try_get("cookies")
                    .context("Credential row has no cookies column")?;
                let cookies: Vec<StoredCookie> =
                    serde_json::from_value(value).context("Stored cookies are malformed")?;
                debug!("loaded {} cookies for user {}", cookies.len(), user_id);
                Ok(Some(cookies))
            }
            None => Ok(None),
        }
    }

    async fn persist(&self, user_id: i64, cookies: &[StoredCookie]) -> Result<i64> {
        let payload = serde_json::to_value(cookies).context("Failed to encode cookies")?;
        let id: i64 = sqlx::query_scalar(&format!(
            "INSERT INTO {} (user_id, cookies) VALUES ($1, $2)
             ON CONFLICT (user_id)
             DO UPDATE SET cookies = EXCLUDED.cookies, updated_at = NOW()
             RETURNING id",
            self.table
        ))
        .bind(user_id)
        .bind(payload)
        .fetch_one(&self.pool)
        .await
        .context("Failed to persist credentials")?;

        debug!("stored {} cookies for user {} (row {})", cookies.len(), user_id, id);
        Ok(id)
    }
}
