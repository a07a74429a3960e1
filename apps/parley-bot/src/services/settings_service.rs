use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::info;

use crate::services::billing_service::MessageKind;

/// Bot-wide key/value settings backed by the `settings` table, read through
/// an in-process cache. Writes go through to the DB first.
#[derive(Debug, Clone)]
pub struct SettingsService {
    pool: PgPool,
    cache: Arc<RwLock<HashMap<String, String>>>,
}

impl SettingsService {
    pub async fn new(pool: PgPool) -> Result<Self> {
        let service = Self {
            pool,
            cache: Arc::new(RwLock::new(HashMap::new())),
        };

        service.reload_cache().await?;
        Ok(service)
    }

    pub async fn reload_cache(&self) -> Result<()> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch settings from DB")?;

        let mut cache = self.cache.write().await;
        cache.clear();
        for (key, value) in rows {
            cache.insert(key, value);
        }

        info!("Settings cache reloaded with {} items", cache.len());
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let cache = self.cache.read().await;
        cache.get(key).cloned()
    }

    pub async fn get_or_default(&self, key: &str, default: &str) -> String {
        self.get(key).await.unwrap_or_else(|| default.to_string())
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = NOW()",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .context("Failed to update setting in DB")?;

        let mut cache = self.cache.write().await;
        cache.insert(key.to_string(), value.to_string());

        Ok(())
    }

    /// Per-kind message cost in credits. Unparseable overrides fall back to
    /// the compiled-in default.
    pub async fn message_cost(&self, kind: MessageKind) -> i64 {
        match self.get(kind.settings_key()).await {
            Some(raw) => raw.parse().unwrap_or_else(|_| kind.default_cost()),
            None => kind.default_cost(),
        }
    }
}
