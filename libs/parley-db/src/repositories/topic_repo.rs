use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::store::Topic;

#[derive(Debug, Clone)]
pub struct TopicRepository {
    pool: PgPool,
}

impl TopicRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_by_user_id(&self, user_id: i64) -> Result<Option<Topic>> {
        let topic = sqlx::query_as::<_, Topic>("SELECT * FROM topics WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch topic by user ID")?;
        Ok(topic)
    }

    pub async fn get_by_thread_id(&self, thread_id: i32) -> Result<Option<Topic>> {
        let topic = sqlx::query_as::<_, Topic>(
            "SELECT * FROM topics WHERE thread_id = $1 AND is_stale = FALSE",
        )
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch topic by thread ID")?;
        Ok(topic)
    }

    /// A user keeps a single row; recreating a stale topic overwrites the
    /// old thread id in place.
    pub async fn upsert(&self, user_id: i64, thread_id: i32) -> Result<Topic> {
        let topic = sqlx::query_as::<_, Topic>(
            r#"
            INSERT INTO topics (user_id, thread_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET
                thread_id = excluded.thread_id,
                is_stale = FALSE
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(thread_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to upsert topic mapping")?;
        Ok(topic)
    }

    pub async fn mark_stale(&self, user_id: i64) -> Result<()> {
        sqlx::query("UPDATE topics SET is_stale = TRUE WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to mark topic stale")?;
        Ok(())
    }

    pub async fn record_user_message(&self, user_id: i64, priority: f64) -> Result<()> {
        sqlx::query(
            "UPDATE topics SET unread_count = unread_count + 1, \
             last_user_msg_at = NOW(), priority = $1 WHERE user_id = $2",
        )
        .bind(priority)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("Failed to record user message on topic")?;
        Ok(())
    }

    pub async fn record_admin_reply(&self, user_id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE topics SET unread_count = 0, last_admin_msg_at = NOW() WHERE user_id = $1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("Failed to record admin reply on topic")?;
        Ok(())
    }

    pub async fn list_by_priority(&self, limit: i64) -> Result<Vec<Topic>> {
        let topics = sqlx::query_as::<_, Topic>(
            "SELECT * FROM topics WHERE unread_count > 0 ORDER BY priority DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list topics by priority")?;
        Ok(topics)
    }
}
