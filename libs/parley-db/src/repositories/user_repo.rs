use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::store::User;

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by ID")?;
        Ok(user)
    }

    pub async fn get_by_tg_id(&self, tg_id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE tg_id = $1")
            .bind(tg_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by TG ID")?;
        Ok(user)
    }

    pub async fn upsert(
        &self,
        tg_id: i64,
        username: Option<&str>,
        full_name: Option<&str>,
    ) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (tg_id, username, full_name)
            VALUES ($1, $2, $3)
            ON CONFLICT (tg_id) DO UPDATE SET
                username = COALESCE(excluded.username, users.username),
                full_name = COALESCE(excluded.full_name, users.full_name),
                last_active_at = NOW()
            RETURNING *
            "#,
        )
        .bind(tg_id)
        .bind(username)
        .bind(full_name)
        .fetch_one(&self.pool)
        .await
        .context("Failed to upsert user")?;
        Ok(user)
    }

    /// Conditional debit: zero rows affected means the balance was too low.
    /// The WHERE clause is what keeps credits non-negative under concurrent
    /// charges.
    pub async fn try_debit(&self, id: i64, cost: i64) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE users SET credits = credits - $1, last_active_at = NOW() \
             WHERE id = $2 AND credits >= $1",
        )
        .bind(cost)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to debit user credits")?;
        Ok(res.rows_affected() == 1)
    }

    pub async fn adjust_credits(&self, id: i64, delta: i64) -> Result<()> {
        sqlx::query("UPDATE users SET credits = GREATEST(credits + $1, 0) WHERE id = $2")
            .bind(delta)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to adjust user credits")?;
        Ok(())
    }

    pub async fn set_banned(&self, id: i64, banned: bool) -> Result<()> {
        sqlx::query("UPDATE users SET is_banned = $1 WHERE id = $2")
            .bind(banned)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update ban flag")?;
        Ok(())
    }

    pub async fn touch_last_active(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE users SET last_active_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count users")?;
        Ok(count)
    }
}
