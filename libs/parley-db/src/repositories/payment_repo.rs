use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::store::Payment;

#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert the audit row for an external payment. Returns `false` when a
    /// row with the same `external_id` already exists — the caller must then
    /// skip crediting. This is the idempotency mechanism for duplicate
    /// webhook delivery; there is no in-process locking.
    pub async fn record_once(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        product_id: Option<i64>,
        method: &str,
        amount: i64,
        external_id: &str,
    ) -> Result<bool> {
        let res = sqlx::query(
            r#"
            INSERT INTO payments (user_id, product_id, method, amount, external_id, status)
            VALUES ($1, $2, $3, $4, $5, 'paid')
            ON CONFLICT (external_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .bind(method)
        .bind(amount)
        .bind(external_id)
        .execute(&mut **tx)
        .await
        .context("Failed to record payment")?;
        Ok(res.rows_affected() == 1)
    }

    pub async fn recent_for_user(&self, user_id: i64, limit: i64) -> Result<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch user payments")?;
        Ok(payments)
    }
}
