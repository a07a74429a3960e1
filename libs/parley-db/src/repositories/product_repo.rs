use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::store::Product;

#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: PgPool,
}

impl ProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_active(&self) -> Result<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE is_active = TRUE ORDER BY price ASC",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list active products")?;
        Ok(products)
    }

    pub async fn list_all(&self) -> Result<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>("SELECT * FROM products ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list products")?;
        Ok(products)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch product")?;
        Ok(product)
    }

    pub async fn create(
        &self,
        name: &str,
        description: Option<&str>,
        price: i64,
        stripe_price_id: Option<&str>,
        item_type: &str,
        amount: i64,
    ) -> Result<Product> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (name, description, price, stripe_price_id, item_type, amount)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(price)
        .bind(stripe_price_id)
        .bind(item_type)
        .bind(amount)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create product")?;
        Ok(product)
    }

    /// Products referenced by payments are deactivated, never deleted.
    pub async fn set_active(&self, id: i64, active: bool) -> Result<bool> {
        let res = sqlx::query("UPDATE products SET is_active = $1 WHERE id = $2")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update product active flag")?;
        Ok(res.rows_affected() == 1)
    }
}
