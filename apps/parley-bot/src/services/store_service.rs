use anyhow::{Context, Result};
use parley_db::models::store::{ItemType, Product};
use parley_db::repositories::ProductRepository;

/// Catalog facade used by /buy, the admin product commands, and purchase
/// fulfillment.
#[derive(Debug, Clone)]
pub struct StoreService {
    products: ProductRepository,
}

impl StoreService {
    pub fn new(products: ProductRepository) -> Self {
        Self { products }
    }

    pub async fn list_products(&self) -> Result<Vec<Product>> {
        self.products.list_active().await
    }

    pub async fn list_all_products(&self) -> Result<Vec<Product>> {
        self.products.list_all().await
    }

    pub async fn get_product(&self, id: i64) -> Result<Option<Product>> {
        self.products.get(id).await
    }

    pub async fn create_product(
        &self,
        name: &str,
        price: i64,
        item_type: ItemType,
        amount: i64,
    ) -> Result<Product> {
        if price <= 0 || amount <= 0 {
            return Err(anyhow::anyhow!("Price and amount must be positive"));
        }
        self.products
            .create(name, None, price, None, &item_type.to_string(), amount)
            .await
            .context("Failed to create product")
    }

    pub async fn deactivate_product(&self, id: i64) -> Result<bool> {
        self.products.set_active(id, false).await
    }

    /// One-line catalog label, e.g. "25 credits — $5.00".
    pub fn product_label(product: &Product) -> String {
        let price = format!("${:.2}", product.price as f64 / 100.0);
        match product.parsed_type() {
            Ok(ItemType::Credits) => format!("{} credits — {}", product.amount, price),
            Ok(ItemType::Time) => format!("{} min unmetered — {}", product.amount, price),
            Err(_) => format!("{} — {}", product.name, price),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn product(item_type: &str, amount: i64, price: i64) -> Product {
        Product {
            id: 1,
            name: "Test".to_string(),
            description: None,
            price,
            stripe_price_id: None,
            item_type: item_type.to_string(),
            amount,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn labels() {
        assert_eq!(
            StoreService::product_label(&product("credits", 25, 500)),
            "25 credits — $5.00"
        );
        assert_eq!(
            StoreService::product_label(&product("time", 60, 1500)),
            "60 min unmetered — $15.00"
        );
        assert_eq!(
            StoreService::product_label(&product("mystery", 1, 100)),
            "Test — $1.00"
        );
    }
}
