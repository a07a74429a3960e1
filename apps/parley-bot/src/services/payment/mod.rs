use anyhow::Result;
use async_trait::async_trait;
use parley_db::models::store::Product;

pub mod stripe;

#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    /// Create a hosted checkout for the product and return the payment URL.
    /// `reference` travels with the session and comes back in the webhook.
    async fn create_checkout(
        &self,
        reference: &str,
        product: &Product,
        return_url: &str,
    ) -> Result<String>;

    /// Verify the webhook signature.
    fn verify_signature(&self, payload: &str, signature: Option<&str>) -> Result<()>;

    /// Adapter name, recorded as the payment method in the audit log.
    fn name(&self) -> &str;
}
