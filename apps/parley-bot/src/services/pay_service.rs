use std::sync::Arc;

use anyhow::{Context, Result};
use parley_db::models::store::{ItemType, Product, User};
use parley_db::repositories::{PaymentRepository, UserRepository};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::bot_manager::BotManager;
use crate::services::payment::PaymentAdapter;
use crate::services::settings_service::SettingsService;
use crate::services::store_service::StoreService;

/// Webhook processing outcome for the HTTP layer. `Rejected` maps to a 4xx
/// (nothing was mutated); `Internal` maps to a 5xx so the provider retries.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("webhook rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub struct PayService {
    pool: PgPool,
    adapter: Arc<dyn PaymentAdapter>,
    store_service: Arc<StoreService>,
    users: UserRepository,
    payments: PaymentRepository,
    settings: Arc<SettingsService>,
    bot_manager: Arc<BotManager>,
}

impl PayService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        adapter: Arc<dyn PaymentAdapter>,
        store_service: Arc<StoreService>,
        users: UserRepository,
        payments: PaymentRepository,
        settings: Arc<SettingsService>,
        bot_manager: Arc<BotManager>,
    ) -> Self {
        Self {
            pool,
            adapter,
            store_service,
            users,
            payments,
            settings,
            bot_manager,
        }
    }

    pub async fn create_checkout_for(&self, user: &User, product: &Product) -> Result<String> {
        let reference = checkout_payload(user.tg_id, product.id);

        // Send the buyer back to the bot after checkout.
        let bot_username = self.settings.get_or_default("bot_username", "").await;
        let return_url = if bot_username.is_empty() {
            "https://t.me".to_string()
        } else {
            format!("https://t.me/{}", bot_username)
        };

        info!(
            "Creating {} checkout for user {} (product {})",
            self.adapter.name(),
            user.tg_id,
            product.id
        );
        self.adapter
            .create_checkout(&reference, product, &return_url)
            .await
    }

    pub async fn handle_webhook(
        &self,
        payload: &str,
        signature: Option<&str>,
    ) -> Result<(), WebhookError> {
        self.adapter
            .verify_signature(payload, signature)
            .map_err(|e| WebhookError::Rejected(e.to_string()))?;

        let body: serde_json::Value = serde_json::from_str(payload)
            .map_err(|e| WebhookError::Rejected(format!("malformed payload: {}", e)))?;

        let event_type = body["type"].as_str().unwrap_or("");
        if event_type != "checkout.session.completed" {
            // Accepted and ignored so the provider does not keep retrying.
            info!("Ignoring webhook event type: {}", event_type);
            return Ok(());
        }

        let session = &body["data"]["object"];
        let external_id = session["id"]
            .as_str()
            .ok_or_else(|| WebhookError::Rejected("missing session id".to_string()))?;
        let amount_total = session["amount_total"].as_i64().unwrap_or(0);
        let reference = session["client_reference_id"].as_str().unwrap_or("");
        let (tg_id, product_id) = parse_checkout_payload(reference).ok_or_else(|| {
            WebhookError::Rejected(format!("bad client_reference_id: {:?}", reference))
        })?;

        self.fulfill(tg_id, product_id, amount_total, external_id)
            .await
    }

    /// Apply a completed checkout to the buyer's account, exactly once per
    /// payment id. The audit insert and the credit live in one transaction;
    /// the UNIQUE constraint on `payments.external_id` settles concurrent
    /// duplicate deliveries.
    async fn fulfill(
        &self,
        tg_id: i64,
        product_id: i64,
        amount_total: i64,
        external_id: &str,
    ) -> Result<(), WebhookError> {
        let user = self
            .users
            .get_by_tg_id(tg_id)
            .await?
            .ok_or_else(|| WebhookError::Rejected(format!("unknown buyer: {}", tg_id)))?;
        let product = self
            .store_service
            .get_product(product_id)
            .await?
            .ok_or_else(|| WebhookError::Rejected(format!("unknown product: {}", product_id)))?;
        let item_type = product
            .parsed_type()
            .map_err(|e| WebhookError::Internal(e.into()))?;

        let amount_cents = if amount_total > 0 {
            amount_total
        } else {
            product.price
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to open fulfillment transaction")?;

        let inserted = self
            .payments
            .record_once(
                &mut tx,
                user.id,
                Some(product.id),
                self.adapter.name(),
                amount_cents,
                external_id,
            )
            .await?;

        if !inserted {
            info!(
                "Duplicate delivery for payment {}, crediting skipped",
                external_id
            );
            return Ok(());
        }

        match item_type {
            ItemType::Credits => {
                sqlx::query(
                    "UPDATE users SET credits = credits + $1, \
                     total_spent = total_spent + $2, purchase_count = purchase_count + 1 \
                     WHERE id = $3",
                )
                .bind(product.amount)
                .bind(amount_cents)
                .bind(user.id)
                .execute(&mut *tx)
                .await
                .context("Failed to credit user")?;
            }
            ItemType::Time => {
                // Stacking: extend from whichever is later, now or the
                // current expiry, so paid time is never silently lost.
                sqlx::query(
                    "UPDATE users SET session_expires_at = \
                     GREATEST(COALESCE(session_expires_at, NOW()), NOW()) + make_interval(mins => $1::int), \
                     total_spent = total_spent + $2, purchase_count = purchase_count + 1 \
                     WHERE id = $3",
                )
                .bind(product.amount)
                .bind(amount_cents)
                .bind(user.id)
                .execute(&mut *tx)
                .await
                .context("Failed to extend user session")?;
            }
        }

        tx.commit()
            .await
            .context("Failed to commit fulfillment transaction")?;

        info!(
            "Fulfilled payment {} for user {}: {} x{}",
            external_id, tg_id, item_type, product.amount
        );

        let buyer_note = match item_type {
            ItemType::Credits => format!("✅ Payment received! +{} credits.", product.amount),
            ItemType::Time => format!(
                "✅ Payment received! {} minutes of unmetered messaging added.",
                product.amount
            ),
        };
        if let Err(e) = self.bot_manager.send_notification(tg_id, &buyer_note).await {
            warn!("Failed to notify buyer {}: {}", tg_id, e);
        }
        self.bot_manager
            .notify_admins(&format!(
                "💰 {} purchased: {}",
                user.display_name(),
                StoreService::product_label(&product)
            ))
            .await;

        Ok(())
    }
}

fn checkout_payload(tg_id: i64, product_id: i64) -> String {
    format!("{}:prod:{}", tg_id, product_id)
}

fn parse_checkout_payload(reference: &str) -> Option<(i64, i64)> {
    let parts: Vec<&str> = reference.split(':').collect();
    if parts.len() != 3 || parts[1] != "prod" {
        return None;
    }
    Some((parts[0].parse().ok()?, parts[2].parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_round_trip() {
        let payload = checkout_payload(123456789, 42);
        assert_eq!(payload, "123456789:prod:42");
        assert_eq!(parse_checkout_payload(&payload), Some((123456789, 42)));
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert_eq!(parse_checkout_payload(""), None);
        assert_eq!(parse_checkout_payload("123"), None);
        assert_eq!(parse_checkout_payload("123:sub:42"), None);
        assert_eq!(parse_checkout_payload("abc:prod:42"), None);
        assert_eq!(parse_checkout_payload("1:prod:2:3"), None);
    }
}
