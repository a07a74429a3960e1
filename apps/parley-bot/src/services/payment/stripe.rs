use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use parley_db::models::store::Product;

use crate::services::payment::PaymentAdapter;

/// Webhooks older than this (or timestamped this far in the future) are
/// rejected even with a valid MAC.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

pub struct StripeAdapter {
    secret_key: String,
    webhook_secret: String,
}

impl StripeAdapter {
    pub fn new(secret_key: String, webhook_secret: String) -> Self {
        Self {
            secret_key,
            webhook_secret,
        }
    }
}

#[async_trait]
impl PaymentAdapter for StripeAdapter {
    async fn create_checkout(
        &self,
        reference: &str,
        product: &Product,
        return_url: &str,
    ) -> Result<String> {
        let mut params: Vec<(&str, String)> = vec![
            ("mode", "payment".to_string()),
            ("success_url", return_url.to_string()),
            ("cancel_url", return_url.to_string()),
            ("client_reference_id", reference.to_string()),
            ("line_items[0][quantity]", "1".to_string()),
        ];

        match &product.stripe_price_id {
            Some(price_id) => {
                params.push(("line_items[0][price]", price_id.clone()));
            }
            None => {
                params.push(("line_items[0][price_data][currency]", "usd".to_string()));
                params.push((
                    "line_items[0][price_data][product_data][name]",
                    product.name.clone(),
                ));
                params.push((
                    "line_items[0][price_data][unit_amount]",
                    product.price.to_string(),
                ));
            }
        }

        let client = reqwest::Client::new();
        let resp = client
            .post("https://api.stripe.com/v1/checkout/sessions")
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&params)
            .send()
            .await?;

        let body: serde_json::Value = resp.json().await?;
        if let Some(url) = body["url"].as_str() {
            Ok(url.to_string())
        } else {
            Err(anyhow!("Stripe Error: {:?}", body))
        }
    }

    fn verify_signature(&self, payload: &str, signature: Option<&str>) -> Result<()> {
        verify_with_time(
            payload,
            signature,
            &self.webhook_secret,
            Utc::now().timestamp(),
        )
    }

    fn name(&self) -> &str {
        "stripe"
    }
}

/// Stripe signs `"{t}.{payload}"` with HMAC-SHA256; the header carries
/// `t=<unix>,v1=<hex>` pairs.
fn verify_with_time(
    payload: &str,
    signature: Option<&str>,
    webhook_secret: &str,
    now_unix: i64,
) -> Result<()> {
    let sig = signature.ok_or_else(|| anyhow!("Missing Stripe-Signature header"))?;

    let mut timestamp = "";
    let mut sig_v1 = "";
    for part in sig.split(',') {
        if let Some(val) = part.strip_prefix("t=") {
            timestamp = val;
        } else if let Some(val) = part.strip_prefix("v1=") {
            sig_v1 = val;
        }
    }

    if timestamp.is_empty() {
        return Err(anyhow!("Missing timestamp in signature"));
    }
    if sig_v1.is_empty() {
        return Err(anyhow!("Missing v1 signature"));
    }

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| anyhow!("Malformed timestamp in signature"))?;
    if (now_unix - ts).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(anyhow!("Stripe signature timestamp outside tolerance"));
    }

    use hmac::{Hmac, Mac};
    type HmacSha256 = Hmac<sha2::Sha256>;

    let signed_payload = format!("{}.{}", timestamp, payload);
    let mut mac = HmacSha256::new_from_slice(webhook_secret.as_bytes())
        .map_err(|e| anyhow!("Invalid HMAC key: {}", e))?;
    mac.update(signed_payload.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    if sig_v1 == expected {
        Ok(())
    } else {
        Err(anyhow!("Invalid Stripe signature"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};

    const SECRET: &str = "whsec_test";
    const PAYLOAD: &str = r#"{"type":"checkout.session.completed"}"#;

    fn sign(payload: &str, secret: &str, ts: i64) -> String {
        type HmacSha256 = Hmac<sha2::Sha256>;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.{}", ts, payload).as_bytes());
        format!("t={},v1={}", ts, hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn accepts_valid_signature() {
        let now = 1_700_000_000;
        let header = sign(PAYLOAD, SECRET, now);
        assert!(verify_with_time(PAYLOAD, Some(&header), SECRET, now).is_ok());
    }

    #[test]
    fn rejects_wrong_secret() {
        let now = 1_700_000_000;
        let header = sign(PAYLOAD, "whsec_other", now);
        assert!(verify_with_time(PAYLOAD, Some(&header), SECRET, now).is_err());
    }

    #[test]
    fn rejects_tampered_payload() {
        let now = 1_700_000_000;
        let header = sign(PAYLOAD, SECRET, now);
        let tampered = r#"{"type":"checkout.session.completed","amount":1}"#;
        assert!(verify_with_time(tampered, Some(&header), SECRET, now).is_err());
    }

    #[test]
    fn rejects_missing_header() {
        assert!(verify_with_time(PAYLOAD, None, SECRET, 1_700_000_000).is_err());
    }

    #[test]
    fn rejects_stale_timestamp() {
        let signed_at = 1_700_000_000;
        let header = sign(PAYLOAD, SECRET, signed_at);
        let now = signed_at + SIGNATURE_TOLERANCE_SECS + 1;
        assert!(verify_with_time(PAYLOAD, Some(&header), SECRET, now).is_err());
    }

    #[test]
    fn accepts_within_tolerance() {
        let signed_at = 1_700_000_000;
        let header = sign(PAYLOAD, SECRET, signed_at);
        let now = signed_at + SIGNATURE_TOLERANCE_SECS - 1;
        assert!(verify_with_time(PAYLOAD, Some(&header), SECRET, now).is_ok());
    }
}
