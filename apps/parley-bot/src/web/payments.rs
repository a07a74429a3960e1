use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use tracing::{error, info, warn};

use crate::services::pay_service::WebhookError;
use crate::state::AppState;

/// Stripe webhook endpoint. Signature failures and malformed payloads are
/// 4xx with no state mutated; processing failures are 5xx so Stripe
/// redelivers; everything else (including ignored event types) is 200.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    info!("Received payment webhook from stripe");

    let signature = headers
        .get("stripe-signature")
        .and_then(|h| h.to_str().ok());

    match state.pay_service.handle_webhook(&body, signature).await {
        Ok(()) => StatusCode::OK,
        Err(WebhookError::Rejected(reason)) => {
            warn!("Rejected payment webhook: {}", reason);
            StatusCode::BAD_REQUEST
        }
        Err(WebhookError::Internal(e)) => {
            error!("Failed to process payment webhook: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
