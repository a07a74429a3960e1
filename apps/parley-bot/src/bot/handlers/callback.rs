use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::{error, info};
use url::Url;

use crate::bot::keyboards;
use crate::state::AppState;

pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    info!("Received callback: {:?}", q.data);
    let callback_id = q.id.clone();
    let tg_id = q.from.id.0 as i64;

    if let Some(data) = q.data {
        if let Some(id_str) = data.strip_prefix("buy_") {
            let product_id: i64 = id_str.parse().unwrap_or(0);

            match start_checkout(&state, tg_id, product_id).await {
                Ok(url) => {
                    let _ = bot.answer_callback_query(callback_id).await;
                    let _ = bot
                        .send_message(
                            ChatId(tg_id),
                            "💳 Your checkout is ready — the link is valid for a short while:",
                        )
                        .parse_mode(ParseMode::Html)
                        .reply_markup(keyboards::checkout_keyboard(url))
                        .await;
                }
                Err(e) => {
                    error!("Checkout creation failed for {}: {:#}", tg_id, e);
                    let _ = bot
                        .answer_callback_query(callback_id)
                        .text("❌ Could not create the checkout. Try again later.")
                        .show_alert(true)
                        .await;
                }
            }
            return Ok(());
        }
    }

    let _ = bot.answer_callback_query(callback_id).await;
    Ok(())
}

async fn start_checkout(state: &AppState, tg_id: i64, product_id: i64) -> anyhow::Result<Url> {
    let user = state
        .users
        .get_by_tg_id(tg_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Unknown user {}", tg_id))?;
    if user.is_banned {
        return Err(anyhow::anyhow!("User {} is banned", tg_id));
    }

    let product = state
        .store_service
        .get_product(product_id)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| anyhow::anyhow!("Unknown or inactive product {}", product_id))?;

    let url = state.pay_service.create_checkout_for(&user, &product).await?;
    Url::parse(&url).map_err(|e| anyhow::anyhow!("Stripe returned a bad URL: {}", e))
}
