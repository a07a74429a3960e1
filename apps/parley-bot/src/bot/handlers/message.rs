use anyhow::Result;
use chrono::Utc;
use parley_db::models::store::User;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::error;

use crate::bot::handlers::admin;
use crate::bot::keyboards::{self, BTN_BALANCE, BTN_BUY, BTN_HELP};
use crate::bot::utils::escape_html;
use crate::services::billing_service::{ChargeOutcome, MessageKind};
use crate::state::AppState;

pub async fn message_handler(
    bot: Bot,
    msg: Message,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    if msg.chat.id.0 == state.config.admin_group_id {
        if let Err(e) = admin::handle_admin_group_message(&bot, &msg, &state).await {
            error!("Admin group handler error: {:#}", e);
        }
        return Ok(());
    }

    // Everything else only matters in one-on-one chats.
    if !msg.chat.is_private() {
        return Ok(());
    }

    if let Err(e) = handle_private_message(&bot, &msg, &state).await {
        error!("Private message handler error: {:#}", e);
        let _ = bot
            .send_message(
                msg.chat.id,
                "⚠️ Something went wrong. Please try again later.",
            )
            .await;
    }
    Ok(())
}

async fn handle_private_message(bot: &Bot, msg: &Message, state: &AppState) -> Result<()> {
    let tg_id = msg.chat.id.0;
    let text = msg.text().unwrap_or("");

    if text.starts_with("/start") {
        let full_name = msg.from.as_ref().map(|u| u.full_name());
        let user = state
            .users
            .upsert(
                tg_id,
                msg.from.as_ref().and_then(|u| u.username.as_deref()),
                full_name.as_deref(),
            )
            .await?;

        if user.is_banned {
            send_banned_notice(bot, msg).await;
            return Ok(());
        }

        bot.send_message(
            msg.chat.id,
            format!(
                "👋 Welcome, <b>{}</b>!\n\n\
                 This is a direct line to our team. Each message costs a few \
                 credits depending on its kind (text is cheapest), or is free \
                 while a paid time window is active.\n\n\
                 💰 You have <b>{}</b> credits. Use {} to top up.",
                escape_html(&user.display_name()),
                user.credits,
                BTN_BUY
            ),
        )
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::main_menu())
        .await?;
        return Ok(());
    }

    let Some(user) = state.users.get_by_tg_id(tg_id).await? else {
        bot.send_message(msg.chat.id, "Please send /start first.")
            .await?;
        return Ok(());
    };

    if user.is_banned {
        send_banned_notice(bot, msg).await;
        return Ok(());
    }

    match text {
        "/balance" | BTN_BALANCE => send_balance(bot, msg, &user).await,
        "/buy" | BTN_BUY => send_catalog(bot, msg, state).await,
        "/help" | BTN_HELP => send_help(bot, msg, state).await,
        t if t.starts_with('/') => {
            bot.send_message(msg.chat.id, "Unknown command. Try /help.")
                .await?;
            Ok(())
        }
        _ => gate_and_forward(bot, msg, &user, state).await,
    }
}

/// The paid path: charge first, forward only on success. A database error
/// rejects the message — the gate fails closed rather than granting free
/// access.
async fn gate_and_forward(bot: &Bot, msg: &Message, user: &User, state: &AppState) -> Result<()> {
    let kind = MessageKind::classify(msg);

    let outcome = match state.billing_service.charge_for_message(user, kind).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Message gate failed closed for user {}: {:#}", user.id, e);
            bot.send_message(
                msg.chat.id,
                "⚠️ We could not process your message right now. It was not \
                 delivered and nothing was charged. Please try again shortly.",
            )
            .await?;
            return Ok(());
        }
    };

    match outcome {
        ChargeOutcome::Allowed { .. } => {
            state.routing_service.forward_user_message(bot, user, msg).await
        }
        ChargeOutcome::InsufficientCredits { cost, balance } => {
            let products = state.store_service.list_products().await.unwrap_or_default();
            let mut req = bot
                .send_message(
                    msg.chat.id,
                    format!(
                        "💸 <b>Insufficient balance.</b>\n\nThis message costs \
                         <b>{}</b> credits and you have <b>{}</b>. Top up to \
                         continue the conversation:",
                        cost, balance
                    ),
                )
                .parse_mode(ParseMode::Html);
            if !products.is_empty() {
                req = req.reply_markup(keyboards::products_keyboard(&products));
            }
            req.await?;
            Ok(())
        }
    }
}

async fn send_balance(bot: &Bot, msg: &Message, user: &User) -> Result<()> {
    let now = Utc::now();
    let session_line = match user.session_expires_at {
        Some(exp) if exp > now => {
            let mins = (exp - now).num_minutes();
            format!("⏱ Unmetered session: <b>{} min</b> remaining\n", mins)
        }
        _ => String::new(),
    };

    bot.send_message(
        msg.chat.id,
        format!(
            "💰 Credits: <b>{}</b>\n{}🏅 Tier: <b>{}</b>\n📈 Lifetime spend: ${:.2}",
            user.credits,
            session_line,
            user.tier(),
            user.total_spent as f64 / 100.0
        ),
    )
    .parse_mode(ParseMode::Html)
    .await?;
    Ok(())
}

async fn send_catalog(bot: &Bot, msg: &Message, state: &AppState) -> Result<()> {
    let products = state.store_service.list_products().await?;
    if products.is_empty() {
        bot.send_message(msg.chat.id, "The store is empty right now. Check back later.")
            .await?;
        return Ok(());
    }

    bot.send_message(msg.chat.id, "🛒 <b>Choose a package:</b>")
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::products_keyboard(&products))
        .await?;
    Ok(())
}

async fn send_help(bot: &Bot, msg: &Message, state: &AppState) -> Result<()> {
    let costs = [
        MessageKind::Text,
        MessageKind::Photo,
        MessageKind::Voice,
        MessageKind::Video,
        MessageKind::Document,
    ];
    let mut lines = String::new();
    for kind in costs {
        let cost = state.settings.message_cost(kind).await;
        let label = kind.settings_key().strip_prefix("cost_").unwrap_or("?");
        lines.push_str(&format!("  • {}: {} credits\n", label, cost));
    }

    bot.send_message(
        msg.chat.id,
        format!(
            "❓ <b>How it works</b>\n\n\
             Write here and our team answers personally. Message costs:\n{}\n\
             A purchased time window makes messaging free until it expires.\n\n\
             /balance — your credits and session\n\
             /buy — top up",
            lines
        ),
    )
    .parse_mode(ParseMode::Html)
    .await?;
    Ok(())
}

async fn send_banned_notice(bot: &Bot, msg: &Message) {
    let _ = bot
        .send_message(msg.chat.id, "🚫 <b>Access denied.</b>")
        .parse_mode(ParseMode::Html)
        .await;
}
