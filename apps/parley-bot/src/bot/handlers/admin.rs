use anyhow::Result;
use chrono::Utc;
use parley_db::models::store::{ItemType, User};
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::warn;

use crate::bot::utils::escape_html;
use crate::services::billing_service::MessageKind;
use crate::services::routing_service::{TopicState, compute_priority};
use crate::services::store_service::StoreService;
use crate::state::AppState;

/// Everything arriving in the operator group: slash commands from admins,
/// and plain replies inside a user's thread (delivered to that user).
pub async fn handle_admin_group_message(bot: &Bot, msg: &Message, state: &AppState) -> Result<()> {
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    // Ignore our own copies and topic service messages.
    if from.is_bot {
        return Ok(());
    }

    let text = msg.text().unwrap_or("");
    if let Some(cmd_line) = text.strip_prefix('/') {
        if !state.config.is_admin(from.id.0 as i64) {
            reply_in_place(bot, msg, "Not authorized.".to_string()).await?;
            return Ok(());
        }
        return handle_admin_command(bot, msg, state, cmd_line).await;
    }

    // Operator reply inside a mapped thread → route to the user.
    let Some(thread_id) = msg.thread_id else {
        return Ok(());
    };
    match state
        .routing_service
        .deliver_admin_reply(bot, thread_id.0.0, msg)
        .await
    {
        Ok(Some(_)) => {}
        Ok(None) => {
            // Operators chatting in an unmapped thread; nothing to route.
        }
        Err(e) => {
            warn!("Failed to deliver admin reply: {:#}", e);
            reply_in_place(
                bot,
                msg,
                "❌ Could not deliver the reply (user may have blocked the bot).".to_string(),
            )
            .await?;
        }
    }
    Ok(())
}

async fn handle_admin_command(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    cmd_line: &str,
) -> Result<()> {
    let mut parts = cmd_line.split_whitespace();
    let command = parts
        .next()
        .unwrap_or("")
        .split('@')
        .next()
        .unwrap_or("");
    let args: Vec<&str> = parts.collect();

    match command {
        "ban" | "unban" => {
            let banned = command == "ban";
            let Some(user) = target_user(state, msg, args.first().copied()).await? else {
                reply_in_place(bot, msg, "No target user. Use inside a thread or pass a tg id.".to_string()).await?;
                return Ok(());
            };
            state.users.set_banned(user.id, banned).await?;
            let verb = if banned { "banned" } else { "unbanned" };
            reply_in_place(
                bot,
                msg,
                format!("✅ {} {}.", escape_html(&user.display_name()), verb),
            )
            .await?;
        }
        "credit" => {
            // `/credit 50` inside a thread, `/credit <tg_id> 50` anywhere.
            let (target_arg, amount_arg) = match args.as_slice() {
                [amount] => (None, *amount),
                [tg_id, amount] => (Some(*tg_id), *amount),
                _ => {
                    reply_in_place(bot, msg, "Usage: /credit [tg_id] <amount>".to_string())
                        .await?;
                    return Ok(());
                }
            };
            let Ok(amount) = amount_arg.parse::<i64>() else {
                reply_in_place(bot, msg, "Amount must be an integer.".to_string()).await?;
                return Ok(());
            };
            let Some(user) = target_user(state, msg, target_arg).await? else {
                reply_in_place(bot, msg, "No target user.".to_string()).await?;
                return Ok(());
            };
            state.users.adjust_credits(user.id, amount).await?;
            reply_in_place(
                bot,
                msg,
                format!(
                    "✅ Adjusted {} by {} credits.",
                    escape_html(&user.display_name()),
                    amount
                ),
            )
            .await?;
            if amount > 0 {
                let _ = state
                    .bot_manager
                    .send_notification(
                        user.tg_id,
                        &format!("🎁 You received {} credits from the team.", amount),
                    )
                    .await;
            }
        }
        "who" => {
            let Some(user) = target_user(state, msg, args.first().copied()).await? else {
                reply_in_place(bot, msg, "No target user.".to_string()).await?;
                return Ok(());
            };
            let mut card = profile_card(&user);
            match state.routing_service.resolve_topic(user.id).await? {
                TopicState::Found(thread_id) => {
                    card.push_str(&format!("\n🧵 thread: {}", thread_id));
                }
                TopicState::Stale => card.push_str("\n🧵 thread: stale"),
                TopicState::Missing => {}
            }
            let recent = state.payments.recent_for_user(user.id, 5).await?;
            if !recent.is_empty() {
                card.push_str("\n\n🧾 <b>Recent payments</b>");
                for p in recent {
                    card.push_str(&format!(
                        "\n{} — ${:.2} via {}",
                        p.created_at.format("%Y-%m-%d"),
                        p.amount as f64 / 100.0,
                        p.method
                    ));
                }
            }
            reply_in_place(bot, msg, card).await?;
        }
        "queue" => {
            let waiting = state.routing_service.waiting_conversations(10).await?;
            if waiting.is_empty() {
                reply_in_place(bot, msg, "Queue is empty — nothing unread. 🎉".to_string())
                    .await?;
                return Ok(());
            }
            let now = Utc::now();
            let mut lines = String::from("📋 <b>Waiting conversations</b>\n");
            for (topic, user) in waiting {
                let idle = topic
                    .last_user_msg_at
                    .map(|ts| (now - ts).num_minutes())
                    .unwrap_or(0);
                let score = compute_priority(topic.unread_count, idle, user.tier());
                lines.push_str(&format!(
                    "{:>4.0} · {} — {} unread, idle {}m\n",
                    score,
                    escape_html(&user.display_name()),
                    topic.unread_count,
                    idle
                ));
            }
            reply_in_place(bot, msg, lines).await?;
        }
        "products" => {
            let products = state.store_service.list_all_products().await?;
            if products.is_empty() {
                reply_in_place(bot, msg, "No products configured.".to_string()).await?;
                return Ok(());
            }
            let mut lines = String::from("📦 <b>Products</b>\n");
            for p in products {
                let flag = if p.is_active { "" } else { " (inactive)" };
                lines.push_str(&format!(
                    "#{} {}{}\n",
                    p.id,
                    escape_html(&StoreService::product_label(&p)),
                    flag
                ));
            }
            reply_in_place(bot, msg, lines).await?;
        }
        "addproduct" => {
            let spec = cmd_line
                .strip_prefix("addproduct")
                .unwrap_or("")
                .trim();
            let Some((name, price, item_type, amount)) = parse_product_spec(spec) else {
                reply_in_place(
                    bot,
                    msg,
                    "Usage: /addproduct name;price_cents;credits|time;amount".to_string(),
                )
                .await?;
                return Ok(());
            };
            let product = state
                .store_service
                .create_product(&name, price, item_type, amount)
                .await?;
            reply_in_place(
                bot,
                msg,
                format!(
                    "✅ Created #{}: {}",
                    product.id,
                    escape_html(&StoreService::product_label(&product))
                ),
            )
            .await?;
        }
        "delproduct" => {
            let Some(id) = args.first().and_then(|a| a.parse::<i64>().ok()) else {
                reply_in_place(bot, msg, "Usage: /delproduct <id>".to_string()).await?;
                return Ok(());
            };
            if state.store_service.deactivate_product(id).await? {
                reply_in_place(bot, msg, format!("✅ Product #{} deactivated.", id)).await?;
            } else {
                reply_in_place(bot, msg, format!("No product #{}.", id)).await?;
            }
        }
        "setcost" => {
            let (Some(kind_arg), Some(cost_arg)) = (args.first(), args.get(1)) else {
                reply_in_place(bot, msg, "Usage: /setcost <kind> <credits>".to_string()).await?;
                return Ok(());
            };
            let Some(kind) = MessageKind::from_key_suffix(kind_arg) else {
                reply_in_place(
                    bot,
                    msg,
                    "Unknown kind. One of: text, photo, voice, video, video_note, audio, document, sticker, other".to_string(),
                )
                .await?;
                return Ok(());
            };
            let Ok(cost) = cost_arg.parse::<i64>() else {
                reply_in_place(bot, msg, "Cost must be a non-negative integer.".to_string())
                    .await?;
                return Ok(());
            };
            if cost < 0 {
                reply_in_place(bot, msg, "Cost must be a non-negative integer.".to_string())
                    .await?;
                return Ok(());
            }
            state
                .settings
                .set(kind.settings_key(), &cost.to_string())
                .await?;
            reply_in_place(bot, msg, format!("✅ {} now costs {}.", kind_arg, cost)).await?;
        }
        _ => {
            reply_in_place(
                bot,
                msg,
                "Commands: /ban /unban /credit /who /queue /products /addproduct /delproduct /setcost"
                    .to_string(),
            )
            .await?;
        }
    }
    Ok(())
}

/// Resolve a command target: an explicit tg id argument wins, otherwise the
/// user mapped to the surrounding thread.
async fn target_user(
    state: &AppState,
    msg: &Message,
    arg: Option<&str>,
) -> Result<Option<User>> {
    if let Some(arg) = arg {
        if let Ok(tg_id) = arg.parse::<i64>() {
            return state.users.get_by_tg_id(tg_id).await;
        }
    }
    if let Some(thread_id) = msg.thread_id {
        return state.routing_service.user_for_thread(thread_id.0.0).await;
    }
    Ok(None)
}

async fn reply_in_place(bot: &Bot, msg: &Message, text: String) -> Result<()> {
    let mut req = bot
        .send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html);
    if let Some(thread_id) = msg.thread_id {
        req = req.message_thread_id(thread_id);
    }
    req.await?;
    Ok(())
}

fn profile_card(user: &User) -> String {
    let banned = if user.is_banned { "\n🚫 banned" } else { "" };
    format!(
        "👤 <b>{}</b>\nid: <code>{}</code>\ntier: {}\ncredits: {}\npurchases: {} (${:.2}){}",
        escape_html(&user.display_name()),
        user.tg_id,
        user.tier(),
        user.credits,
        user.purchase_count,
        user.total_spent as f64 / 100.0,
        banned
    )
}

/// "name;price_cents;credits|time;amount"
fn parse_product_spec(spec: &str) -> Option<(String, i64, ItemType, i64)> {
    let parts: Vec<&str> = spec.split(';').map(str::trim).collect();
    if parts.len() != 4 {
        return None;
    }
    let name = parts[0];
    if name.is_empty() {
        return None;
    }
    let price: i64 = parts[1].parse().ok()?;
    let item_type: ItemType = parts[2].parse().ok()?;
    let amount: i64 = parts[3].parse().ok()?;
    Some((name.to_string(), price, item_type, amount))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_spec_parsing() {
        assert_eq!(
            parse_product_spec("Starter pack;500;credits;25"),
            Some(("Starter pack".to_string(), 500, ItemType::Credits, 25))
        );
        assert_eq!(
            parse_product_spec("Hour pass ; 1500 ; time ; 60"),
            Some(("Hour pass".to_string(), 1500, ItemType::Time, 60))
        );
        assert_eq!(parse_product_spec(""), None);
        assert_eq!(parse_product_spec("a;b;c"), None);
        assert_eq!(parse_product_spec("x;100;plan;5"), None);
        assert_eq!(parse_product_spec(";100;credits;5"), None);
    }
}
