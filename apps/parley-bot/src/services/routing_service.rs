use anyhow::{Context, Result};
use parley_db::models::store::{Tier, Topic, User};
use parley_db::repositories::{TopicRepository, UserRepository};
use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode, ThreadId};
use tracing::{error, warn};

use crate::bot::utils::escape_html;

/// Resolution of a user's dedicated thread in the operator group. `Stale`
/// means we hold a mapping but the remote topic is known-deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicState {
    Found(i32),
    Stale,
    Missing,
}

/// Two-way bridge between end users and the operator group's forum topics.
pub struct RoutingService {
    topics: TopicRepository,
    users: UserRepository,
    admin_group_id: i64,
}

impl RoutingService {
    pub fn new(topics: TopicRepository, users: UserRepository, admin_group_id: i64) -> Self {
        Self {
            topics,
            users,
            admin_group_id,
        }
    }

    pub async fn resolve_topic(&self, user_id: i64) -> Result<TopicState> {
        let row = self.topics.get_by_user_id(user_id).await?;
        Ok(topic_state(row.as_ref()))
    }

    /// Forward a charged user message into the user's thread. Recovery is
    /// explicit: a deleted remote topic gets one recreate attempt, then the
    /// message falls back to flat forwarding into the group's general chat.
    /// Either way the routing counters are updated.
    pub async fn forward_user_message(&self, bot: &Bot, user: &User, msg: &Message) -> Result<()> {
        let existing = self.topics.get_by_user_id(user.id).await?;

        let thread = match topic_state(existing.as_ref()) {
            TopicState::Found(thread_id) => Some(thread_id),
            TopicState::Stale | TopicState::Missing => self.create_topic(bot, user).await,
        };

        let delivered = match thread {
            Some(thread_id) => match self.copy_into_thread(bot, msg, thread_id).await {
                Ok(()) => true,
                Err(e) if is_thread_missing(&e) => {
                    warn!(
                        "Thread {} for user {} is gone, recreating",
                        thread_id, user.id
                    );
                    self.topics.mark_stale(user.id).await?;
                    match self.create_topic(bot, user).await {
                        Some(new_thread) => {
                            self.copy_into_thread(bot, msg, new_thread).await.is_ok()
                        }
                        None => false,
                    }
                }
                Err(e) => return Err(e).context("Failed to forward message into thread"),
            },
            None => false,
        };

        if !delivered {
            self.flat_forward(bot, user, msg).await?;
        }

        let unread = existing.as_ref().map(|t| t.unread_count).unwrap_or(0) + 1;
        let priority = compute_priority(unread, 0, user.tier());
        self.topics.record_user_message(user.id, priority).await?;

        Ok(())
    }

    /// Resolve an operator reply in a thread back to its user and deliver
    /// it to that user only. `Ok(None)` means the thread is not mapped.
    pub async fn deliver_admin_reply(
        &self,
        bot: &Bot,
        thread_id: i32,
        msg: &Message,
    ) -> Result<Option<User>> {
        let Some(topic) = self.topics.get_by_thread_id(thread_id).await? else {
            return Ok(None);
        };
        let Some(user) = self.users.get_by_id(topic.user_id).await? else {
            return Ok(None);
        };

        bot.copy_message(ChatId(user.tg_id), msg.chat.id, msg.id)
            .await
            .context("Failed to deliver reply to user")?;

        self.topics.record_admin_reply(user.id).await?;
        Ok(Some(user))
    }

    /// Look up the user a thread belongs to without delivering anything.
    pub async fn user_for_thread(&self, thread_id: i32) -> Result<Option<User>> {
        let Some(topic) = self.topics.get_by_thread_id(thread_id).await? else {
            return Ok(None);
        };
        self.users.get_by_id(topic.user_id).await
    }

    /// Conversations with unread user messages, highest stored priority
    /// first.
    pub async fn waiting_conversations(&self, limit: i64) -> Result<Vec<(Topic, User)>> {
        let topics = self.topics.list_by_priority(limit).await?;
        let mut out = Vec::with_capacity(topics.len());
        for topic in topics {
            if let Some(user) = self.users.get_by_id(topic.user_id).await? {
                out.push((topic, user));
            }
        }
        Ok(out)
    }

    async fn create_topic(&self, bot: &Bot, user: &User) -> Option<i32> {
        let title = topic_title(user);
        match bot
            .create_forum_topic(ChatId(self.admin_group_id), title)
            .await
        {
            Ok(topic) => {
                let thread_id = topic.thread_id.0.0;
                if let Err(e) = self.topics.upsert(user.id, thread_id).await {
                    error!("Failed to persist topic mapping for {}: {}", user.id, e);
                    return None;
                }

                // Info card pinned into the fresh thread, best effort.
                if let Ok(sent) = bot
                    .send_message(ChatId(self.admin_group_id), user_card(user))
                    .message_thread_id(topic.thread_id)
                    .parse_mode(ParseMode::Html)
                    .await
                {
                    let _ = bot
                        .pin_chat_message(ChatId(self.admin_group_id), sent.id)
                        .await;
                }

                Some(thread_id)
            }
            Err(e) => {
                error!("Failed to create forum topic for {}: {}", user.id, e);
                None
            }
        }
    }

    async fn copy_into_thread(
        &self,
        bot: &Bot,
        msg: &Message,
        thread_id: i32,
    ) -> Result<(), teloxide::RequestError> {
        bot.copy_message(ChatId(self.admin_group_id), msg.chat.id, msg.id)
            .message_thread_id(ThreadId(MessageId(thread_id)))
            .await?;
        Ok(())
    }

    async fn flat_forward(&self, bot: &Bot, user: &User, msg: &Message) -> Result<()> {
        let _ = bot
            .send_message(
                ChatId(self.admin_group_id),
                format!(
                    "📨 From {} (id <code>{}</code>):",
                    escape_html(&user.display_name()),
                    user.tg_id
                ),
            )
            .parse_mode(ParseMode::Html)
            .await;

        bot.copy_message(ChatId(self.admin_group_id), msg.chat.id, msg.id)
            .await
            .context("Failed flat forward to admin group")?;
        Ok(())
    }
}

fn topic_state(row: Option<&Topic>) -> TopicState {
    match row {
        None => TopicState::Missing,
        Some(t) if t.is_stale => TopicState::Stale,
        Some(t) => TopicState::Found(t.thread_id),
    }
}

/// Telegram reports a deleted/absent topic as a generic API error; there is
/// no dedicated variant to match on.
fn is_thread_missing(err: &teloxide::RequestError) -> bool {
    match err {
        teloxide::RequestError::Api(api) => {
            let text = api.to_string().to_lowercase();
            text.contains("thread not found") || text.contains("topic_deleted")
        }
        _ => false,
    }
}

/// Conversation priority, recomputed on each user message: unread pressure,
/// recency, and who is paying.
pub fn compute_priority(unread: i32, idle_minutes: i64, tier: Tier) -> f64 {
    let unread_part = f64::from(unread.max(0)) * 10.0;
    let recency_part = (120 - idle_minutes).max(0) as f64;
    unread_part + recency_part + tier.priority_weight()
}

fn topic_title(user: &User) -> String {
    let badge = user.tier().badge();
    if badge.is_empty() {
        format!("{} · {}", user.display_name(), user.tg_id)
    } else {
        format!("{} {} · {}", badge, user.display_name(), user.tg_id)
    }
}

fn user_card(user: &User) -> String {
    format!(
        "👤 <b>{}</b>\nid: <code>{}</code>\ntier: {}\ncredits: {}\nmember since: {}",
        escape_html(&user.display_name()),
        user.tg_id,
        user.tier(),
        user.credits,
        user.created_at.format("%Y-%m-%d")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn topic_row(thread_id: i32, is_stale: bool) -> Topic {
        Topic {
            id: 1,
            user_id: 1,
            thread_id,
            last_user_msg_at: None,
            last_admin_msg_at: None,
            unread_count: 0,
            priority: 0.0,
            is_stale,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn topic_state_tags() {
        assert_eq!(topic_state(None), TopicState::Missing);
        assert_eq!(topic_state(Some(&topic_row(7, true))), TopicState::Stale);
        assert_eq!(topic_state(Some(&topic_row(7, false))), TopicState::Found(7));
    }

    #[test]
    fn priority_orders_by_unread() {
        let quiet = compute_priority(1, 0, Tier::Standard);
        let busy = compute_priority(5, 0, Tier::Standard);
        assert!(busy > quiet);
    }

    #[test]
    fn priority_rewards_paying_tiers() {
        let standard = compute_priority(1, 0, Tier::Standard);
        let vip = compute_priority(1, 0, Tier::Vip);
        assert!(vip > standard);
    }

    #[test]
    fn priority_decays_with_idle_time() {
        let fresh = compute_priority(1, 0, Tier::Standard);
        let old = compute_priority(1, 600, Tier::Standard);
        assert!(fresh > old);
        // Recency bottoms out instead of going negative.
        assert_eq!(old, compute_priority(1, 6000, Tier::Standard));
    }
}
