use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use parley_db::models::store::User;
use parley_db::repositories::UserRepository;
use teloxide::types::Message;
use tracing::debug;

use crate::services::settings_service::SettingsService;

/// Chargeable message classes. Costs are settings-driven per kind, with the
/// compiled-in defaults matching the seed migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Photo,
    Voice,
    Video,
    VideoNote,
    Audio,
    Document,
    Sticker,
    Other,
}

impl MessageKind {
    pub fn classify(msg: &Message) -> Self {
        if msg.text().is_some() {
            MessageKind::Text
        } else if msg.photo().is_some() {
            MessageKind::Photo
        } else if msg.voice().is_some() {
            MessageKind::Voice
        } else if msg.video().is_some() {
            MessageKind::Video
        } else if msg.video_note().is_some() {
            MessageKind::VideoNote
        } else if msg.audio().is_some() {
            MessageKind::Audio
        } else if msg.document().is_some() {
            MessageKind::Document
        } else if msg.sticker().is_some() {
            MessageKind::Sticker
        } else {
            MessageKind::Other
        }
    }

    pub fn settings_key(&self) -> &'static str {
        match self {
            MessageKind::Text => "cost_text",
            MessageKind::Photo => "cost_photo",
            MessageKind::Voice => "cost_voice",
            MessageKind::Video => "cost_video",
            MessageKind::VideoNote => "cost_video_note",
            MessageKind::Audio => "cost_audio",
            MessageKind::Document => "cost_document",
            MessageKind::Sticker => "cost_sticker",
            MessageKind::Other => "cost_other",
        }
    }

    pub fn default_cost(&self) -> i64 {
        match self {
            MessageKind::Text => 1,
            MessageKind::Photo => 3,
            MessageKind::Voice => 5,
            MessageKind::Video => 5,
            MessageKind::VideoNote => 5,
            MessageKind::Audio => 5,
            MessageKind::Document => 3,
            MessageKind::Sticker => 1,
            MessageKind::Other => 1,
        }
    }

    pub fn from_key_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "text" => Some(MessageKind::Text),
            "photo" => Some(MessageKind::Photo),
            "voice" => Some(MessageKind::Voice),
            "video" => Some(MessageKind::Video),
            "video_note" => Some(MessageKind::VideoNote),
            "audio" => Some(MessageKind::Audio),
            "document" => Some(MessageKind::Document),
            "sticker" => Some(MessageKind::Sticker),
            "other" => Some(MessageKind::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeOutcome {
    Allowed { cost: i64, via_session: bool },
    InsufficientCredits { cost: i64, balance: i64 },
}

/// The message gate. Any database failure propagates as `Err` and the
/// caller must reject the message: the gate fails closed, it never grants
/// free access.
pub struct BillingService {
    users: UserRepository,
    settings: Arc<SettingsService>,
}

impl BillingService {
    pub fn new(users: UserRepository, settings: Arc<SettingsService>) -> Self {
        Self { users, settings }
    }

    pub async fn charge_for_message(
        &self,
        user: &User,
        kind: MessageKind,
    ) -> Result<ChargeOutcome> {
        let cost = self.settings.message_cost(kind).await;

        if cost == 0 {
            self.users.touch_last_active(user.id).await?;
            return Ok(ChargeOutcome::Allowed {
                cost: 0,
                via_session: false,
            });
        }

        // An active time window covers any kind unconditionally. Expired
        // windows fall through to the credit path.
        if user.has_active_session(Utc::now()) {
            self.users.touch_last_active(user.id).await?;
            return Ok(ChargeOutcome::Allowed {
                cost,
                via_session: true,
            });
        }

        if self.users.try_debit(user.id, cost).await? {
            debug!("Charged user {} {} credits for {:?}", user.id, cost, kind);
            return Ok(ChargeOutcome::Allowed {
                cost,
                via_session: false,
            });
        }

        // Re-read for an accurate balance in the rejection prompt; the
        // cached row may predate the failed debit.
        let balance = self
            .users
            .get_by_id(user.id)
            .await?
            .map(|u| u.credits)
            .unwrap_or(user.credits);

        Ok(ChargeOutcome::InsufficientCredits { cost, balance })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_keys_match_kind_suffixes() {
        let kinds = [
            MessageKind::Text,
            MessageKind::Photo,
            MessageKind::Voice,
            MessageKind::Video,
            MessageKind::VideoNote,
            MessageKind::Audio,
            MessageKind::Document,
            MessageKind::Sticker,
            MessageKind::Other,
        ];
        for kind in kinds {
            let suffix = kind.settings_key().strip_prefix("cost_").unwrap();
            assert_eq!(MessageKind::from_key_suffix(suffix), Some(kind));
        }
    }

    #[test]
    fn default_costs_are_positive() {
        assert_eq!(MessageKind::Text.default_cost(), 1);
        assert_eq!(MessageKind::Voice.default_cost(), 5);
        assert!(MessageKind::Other.default_cost() > 0);
    }
}
