use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub tg_id: i64,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub credits: i64,
    pub session_expires_at: Option<DateTime<Utc>>,
    pub is_banned: bool,
    pub total_spent: i64,
    pub purchase_count: i32,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl User {
    /// Derived at read time so threshold changes re-tier everyone.
    pub fn tier(&self) -> Tier {
        Tier::from_total_spent(self.total_spent)
    }

    pub fn has_active_session(&self, now: DateTime<Utc>) -> bool {
        self.session_expires_at.map(|exp| exp > now).unwrap_or(false)
    }

    pub fn display_name(&self) -> String {
        self.full_name
            .clone()
            .or_else(|| self.username.as_ref().map(|u| format!("@{}", u)))
            .unwrap_or_else(|| self.tg_id.to_string())
    }
}

/// Spending tiers, in cents of lifetime spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    Standard,
    Regular,
    Vip,
}

const REGULAR_THRESHOLD_CENTS: i64 = 2_500;
const VIP_THRESHOLD_CENTS: i64 = 10_000;

impl Tier {
    pub fn from_total_spent(total_spent: i64) -> Self {
        if total_spent >= VIP_THRESHOLD_CENTS {
            Tier::Vip
        } else if total_spent >= REGULAR_THRESHOLD_CENTS {
            Tier::Regular
        } else {
            Tier::Standard
        }
    }

    pub fn badge(&self) -> &'static str {
        match self {
            Tier::Standard => "",
            Tier::Regular => "⭐",
            Tier::Vip => "💎",
        }
    }

    /// Weight used by conversation priority scoring.
    pub fn priority_weight(&self) -> f64 {
        match self {
            Tier::Standard => 0.0,
            Tier::Regular => 20.0,
            Tier::Vip => 50.0,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Standard => write!(f, "Standard"),
            Tier::Regular => write!(f, "Regular"),
            Tier::Vip => write!(f, "VIP"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub stripe_price_id: Option<String>,
    pub item_type: String, // 'credits', 'time'
    pub amount: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn parsed_type(&self) -> Result<ItemType, ParseItemTypeError> {
        self.item_type.parse()
    }
}

/// What a product grants on fulfillment: credits, or minutes of unmetered
/// messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemType {
    Credits,
    Time,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown product item type: {0}")]
pub struct ParseItemTypeError(String);

impl FromStr for ItemType {
    type Err = ParseItemTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credits" => Ok(ItemType::Credits),
            "time" => Ok(ItemType::Time),
            other => Err(ParseItemTypeError(other.to_string())),
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemType::Credits => write!(f, "credits"),
            ItemType::Time => write!(f, "time"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: i64,
    pub user_id: i64,
    pub product_id: Option<i64>,
    pub method: String,
    pub amount: i64,
    pub external_id: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Topic {
    pub id: i64,
    pub user_id: i64,
    pub thread_id: i32,
    pub last_user_msg_at: Option<DateTime<Utc>>,
    pub last_admin_msg_at: Option<DateTime<Utc>>,
    pub unread_count: i32,
    pub priority: f64,
    pub is_stale: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn tier_thresholds() {
        assert_eq!(Tier::from_total_spent(0), Tier::Standard);
        assert_eq!(Tier::from_total_spent(2_499), Tier::Standard);
        assert_eq!(Tier::from_total_spent(2_500), Tier::Regular);
        assert_eq!(Tier::from_total_spent(9_999), Tier::Regular);
        assert_eq!(Tier::from_total_spent(10_000), Tier::Vip);
    }

    #[test]
    fn item_type_round_trip() {
        assert_eq!("credits".parse::<ItemType>().unwrap(), ItemType::Credits);
        assert_eq!("time".parse::<ItemType>().unwrap(), ItemType::Time);
        assert!("subscription".parse::<ItemType>().is_err());
    }

    fn user_with_session(expires: Option<DateTime<Utc>>) -> User {
        User {
            id: 1,
            tg_id: 100,
            username: None,
            full_name: None,
            credits: 0,
            session_expires_at: expires,
            is_banned: false,
            total_spent: 0,
            purchase_count: 0,
            created_at: Utc::now(),
            last_active_at: Utc::now(),
        }
    }

    #[test]
    fn expired_session_is_inactive() {
        let now = Utc::now();
        let expired = user_with_session(Some(now - Duration::minutes(1)));
        let active = user_with_session(Some(now + Duration::minutes(1)));
        let none = user_with_session(None);

        assert!(!expired.has_active_session(now));
        assert!(active.has_active_session(now));
        assert!(!none.has_active_session(now));
    }
}
