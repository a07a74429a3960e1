use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    /// The operators' supergroup (forum mode) where per-user topics live.
    pub admin_group_id: i64,
    /// Telegram ids allowed to run admin commands.
    pub admin_ids: Vec<i64>,
    pub database_url: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub listen_port: u16,
}

impl Config {
    pub fn load() -> Result<Self> {
        tracing::info!("Loading config from environment");
        Ok(Self {
            bot_token: std::env::var("BOT_TOKEN").context("BOT_TOKEN is not set")?,
            admin_group_id: std::env::var("ADMIN_GROUP_ID")
                .context("ADMIN_GROUP_ID is not set")?
                .parse()
                .context("ADMIN_GROUP_ID must be a chat id")?,
            admin_ids: parse_id_list(&std::env::var("ADMIN_IDS").unwrap_or_default()),
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?,
            stripe_secret_key: std::env::var("STRIPE_SECRET_KEY").unwrap_or_default(),
            stripe_webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
            listen_port: std::env::var("LISTEN_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
        })
    }

    pub fn is_admin(&self, tg_id: i64) -> bool {
        self.admin_ids.contains(&tg_id)
    }
}

fn parse_id_list(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_list_parsing() {
        assert_eq!(parse_id_list("1, 2,3"), vec![1, 2, 3]);
        assert_eq!(parse_id_list(""), Vec::<i64>::new());
        assert_eq!(parse_id_list("42,abc,7"), vec![42, 7]);
    }
}
