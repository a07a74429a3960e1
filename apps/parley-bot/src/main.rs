use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use teloxide::prelude::*;
use teloxide::update_listeners::webhooks;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parley_db::repositories::{
    PaymentRepository, ProductRepository, TopicRepository, UserRepository,
};

mod bot;
mod bot_manager;
mod config;
mod services;
mod state;
mod web;

use crate::bot_manager::BotManager;
use crate::config::Config;
use crate::services::billing_service::BillingService;
use crate::services::pay_service::PayService;
use crate::services::payment::PaymentAdapter;
use crate::services::payment::stripe::StripeAdapter;
use crate::services::routing_service::RoutingService;
use crate::services::settings_service::SettingsService;
use crate::services::store_service::StoreService;
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "parley-bot")]
#[command(about = "Paid-conversation Telegram bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server and the bot
    Serve {
        /// Public HTTPS URL for Telegram webhook mode; long-polling when absent
        #[arg(long)]
        webhook_url: Option<String>,
    },
    /// Administrative tools
    Admin {
        #[command(subcommand)]
        subcommand: AdminCommands,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Grant credits to a user by Telegram id
    GrantCredits { tg_id: i64, amount: i64 },
    /// Show deployment info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley_bot=info,parley_db=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Serve { webhook_url } => run_server(config, webhook_url).await,
        Commands::Admin { subcommand } => run_admin(config, subcommand).await,
    }
}

async fn run_server(config: Config, webhook_url: Option<String>) -> Result<()> {
    info!("Starting parley-bot...");

    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        error!("CRITICAL PANIC: {:?}", info);
        prev_hook(info);
    }));

    let pool = parley_db::connect(&config.database_url).await?;

    let settings = Arc::new(SettingsService::new(pool.clone()).await?);
    let bot_manager = Arc::new(BotManager::new(config.admin_group_id));

    let users = UserRepository::new(pool.clone());
    let payments = PaymentRepository::new(pool.clone());
    let products = ProductRepository::new(pool.clone());
    let topics = TopicRepository::new(pool.clone());

    let store_service = Arc::new(StoreService::new(products));
    let billing_service = Arc::new(BillingService::new(users.clone(), settings.clone()));
    let routing_service = Arc::new(RoutingService::new(
        topics,
        users.clone(),
        config.admin_group_id,
    ));
    let adapter: Arc<dyn PaymentAdapter> = Arc::new(StripeAdapter::new(
        config.stripe_secret_key.clone(),
        config.stripe_webhook_secret.clone(),
    ));
    let pay_service = Arc::new(PayService::new(
        pool.clone(),
        adapter,
        store_service.clone(),
        users.clone(),
        payments.clone(),
        settings.clone(),
        bot_manager.clone(),
    ));

    let config = Arc::new(config);
    let state = AppState {
        config: config.clone(),
        settings,
        bot_manager: bot_manager.clone(),
        store_service,
        billing_service,
        pay_service,
        routing_service,
        users,
        payments,
    };

    let bot = Bot::new(config.bot_token.clone());
    bot_manager.set_bot(bot.clone()).await;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.listen_port));
    let app = web::router(state.clone());

    match webhook_url {
        Some(url) => {
            let url = url::Url::parse(&url).context("Invalid webhook URL")?;
            info!("Starting bot in webhook mode at {}", url);

            let (listener, stop_flag, bot_router) =
                webhooks::axum_to_router(bot.clone(), webhooks::Options::new(addr, url))
                    .await
                    .context("Failed to set up webhook listener")?;

            let tcp = tokio::net::TcpListener::bind(addr)
                .await
                .context("Failed to bind listen port")?;
            info!("HTTP server listening on {}", addr);

            let app = app.merge(bot_router);
            tokio::spawn(async move {
                if let Err(e) = axum::serve(tcp, app)
                    .with_graceful_shutdown(stop_flag)
                    .await
                {
                    error!("HTTP server error: {}", e);
                }
            });

            bot::run_webhook(bot, listener, state).await;
        }
        None => {
            info!("Starting bot in long polling mode");

            let tcp = tokio::net::TcpListener::bind(addr)
                .await
                .context("Failed to bind listen port")?;
            info!("HTTP server listening on {}", addr);

            tokio::spawn(async move {
                if let Err(e) = axum::serve(tcp, app).await {
                    error!("HTTP server error: {}", e);
                }
            });

            let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                info!("Received Ctrl-C, shutting down...");
                let _ = shutdown_tx.send(());
            });

            bot::run_polling(bot, shutdown_rx, state).await;
        }
    }

    Ok(())
}

async fn run_admin(config: Config, cmd: AdminCommands) -> Result<()> {
    let pool = parley_db::connect(&config.database_url).await?;
    let users = UserRepository::new(pool.clone());

    match cmd {
        AdminCommands::GrantCredits { tg_id, amount } => {
            let Some(user) = users.get_by_tg_id(tg_id).await? else {
                return Err(anyhow::anyhow!("No user with tg id {}", tg_id));
            };
            users.adjust_credits(user.id, amount).await?;
            println!(
                "Granted {} credits to {} (balance was {})",
                amount, tg_id, user.credits
            );
        }
        AdminCommands::Info => {
            println!("\n=== PARLEY INFO ===");
            println!("Admin group: {}", config.admin_group_id);
            println!("Admins:      {:?}", config.admin_ids);
            println!("Listen port: {}", config.listen_port);
            println!("Users:       {}", users.count().await?);
            println!("===================\n");
        }
    }

    Ok(())
}
