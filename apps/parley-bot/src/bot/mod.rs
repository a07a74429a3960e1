use teloxide::dispatching::UpdateHandler;
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::update_listeners::UpdateListener;
use teloxide::{dptree, prelude::*, types::Update};
use tracing::{error, info};

use crate::state::AppState;

pub mod handlers;
pub mod keyboards;
pub mod utils;

fn schema() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(Update::filter_message().endpoint(handlers::message::message_handler))
        .branch(Update::filter_callback_query().endpoint(handlers::callback::callback_handler))
}

/// Identity check before taking updates; also records the bot username for
/// checkout return links. Returns false when Telegram is unreachable
/// (usually an invalid token).
async fn announce_identity(bot: &Bot, state: &AppState) -> bool {
    match bot.get_me().await {
        Ok(me) => {
            let username = me.username.clone().unwrap_or_else(|| "unknown".to_string());
            info!("Bot connected as: @{}", username);
            if let Err(e) = state.settings.set("bot_username", &username).await {
                error!("Failed to store bot username: {}", e);
            }
            true
        }
        Err(e) => {
            error!("CRITICAL: Bot failed to connect to Telegram: {}", e);
            false
        }
    }
}

fn build_dispatcher(
    bot: Bot,
    state: AppState,
) -> Dispatcher<Bot, teloxide::RequestError, teloxide::dispatching::DefaultKey> {
    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![state])
        .default_handler(|upd: std::sync::Arc<Update>| async move {
            info!("Unhandled update: {:?}", upd);
        })
        .build()
}

pub async fn run_polling(
    bot: Bot,
    mut shutdown_signal: tokio::sync::broadcast::Receiver<()>,
    state: AppState,
) {
    if !announce_identity(&bot, &state).await {
        return;
    }

    // Drop any stale webhook so long polling can take updates.
    let _ = bot.delete_webhook().await;

    let mut dispatcher = build_dispatcher(bot, state);

    tokio::select! {
        _ = dispatcher.dispatch() => {
            info!("Bot dispatcher exited naturally");
        }
        _ = shutdown_signal.recv() => {
            info!("Bot received shutdown signal, stopping...");
        }
    }
}

pub async fn run_webhook<L>(bot: Bot, listener: L, state: AppState)
where
    L: UpdateListener<Err = std::convert::Infallible> + Send,
{
    if !announce_identity(&bot, &state).await {
        return;
    }

    let mut dispatcher = build_dispatcher(bot, state);
    dispatcher
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("An error from the update listener"),
        )
        .await;
}
