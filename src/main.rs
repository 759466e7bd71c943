//! TaskPulse: ClickUp webhook dispatcher with Telegram notifications.
//!
//! Startup order matters: configuration is validated first, handlers are
//! registered on the dispatcher, the ClickUp webhook subscription is
//! refreshed, and only then does the server start accepting deliveries. The
//! dispatcher is immutable once the server is up.

mod handlers;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use taskpulse_clickup::{ClickUpClient, WebhookManager};
use taskpulse_core::Config;
use taskpulse_dispatch::Dispatcher;
use taskpulse_server::WebhookServer;
use taskpulse_telegram::TelegramNotifier;

use handlers::HandlerContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fatal: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    let clickup = Arc::new(ClickUpClient::new(&config.clickup_api_token)?);
    let telegram = Arc::new(TelegramNotifier::new(&config.bot_token)?);

    let context = Arc::new(HandlerContext {
        clickup: clickup.clone(),
        telegram,
        team_id: config.team_id.clone(),
        notify_chat_id: config.notify_chat_id.clone(),
    });

    let mut dispatcher = Dispatcher::new();
    handlers::register_all(&mut dispatcher, context)?;
    tracing::info!("registered events: {:?}", dispatcher.registered_events());

    // Refresh the ClickUp-side subscription so exactly one webhook points at
    // this instance. A failure here is logged but not fatal: the server can
    // still receive deliveries from an existing subscription.
    match &config.webhook_endpoint {
        Some(endpoint) => {
            let manager = WebhookManager::new(clickup, &config.team_id, endpoint);
            if let Err(e) = manager.initialize().await {
                tracing::error!("failed to initialize webhook: {e}");
                tracing::warn!("continuing without webhook initialization");
            }
        }
        None => {
            tracing::warn!("WEBHOOK_ENDPOINT not set, skipping webhook initialization");
        }
    }

    let server = WebhookServer::new(
        Arc::new(dispatcher),
        config.webhook_secret.clone(),
        &config.webhook_path,
    );
    tracing::info!(
        "starting TaskPulse on {}:{}{}",
        config.server_host,
        config.server_port,
        config.webhook_path
    );
    server.serve(&config.server_host, config.server_port).await
}
