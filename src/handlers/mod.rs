//! Domain handlers registered against the dispatcher at startup.
//!
//! Handlers receive their collaborators through [`HandlerContext`]: one
//! context is built in `main` and cloned into each registration. Filter
//! construction errors propagate out of [`register_all`] and abort startup.

mod assignee;
mod broker;
mod dogovor;
mod logging;
mod status;

use std::sync::Arc;

use taskpulse_clickup::ClickUpClient;
use taskpulse_dispatch::Dispatcher;
use taskpulse_telegram::TelegramNotifier;

/// Collaborators shared by every domain handler.
pub struct HandlerContext {
    pub clickup: Arc<ClickUpClient>,
    pub telegram: Arc<TelegramNotifier>,
    /// ClickUp team id, needed by handlers that search team tasks.
    pub team_id: String,
    /// Default chat for status notifications. Handlers that resolve a chat
    /// per event (e.g. from a task's custom field) ignore this.
    pub notify_chat_id: Option<String>,
}

/// Register every handler and middleware on the dispatcher.
pub fn register_all(
    dispatcher: &mut Dispatcher,
    context: Arc<HandlerContext>,
) -> anyhow::Result<()> {
    dispatcher.middleware(logging::LoggingMiddleware);
    broker::register(dispatcher, context.clone())?;
    dogovor::register(dispatcher, context.clone())?;
    assignee::register(dispatcher, context.clone())?;
    status::register(dispatcher, context)?;
    Ok(())
}
