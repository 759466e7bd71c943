//! Status transition handlers.
//!
//! Completed tasks are announced in the configured notification chat. The
//! handler enriches the event with the full task so the announcement carries
//! the task name and a link, not just an id.

use std::sync::Arc;

use serde_json::{Value, json};

use taskpulse_clickup::ClickUpError;
use taskpulse_dispatch::{Dispatcher, Event, event_types, status_changed};

use super::HandlerContext;

const DONE_STATUS: &str = "complete";

pub fn register(dispatcher: &mut Dispatcher, context: Arc<HandlerContext>) -> anyhow::Result<()> {
    let filter = status_changed(None, Some(DONE_STATUS));
    dispatcher.on(
        event_types::TASK_STATUS_UPDATED,
        "task_completed",
        Some(Box::new(filter)),
        move |event| {
            let ctx = context.clone();
            async move { handle_task_completed(&ctx, &event).await }
        },
    );
    Ok(())
}

async fn handle_task_completed(context: &HandlerContext, event: &Event) -> anyhow::Result<Value> {
    let Some(chat_id) = &context.notify_chat_id else {
        tracing::debug!("NOTIFY_CHAT_ID not set, skipping completion notification");
        return Ok(Value::Null);
    };
    let Some(task_id) = event.task_id.as_deref() else {
        tracing::warn!("status event without a task id");
        return Ok(Value::Null);
    };

    let (name, url) = match context.clickup.get_task(task_id).await {
        Ok(task) => (
            task.get("name")
                .and_then(Value::as_str)
                .unwrap_or(task_id)
                .to_owned(),
            task.get("url").and_then(Value::as_str).map(str::to_owned),
        ),
        // The task may have been deleted between the event and the fetch;
        // announce with the id we have.
        Err(ClickUpError::NotFound(_)) => {
            tracing::warn!("completed task {task_id} no longer exists");
            (task_id.to_owned(), None)
        }
        Err(e) => return Err(e.into()),
    };

    let message = match url {
        Some(url) => format!("✅ Task completed: <a href=\"{url}\">{name}</a>"),
        None => format!("✅ Task completed: {name}"),
    };

    let sent = context.telegram.send_message(chat_id, &message, None).await?;
    Ok(json!({"notified": sent}))
}
