//! Broker relation handlers.
//!
//! When the "Broker" relation field on a deal task is set, the linked broker
//! task carries the broker's `telegram_id` custom field; that broker gets a
//! formatted notification with a link back to the deal. Removal and update
//! are observed for audit logging only.

use std::sync::Arc;

use anyhow::Context;
use serde_json::{Value, json};

use taskpulse_clickup::{ClickUpError, custom_field_value, format_deadline, relationship_name};
use taskpulse_dispatch::{
    Dispatcher, Event, HistoryItem, event_types, field_removed, field_set, field_updated,
};
use taskpulse_telegram::{InlineKeyboardButton, InlineKeyboardMarkup};

use super::HandlerContext;

const BROKER_FIELD: &str = "Broker";

pub fn register(dispatcher: &mut Dispatcher, context: Arc<HandlerContext>) -> anyhow::Result<()> {
    let set_filter = field_set(None, Some(BROKER_FIELD))?;
    let ctx = context.clone();
    dispatcher.on(
        event_types::TASK_UPDATED,
        "broker_set",
        Some(Box::new(set_filter)),
        move |event| {
            let ctx = ctx.clone();
            async move { handle_broker_set(&ctx, &event).await }
        },
    );

    let removed_filter = field_removed(None, Some(BROKER_FIELD))?;
    dispatcher.on(
        event_types::TASK_UPDATED,
        "broker_removed",
        Some(Box::new(removed_filter)),
        |event| async move {
            tracing::info!(
                "broker removed from task {}",
                event.task_id.as_deref().unwrap_or("unknown")
            );
            Ok(Value::Null)
        },
    );

    let updated_filter = field_updated(None, Some(BROKER_FIELD))?;
    dispatcher.on(
        event_types::TASK_UPDATED,
        "broker_updated",
        Some(Box::new(updated_filter)),
        |event| async move {
            for item in &event.history_items {
                tracing::info!(
                    "broker changed on task {}: {} -> {}",
                    event.task_id.as_deref().unwrap_or("unknown"),
                    item.before,
                    item.after
                );
            }
            Ok(Value::Null)
        },
    );

    Ok(())
}

async fn handle_broker_set(context: &HandlerContext, event: &Event) -> anyhow::Result<Value> {
    let task_id = event
        .task_id
        .as_deref()
        .context("broker set event without a task id")?;
    tracing::info!("broker assigned on task {task_id}");

    // One bad history item must not cost the remaining brokers their
    // notification; failures are logged per item and iteration continues.
    let mut notified = 0u32;
    for item in &event.history_items {
        match notify_broker(context, task_id, item).await {
            Ok(true) => notified += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::error!("error processing broker change on task {task_id}: {e:#}");
            }
        }
    }

    Ok(json!({"notified": notified}))
}

async fn notify_broker(
    context: &HandlerContext,
    task_id: &str,
    item: &HistoryItem,
) -> anyhow::Result<bool> {
    let Some(relation_task_id) = extract_relation_task_id(&item.after) else {
        tracing::warn!("could not extract relation task id from: {}", item.after);
        return Ok(false);
    };

    let broker_task = match context.clickup.get_task(&relation_task_id).await {
        Ok(task) => task,
        Err(ClickUpError::NotFound(_)) => {
            tracing::warn!("broker task {relation_task_id} no longer exists, skipping");
            return Ok(false);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("fetching broker task {relation_task_id}"));
        }
    };
    let Some(telegram_id) = custom_field_value(&broker_task, "telegram_id") else {
        tracing::warn!("no telegram_id on broker task {relation_task_id}");
        return Ok(false);
    };
    let chat_id = value_text(telegram_id);

    let deal_task = context
        .clickup
        .get_task(task_id)
        .await
        .with_context(|| format!("fetching deal task {task_id}"))?;

    let message = build_broker_message(&deal_task);
    let keyboard = build_broker_keyboard(&deal_task, task_id);

    let sent = context
        .telegram
        .send_message(&chat_id, &message, Some(&keyboard))
        .await?;
    if sent {
        tracing::info!("broker notified (chat {chat_id})");
    } else {
        tracing::error!("failed to notify broker (chat {chat_id})");
    }
    Ok(sent)
}

/// Relation values arrive as a list of linked tasks, a single object, or a
/// bare id string depending on the field configuration.
pub(super) fn extract_relation_task_id(after: &Value) -> Option<String> {
    match after {
        Value::Array(items) => {
            let first = items.first()?;
            match first {
                Value::Object(entry) => entry.get("id").map(value_text),
                other => Some(value_text(other)),
            }
        }
        Value::Object(entry) => {
            if let Some(id) = entry.get("id") {
                return Some(value_text(id));
            }
            // Single-key objects sometimes hold the id as their only value.
            if entry.len() == 1 {
                return entry.values().next().map(value_text);
            }
            None
        }
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

pub(super) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn build_broker_message(task: &Value) -> String {
    let name = task.get("name").and_then(Value::as_str).unwrap_or("N/A");
    let status = task
        .get("status")
        .and_then(|s| s.get("status"))
        .and_then(Value::as_str)
        .unwrap_or("N/A");
    let list_name = task
        .get("list")
        .and_then(|l| l.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("N/A");
    let firm = relationship_name(custom_field_value(task, "Firm"));
    let partner = relationship_name(custom_field_value(task, "Partner"));
    let deadline = format_deadline(custom_field_value(task, "Broker deadline"));

    format!(
        "🆕 <b>New deal assigned</b>\n\n\
         📌 Task: {name}\n\
         📊 Status: {status}\n\
         📂 List: {list_name}\n\
         🏢 Firm: {firm}\n\
         🤝 Partner: {partner}\n\
         📅 Deadline: {deadline}"
    )
}

fn build_broker_keyboard(task: &Value, task_id: &str) -> InlineKeyboardMarkup {
    let list_id = task
        .get("list")
        .and_then(|l| l.get("id"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let mut rows = Vec::new();
    if let Some(url) = task.get("url").and_then(Value::as_str) {
        rows.push(vec![InlineKeyboardButton::url("Open task", url)]);
    }
    rows.push(vec![InlineKeyboardButton::callback(
        "✅ Accept",
        &format!("accept={task_id}&list_id={list_id}"),
    )]);
    InlineKeyboardMarkup::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};

    use taskpulse_clickup::ClickUpClient;
    use taskpulse_telegram::TelegramNotifier;

    fn stub_broker_task() -> Value {
        json!({
            "name": "Broker card",
            "custom_fields": [{"name": "telegram_id", "value": "555"}]
        })
    }

    fn stub_deal_task() -> Value {
        json!({
            "name": "Deal #7",
            "url": "https://app.clickup.com/t/T1",
            "status": {"status": "in progress"},
            "list": {"id": "L1", "name": "Deals"},
            "custom_fields": []
        })
    }

    /// Serves both the ClickUp task endpoints and the Telegram send endpoint
    /// on one local listener. Task "GONE" is deleted, "BROKEN" errors.
    async fn stub_api(sends: Arc<AtomicUsize>) -> String {
        let app = Router::new()
            .route(
                "/task/{id}",
                get(|Path(id): Path<String>| async move {
                    match id.as_str() {
                        "GONE" => StatusCode::NOT_FOUND.into_response(),
                        "BROKEN" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
                        "B2" => Json(stub_broker_task()).into_response(),
                        "T1" => Json(stub_deal_task()).into_response(),
                        _ => StatusCode::NOT_FOUND.into_response(),
                    }
                }),
            )
            .route(
                "/bot123abc/sendMessage",
                post(move || {
                    let sends = sends.clone();
                    async move {
                        sends.fetch_add(1, Ordering::SeqCst);
                        Json(json!({"ok": true}))
                    }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn stub_context(base: &str) -> HandlerContext {
        HandlerContext {
            clickup: Arc::new(ClickUpClient::with_base_url("pk_test", base).unwrap()),
            telegram: Arc::new(TelegramNotifier::with_base_url("123abc", base).unwrap()),
            team_id: "9001".into(),
            notify_chat_id: None,
        }
    }

    #[tokio::test]
    async fn failed_items_do_not_stop_remaining_notifications() {
        let sends = Arc::new(AtomicUsize::new(0));
        let base = stub_api(sends.clone()).await;
        let context = stub_context(&base);

        // First relation task was deleted, second errors server-side; the
        // third broker must still be notified.
        let event = Event::from_value(&json!({
            "event": "taskUpdated",
            "task_id": "T1",
            "history_items": [
                {"field": "Broker", "before": {}, "after": [{"id": "GONE"}]},
                {"field": "Broker", "before": {}, "after": [{"id": "BROKEN"}]},
                {"field": "Broker", "before": {}, "after": [{"id": "B2"}]}
            ]
        }));

        let result = handle_broker_set(&context, &event).await.unwrap();
        assert_eq!(result, json!({"notified": 1}));
        assert_eq!(sends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn extracts_relation_id_from_all_shapes() {
        assert_eq!(
            extract_relation_task_id(&json!([{"id": "T9", "name": "Broker"}])),
            Some("T9".into())
        );
        assert_eq!(extract_relation_task_id(&json!(["T9"])), Some("T9".into()));
        assert_eq!(
            extract_relation_task_id(&json!({"id": "T9"})),
            Some("T9".into())
        );
        assert_eq!(
            extract_relation_task_id(&json!({"task": "T9"})),
            Some("T9".into())
        );
        assert_eq!(extract_relation_task_id(&json!("T9")), Some("T9".into()));
        assert_eq!(extract_relation_task_id(&Value::Null), None);
        assert_eq!(extract_relation_task_id(&json!([])), None);
    }

    #[test]
    fn broker_message_includes_task_context() {
        let task = json!({
            "name": "Deal #7",
            "url": "https://app.clickup.com/t/T1",
            "status": {"status": "in progress"},
            "list": {"id": "L1", "name": "Deals"},
            "custom_fields": [
                {"name": "Firm", "value": [{"id": "F1", "name": "Acme"}]},
                {"name": "Broker deadline", "value": "1772323200000"}
            ]
        });
        let message = build_broker_message(&task);
        assert!(message.contains("Deal #7"));
        assert!(message.contains("in progress"));
        assert!(message.contains("Acme"));
        assert!(message.contains("01.03.2026"));
        // Missing Partner relation falls back to the placeholder.
        assert!(message.contains("Partner: N/A"));

        let keyboard = build_broker_keyboard(&task, "T1");
        assert_eq!(keyboard.inline_keyboard.len(), 2);
        assert_eq!(
            keyboard.inline_keyboard[1][0].callback_data.as_deref(),
            Some("accept=T1&list_id=L1")
        );
    }
}
