//! Contract ("Dogovor") document handlers.
//!
//! When a contract document lands on a deal task, the accountant linked
//! through the "Bug'galter | Document" relation receives the document itself,
//! with the deal context as the caption. Removal is observed for audit
//! logging only.

use std::sync::Arc;

use anyhow::Context;
use serde_json::{Value, json};

use taskpulse_clickup::{ClickUpError, custom_field_value};
use taskpulse_dispatch::{Dispatcher, Event, HistoryItem, event_types, field_removed, field_set};
use taskpulse_telegram::{InlineKeyboardButton, InlineKeyboardMarkup};

use super::HandlerContext;
use super::broker::{extract_relation_task_id, value_text};

const CONTRACT_FIELD: &str = "Dogovor";
const ACCOUNTANT_FIELD: &str = "Bug'galter | Document";

pub fn register(dispatcher: &mut Dispatcher, context: Arc<HandlerContext>) -> anyhow::Result<()> {
    let set_filter = field_set(None, Some(CONTRACT_FIELD))?;
    dispatcher.on(
        event_types::TASK_UPDATED,
        "dogovor_set",
        Some(Box::new(set_filter)),
        move |event| {
            let ctx = context.clone();
            async move { handle_dogovor_set(&ctx, &event).await }
        },
    );

    let removed_filter = field_removed(None, Some(CONTRACT_FIELD))?;
    dispatcher.on(
        event_types::TASK_UPDATED,
        "dogovor_removed",
        Some(Box::new(removed_filter)),
        |event| async move {
            tracing::info!(
                "contract removed from task {}",
                event.task_id.as_deref().unwrap_or("unknown")
            );
            Ok(Value::Null)
        },
    );

    Ok(())
}

async fn handle_dogovor_set(context: &HandlerContext, event: &Event) -> anyhow::Result<Value> {
    let task_id = event
        .task_id
        .as_deref()
        .context("contract set event without a task id")?;
    tracing::info!("contract attached on task {task_id}");

    // Failures are contained per history item, as in the broker flow.
    let mut sent = 0u32;
    for item in &event.history_items {
        match forward_contract(context, task_id, item).await {
            Ok(true) => sent += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::error!("error forwarding contract on task {task_id}: {e:#}");
            }
        }
    }

    Ok(json!({"sent": sent}))
}

async fn forward_contract(
    context: &HandlerContext,
    task_id: &str,
    item: &HistoryItem,
) -> anyhow::Result<bool> {
    let Some(file_url) = extract_document_url(&item.after) else {
        tracing::warn!("could not extract contract url from: {}", item.after);
        return Ok(false);
    };

    let deal_task = match context.clickup.get_task(task_id).await {
        Ok(task) => task,
        Err(ClickUpError::NotFound(_)) => {
            tracing::warn!("deal task {task_id} no longer exists, skipping");
            return Ok(false);
        }
        Err(e) => return Err(e).with_context(|| format!("fetching deal task {task_id}")),
    };

    let Some(relation) = custom_field_value(&deal_task, ACCOUNTANT_FIELD) else {
        tracing::warn!("no accountant relation on task {task_id}");
        return Ok(false);
    };
    let Some(accountant_task_id) = extract_relation_task_id(relation) else {
        tracing::warn!("could not extract accountant task id from: {relation}");
        return Ok(false);
    };

    let accountant_task = match context.clickup.get_task(&accountant_task_id).await {
        Ok(task) => task,
        Err(ClickUpError::NotFound(_)) => {
            tracing::warn!("accountant task {accountant_task_id} no longer exists, skipping");
            return Ok(false);
        }
        Err(e) => {
            return Err(e)
                .with_context(|| format!("fetching accountant task {accountant_task_id}"));
        }
    };
    let Some(telegram_id) = custom_field_value(&accountant_task, "telegram_id") else {
        tracing::warn!("no telegram_id on accountant task {accountant_task_id}");
        return Ok(false);
    };
    let chat_id = value_text(telegram_id);

    let caption = build_contract_caption(&deal_task);
    let keyboard = build_contract_keyboard(&deal_task, task_id);

    let delivered = context
        .telegram
        .send_document(&chat_id, &file_url, Some(&caption), Some(&keyboard))
        .await?;
    if delivered {
        tracing::info!("contract forwarded to accountant (chat {chat_id})");
    } else {
        tracing::error!("failed to forward contract (chat {chat_id})");
    }
    Ok(delivered)
}

/// Contract fields hold the document as a bare URL string, an attachment
/// object with a `url`, or a list of such attachments.
fn extract_document_url(after: &Value) -> Option<String> {
    match after {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(entry) => entry.get("url").and_then(Value::as_str).map(str::to_owned),
        Value::Array(items) => match items.first()? {
            Value::Object(entry) => entry.get("url").and_then(Value::as_str).map(str::to_owned),
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn build_contract_caption(task: &Value) -> String {
    let name = task.get("name").and_then(Value::as_str).unwrap_or("N/A");
    let list_name = task
        .get("list")
        .and_then(|l| l.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("N/A");
    format!(
        "📄 <b>New contract uploaded</b>\n\n\
         📌 Task: {name}\n\
         📂 List: {list_name}"
    )
}

fn build_contract_keyboard(task: &Value, task_id: &str) -> InlineKeyboardMarkup {
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
        "✅ Confirm",
        &format!("confirm={task_id}&list_id={list_id}"),
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

    #[test]
    fn extracts_document_url_from_all_shapes() {
        assert_eq!(
            extract_document_url(&json!("https://files/contract.pdf")),
            Some("https://files/contract.pdf".into())
        );
        assert_eq!(
            extract_document_url(&json!({"url": "https://files/c.pdf", "title": "c"})),
            Some("https://files/c.pdf".into())
        );
        assert_eq!(
            extract_document_url(&json!([{"url": "https://files/c.pdf"}])),
            Some("https://files/c.pdf".into())
        );
        assert_eq!(
            extract_document_url(&json!(["https://files/c.pdf"])),
            Some("https://files/c.pdf".into())
        );
        assert_eq!(extract_document_url(&json!("")), None);
        assert_eq!(extract_document_url(&json!([])), None);
        assert_eq!(extract_document_url(&Value::Null), None);
    }

    #[test]
    fn contract_keyboard_carries_confirm_callback() {
        let task = json!({"url": "https://app.clickup.com/t/T1", "list": {"id": "L1"}});
        let keyboard = build_contract_keyboard(&task, "T1");
        assert_eq!(keyboard.inline_keyboard.len(), 2);
        assert_eq!(
            keyboard.inline_keyboard[1][0].callback_data.as_deref(),
            Some("confirm=T1&list_id=L1")
        );
    }

    async fn stub_api(sends: Arc<AtomicUsize>) -> String {
        let app = Router::new()
            .route(
                "/task/{id}",
                get(|Path(id): Path<String>| async move {
                    match id.as_str() {
                        "T1" => Json(json!({
                            "name": "Deal #7",
                            "url": "https://app.clickup.com/t/T1",
                            "list": {"id": "L1", "name": "Deals"},
                            "custom_fields": [
                                {"name": "Bug'galter | Document", "value": [{"id": "ACC"}]}
                            ]
                        }))
                        .into_response(),
                        "ACC" => Json(json!({
                            "name": "Accountant card",
                            "custom_fields": [{"name": "telegram_id", "value": 777}]
                        }))
                        .into_response(),
                        _ => StatusCode::NOT_FOUND.into_response(),
                    }
                }),
            )
            .route(
                "/bot123abc/sendDocument",
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

    #[tokio::test]
    async fn forwards_contract_document_to_accountant() {
        let sends = Arc::new(AtomicUsize::new(0));
        let base = stub_api(sends.clone()).await;
        let context = HandlerContext {
            clickup: Arc::new(ClickUpClient::with_base_url("pk_test", &base).unwrap()),
            telegram: Arc::new(TelegramNotifier::with_base_url("123abc", &base).unwrap()),
            team_id: "9001".into(),
            notify_chat_id: None,
        };
        let event = Event::from_value(&json!({
            "event": "taskUpdated",
            "task_id": "T1",
            "history_items": [
                {"field": "Dogovor", "before": null, "after": "https://files/contract.pdf"}
            ]
        }));

        let result = handle_dogovor_set(&context, &event).await.unwrap();
        assert_eq!(result, json!({"sent": 1}));
        assert_eq!(sends.load(Ordering::SeqCst), 1);
    }
}
