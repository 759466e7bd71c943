//! Assignee notification handlers.
//!
//! When a task's assignees change, each current assignee is looked up in the
//! staff roster list and told on Telegram that the task landed on them. The
//! roster is a ClickUp list with one card per member; the card carries the
//! member's `telegram_id` custom field.

use std::sync::Arc;

use anyhow::Context;
use serde_json::{Value, json};

use taskpulse_clickup::{ClickUpError, custom_field_value};
use taskpulse_dispatch::{Dispatcher, Event, assignee_changed, event_types};

use super::HandlerContext;
use super::broker::value_text;

const MEMBER_LIST: &str = "stuffs-extra-datas";
/// Paging guard for the roster search.
const MAX_SEARCH_PAGES: u32 = 10;

pub fn register(dispatcher: &mut Dispatcher, context: Arc<HandlerContext>) -> anyhow::Result<()> {
    let filter = assignee_changed(None);
    dispatcher.on(
        event_types::TASK_ASSIGNEE_UPDATED,
        "assignee_notify",
        Some(Box::new(filter)),
        move |event| {
            let ctx = context.clone();
            async move { handle_assignee_change(&ctx, &event).await }
        },
    );
    Ok(())
}

async fn handle_assignee_change(
    context: &HandlerContext,
    event: &Event,
) -> anyhow::Result<Value> {
    let task_id = event
        .task_id
        .as_deref()
        .context("assignee event without a task id")?;

    // The event's history items are unreliable for the new assignee set; the
    // task itself is the source of truth.
    let task = match context.clickup.get_task(task_id).await {
        Ok(task) => task,
        Err(ClickUpError::NotFound(_)) => {
            tracing::warn!("task {task_id} no longer exists, skipping assignee notification");
            return Ok(Value::Null);
        }
        Err(e) => return Err(e).with_context(|| format!("fetching task {task_id}")),
    };

    let assignees = task
        .get("assignees")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if assignees.is_empty() {
        tracing::warn!("task {task_id} has no assignees, skipping notification");
        return Ok(json!({"notified": 0}));
    }
    tracing::info!("task {task_id} assignees now: {}", format_assignees(&assignees));

    let task_name = task.get("name").and_then(Value::as_str).unwrap_or("N/A");
    let list_name = task
        .get("list")
        .and_then(|l| l.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("N/A");
    let task_url = task.get("url").and_then(Value::as_str);

    let mut notified = 0u32;
    for assignee in &assignees {
        let Some(assignee_id) = assignee.get("id").map(value_text) else {
            tracing::warn!("assignee entry without an id: {assignee}");
            continue;
        };

        let member_task = match find_member_task(context, MEMBER_LIST, &assignee_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                tracing::warn!("no member card found for assignee {assignee_id}");
                continue;
            }
            Err(e) => {
                tracing::error!("member search failed for assignee {assignee_id}: {e:#}");
                continue;
            }
        };
        let Some(telegram_id) = custom_field_value(&member_task, "telegram_id") else {
            tracing::warn!("no telegram_id on member card for assignee {assignee_id}");
            continue;
        };
        let chat_id = value_text(telegram_id);

        let mut message = format!(
            "👤 <b>Task assigned to you</b>\n\n\
             📋 Task: {task_name}\n\
             📂 List: {list_name}"
        );
        if let Some(url) = task_url {
            message.push_str(&format!("\n\n🔗 <a href=\"{url}\">Open task</a>"));
        }

        match context.telegram.send_message(&chat_id, &message, None).await {
            Ok(true) => {
                tracing::info!("assignee {assignee_id} notified (chat {chat_id})");
                notified += 1;
            }
            Ok(false) => {
                tracing::error!("failed to notify assignee {assignee_id} (chat {chat_id})");
            }
            Err(e) => {
                tracing::error!("transport error notifying assignee {assignee_id}: {e}");
            }
        }
    }

    Ok(json!({"notified": notified}))
}

/// Page through the team's tasks for the given assignee looking for their
/// member card: first by roster list name, then by id-bearing custom fields.
async fn find_member_task(
    context: &HandlerContext,
    list_name: &str,
    assignee_id: &str,
) -> anyhow::Result<Option<Value>> {
    let wanted = list_name.trim().to_lowercase();

    for page in 0..MAX_SEARCH_PAGES {
        let response = context
            .clickup
            .get_team_tasks(&context.team_id, page, &[assignee_id])
            .await
            .with_context(|| format!("fetching team tasks page {page}"))?;
        let Some(tasks) = response.get("tasks").and_then(Value::as_array) else {
            break;
        };
        if tasks.is_empty() {
            break;
        }

        for task in tasks {
            let candidate = task
                .get("list")
                .and_then(|l| l.get("name"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .trim()
                .to_lowercase();
            if !candidate.is_empty() && (candidate == wanted || candidate.contains(&wanted)) {
                return Ok(Some(task.clone()));
            }
            if member_field_matches(task, assignee_id) {
                return Ok(Some(task.clone()));
            }
        }
    }

    Ok(None)
}

/// Roster cards sometimes carry the ClickUp user id in a custom field rather
/// than living in the roster list.
fn member_field_matches(task: &Value, assignee_id: &str) -> bool {
    for field in ["assignee_id", "user_id", "member_id", "clickup_id"] {
        let Some(value) = custom_field_value(task, field) else {
            continue;
        };
        let text = match value {
            Value::Array(items) => match items.first() {
                Some(Value::Object(entry)) => entry.get("id").map(value_text).unwrap_or_default(),
                Some(other) => value_text(other),
                None => String::new(),
            },
            Value::Object(map) => map
                .get("id")
                .or_else(|| map.values().next())
                .map(value_text)
                .unwrap_or_default(),
            other => value_text(other),
        };
        if text == assignee_id {
            return true;
        }
    }
    false
}

fn format_assignees(assignees: &[Value]) -> String {
    let names: Vec<String> = assignees
        .iter()
        .filter_map(|assignee| match assignee {
            Value::Object(map) => ["display_name", "name", "username"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .map(str::to_owned),
            Value::String(s) => Some(s.clone()),
            _ => None,
        })
        .collect();
    if names.is_empty() {
        "nobody".into()
    } else {
        names.join(", ")
    }
}
