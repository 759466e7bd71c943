//! Webhook event model.
//!
//! Events are built once per inbound request from the raw JSON payload and
//! never fail to parse: missing optional fields fall back to defaults and
//! unknown keys are ignored. ClickUp payloads are loosely shaped, so the
//! before/after values of a change stay as raw [`Value`]s.

use serde_json::Value;

/// Well-known ClickUp webhook event types.
///
/// The event type is an open string, not a closed enum; ClickUp adds event
/// types without notice and unknown types must still flow through dispatch.
pub mod event_types {
    pub const TASK_CREATED: &str = "taskCreated";
    pub const TASK_UPDATED: &str = "taskUpdated";
    pub const TASK_DELETED: &str = "taskDeleted";
    pub const TASK_PRIORITY_UPDATED: &str = "taskPriorityUpdated";
    pub const TASK_STATUS_UPDATED: &str = "taskStatusUpdated";
    pub const TASK_ASSIGNEE_UPDATED: &str = "taskAssigneeUpdated";
    pub const TASK_DUE_DATE_UPDATED: &str = "taskDueDateUpdated";
    pub const TASK_MOVED: &str = "taskMoved";
    pub const TASK_COMMENT_POSTED: &str = "taskCommentPosted";
    pub const LIST_CREATED: &str = "listCreated";
    pub const LIST_UPDATED: &str = "listUpdated";
    pub const LIST_DELETED: &str = "listDeleted";

    /// Matches every event type, after exact-type registrations.
    pub const WILDCARD: &str = "*";
}

/// One atomic before/after change record within an event.
#[derive(Debug, Clone)]
pub struct HistoryItem {
    /// Human-readable field label (`field` in the payload).
    pub field: Option<String>,
    /// Field id (`field_id`, falling back to a generic `id` key).
    pub field_id: Option<String>,
    /// Value before the change. `Null` when absent.
    pub before: Value,
    /// Value after the change. `Null` when absent.
    pub after: Value,
    /// The full raw history item, kept for heuristic field matching.
    pub raw: Value,
}

impl HistoryItem {
    fn from_value(raw: &Value) -> Self {
        let field = raw.get("field").and_then(Value::as_str).map(str::to_owned);
        let field_id = raw
            .get("field_id")
            .or_else(|| raw.get("id"))
            .map(value_to_string);
        Self {
            field,
            field_id,
            before: raw.get("before").cloned().unwrap_or(Value::Null),
            after: raw.get("after").cloned().unwrap_or(Value::Null),
            raw: raw.clone(),
        }
    }
}

/// One normalized webhook notification.
///
/// Immutable after construction; history item ordering is preserved from the
/// source payload.
#[derive(Debug, Clone)]
pub struct Event {
    /// Event type, e.g. `taskUpdated`. Empty string when the payload had none.
    pub event_type: String,
    pub history_items: Vec<HistoryItem>,
    pub task_id: Option<String>,
    pub webhook_id: Option<String>,
}

impl Event {
    /// Build an event from a raw webhook payload. Never fails.
    pub fn from_value(data: &Value) -> Self {
        let event_type = data
            .get("event")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let history_items = data
            .get("history_items")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(HistoryItem::from_value).collect())
            .unwrap_or_default();
        Self {
            event_type,
            history_items,
            task_id: data.get("task_id").map(value_to_string),
            webhook_id: data.get("webhook_id").map(value_to_string),
        }
    }
}

/// Render a JSON value as a bare string: strings lose their quotes, everything
/// else is serialized. Ids show up as both strings and numbers in payloads.
pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_full_payload() {
        let payload = json!({
            "event": "taskUpdated",
            "task_id": "T1",
            "webhook_id": "wh-1",
            "history_items": [
                {"field": "status", "before": "open", "after": "done"},
                {"field": "assignee", "before": null, "after": {"id": 7}}
            ]
        });
        let event = Event::from_value(&payload);
        assert_eq!(event.event_type, "taskUpdated");
        assert_eq!(event.task_id.as_deref(), Some("T1"));
        assert_eq!(event.webhook_id.as_deref(), Some("wh-1"));
        assert_eq!(event.history_items.len(), 2);
        assert_eq!(event.history_items[0].field.as_deref(), Some("status"));
        assert_eq!(event.history_items[1].after, json!({"id": 7}));
    }

    #[test]
    fn item_ordering_is_preserved() {
        let payload = json!({
            "event": "taskUpdated",
            "history_items": [
                {"field": "a"}, {"field": "b"}, {"field": "c"}
            ]
        });
        let event = Event::from_value(&payload);
        let fields: Vec<_> = event
            .history_items
            .iter()
            .map(|i| i.field.as_deref().unwrap())
            .collect();
        assert_eq!(fields, ["a", "b", "c"]);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let event = Event::from_value(&json!({}));
        assert_eq!(event.event_type, "");
        assert!(event.history_items.is_empty());
        assert!(event.task_id.is_none());
        assert!(event.webhook_id.is_none());
    }

    #[test]
    fn numeric_ids_are_stringified() {
        let payload = json!({
            "event": "taskUpdated",
            "task_id": 42,
            "history_items": [{"field_id": 99}]
        });
        let event = Event::from_value(&payload);
        assert_eq!(event.task_id.as_deref(), Some("42"));
        assert_eq!(event.history_items[0].field_id.as_deref(), Some("99"));
    }

    #[test]
    fn unknown_top_level_keys_are_ignored() {
        let event = Event::from_value(&json!({"event": "taskCreated", "whatever": {"x": 1}}));
        assert_eq!(event.event_type, "taskCreated");
    }
}
