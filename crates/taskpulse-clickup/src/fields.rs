//! Helpers for reading values out of ClickUp task payloads.
//!
//! Tasks carry custom fields as a loosely-typed array; relationship fields
//! hold lists of linked entities; dates are millisecond timestamps. These
//! helpers absorb those shapes so handlers stay readable.

use chrono::DateTime;
use serde_json::Value;

const DEFAULT_VALUE: &str = "N/A";
const DATE_FORMAT: &str = "%d.%m.%Y";

/// Look up a custom field's value on a task by field name.
pub fn custom_field_value<'a>(task: &'a Value, field_name: &str) -> Option<&'a Value> {
    if field_name.is_empty() {
        return None;
    }
    let custom_fields = task.get("custom_fields")?.as_array()?;
    custom_fields
        .iter()
        .find(|cf| cf.get("name").and_then(Value::as_str) == Some(field_name))
        .and_then(|cf| cf.get("value"))
}

/// Extract a display name from a relationship field value, which may be a
/// list of linked entities, a single entity object, or a bare string.
pub fn relationship_name(value: Option<&Value>) -> String {
    let Some(value) = value else {
        return DEFAULT_VALUE.into();
    };

    match value {
        Value::Array(items) => match items.first() {
            Some(Value::Object(entity)) => entity
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_VALUE)
                .to_owned(),
            Some(other) => value_text(other),
            None => DEFAULT_VALUE.into(),
        },
        Value::Object(entity) => entity
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_VALUE)
            .to_owned(),
        Value::Null => DEFAULT_VALUE.into(),
        other => value_text(other),
    }
}

/// Format a deadline (milliseconds since epoch, as number or numeric string)
/// as `dd.mm.yyyy`. Unparseable values are returned verbatim rather than
/// dropped, so the message still shows what ClickUp sent.
pub fn format_deadline(value: Option<&Value>) -> String {
    let Some(value) = value else {
        return DEFAULT_VALUE.into();
    };
    if value.is_null() {
        return DEFAULT_VALUE.into();
    }

    let millis = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) if !s.is_empty() => s.parse::<i64>().ok(),
        _ => None,
    };

    match millis.and_then(DateTime::from_timestamp_millis) {
        Some(timestamp) => timestamp.format(DATE_FORMAT).to_string(),
        None => {
            let raw = value_text(value);
            tracing::warn!("failed to format deadline: {raw}");
            if raw.is_empty() { DEFAULT_VALUE.into() } else { raw }
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task() -> Value {
        json!({
            "name": "Deal #7",
            "custom_fields": [
                {"name": "telegram_id", "value": "100500"},
                {"name": "Broker", "value": [{"id": "T9", "name": "Acme Brokerage"}]},
                {"name": "empty", "value": null}
            ]
        })
    }

    #[test]
    fn finds_custom_field_by_name() {
        let task = task();
        assert_eq!(
            custom_field_value(&task, "telegram_id"),
            Some(&json!("100500"))
        );
        assert_eq!(custom_field_value(&task, "missing"), None);
        assert_eq!(custom_field_value(&task, ""), None);
    }

    #[test]
    fn relationship_name_handles_all_shapes() {
        assert_eq!(
            relationship_name(Some(&json!([{"id": "T9", "name": "Acme"}]))),
            "Acme"
        );
        assert_eq!(relationship_name(Some(&json!({"name": "Solo"}))), "Solo");
        assert_eq!(relationship_name(Some(&json!("plain"))), "plain");
        assert_eq!(relationship_name(Some(&json!([]))), "N/A");
        assert_eq!(relationship_name(Some(&Value::Null)), "N/A");
        assert_eq!(relationship_name(None), "N/A");
    }

    #[test]
    fn deadline_formats_millisecond_timestamps() {
        // 2026-03-01T00:00:00Z
        let millis = 1_772_323_200_000_i64;
        assert_eq!(format_deadline(Some(&json!(millis))), "01.03.2026");
        assert_eq!(
            format_deadline(Some(&json!(millis.to_string()))),
            "01.03.2026"
        );
    }

    #[test]
    fn deadline_falls_back_on_unparseable_values() {
        assert_eq!(format_deadline(None), "N/A");
        assert_eq!(format_deadline(Some(&Value::Null)), "N/A");
        assert_eq!(format_deadline(Some(&json!("next week"))), "next week");
    }
}
