//! Composable event filters.
//!
//! A filter is a stateless predicate over an [`Event`]. Filters never perform
//! I/O; decisions that depend on external data belong in handlers. The
//! `check` method is async only so implementations compose with the async
//! dispatch path.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::event::{Event, HistoryItem, event_types, value_to_string};

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("field change filter requires a field_id or field_name")]
    MissingFieldTarget,
}

/// Predicate deciding whether a handler should run for a given event.
#[async_trait]
pub trait Filter: Send + Sync {
    async fn check(&self, event: &Event) -> bool;
}

/// A value counts as empty when it is null, or an empty string/array/object.
/// Numbers are never empty: zero is a real value, not an absent one.
fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(m) => m.is_empty(),
        Value::Number(_) | Value::Bool(_) => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeKind {
    Set,
    Remove,
    Update,
}

fn classify_change(before: &Value, after: &Value) -> Option<ChangeKind> {
    match (is_empty_value(before), is_empty_value(after)) {
        (true, false) => Some(ChangeKind::Set),
        (false, true) => Some(ChangeKind::Remove),
        (false, false) => Some(ChangeKind::Update),
        (true, true) => None,
    }
}

/// Matches custom-field changes on `taskUpdated` events.
///
/// Each history item is classified as a set / remove / update by comparing the
/// emptiness of `before` and `after`, then matched against the configured
/// field identity. The first item that passes both checks accepts the event.
pub struct FieldChangeFilter {
    field_id: Option<String>,
    field_name: Option<String>,
    on_set: bool,
    on_remove: bool,
    on_update: bool,
}

impl FieldChangeFilter {
    /// Create a filter matching all three change kinds. At least one of
    /// `field_id` / `field_name` must be given; a target-less filter is a
    /// registration bug and fails here rather than silently never matching.
    pub fn new(
        field_id: Option<&str>,
        field_name: Option<&str>,
    ) -> Result<Self, FilterError> {
        if field_id.is_none() && field_name.is_none() {
            return Err(FilterError::MissingFieldTarget);
        }
        Ok(Self {
            field_id: field_id.map(str::to_owned),
            field_name: field_name.map(str::to_owned),
            on_set: true,
            on_remove: true,
            on_update: true,
        })
    }

    /// Restrict which change kinds the filter accepts.
    pub fn with_changes(mut self, on_set: bool, on_remove: bool, on_update: bool) -> Self {
        self.on_set = on_set;
        self.on_remove = on_remove;
        self.on_update = on_update;
        self
    }

    fn accepts_kind(&self, kind: ChangeKind) -> bool {
        match kind {
            ChangeKind::Set => self.on_set,
            ChangeKind::Remove => self.on_remove,
            ChangeKind::Update => self.on_update,
        }
    }

    /// Field identity by id, tried from precise to loose:
    /// exact id on the item, substring in the label, recursive id-key search
    /// inside before/after, then a substring scan over the serialized item.
    fn matches_by_id(&self, item: &HistoryItem, target: &str) -> bool {
        let target = target.trim();

        if let Some(field_id) = &item.field_id {
            if field_id.trim() == target {
                return true;
            }
        }
        if let Some(id) = item.raw.get("id") {
            if value_to_string(id).trim() == target {
                return true;
            }
        }

        if let Some(field) = &item.field {
            if field.contains(target) {
                return true;
            }
        }

        if find_id_key(&item.after, target) || find_id_key(&item.before, target) {
            return true;
        }

        // Last resort: the id may be buried somewhere we do not model.
        item.raw.to_string().contains(target)
    }

    /// Field identity by label: case-insensitive equals/contains in either
    /// direction against the label and the `name`/`label` sub-fields of
    /// after/before, then the serialized-item fallback.
    fn matches_by_name(&self, item: &HistoryItem, target: &str) -> bool {
        let needle = target.trim().to_lowercase();

        if let Some(field) = &item.field {
            if labels_overlap(&needle, field) {
                return true;
            }
        }

        for side in [&item.after, &item.before] {
            if let Some(map) = side.as_object() {
                for key in ["name", "label"] {
                    if let Some(candidate) = map.get(key).and_then(Value::as_str) {
                        if !candidate.is_empty() && labels_overlap(&needle, candidate) {
                            return true;
                        }
                    }
                }
            }
        }

        item.raw.to_string().to_lowercase().contains(&needle)
    }
}

fn labels_overlap(needle: &str, candidate: &str) -> bool {
    let hay = candidate.trim().to_lowercase();
    needle == hay || hay.contains(needle) || needle.contains(&hay)
}

/// Recursive search for an id-like key holding `target`. Covers the nested
/// `custom_field` sub-object ClickUp uses for field payloads, and descends
/// into object values and array elements.
fn find_id_key(value: &Value, target: &str) -> bool {
    if let Some(elements) = value.as_array() {
        return elements
            .iter()
            .any(|element| element.is_object() && find_id_key(element, target));
    }
    let Some(map) = value.as_object() else {
        return false;
    };

    const ID_KEYS: [&str; 3] = ["id", "field_id", "custom_field_id"];

    for key in ID_KEYS {
        if let Some(found) = map.get(key) {
            if value_to_string(found).trim() == target {
                return true;
            }
        }
    }

    if let Some(custom_field) = map.get("custom_field").and_then(Value::as_object) {
        for key in ID_KEYS {
            if let Some(found) = custom_field.get(key) {
                if value_to_string(found).trim() == target {
                    return true;
                }
            }
        }
    }

    for nested in map.values() {
        match nested {
            Value::Object(_) => {
                if find_id_key(nested, target) {
                    return true;
                }
            }
            Value::Array(elements) => {
                for element in elements {
                    if element.is_object() && find_id_key(element, target) {
                        return true;
                    }
                }
            }
            _ => {}
        }
    }

    false
}

#[async_trait]
impl Filter for FieldChangeFilter {
    async fn check(&self, event: &Event) -> bool {
        if event.event_type != event_types::TASK_UPDATED {
            return false;
        }

        for item in &event.history_items {
            let Some(kind) = classify_change(&item.before, &item.after) else {
                continue;
            };
            if !self.accepts_kind(kind) {
                continue;
            }

            if let Some(target) = &self.field_id {
                if self.matches_by_id(item, target) {
                    return true;
                }
            }
            if let Some(target) = &self.field_name {
                if self.matches_by_name(item, target) {
                    return true;
                }
            }
        }

        false
    }
}

/// Matches status transitions on `taskStatusUpdated` events.
///
/// Each bound is optional; an unconfigured bound matches any status.
/// Comparison is case-insensitive.
pub struct StatusTransitionFilter {
    from_status: Option<String>,
    to_status: Option<String>,
}

impl StatusTransitionFilter {
    pub fn new(from_status: Option<&str>, to_status: Option<&str>) -> Self {
        Self {
            from_status: from_status.map(|s| s.to_lowercase()),
            to_status: to_status.map(|s| s.to_lowercase()),
        }
    }
}

/// Pull a status string out of a history item value. ClickUp sends either a
/// bare string or a `{status: {status: "..."}}` nesting depending on the
/// webhook variant.
fn extract_status(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_owned(),
        Value::Object(map) => match map.get("status") {
            Some(Value::Object(inner)) => inner
                .get("status")
                .map(value_to_string)
                .unwrap_or_default()
                .trim()
                .to_owned(),
            Some(Value::String(s)) => s.trim().to_owned(),
            Some(other) => value_to_string(other).trim().to_owned(),
            None => String::new(),
        },
        Value::Null => String::new(),
        other => value_to_string(other).trim().to_owned(),
    }
}

#[async_trait]
impl Filter for StatusTransitionFilter {
    async fn check(&self, event: &Event) -> bool {
        if event.event_type != event_types::TASK_STATUS_UPDATED {
            return false;
        }

        for item in &event.history_items {
            let old_status = extract_status(&item.before).to_lowercase();
            let new_status = extract_status(&item.after).to_lowercase();

            if let Some(from) = &self.from_status {
                if &old_status != from {
                    continue;
                }
            }
            if let Some(to) = &self.to_status {
                if &new_status != to {
                    continue;
                }
            }
            return true;
        }

        false
    }
}

/// Matches assignee changes on `taskAssigneeUpdated` events.
///
/// Without a user id it matches any assignee change. With one, the event is
/// accepted when `after.assignees` contains that user; entries may be
/// objects with an `id` or bare identifiers.
pub struct AssigneeChangeFilter {
    user_id: Option<String>,
}

impl AssigneeChangeFilter {
    pub fn new(user_id: Option<&str>) -> Self {
        Self {
            user_id: user_id.map(str::to_owned),
        }
    }
}

#[async_trait]
impl Filter for AssigneeChangeFilter {
    async fn check(&self, event: &Event) -> bool {
        if event.event_type != event_types::TASK_ASSIGNEE_UPDATED {
            return false;
        }

        let Some(user_id) = &self.user_id else {
            return true;
        };

        for item in &event.history_items {
            let Some(assignees) = item.after.get("assignees").and_then(Value::as_array) else {
                continue;
            };
            for assignee in assignees {
                let id = match assignee.get("id") {
                    Some(id) => value_to_string(id),
                    None => value_to_string(assignee),
                };
                if &id == user_id {
                    return true;
                }
            }
        }

        false
    }
}

/// Matches when the event type is in the configured set (case-insensitive).
pub struct EventTypeFilter {
    event_types: Vec<String>,
}

impl EventTypeFilter {
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            event_types: types
                .into_iter()
                .map(|t| t.as_ref().to_lowercase())
                .collect(),
        }
    }
}

#[async_trait]
impl Filter for EventTypeFilter {
    async fn check(&self, event: &Event) -> bool {
        self.event_types.contains(&event.event_type.to_lowercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logic {
    And,
    Or,
}

/// Combines child filters with AND/OR logic.
///
/// All children are evaluated; filters are side-effect free, so there is
/// nothing to gain from short-circuiting. An empty child list is vacuously
/// true.
pub struct CombinedFilter {
    filters: Vec<Box<dyn Filter>>,
    logic: Logic,
}

impl CombinedFilter {
    pub fn new(filters: Vec<Box<dyn Filter>>, logic: Logic) -> Self {
        Self { filters, logic }
    }
}

#[async_trait]
impl Filter for CombinedFilter {
    async fn check(&self, event: &Event) -> bool {
        if self.filters.is_empty() {
            return true;
        }

        let mut results = Vec::with_capacity(self.filters.len());
        for filter in &self.filters {
            results.push(filter.check(event).await);
        }

        match self.logic {
            Logic::And => results.iter().all(|r| *r),
            Logic::Or => results.iter().any(|r| *r),
        }
    }
}

/// Filter for any change to the given field.
pub fn field_changed(
    field_id: Option<&str>,
    field_name: Option<&str>,
) -> Result<FieldChangeFilter, FilterError> {
    FieldChangeFilter::new(field_id, field_name)
}

/// Filter for a field going from empty to filled.
pub fn field_set(
    field_id: Option<&str>,
    field_name: Option<&str>,
) -> Result<FieldChangeFilter, FilterError> {
    Ok(FieldChangeFilter::new(field_id, field_name)?.with_changes(true, false, false))
}

/// Filter for a field going from filled to empty.
pub fn field_removed(
    field_id: Option<&str>,
    field_name: Option<&str>,
) -> Result<FieldChangeFilter, FilterError> {
    Ok(FieldChangeFilter::new(field_id, field_name)?.with_changes(false, true, false))
}

/// Filter for a filled field changing to another filled value.
pub fn field_updated(
    field_id: Option<&str>,
    field_name: Option<&str>,
) -> Result<FieldChangeFilter, FilterError> {
    Ok(FieldChangeFilter::new(field_id, field_name)?.with_changes(false, false, true))
}

/// Filter for a status transition.
pub fn status_changed(
    from_status: Option<&str>,
    to_status: Option<&str>,
) -> StatusTransitionFilter {
    StatusTransitionFilter::new(from_status, to_status)
}

/// Filter for an assignee change, optionally scoped to one user.
pub fn assignee_changed(user_id: Option<&str>) -> AssigneeChangeFilter {
    AssigneeChangeFilter::new(user_id)
}
