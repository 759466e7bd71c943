//! Webhook event dispatch core.
//!
//! A ClickUp webhook payload is normalized into an [`Event`], matched against
//! registered `(event type, filter)` pairs and routed through a middleware
//! chain to the handlers that claimed it. Filters are pure predicates over the
//! event; anything that needs I/O belongs in a handler.

pub mod dispatcher;
pub mod event;
pub mod filters;

pub use dispatcher::{Dispatcher, Handler, HandlerError, HandlerResult, Middleware, Next};
pub use event::{Event, HistoryItem, event_types};
pub use filters::{
    AssigneeChangeFilter, CombinedFilter, EventTypeFilter, FieldChangeFilter, Filter, FilterError,
    Logic, StatusTransitionFilter, assignee_changed, field_changed, field_removed, field_set,
    field_updated, status_changed,
};
