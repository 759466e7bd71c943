//! ClickUp REST API client.
//!
//! Handlers consume this crate to enrich webhook events: fetch the task the
//! event refers to, read custom fields, and manage the webhook subscription
//! itself.

pub mod client;
pub mod error;
pub mod fields;
pub mod webhooks;

pub use client::ClickUpClient;
pub use error::{ClickUpError, Result};
pub use fields::{custom_field_value, format_deadline, relationship_name};
pub use webhooks::WebhookManager;
