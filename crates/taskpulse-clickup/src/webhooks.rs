//! ClickUp webhook subscription lifecycle.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::client::ClickUpClient;
use crate::error::Result;

/// Event types subscribed to when none are given explicitly.
pub const DEFAULT_EVENTS: &[&str] = &[
    "taskCreated",
    "taskUpdated",
    "taskStatusUpdated",
    "taskAssigneeUpdated",
    "taskDeleted",
];

/// Manages the team's webhook registration on the ClickUp side.
pub struct WebhookManager {
    client: Arc<ClickUpClient>,
    team_id: String,
    endpoint: String,
}

impl WebhookManager {
    pub fn new(client: Arc<ClickUpClient>, team_id: &str, endpoint: &str) -> Self {
        Self {
            client,
            team_id: team_id.to_owned(),
            endpoint: endpoint.to_owned(),
        }
    }

    /// List the team's current webhooks.
    pub async fn get_webhooks(&self) -> Result<Vec<Value>> {
        let response = self
            .client
            .get(&format!("/team/{}/webhook", self.team_id), &[])
            .await?;
        Ok(response
            .get("webhooks")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Register a webhook for the configured endpoint.
    pub async fn create_webhook(&self, events: Option<&[&str]>) -> Result<Value> {
        let events = events.unwrap_or(DEFAULT_EVENTS);
        let payload = json!({
            "endpoint": self.endpoint,
            "events": events,
            "status": "active",
        });
        let created = self
            .client
            .post(&format!("/team/{}/webhook", self.team_id), &payload)
            .await?;
        tracing::info!(
            "webhook created: {}",
            created
                .get("id")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown")
        );
        Ok(created)
    }

    pub async fn delete_webhook(&self, webhook_id: &str) -> Result<()> {
        self.client.delete(&format!("/webhook/{webhook_id}")).await?;
        tracing::info!("webhook deleted: {webhook_id}");
        Ok(())
    }

    /// Delete every existing webhook and register a fresh one, so exactly one
    /// active subscription points at this instance.
    pub async fn initialize(&self) -> Result<()> {
        let existing = self.get_webhooks().await?;
        if !existing.is_empty() {
            tracing::info!("deleting {} existing webhook(s)", existing.len());
            for webhook in &existing {
                let Some(id) = webhook.get("id").and_then(Value::as_str) else {
                    continue;
                };
                if let Err(e) = self.delete_webhook(id).await {
                    tracing::warn!("could not delete webhook {id}: {e}");
                }
            }
        }

        self.create_webhook(None).await?;

        let active = self.get_webhooks().await?;
        tracing::info!(
            "webhook initialization complete, active webhooks: {}",
            active.len()
        );
        Ok(())
    }
}
