//! Logging middleware that traces every matched handler invocation.

use std::sync::Arc;

use async_trait::async_trait;

use taskpulse_dispatch::{Event, HandlerResult, Middleware, Next};

pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(&self, event: Arc<Event>, next: Next<'_>) -> HandlerResult {
        let event_type = event.event_type.clone();
        let task_id = event.task_id.clone().unwrap_or_default();
        tracing::info!("processing event {event_type} (task {task_id})");
        let result = next.run(event).await;
        if result.is_err() {
            tracing::debug!("event {event_type} (task {task_id}) finished with error");
        }
        result
    }
}
