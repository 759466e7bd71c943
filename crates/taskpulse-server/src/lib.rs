//! HTTP ingress for ClickUp webhooks, built on Axum.
//!
//! One POST endpoint receives webhook deliveries, verifies the optional
//! shared secret and hands the parsed payload to the dispatcher. The
//! dispatcher must be fully registered before the server starts; it is shared
//! read-only across concurrent requests.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

use taskpulse_dispatch::Dispatcher;

/// Shared state for the webhook server.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub secret: Option<String>,
}

/// Webhook ingress server.
pub struct WebhookServer {
    state: AppState,
    path: String,
}

impl WebhookServer {
    /// `path` is where the webhook endpoint is mounted, e.g. `/clickup-webhook`.
    pub fn new(dispatcher: Arc<Dispatcher>, secret: Option<String>, path: &str) -> Self {
        Self {
            state: AppState { dispatcher, secret },
            path: path.to_owned(),
        }
    }

    /// Build the router. Exposed separately so tests can drive it without a
    /// listener.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(root))
            .route("/health", get(health))
            .route(&self.path, post(receive_webhook))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind and serve until the process exits.
    pub async fn serve(self, host: &str, port: u16) -> anyhow::Result<()> {
        let app = self.router();
        let addr = format!("{host}:{port}");
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!("webhook server listening on http://{addr}{}", self.path);
        axum::serve(listener, app).await?;
        Ok(())
    }
}

async fn root() -> Json<Value> {
    Json(json!({"status": "ok", "message": "TaskPulse Webhook Server"}))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "healthy"}))
}

/// Webhook delivery endpoint.
///
/// 401 on a bad shared secret, 500 on unparseable JSON, otherwise 200 with
/// the count of handlers that ran. Individual handler failures are logged by
/// the dispatcher and do not affect the response: routing itself succeeded.
async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let payload: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!("error parsing webhook body: {e}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "error", "detail": format!("invalid JSON: {e}")})),
            )
                .into_response();
        }
    };

    if let Some(expected) = &state.secret {
        // ClickUp sends the secret in a header; some proxies move it into
        // the body, so accept either.
        let received = headers
            .get("X-ClickUp-Secret")
            .and_then(|value| value.to_str().ok())
            .or_else(|| payload.get("secret").and_then(Value::as_str));
        if received != Some(expected.as_str()) {
            tracing::warn!("webhook secret verification failed");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"status": "error", "detail": "invalid secret"})),
            )
                .into_response();
        }
    }

    tracing::info!(
        "received webhook event: {}",
        payload
            .get("event")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown")
    );

    let results = state.dispatcher.dispatch(&payload).await;
    (
        StatusCode::OK,
        Json(json!({"status": "ok", "processed": results.len()})),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn dispatcher_with_handler() -> Arc<Dispatcher> {
        let mut dispatcher = Dispatcher::new();
        dispatcher.on("taskCreated", "ack", None, |_event| async {
            Ok(json!("done"))
        });
        Arc::new(dispatcher)
    }

    fn server(secret: Option<&str>) -> Router {
        WebhookServer::new(
            dispatcher_with_handler(),
            secret.map(str::to_owned),
            "/clickup-webhook",
        )
        .router()
    }

    fn webhook_request(body: &str, secret_header: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/clickup-webhook")
            .header("content-type", "application/json");
        if let Some(secret) = secret_header {
            builder = builder.header("X-ClickUp-Secret", secret);
        }
        builder.body(Body::from(body.to_owned())).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoints_respond() {
        let app = server(None);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn dispatches_and_reports_processed_count() {
        let app = server(None);
        let response = app
            .oneshot(webhook_request(r#"{"event": "taskCreated"}"#, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["processed"], json!(1));
    }

    #[tokio::test]
    async fn unhandled_event_type_still_returns_ok() {
        let app = server(None);
        let response = app
            .oneshot(webhook_request(r#"{"event": "spaceCreated"}"#, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["processed"], json!(0));
    }

    #[tokio::test]
    async fn bad_secret_is_rejected_without_dispatch() {
        let app = server(Some("s3cret"));
        let response = app
            .oneshot(webhook_request(r#"{"event": "taskCreated"}"#, Some("wrong")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn secret_accepted_from_header_or_body() {
        let app = server(Some("s3cret"));
        let response = app
            .oneshot(webhook_request(r#"{"event": "taskCreated"}"#, Some("s3cret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let app = server(Some("s3cret"));
        let response = app
            .oneshot(webhook_request(
                r#"{"event": "taskCreated", "secret": "s3cret"}"#,
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_json_returns_500() {
        let app = server(None);
        let response = app
            .oneshot(webhook_request("{not json", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
