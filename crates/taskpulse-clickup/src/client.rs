//! HTTP client for the ClickUp v2 API.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;

use crate::error::{ClickUpError, Result};

const BASE_URL: &str = "https://api.clickup.com/api/v2";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// ClickUp API client. Cheap to clone behind an `Arc`; one instance is built
/// at startup and shared by every handler.
pub struct ClickUpClient {
    http: reqwest::Client,
    base_url: String,
}

impl ClickUpClient {
    /// Build a client authenticating with the given personal API token.
    pub fn new(token: &str) -> Result<Self> {
        Self::with_base_url(token, BASE_URL)
    }

    /// Build a client against a non-default base URL. Used by tests.
    pub fn with_base_url(token: &str, base_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(token).map_err(|_| {
            ClickUpError::InvalidToken("token contains invalid header characters".into())
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// Fetch a single task by id.
    pub async fn get_task(&self, task_id: &str) -> Result<Value> {
        self.get(&format!("/task/{task_id}"), &[]).await
    }

    /// Fetch one page of the team's tasks, optionally filtered to the given
    /// assignee user ids. ClickUp pages are fixed-size; an empty `tasks`
    /// array means the page ran past the end.
    pub async fn get_team_tasks(
        &self,
        team_id: &str,
        page: u32,
        assignees: &[&str],
    ) -> Result<Value> {
        let mut params: Vec<(&str, String)> = vec![("page", page.to_string())];
        for assignee in assignees {
            params.push(("assignees[]", (*assignee).to_owned()));
        }
        self.get(&format!("/team/{team_id}/task"), &params).await
    }

    pub(crate) async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Value> {
        let mut request = self.http.get(format!("{}{path}", self.base_url));
        if !params.is_empty() {
            request = request.query(params);
        }
        Self::read_response(path, request.send().await?).await
    }

    pub(crate) async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await?;
        Self::read_response(path, response).await
    }

    pub(crate) async fn delete(&self, path: &str) -> Result<Value> {
        let response = self
            .http
            .delete(format!("{}{path}", self.base_url))
            .send()
            .await?;
        Self::read_response(path, response).await
    }

    async fn read_response(path: &str, response: reqwest::Response) -> Result<Value> {
        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::NOT_FOUND => Err(ClickUpError::NotFound(path.to_owned())),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ClickUpError::Api {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}
