//! ClickUp client errors.
//!
//! Not-found is distinct from other API failures so handlers can decide to
//! skip a vanished task instead of treating it as a transient fault.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClickUpError>;

#[derive(Debug, Error)]
pub enum ClickUpError {
    #[error("invalid API token: {0}")]
    InvalidToken(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("ClickUp API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}
