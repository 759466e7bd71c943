//! TaskPulse error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TaskPulseError>;

#[derive(Debug, Error)]
pub enum TaskPulseError {
    #[error("Configuration error: {0}")]
    Config(String),
}
