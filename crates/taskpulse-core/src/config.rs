//! TaskPulse configuration, loaded from environment variables.
//!
//! The config is built once at startup and threaded explicitly into the
//! server, the API clients and the handlers, with no global state.

use std::env;

use crate::error::{Result, TaskPulseError};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// ClickUp personal API token (`CLICKUP_API_TOKEN`, required).
    pub clickup_api_token: String,
    /// ClickUp team (workspace) id (`TEAM_ID`, required).
    pub team_id: String,
    /// Telegram bot token (`BOT_TOKEN`, required).
    pub bot_token: String,
    /// Shared secret expected on inbound webhook requests (`WEBHOOK_SECRET`).
    pub webhook_secret: Option<String>,
    /// Public URL ClickUp should deliver webhooks to (`WEBHOOK_ENDPOINT`).
    /// When unset, webhook bootstrap on the ClickUp side is skipped.
    pub webhook_endpoint: Option<String>,
    /// Local path the webhook endpoint is mounted at (`WEBHOOK_PATH`).
    pub webhook_path: String,
    /// Bind address (`SERVER_HOST`).
    pub server_host: String,
    /// Bind port (`SERVER_PORT`).
    pub server_port: u16,
    /// Default Telegram chat for status notifications (`NOTIFY_CHAT_ID`).
    pub notify_chat_id: Option<String>,
    /// Log verbosity passed to the tracing env filter (`LOG_LEVEL`).
    pub log_level: String,
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// Missing required variables are reported together in a single error so
    /// a misconfigured deployment fails fast with the full list.
    pub fn from_env() -> Result<Self> {
        let clickup_api_token = optional("CLICKUP_API_TOKEN").unwrap_or_default();
        let team_id = optional("TEAM_ID").unwrap_or_default();
        let bot_token = optional("BOT_TOKEN").unwrap_or_default();

        let required = [
            ("CLICKUP_API_TOKEN", &clickup_api_token),
            ("TEAM_ID", &team_id),
            ("BOT_TOKEN", &bot_token),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(TaskPulseError::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let server_port = match optional("SERVER_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| {
                TaskPulseError::Config(format!("SERVER_PORT is not a valid port: {raw}"))
            })?,
            None => 3000,
        };

        Ok(Self {
            clickup_api_token,
            team_id,
            bot_token,
            webhook_secret: optional("WEBHOOK_SECRET"),
            webhook_endpoint: optional("WEBHOOK_ENDPOINT"),
            webhook_path: optional("WEBHOOK_PATH").unwrap_or_else(|| "/clickup-webhook".into()),
            server_host: optional("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            server_port,
            notify_chat_id: optional("NOTIFY_CHAT_ID"),
            log_level: optional("LOG_LEVEL").unwrap_or_else(|| "info".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env vars are process-global; serialize the tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            "CLICKUP_API_TOKEN",
            "TEAM_ID",
            "BOT_TOKEN",
            "WEBHOOK_SECRET",
            "WEBHOOK_ENDPOINT",
            "WEBHOOK_PATH",
            "SERVER_HOST",
            "SERVER_PORT",
            "NOTIFY_CHAT_ID",
            "LOG_LEVEL",
        ] {
            unsafe { env::remove_var(key) };
        }
    }

    fn set_required() {
        unsafe {
            env::set_var("CLICKUP_API_TOKEN", "pk_test");
            env::set_var("TEAM_ID", "9001");
            env::set_var("BOT_TOKEN", "123:abc");
        }
    }

    #[test]
    fn missing_required_vars_are_reported_together() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe { env::set_var("TEAM_ID", "9001") };

        let err = Config::from_env().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("CLICKUP_API_TOKEN"));
        assert!(message.contains("BOT_TOKEN"));
        assert!(!message.contains("TEAM_ID,"));
    }

    #[test]
    fn defaults_apply_when_optionals_are_absent() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        set_required();

        let config = Config::from_env().unwrap();
        assert_eq!(config.webhook_path, "/clickup-webhook");
        assert_eq!(config.server_host, "0.0.0.0");
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.log_level, "info");
        assert!(config.webhook_secret.is_none());
        assert!(config.webhook_endpoint.is_none());
    }

    #[test]
    fn invalid_port_is_a_config_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        set_required();
        unsafe { env::set_var("SERVER_PORT", "not-a-port") };

        assert!(Config::from_env().is_err());
    }
}
