// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for workflow sessions and the HTTP backend.

use std::time::Duration;

use crate::error::{Result, SdkError};

/// Default base URL of the console API.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3443";

/// Behavioral switches shared by every session created from one registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Glossary generation waits for required clarification questions.
    pub require_question_gate: bool,
    /// `start_extraction` rejects a blank description locally.
    pub require_description_to_start: bool,
    /// QuestionGate assumes zero pending questions when the read fails.
    pub assume_clear_on_error: bool,
    /// Fast-cadence ticks a command keeps alive before polling may slow down.
    pub command_settle_ticks: u32,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            require_question_gate: true,
            require_description_to_start: false,
            assume_clear_on_error: true,
            command_settle_ticks: 5,
        }
    }
}

/// Configuration for the SessionRegistry and HttpBackend.
#[derive(Debug, Clone)]
pub struct SdkConfig {
    /// Base URL of the console API.
    pub base_url: String,
    /// Optional bearer token sent with every request.
    pub api_token: Option<String>,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Request timeout.
    pub request_timeout: Duration,
    /// Poll interval while a workflow is active or a command is pending.
    pub poll_interval: Duration,
    /// Poll interval once the workflow is idle, complete or failed.
    /// `None` suspends polling until the next command.
    pub settled_poll_interval: Option<Duration>,
    /// Session behavior switches.
    pub policy: SessionPolicy,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_token: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(3),
            settled_poll_interval: Some(Duration::from_secs(15)),
            policy: SessionPolicy::default(),
        }
    }
}

impl SdkConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration for a local API on the given port.
    pub fn localhost(port: u16) -> Self {
        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            ..Self::default()
        }
    }

    /// Create a configuration from environment variables.
    ///
    /// Environment variables:
    /// - `ONTOLOGY_API_URL`: Base URL (default: "http://127.0.0.1:3443")
    /// - `ONTOLOGY_API_TOKEN`: Bearer token (default: unset)
    /// - `ONTOLOGY_CONNECT_TIMEOUT_MS`: Connection timeout (default: 10000)
    /// - `ONTOLOGY_REQUEST_TIMEOUT_MS`: Request timeout (default: 30000)
    /// - `ONTOLOGY_POLL_INTERVAL_MS`: Active poll interval (default: 3000)
    /// - `ONTOLOGY_SETTLED_POLL_INTERVAL_MS`: Settled poll interval (default: 15000, 0 suspends)
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("ONTOLOGY_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(SdkError::Config(format!(
                "invalid ONTOLOGY_API_URL: {} (expected http:// or https://)",
                base_url
            )));
        }

        let api_token = std::env::var("ONTOLOGY_API_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());

        let connect_timeout_ms = env_millis("ONTOLOGY_CONNECT_TIMEOUT_MS", 10_000)?;
        let request_timeout_ms = env_millis("ONTOLOGY_REQUEST_TIMEOUT_MS", 30_000)?;
        let poll_interval_ms = env_millis("ONTOLOGY_POLL_INTERVAL_MS", 3_000)?;
        let settled_poll_interval_ms = env_millis("ONTOLOGY_SETTLED_POLL_INTERVAL_MS", 15_000)?;

        if poll_interval_ms == 0 {
            return Err(SdkError::Config(
                "ONTOLOGY_POLL_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            api_token,
            connect_timeout: Duration::from_millis(connect_timeout_ms),
            request_timeout: Duration::from_millis(request_timeout_ms),
            poll_interval: Duration::from_millis(poll_interval_ms),
            settled_poll_interval: (settled_poll_interval_ms > 0)
                .then(|| Duration::from_millis(settled_poll_interval_ms)),
            policy: SessionPolicy::default(),
        })
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the bearer token.
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the active poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the settled poll interval (`None` suspends polling when settled).
    pub fn with_settled_poll_interval(mut self, interval: Option<Duration>) -> Self {
        self.settled_poll_interval = interval;
        self
    }

    /// Set the session policy.
    pub fn with_policy(mut self, policy: SessionPolicy) -> Self {
        self.policy = policy;
        self
    }
}

fn env_millis(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|e| SdkError::Config(format!("invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SdkConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(config.api_token.is_none());
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert_eq!(config.settled_poll_interval, Some(Duration::from_secs(15)));
        assert!(config.policy.assume_clear_on_error);
    }

    #[test]
    fn test_localhost_config() {
        let config = SdkConfig::localhost(8080);
        assert_eq!(config.base_url, "http://127.0.0.1:8080");
    }

    #[test]
    fn test_builder_methods() {
        let config = SdkConfig::new()
            .with_base_url("https://console.example.com")
            .with_api_token("secret")
            .with_connect_timeout(Duration::from_secs(5))
            .with_request_timeout(Duration::from_secs(60))
            .with_poll_interval(Duration::from_millis(500))
            .with_settled_poll_interval(None)
            .with_policy(SessionPolicy {
                require_description_to_start: true,
                ..SessionPolicy::default()
            });

        assert_eq!(config.base_url, "https://console.example.com");
        assert_eq!(config.api_token.as_deref(), Some("secret"));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert!(config.settled_poll_interval.is_none());
        assert!(config.policy.require_description_to_start);
    }
}
