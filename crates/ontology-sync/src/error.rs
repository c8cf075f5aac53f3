// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for ontology-sync.

use thiserror::Error;

/// Result type using SdkError.
pub type Result<T> = std::result::Result<T, SdkError>;

/// Server error code reported when a project has no datasource to extract from.
pub const NO_DATASOURCE_CONFIGURED: &str = "no_datasource_configured";

/// Errors that can occur while observing or controlling a workflow.
#[derive(Debug, Error)]
pub enum SdkError {
    /// Configuration error (missing or invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// The service could not be reached at all (connect, DNS, timeout).
    #[error("service unreachable: {0}")]
    Unreachable(String),

    /// The service answered with an error payload or a non-success status.
    #[error("server error [{status}] {code}: {message}")]
    Server {
        status: u16,
        code: String,
        message: String,
    },

    /// Response body could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Extraction was refused because the project has no datasource.
    #[error("no datasource configured: {0}")]
    NoDatasourceConfigured(String),

    /// Extraction start was refused for any other reason.
    #[error("failed to start extraction: {0}")]
    StartFailed(String),

    /// A cancel, delete or restart command was refused.
    #[error("{command} rejected [{code}]: {message}")]
    CommandRejected {
        command: &'static str,
        code: String,
        message: String,
    },

    /// Invalid input rejected before any request was sent.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The session was stopped before the operation could be applied.
    #[error("session stopped for project {0}")]
    SessionStopped(String),
}

impl SdkError {
    /// Transport-level failure, as opposed to a server-asserted error.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, SdkError::Unreachable(_))
    }

    /// Machine-readable server code, when the server supplied one.
    pub fn code(&self) -> Option<&str> {
        match self {
            SdkError::Server { code, .. } | SdkError::CommandRejected { code, .. } => {
                Some(code.as_str())
            }
            SdkError::NoDatasourceConfigured(_) => Some(NO_DATASOURCE_CONFIGURED),
            _ => None,
        }
    }

    /// Message suitable for a banner or toast in the console.
    pub fn user_message(&self) -> String {
        match self {
            SdkError::NoDatasourceConfigured(_) => {
                "No datasource is configured for this project. Connect a datasource and select \
                 the schema to extract before starting ontology extraction."
                    .to_string()
            }
            SdkError::Unreachable(_) => {
                "Unable to reach the server. Check your connection and try again.".to_string()
            }
            SdkError::StartFailed(message) => {
                format!("Failed to start ontology extraction: {}", message)
            }
            SdkError::CommandRejected {
                command, message, ..
            } => format!("Failed to {} the ontology workflow: {}", command, message),
            SdkError::InvalidInput(message) => message.clone(),
            SdkError::SessionStopped(_) => {
                "The workflow view was closed before the request completed.".to_string()
            }
            other => format!("Unexpected error: {}", other),
        }
    }
}

impl From<reqwest::Error> for SdkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SdkError::Serialization(err.to_string())
        } else if let Some(status) = err.status() {
            SdkError::Server {
                status: status.as_u16(),
                code: status.as_str().to_string(),
                message: err.to_string(),
            }
        } else {
            SdkError::Unreachable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::Serialization(err.to_string())
    }
}
