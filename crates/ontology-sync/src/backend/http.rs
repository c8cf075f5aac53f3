// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP backend for the console API.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use super::{StatusFetcher, WorkflowCommands};
use crate::config::SdkConfig;
use crate::error::{NO_DATASOURCE_CONFIGURED, Result, SdkError};
use crate::types::{NextQuestion, WorkflowStatus};

/// JSON-over-HTTP implementation of [`StatusFetcher`] and [`WorkflowCommands`].
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    error: Option<ErrorField>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorField {
    Message(String),
    Detail {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
}

impl ErrorPayload {
    fn into_server_error(self, status: StatusCode) -> SdkError {
        let (nested_code, nested_message) = match self.error {
            Some(ErrorField::Message(message)) => (None, Some(message)),
            Some(ErrorField::Detail { code, message }) => (code, message),
            None => (None, None),
        };
        let code = self
            .code
            .or(nested_code)
            .unwrap_or_else(|| status.as_str().to_string());
        let message = nested_message
            .or(self.message)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
        SdkError::Server {
            status: status.as_u16(),
            code,
            message,
        }
    }
}

impl HttpBackend {
    /// Create a backend from configuration.
    pub fn new(config: &SdkConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SdkError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, project_id: &str, path: &str) -> Result<String> {
        if project_id.is_empty()
            || project_id
                .chars()
                .any(|c| c == '/' || c == '?' || c == '#' || c.is_whitespace())
        {
            return Err(SdkError::InvalidInput(format!(
                "invalid project id: {:?}",
                project_id
            )));
        }
        Ok(format!(
            "{}/api/projects/{}/ontology/{}",
            self.base_url, project_id, path
        ))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and decode the (optionally `data`-wrapped) JSON body.
    ///
    /// A body with a `data` key is decoded from `data` alone; a body that
    /// does not decode is a `Serialization` error, never a default value.
    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let payload: ErrorPayload = serde_json::from_slice(&bytes).unwrap_or_default();
            return Err(payload.into_server_error(status));
        }

        let value: Value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };

        if value.get("success").and_then(Value::as_bool) == Some(false) {
            let payload: ErrorPayload = serde_json::from_value(value).unwrap_or_default();
            return Err(payload.into_server_error(StatusCode::UNPROCESSABLE_ENTITY));
        }

        let body = match value {
            Value::Object(mut fields) if fields.contains_key("data") => {
                fields.remove("data").unwrap_or(Value::Null)
            }
            bare => bare,
        };
        Ok(serde_json::from_value(body)?)
    }

    async fn post_command(
        &self,
        command: &'static str,
        project_id: &str,
        body: Option<Value>,
    ) -> Result<()> {
        let url = self.endpoint(project_id, command)?;
        let mut builder = self.request(Method::POST, &url);
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        self.send::<Value>(builder).await.map(|_| ())
    }
}

fn reject(command: &'static str, err: SdkError) -> SdkError {
    match err {
        SdkError::Server { code, message, .. } => SdkError::CommandRejected {
            command,
            code,
            message,
        },
        other => other,
    }
}

#[async_trait]
impl StatusFetcher for HttpBackend {
    #[instrument(skip(self), fields(project_id = %project_id))]
    async fn get_status(&self, project_id: &str) -> Result<WorkflowStatus> {
        let url = self.endpoint(project_id, "workflow")?;
        let status: WorkflowStatus = self.send(self.request(Method::GET, &url)).await?;
        debug!(state = %status.state(), "Fetched workflow status");
        Ok(status)
    }

    #[instrument(skip(self), fields(project_id = %project_id))]
    async fn get_next_question(&self, project_id: &str) -> Result<NextQuestion> {
        let url = self.endpoint(project_id, "questions/next")?;
        self.send(self.request(Method::GET, &url)).await
    }
}

#[async_trait]
impl WorkflowCommands for HttpBackend {
    #[instrument(skip(self, description), fields(project_id = %project_id))]
    async fn start(&self, project_id: &str, description: &str) -> Result<()> {
        let body = serde_json::json!({ "description": description });
        match self.post_command("extract", project_id, Some(body)).await {
            Ok(()) => Ok(()),
            Err(SdkError::Server { code, message, .. }) if code == NO_DATASOURCE_CONFIGURED => {
                Err(SdkError::NoDatasourceConfigured(message))
            }
            Err(SdkError::Server { message, .. }) => Err(SdkError::StartFailed(message)),
            Err(other) => Err(other),
        }
    }

    #[instrument(skip(self), fields(project_id = %project_id))]
    async fn cancel(&self, project_id: &str) -> Result<()> {
        self.post_command("cancel", project_id, None)
            .await
            .map_err(|e| reject("cancel", e))
    }

    #[instrument(skip(self), fields(project_id = %project_id))]
    async fn delete(&self, project_id: &str) -> Result<()> {
        self.post_command("delete", project_id, None)
            .await
            .map_err(|e| reject("delete", e))
    }

    #[instrument(skip(self), fields(project_id = %project_id))]
    async fn restart(&self, project_id: &str) -> Result<()> {
        self.post_command("restart", project_id, None)
            .await
            .map_err(|e| reject("restart", e))
    }
}
