// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Remote service backends.
//!
//! Sessions and gates only see these traits, so tests can drive them with
//! scripted in-memory implementations while production code uses
//! [`http::HttpBackend`].

pub mod http;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{NextQuestion, WorkflowStatus};

/// Point-in-time reads of workflow state.
///
/// Each call is exactly one round trip: no retries, no caching.
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    /// Read the current workflow status for a project.
    async fn get_status(&self, project_id: &str) -> Result<WorkflowStatus>;

    /// Read the next pending clarification question for a project.
    async fn get_next_question(&self, project_id: &str) -> Result<NextQuestion>;
}

/// Control operations against the workflow.
///
/// Implementations map server rejections to the command-specific errors
/// (`NoDatasourceConfigured`, `StartFailed`, `CommandRejected`).
#[async_trait]
pub trait WorkflowCommands: Send + Sync {
    /// Start extraction with a free-text project description.
    async fn start(&self, project_id: &str, description: &str) -> Result<()>;

    /// Request the running workflow to stop.
    async fn cancel(&self, project_id: &str) -> Result<()>;

    /// Delete the extracted ontology.
    async fn delete(&self, project_id: &str) -> Result<()>;

    /// Cancel and start again as a single server-side operation.
    async fn restart(&self, project_id: &str) -> Result<()>;
}

/// A backend that serves both reads and commands.
pub trait OntologyBackend: StatusFetcher + WorkflowCommands {}

impl<T: StatusFetcher + WorkflowCommands> OntologyBackend for T {}
