// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Control commands for a project's workflow.
//!
//! Commands never predict the resulting workflow state. Once the server
//! accepts a command the gateway reads status once, outside the poll cadence,
//! so every observer sees the effect without waiting for the next tick.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::backend::WorkflowCommands;
use crate::config::SessionPolicy;
use crate::error::{Result, SdkError};
use crate::registry::SessionLease;
use crate::types::WorkflowStatus;

/// Issues start/cancel/delete/restart for the lease's project.
pub struct CommandGateway<'a> {
    lease: &'a SessionLease,
    commands: Arc<dyn WorkflowCommands>,
    policy: SessionPolicy,
}

impl<'a> CommandGateway<'a> {
    pub(crate) fn new(
        lease: &'a SessionLease,
        commands: Arc<dyn WorkflowCommands>,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            lease,
            commands,
            policy,
        }
    }

    fn project_id(&self) -> &str {
        self.lease.project_id()
    }

    /// Start ontology extraction.
    ///
    /// Returns the status read right after the server accepted the command,
    /// or `None` if that read failed (polling will pick the change up).
    #[instrument(skip(self, description), fields(project_id = %self.project_id()))]
    pub async fn start_extraction(&self, description: &str) -> Result<Option<WorkflowStatus>> {
        self.lease.ensure_active()?;
        if self.policy.require_description_to_start && description.trim().is_empty() {
            return Err(SdkError::InvalidInput(
                "A project description is required to start ontology extraction.".to_string(),
            ));
        }

        info!("Starting ontology extraction");
        self.commands
            .start(self.project_id(), description)
            .await
            .inspect_err(|e| warn!(error = %e, "Start extraction rejected"))?;
        Ok(self.after_accept("start").await)
    }

    /// Ask the running workflow to stop. Work already completed is kept
    /// server-side.
    #[instrument(skip(self), fields(project_id = %self.project_id()))]
    pub async fn cancel(&self) -> Result<Option<WorkflowStatus>> {
        self.lease.ensure_active()?;
        info!("Cancelling ontology extraction");
        self.commands
            .cancel(self.project_id())
            .await
            .inspect_err(|e| warn!(error = %e, "Cancel rejected"))?;
        Ok(self.after_accept("cancel").await)
    }

    /// Delete the extracted ontology. Confirmation is the caller's job.
    ///
    /// Question-derived flags are reset locally as soon as the server accepts,
    /// since the deletion is synchronous on the server side.
    #[instrument(skip(self), fields(project_id = %self.project_id()))]
    pub async fn delete_ontology(&self) -> Result<Option<WorkflowStatus>> {
        self.lease.ensure_active()?;
        info!("Deleting ontology");
        self.commands
            .delete(self.project_id())
            .await
            .inspect_err(|e| warn!(error = %e, "Delete rejected"))?;
        self.lease.session().reset_question_flags();
        Ok(self.after_accept("delete").await)
    }

    /// Cancel and start again in one server-side operation.
    #[instrument(skip(self), fields(project_id = %self.project_id()))]
    pub async fn restart(&self) -> Result<Option<WorkflowStatus>> {
        self.lease.ensure_active()?;
        info!("Restarting ontology extraction");
        self.commands
            .restart(self.project_id())
            .await
            .inspect_err(|e| warn!(error = %e, "Restart rejected"))?;
        Ok(self.after_accept("restart").await)
    }

    async fn after_accept(&self, command: &'static str) -> Option<WorkflowStatus> {
        let session = self.lease.session();
        session.mark_command_pending();
        match session.refresh().await {
            Ok(status) => {
                debug!(command, state = %status.state(), "Refreshed after command");
                Some(status)
            }
            Err(e) => {
                debug!(command, error = %e, "Refresh after command failed");
                None
            }
        }
    }
}
