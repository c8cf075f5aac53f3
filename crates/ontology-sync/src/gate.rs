// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Clarification-question gating.
//!
//! The gate is evaluated on demand, typically right before offering glossary
//! generation or the question chat, and is not polled.
//!
//! When the question read fails the gate assumes no required questions are
//! pending (see [`SessionPolicy::assume_clear_on_error`]), so a transient read
//! failure cannot block a user-facing action indefinitely.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::backend::StatusFetcher;
use crate::config::SessionPolicy;
use crate::error::{Result, SdkError};
use crate::registry::SessionLease;
use crate::types::{NextQuestion, PendingQuestionState, WorkflowState, WorkflowStatus};

/// On-demand view over the project's pending clarification questions.
pub struct QuestionGate<'a> {
    lease: &'a SessionLease,
    fetcher: Arc<dyn StatusFetcher>,
    policy: SessionPolicy,
}

impl<'a> QuestionGate<'a> {
    pub(crate) fn new(
        lease: &'a SessionLease,
        fetcher: Arc<dyn StatusFetcher>,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            lease,
            fetcher,
            policy,
        }
    }

    fn ontology_ready(&self) -> bool {
        self.lease
            .status()
            .is_some_and(|status| status.ontology_ready)
    }

    /// The next question to show, unfiltered.
    pub async fn next_question(&self) -> Result<NextQuestion> {
        self.lease.ensure_active()?;
        let next = self.fetcher.get_next_question(self.lease.project_id()).await?;
        self.lease.ensure_active()?;
        Ok(next)
    }

    /// Compute the pending-question state.
    ///
    /// Fails only with `SessionStopped` when the lease stopped while the read
    /// was in flight; read failures are folded into the returned state.
    #[instrument(skip(self), fields(project_id = %self.lease.project_id()))]
    pub async fn check(&self) -> Result<PendingQuestionState> {
        self.lease.ensure_active()?;
        let result = self
            .fetcher
            .get_next_question(self.lease.project_id())
            .await;

        if self.lease.ensure_active().is_err() {
            debug!("Discarding question read for stopped session");
            return Err(SdkError::SessionStopped(
                self.lease.project_id().to_string(),
            ));
        }

        let ready = self.ontology_ready();
        Ok(match result {
            Ok(next) => PendingQuestionState {
                has_pending_questions: next.counts.required > 0,
                all_complete: next.all_complete && ready,
                required_count: Some(next.counts.required),
            },
            Err(e) => {
                warn!(
                    error = %e,
                    assume_clear = self.policy.assume_clear_on_error,
                    "Question read failed"
                );
                PendingQuestionState {
                    has_pending_questions: !self.policy.assume_clear_on_error,
                    all_complete: false,
                    required_count: None,
                }
            }
        })
    }

    /// Whether glossary generation may be offered now.
    pub async fn can_generate_glossary(&self) -> Result<bool> {
        self.lease.ensure_active()?;
        if !self.ontology_ready() {
            return Ok(false);
        }
        if !self.policy.require_question_gate {
            return Ok(true);
        }
        Ok(!self.check().await?.has_pending_questions)
    }
}

/// Local flags an observer keeps from the statuses and gate results it sees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObserverFlags {
    pub state: WorkflowState,
    pub ontology_ready: bool,
    pub pending_questions: u32,
    pub all_questions_answered: bool,
}

impl ObserverFlags {
    pub fn observe_status(&mut self, status: &WorkflowStatus) {
        self.state = status.state();
        self.ontology_ready = status.ontology_ready;
        self.pending_questions = status.pending_question_count;
        if !status.ontology_ready || status.pending_question_count > 0 {
            self.all_questions_answered = false;
        }
    }

    pub fn observe_gate(&mut self, gate: &PendingQuestionState) {
        self.all_questions_answered = gate.all_complete && self.ontology_ready;
        if let Some(required) = gate.required_count {
            self.pending_questions = required;
        }
    }

    /// Ready to present the ontology as finished.
    pub fn is_ready(&self) -> bool {
        self.ontology_ready && self.all_questions_answered
    }
}
