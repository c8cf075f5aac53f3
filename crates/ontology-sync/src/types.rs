// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow status, question and session types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Server-side state of the ontology extraction workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// No extraction running.
    #[default]
    Idle,
    /// Extraction accepted, pipeline being prepared.
    Initializing,
    /// Extraction running; `current`/`total` are meaningful.
    Building,
    /// Extraction finished.
    #[serde(alias = "completed")]
    Complete,
    /// Extraction failed; see `last_error`.
    #[serde(alias = "failed")]
    Error,
}

impl WorkflowState {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Complete | WorkflowState::Error)
    }

    /// Idle or terminal: nothing will change without a command.
    pub fn is_settled(&self) -> bool {
        matches!(self, WorkflowState::Idle) || self.is_terminal()
    }

    /// Whether `self` is a direct forward step from `previous`.
    ///
    /// Polling can observe skipped steps, so `false` here is informational.
    pub fn can_follow(&self, previous: WorkflowState) -> bool {
        use WorkflowState::*;
        match (previous, *self) {
            (a, b) if a == b => true,
            (Idle, Initializing) | (Initializing, Building) => true,
            (Building, Complete) | (Building, Error) | (Initializing, Error) => true,
            // cancel
            (Initializing, Idle) | (Building, Idle) => true,
            // restart
            (Complete, Idle) | (Error, Idle) | (Complete, Initializing) | (Error, Initializing) => {
                true
            }
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Idle => "idle",
            WorkflowState::Initializing => "initializing",
            WorkflowState::Building => "building",
            WorkflowState::Complete => "complete",
            WorkflowState::Error => "error",
        }
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of the workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowProgress {
    pub state: WorkflowState,
    #[serde(default)]
    pub current: u32,
    #[serde(default)]
    pub total: u32,
}

impl WorkflowProgress {
    /// Completed fraction in `[0, 1]`, only while building.
    pub fn fraction(&self) -> Option<f64> {
        if self.state != WorkflowState::Building || self.total == 0 {
            return None;
        }
        Some((self.current.min(self.total) as f64) / (self.total as f64))
    }
}

/// Entity/table-level unit of extraction work.
///
/// Display-only; fields the client does not know are kept in `details`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    #[serde(default, alias = "name")]
    pub entity_name: String,
    #[serde(default)]
    pub status: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// Pipeline-stage-level unit of extraction work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// Last-known workflow snapshot as asserted by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    /// Required on the wire: a body without it is not a status.
    pub progress: WorkflowProgress,
    #[serde(default)]
    pub work_queue: Vec<WorkItem>,
    #[serde(default)]
    pub task_queue: Vec<TaskItem>,
    #[serde(default)]
    pub pending_question_count: u32,
    #[serde(default)]
    pub ontology_ready: bool,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl WorkflowStatus {
    pub fn state(&self) -> WorkflowState {
        self.progress.state
    }

    /// Server asserted a workflow-level failure.
    pub fn workflow_error(&self) -> Option<&str> {
        match (self.progress.state, self.last_error.as_deref()) {
            (WorkflowState::Error, Some(message)) => Some(message),
            (WorkflowState::Error, None) => Some("ontology extraction failed"),
            (_, message) => message,
        }
    }

    /// Reset the question-derived flags to their pre-extraction defaults.
    pub(crate) fn reset_question_flags(&mut self) {
        self.pending_question_count = 0;
        self.ontology_ready = false;
    }
}

/// A clarification question raised by the extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// Required and optional question counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionCounts {
    #[serde(default)]
    pub required: u32,
    #[serde(default)]
    pub optional: u32,
}

/// Response of the next-question read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NextQuestion {
    #[serde(default)]
    pub question: Option<Question>,
    #[serde(default)]
    pub all_complete: bool,
    #[serde(default)]
    pub counts: QuestionCounts,
}

/// Derived gating state computed by the QuestionGate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingQuestionState {
    pub has_pending_questions: bool,
    /// Only true when the ontology itself is ready.
    pub all_complete: bool,
    /// `None` when the question read failed.
    pub required_count: Option<u32>,
}

/// Lifecycle of a session (not of the workflow).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Detached,
    /// Awaiting the seed read.
    Attaching,
    Polling,
    /// The seed read failed; `retry()` re-enters `Attaching`.
    SeedFailed,
}

/// Point-in-time view of a session for rendering banners and badges.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub project_id: String,
    pub phase: SessionPhase,
    pub status: Option<WorkflowStatus>,
    /// Seed failure, distinct from `status.last_error`.
    pub fetch_error: Option<String>,
    pub observers: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_status() {
        let status: WorkflowStatus = serde_json::from_value(serde_json::json!({
            "progress": {"state": "building", "current": 3, "total": 10},
            "work_queue": [{"entity_name": "orders", "status": "processing", "token_count": 12}],
            "task_queue": [{"id": "t1", "name": "Scan tables", "status": "complete"}],
            "pending_question_count": 2,
            "ontology_ready": false
        }))
        .unwrap();

        assert_eq!(status.state(), WorkflowState::Building);
        assert_eq!(status.progress.fraction(), Some(0.3));
        assert_eq!(status.work_queue[0].entity_name, "orders");
        assert_eq!(status.work_queue[0].details["token_count"], 12);
        assert_eq!(status.task_queue[0].name, "Scan tables");
        assert!(status.last_error.is_none());
    }

    #[test]
    fn test_status_requires_progress() {
        assert!(serde_json::from_str::<WorkflowStatus>("{}").is_err());
        assert!(serde_json::from_str::<WorkflowStatus>(r#"{"progress": {}}"#).is_err());
        assert!(
            serde_json::from_str::<WorkflowStatus>(r#"{"progress": {"state": "idle"}}"#).is_ok()
        );
    }

    #[test]
    fn test_state_aliases() {
        let state: WorkflowState = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(state, WorkflowState::Complete);
        let state: WorkflowState = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(state, WorkflowState::Error);
        assert!(serde_json::from_str::<WorkflowState>("\"paused\"").is_err());
    }

    #[test]
    fn test_transition_steps() {
        use WorkflowState::*;
        assert!(Initializing.can_follow(Idle));
        assert!(Complete.can_follow(Building));
        assert!(Idle.can_follow(Building));
        assert!(!Complete.can_follow(Idle));
        assert!(!Building.can_follow(Complete));
    }

    #[test]
    fn test_fraction_only_while_building() {
        let progress = WorkflowProgress {
            state: WorkflowState::Complete,
            current: 3,
            total: 10,
        };
        assert_eq!(progress.fraction(), None);
    }

    #[test]
    fn test_workflow_error_defaults_message() {
        let status = WorkflowStatus {
            progress: WorkflowProgress {
                state: WorkflowState::Error,
                ..WorkflowProgress::default()
            },
            ..WorkflowStatus::default()
        };
        assert_eq!(status.workflow_error(), Some("ontology extraction failed"));
    }
}
