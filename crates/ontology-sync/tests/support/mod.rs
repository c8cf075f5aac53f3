// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scripted in-memory backend shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ontology_sync::{
    NO_DATASOURCE_CONFIGURED, NextQuestion, QuestionCounts, Result, SdkConfig, SdkError,
    SessionRegistry, StatusFetcher, WorkflowCommands, WorkflowProgress, WorkflowState,
    WorkflowStatus,
};

/// How a scripted read should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Unreachable,
    Server,
    /// A 2xx answer whose body is not a status.
    Undecodable,
}

impl Failure {
    fn error(self) -> SdkError {
        match self {
            Failure::Unreachable => SdkError::Unreachable("connection refused".to_string()),
            Failure::Server => SdkError::Server {
                status: 500,
                code: "internal".to_string(),
                message: "status query failed".to_string(),
            },
            Failure::Undecodable => {
                SdkError::Serialization("unknown variant `paused`".to_string())
            }
        }
    }
}

#[derive(Default)]
struct Script {
    status: WorkflowStatus,
    status_failures: Vec<Failure>,
    status_delay: Option<Duration>,
    next_question: NextQuestion,
    question_failure: Option<Failure>,
    start_rejection: Option<String>,
    commands: Vec<String>,
}

/// Plays the server: holds the authoritative status and applies commands to it.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<Script>,
    status_calls: AtomicUsize,
    question_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(status: WorkflowStatus) -> Arc<Self> {
        let backend = Self::default();
        backend.script.lock().unwrap().status = status;
        Arc::new(backend)
    }

    pub fn set_status(&self, status: WorkflowStatus) {
        self.script.lock().unwrap().status = status;
    }

    pub fn set_state(&self, state: WorkflowState) {
        self.script.lock().unwrap().status.progress = WorkflowProgress {
            state,
            current: 0,
            total: 0,
        };
    }

    /// Fail the next `count` status reads.
    pub fn fail_status(&self, failure: Failure, count: usize) {
        self.script
            .lock()
            .unwrap()
            .status_failures
            .extend(std::iter::repeat_n(failure, count));
    }

    /// Hold every status read for `delay`; `None` answers at once.
    pub fn set_status_delay(&self, delay: Option<Duration>) {
        self.script.lock().unwrap().status_delay = delay;
    }

    pub fn set_next_question(&self, next: NextQuestion) {
        self.script.lock().unwrap().next_question = next;
    }

    pub fn fail_questions(&self, failure: Failure) {
        self.script.lock().unwrap().question_failure = Some(failure);
    }

    pub fn reject_start(&self, code: &str) {
        self.script.lock().unwrap().start_rejection = Some(code.to_string());
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn question_calls(&self) -> usize {
        self.question_calls.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        self.script.lock().unwrap().commands.clone()
    }
}

#[async_trait]
impl StatusFetcher for ScriptedBackend {
    async fn get_status(&self, _project_id: &str) -> Result<WorkflowStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.script.lock().unwrap().status_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.script.lock().unwrap();
        if !script.status_failures.is_empty() {
            let failure = script.status_failures.remove(0);
            return Err(failure.error());
        }
        Ok(script.status.clone())
    }

    async fn get_next_question(&self, _project_id: &str) -> Result<NextQuestion> {
        self.question_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().unwrap();
        match script.question_failure {
            Some(failure) => Err(failure.error()),
            None => Ok(script.next_question.clone()),
        }
    }
}

#[async_trait]
impl WorkflowCommands for ScriptedBackend {
    async fn start(&self, _project_id: &str, description: &str) -> Result<()> {
        let mut script = self.script.lock().unwrap();
        script.commands.push(format!("start:{}", description));
        match script.start_rejection.as_deref() {
            Some(NO_DATASOURCE_CONFIGURED) => Err(SdkError::NoDatasourceConfigured(
                "project has no datasource".to_string(),
            )),
            Some(code) => Err(SdkError::StartFailed(format!("rejected with {}", code))),
            None => {
                script.status.progress.state = WorkflowState::Initializing;
                script.status.last_error = None;
                Ok(())
            }
        }
    }

    async fn cancel(&self, _project_id: &str) -> Result<()> {
        let mut script = self.script.lock().unwrap();
        script.commands.push("cancel".to_string());
        script.status.progress.state = WorkflowState::Idle;
        Ok(())
    }

    async fn delete(&self, _project_id: &str) -> Result<()> {
        let mut script = self.script.lock().unwrap();
        script.commands.push("delete".to_string());
        script.status = WorkflowStatus::default();
        Ok(())
    }

    async fn restart(&self, _project_id: &str) -> Result<()> {
        let mut script = self.script.lock().unwrap();
        script.commands.push("restart".to_string());
        script.status.progress.state = WorkflowState::Initializing;
        script.status.last_error = None;
        Ok(())
    }
}

pub fn status(state: WorkflowState, current: u32, total: u32) -> WorkflowStatus {
    WorkflowStatus {
        progress: WorkflowProgress {
            state,
            current,
            total,
        },
        ..WorkflowStatus::default()
    }
}

pub fn next_question(required: u32, all_complete: bool) -> NextQuestion {
    NextQuestion {
        question: None,
        all_complete,
        counts: QuestionCounts {
            required,
            optional: 0,
        },
    }
}

pub fn config() -> SdkConfig {
    SdkConfig::new()
        .with_poll_interval(Duration::from_secs(3))
        .with_settled_poll_interval(Some(Duration::from_secs(15)))
}

pub fn registry(backend: &Arc<ScriptedBackend>) -> SessionRegistry {
    SessionRegistry::new(config(), Arc::clone(backend))
}

/// Collects every status a handler receives.
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<WorkflowStatus>>>,
}

impl Recorder {
    pub fn handler(&self) -> impl Fn(&WorkflowStatus) + Send + Sync + 'static {
        let seen = Arc::clone(&self.seen);
        move |status| seen.lock().unwrap().push(status.clone())
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn states(&self) -> Vec<WorkflowState> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(WorkflowStatus::state)
            .collect()
    }

    pub fn last(&self) -> Option<WorkflowStatus> {
        self.seen.lock().unwrap().last().cloned()
    }
}
