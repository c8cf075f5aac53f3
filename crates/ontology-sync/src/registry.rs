// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Session registry and observer leases.
//!
//! The host application owns a [`SessionRegistry`] (one per tenant, per test,
//! per browser-tab equivalent) instead of relying on a process-wide session.
//! Observers attach with [`SessionRegistry::initialize`] and hold the returned
//! [`SessionLease`] for as long as they are mounted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

use crate::backend::http::HttpBackend;
use crate::backend::{OntologyBackend, StatusFetcher, WorkflowCommands};
use crate::commands::CommandGateway;
use crate::config::SdkConfig;
use crate::error::{Result, SdkError};
use crate::gate::QuestionGate;
use crate::session::{SubscriptionId, WorkflowSession};
use crate::types::{SessionView, WorkflowStatus};

struct RegistryShared {
    config: SdkConfig,
    fetcher: Arc<dyn StatusFetcher>,
    commands: Arc<dyn WorkflowCommands>,
    sessions: Mutex<HashMap<String, Arc<WorkflowSession>>>,
}

impl RegistryShared {
    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Arc<WorkflowSession>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Detach one observer; drops the map entry when it was the last one.
    ///
    /// Attach and detach both run under the map lock, so a session that is
    /// being torn down can never be picked up by a concurrent `initialize`.
    fn release(&self, session: &Arc<WorkflowSession>) {
        let mut sessions = self.sessions();
        if session.remove_observer()
            && sessions
                .get(session.project_id())
                .is_some_and(|current| Arc::ptr_eq(current, session))
        {
            sessions.remove(session.project_id());
            debug!(project_id = %session.project_id(), "Session removed from registry");
        }
    }
}

impl Drop for RegistryShared {
    fn drop(&mut self) {
        let sessions = self.sessions.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, session) in sessions.drain() {
            session.shutdown();
        }
    }
}

/// Owns the workflow sessions of one host context, keyed by project id.
#[derive(Clone)]
pub struct SessionRegistry {
    shared: Arc<RegistryShared>,
}

impl SessionRegistry {
    /// Create a registry over a backend that serves reads and commands.
    pub fn new<B>(config: SdkConfig, backend: Arc<B>) -> Self
    where
        B: OntologyBackend + 'static,
    {
        let fetcher: Arc<dyn StatusFetcher> = backend.clone();
        let commands: Arc<dyn WorkflowCommands> = backend;
        Self::with_parts(config, fetcher, commands)
    }

    /// Create a registry from separate read and command transports.
    pub fn with_parts(
        config: SdkConfig,
        fetcher: Arc<dyn StatusFetcher>,
        commands: Arc<dyn WorkflowCommands>,
    ) -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                config,
                fetcher,
                commands,
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Create a registry backed by the HTTP API.
    pub fn http(config: SdkConfig) -> Result<Self> {
        let backend = Arc::new(HttpBackend::new(&config)?);
        Ok(Self::new(config, backend))
    }

    /// Create an HTTP-backed registry from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::http(SdkConfig::from_env()?)
    }

    pub fn config(&self) -> &SdkConfig {
        &self.shared.config
    }

    /// Attach an observer to the project's session, creating and seeding it
    /// on first use.
    ///
    /// A failed seed read does not fail this call: the lease is returned and
    /// the failure is exposed through [`SessionLease::fetch_error`] so the
    /// observer can offer a retry.
    #[instrument(skip(self), fields(project_id = %project_id))]
    pub async fn initialize(&self, project_id: &str) -> Result<SessionLease> {
        if project_id.trim().is_empty() {
            return Err(SdkError::InvalidInput("project id is required".to_string()));
        }

        let session = {
            let mut sessions = self.shared.sessions();
            let session = sessions
                .entry(project_id.to_string())
                .or_insert_with(|| {
                    info!("Creating workflow session");
                    Arc::new(WorkflowSession::new(
                        project_id,
                        Arc::clone(&self.shared.fetcher),
                        &self.shared.config,
                    ))
                })
                .clone();
            session.add_observer();
            session
        };

        let lease = SessionLease {
            session: Arc::clone(&session),
            registry: Arc::downgrade(&self.shared),
            fetcher: Arc::clone(&self.shared.fetcher),
            commands: Arc::clone(&self.shared.commands),
            config: self.shared.config.clone(),
            subscriptions: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        };

        session.ensure_seeded().await?;
        Ok(lease)
    }

    /// Session for a project, if any observer is attached.
    pub fn session(&self, project_id: &str) -> Option<Arc<WorkflowSession>> {
        self.shared.sessions().get(project_id).cloned()
    }

    /// Projects with at least one attached observer.
    pub fn active_projects(&self) -> Vec<String> {
        let mut projects: Vec<_> = self.shared.sessions().keys().cloned().collect();
        projects.sort();
        projects
    }

    /// Tear down every session. Outstanding leases become inert.
    pub fn dispose(&self) {
        let sessions: Vec<_> = self.shared.sessions().drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.shutdown();
        }
        info!("Session registry disposed");
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("base_url", &self.shared.config.base_url)
            .field("sessions", &self.active_projects())
            .finish()
    }
}

/// One observer's attachment to a workflow session.
///
/// Stopping the lease (explicitly or by dropping it) removes every handler it
/// registered and releases its share of the session. It is safe to stop a
/// lease more than once; only the first call counts.
pub struct SessionLease {
    session: Arc<WorkflowSession>,
    registry: Weak<RegistryShared>,
    fetcher: Arc<dyn StatusFetcher>,
    commands: Arc<dyn WorkflowCommands>,
    config: SdkConfig,
    subscriptions: Mutex<Vec<SubscriptionId>>,
    stopped: AtomicBool,
}

impl SessionLease {
    pub fn project_id(&self) -> &str {
        self.session.project_id()
    }

    pub fn session(&self) -> &Arc<WorkflowSession> {
        &self.session
    }

    pub fn view(&self) -> SessionView {
        self.session.view()
    }

    pub fn status(&self) -> Option<WorkflowStatus> {
        self.session.status()
    }

    pub fn fetch_error(&self) -> Option<String> {
        self.session.fetch_error()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.is_stopped() || !self.session.is_attached() {
            return Err(SdkError::SessionStopped(self.project_id().to_string()));
        }
        Ok(())
    }

    fn subscriptions(&self) -> MutexGuard<'_, Vec<SubscriptionId>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a status handler owned by this lease.
    pub fn subscribe<F>(&self, handler: F) -> Result<SubscriptionId>
    where
        F: Fn(&WorkflowStatus) + Send + Sync + 'static,
    {
        self.ensure_active()?;
        // The replay call may run arbitrary observer code, so no lease lock is held.
        let id = self.session.subscribe(handler);
        self.subscriptions().push(id);
        if self.is_stopped() {
            self.session.unsubscribe(id);
        }
        Ok(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscriptions().retain(|existing| *existing != id);
        self.session.unsubscribe(id)
    }

    /// Delivered statuses as a channel; the current status arrives first.
    pub fn status_stream(&self) -> Result<mpsc::UnboundedReceiver<WorkflowStatus>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(move |status| {
            let _ = tx.send(status.clone());
        })?;
        Ok(rx)
    }

    /// Retry a failed seed read.
    pub async fn retry(&self) -> Result<()> {
        self.ensure_active()?;
        self.session.retry().await
    }

    /// Read status now instead of waiting for the next tick.
    pub async fn refresh(&self) -> Result<WorkflowStatus> {
        self.ensure_active()?;
        self.session.refresh().await
    }

    /// Control operations against this project's workflow.
    pub fn commands(&self) -> CommandGateway<'_> {
        CommandGateway::new(self, Arc::clone(&self.commands), self.config.policy.clone())
    }

    /// Question gating for this project's workflow.
    pub fn question_gate(&self) -> QuestionGate<'_> {
        QuestionGate::new(self, Arc::clone(&self.fetcher), self.config.policy.clone())
    }

    /// Detach this observer.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        let subscriptions: Vec<_> = self.subscriptions().drain(..).collect();
        for id in subscriptions {
            self.session.unsubscribe(id);
        }

        match self.registry.upgrade() {
            Some(registry) => registry.release(&self.session),
            None => {
                self.session.remove_observer();
            }
        }
        debug!(project_id = %self.project_id(), "Observer detached");
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("project_id", &self.project_id())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
