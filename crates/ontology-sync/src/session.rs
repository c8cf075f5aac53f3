// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-project workflow session.
//!
//! A [`WorkflowSession`] owns the last status the server asserted for one
//! project, the polling task that keeps it current, and the set of status
//! handlers registered by observers.
//!
//! # Lifecycle
//!
//! ```text
//! Detached ──attach──► Attaching ──seed ok──► Polling ──last detach──► Detached
//!                          │
//!                          └──seed failed──► SeedFailed ──retry──► Attaching
//! ```
//!
//! Observers never construct sessions directly; they attach through
//! [`SessionRegistry`](crate::SessionRegistry), which refcounts attachments
//! so that one observer leaving does not stop polling for the others.
//!
//! # Delivery
//!
//! Handlers are called with the retained status on subscribe (if seeded) and
//! after every change. Before each call the session re-checks that the handler
//! is still registered, that the session has not been torn down since the
//! read was issued, and that the status being delivered is still the retained
//! one. Each handler therefore sees statuses in the order they were retained,
//! even when a tick and a command refresh apply at the same time.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::backend::StatusFetcher;
use crate::config::SdkConfig;
use crate::error::{Result, SdkError};
use crate::types::{SessionPhase, SessionView, WorkflowState, WorkflowStatus};

/// Callback invoked with each delivered status.
pub type StatusHandler = Arc<dyn Fn(&WorkflowStatus) + Send + Sync>;

/// Token returned by [`WorkflowSession::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Where an applied read came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadSource {
    Seed,
    Poll,
    Refresh,
}

struct Subscriber {
    handler: StatusHandler,
    /// Status version last delivered; held while the handler runs.
    delivered: Mutex<u64>,
}

struct Poller {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Debug, Clone, Copy)]
struct PendingCommand {
    issued_from: WorkflowState,
    ticks_left: u32,
}

#[derive(Default)]
struct SessionState {
    phase: SessionPhase,
    status: Option<WorkflowStatus>,
    fetch_error: Option<String>,
    last_updated: Option<DateTime<Utc>>,
    observers: usize,
    generation: u64,
    /// Bumped on every change to `status`.
    version: u64,
    subscribers: BTreeMap<SubscriptionId, Arc<Subscriber>>,
    next_subscription: u64,
    poller: Option<Poller>,
    pending_command: Option<PendingCommand>,
}

/// Synchronization object for one project's workflow.
pub struct WorkflowSession {
    project_id: String,
    fetcher: Arc<dyn StatusFetcher>,
    poll_interval: Duration,
    settled_poll_interval: Option<Duration>,
    command_settle_ticks: u32,
    state: Mutex<SessionState>,
    /// Serializes seed reads so concurrent first attaches share one.
    seed_lock: tokio::sync::Mutex<()>,
    wake: Arc<Notify>,
}

impl WorkflowSession {
    pub(crate) fn new(
        project_id: impl Into<String>,
        fetcher: Arc<dyn StatusFetcher>,
        config: &SdkConfig,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            fetcher,
            poll_interval: config.poll_interval,
            settled_poll_interval: config.settled_poll_interval,
            command_settle_ticks: config.policy.command_settle_ticks,
            state: Mutex::new(SessionState::default()),
            seed_lock: tokio::sync::Mutex::new(()),
            wake: Arc::new(Notify::new()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the retained status and return its version.
    fn retain(st: &mut SessionState, status: Option<WorkflowStatus>) -> u64 {
        st.version += 1;
        st.status = status;
        st.version
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.state().phase
    }

    /// Last status the server asserted, if the session is seeded.
    pub fn status(&self) -> Option<WorkflowStatus> {
        self.state().status.clone()
    }

    /// Seed failure message; distinct from a workflow-level `last_error`.
    pub fn fetch_error(&self) -> Option<String> {
        self.state().fetch_error.clone()
    }

    /// Number of attached observers.
    pub fn observers(&self) -> usize {
        self.state().observers
    }

    pub fn is_attached(&self) -> bool {
        self.observers() > 0
    }

    /// Whether the poll task is alive.
    pub fn is_polling(&self) -> bool {
        self.state()
            .poller
            .as_ref()
            .is_some_and(|poller| !poller.handle.is_finished())
    }

    pub fn view(&self) -> SessionView {
        let st = self.state();
        SessionView {
            project_id: self.project_id.clone(),
            phase: st.phase,
            status: st.status.clone(),
            fetch_error: st.fetch_error.clone(),
            observers: st.observers,
            last_updated: st.last_updated,
        }
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Register a handler; it is called at once with the retained status, if any.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&WorkflowStatus) + Send + Sync + 'static,
    {
        let subscriber = Arc::new(Subscriber {
            handler: Arc::new(handler),
            delivered: Mutex::new(0),
        });
        let (id, replay, generation, version) = {
            let mut st = self.state();
            let id = SubscriptionId(st.next_subscription);
            st.next_subscription += 1;
            st.subscribers.insert(id, subscriber);
            (id, st.status.clone(), st.generation, st.version)
        };

        if let Some(status) = replay {
            self.dispatch(generation, version, &status, &[id]);
        }
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.state().subscribers.remove(&id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.state().subscribers.len()
    }

    /// Deliver `status` (retained as `version`) to the given subscribers.
    ///
    /// Stops as soon as a newer status is retained; whoever retained it
    /// delivers it. The per-subscriber lock orders concurrent deliveries.
    fn dispatch(
        &self,
        generation: u64,
        version: u64,
        status: &WorkflowStatus,
        ids: &[SubscriptionId],
    ) {
        let current = |st: &SessionState| st.generation == generation && st.version == version;

        for id in ids {
            let subscriber = {
                let st = self.state();
                if !current(&*st) {
                    return;
                }
                match st.subscribers.get(id) {
                    Some(subscriber) => Arc::clone(subscriber),
                    None => continue,
                }
            };

            let mut delivered = subscriber
                .delivered
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *delivered >= version {
                continue;
            }
            {
                let st = self.state();
                if !current(&*st) {
                    return;
                }
                if !st.subscribers.contains_key(id) {
                    continue;
                }
            }
            (subscriber.handler)(status);
            *delivered = version;
        }
    }

    // =========================================================================
    // Attach / detach
    // =========================================================================

    /// Count one more observer. Called by the registry under its map lock.
    pub(crate) fn add_observer(&self) {
        self.state().observers += 1;
    }

    /// Count one observer out; tears the session down when it was the last.
    ///
    /// Returns true when this call tore the session down.
    pub(crate) fn remove_observer(&self) -> bool {
        let poller = {
            let mut st = self.state();
            if st.observers == 0 {
                return false;
            }
            st.observers -= 1;
            if st.observers > 0 {
                return false;
            }
            Self::clear(&mut st)
        };
        Self::stop_poller(poller);
        info!(project_id = %self.project_id, "Workflow session detached");
        true
    }

    /// Tear down regardless of attached observers.
    pub(crate) fn shutdown(&self) {
        let poller = {
            let mut st = self.state();
            st.observers = 0;
            Self::clear(&mut st)
        };
        Self::stop_poller(poller);
    }

    fn clear(st: &mut SessionState) -> Option<Poller> {
        st.generation += 1;
        st.phase = SessionPhase::Detached;
        Self::retain(st, None);
        st.fetch_error = None;
        st.last_updated = None;
        st.pending_command = None;
        st.subscribers.clear();
        st.poller.take()
    }

    fn stop_poller(poller: Option<Poller>) {
        if let Some(poller) = poller {
            poller.cancel.cancel();
            poller.handle.abort();
        }
    }

    /// Seed the session if nobody has yet; otherwise attach without side effects.
    #[instrument(skip(self), fields(project_id = %self.project_id))]
    pub(crate) async fn ensure_seeded(self: &Arc<Self>) -> Result<()> {
        let _seed = self.seed_lock.lock().await;
        let generation = {
            let mut st = self.state();
            if st.observers == 0 {
                return Err(SdkError::SessionStopped(self.project_id.clone()));
            }
            match st.phase {
                SessionPhase::Detached => {
                    st.phase = SessionPhase::Attaching;
                    st.generation
                }
                _ => {
                    debug!(phase = ?st.phase, "Attached to existing session");
                    return Ok(());
                }
            }
        };
        self.seed(generation).await
    }

    /// Re-run the seed read after a failure.
    #[instrument(skip(self), fields(project_id = %self.project_id))]
    pub async fn retry(self: &Arc<Self>) -> Result<()> {
        let _seed = self.seed_lock.lock().await;
        let generation = {
            let mut st = self.state();
            if st.observers == 0 {
                return Err(SdkError::SessionStopped(self.project_id.clone()));
            }
            if st.phase != SessionPhase::SeedFailed {
                return Ok(());
            }
            st.phase = SessionPhase::Attaching;
            st.generation
        };
        self.seed(generation).await
    }

    async fn seed(self: &Arc<Self>, generation: u64) -> Result<()> {
        let result = self.fetcher.get_status(&self.project_id).await;

        let mut st = self.state();
        if st.generation != generation {
            debug!(project_id = %self.project_id, "Discarding seed read for stopped session");
            return Err(SdkError::SessionStopped(self.project_id.clone()));
        }

        match result {
            Ok(status) => {
                info!(
                    project_id = %self.project_id,
                    state = %status.state(),
                    ontology_ready = status.ontology_ready,
                    "Workflow session seeded"
                );
                let version = Self::retain(&mut st, Some(status.clone()));
                st.fetch_error = None;
                st.last_updated = Some(Utc::now());
                st.phase = SessionPhase::Polling;
                st.poller = Some(self.spawn_poller(generation));
                let ids: Vec<_> = st.subscribers.keys().copied().collect();
                drop(st);
                self.dispatch(generation, version, &status, &ids);
                Ok(())
            }
            Err(e) => {
                warn!(project_id = %self.project_id, error = %e, "Failed to seed workflow session");
                st.phase = SessionPhase::SeedFailed;
                st.fetch_error = Some(e.to_string());
                Ok(())
            }
        }
    }

    // =========================================================================
    // Polling
    // =========================================================================

    fn spawn_poller(self: &Arc<Self>, generation: u64) -> Poller {
        let cancel = CancellationToken::new();
        let session = Arc::downgrade(self);
        let wake = Arc::clone(&self.wake);
        let token = cancel.clone();
        let handle = tokio::spawn(run_poller(session, wake, token, generation));
        debug!(
            project_id = %self.project_id,
            interval = ?self.poll_interval,
            "Workflow poller started"
        );
        Poller { cancel, handle }
    }

    /// Delay before the next tick; `None` suspends until woken.
    fn next_delay(&self) -> Option<Duration> {
        let st = self.state();
        let settled = st.pending_command.is_none()
            && st
                .status
                .as_ref()
                .is_some_and(|status| status.state().is_settled());
        if settled {
            self.settled_poll_interval
        } else {
            Some(self.poll_interval)
        }
    }

    async fn poll_tick(&self, generation: u64) {
        match self.fetcher.get_status(&self.project_id).await {
            Ok(status) => {
                self.apply(generation, status, ReadSource::Poll);
            }
            Err(e) if e.is_unreachable() => {
                debug!(project_id = %self.project_id, error = %e, "Poll tick failed, keeping last status");
            }
            Err(e) => {
                warn!(project_id = %self.project_id, error = %e, "Poll tick failed, keeping last status");
            }
        }
    }

    /// Read status now, outside the poll cadence.
    ///
    /// Applies last-write-wins with any concurrent tick. A failed read leaves
    /// the retained status untouched and returns the error.
    #[instrument(skip(self), fields(project_id = %self.project_id))]
    pub async fn refresh(self: &Arc<Self>) -> Result<WorkflowStatus> {
        let generation = {
            let st = self.state();
            match st.phase {
                SessionPhase::Polling => Some(st.generation),
                SessionPhase::SeedFailed => None,
                _ => return Err(SdkError::SessionStopped(self.project_id.clone())),
            }
        };

        let Some(generation) = generation else {
            self.retry().await?;
            return match self.fetch_error() {
                Some(error) => Err(SdkError::Unreachable(error)),
                None => self
                    .status()
                    .ok_or_else(|| SdkError::SessionStopped(self.project_id.clone())),
            };
        };

        let status = self.fetcher.get_status(&self.project_id).await?;
        if !self.apply(generation, status.clone(), ReadSource::Refresh)
            && self.state().generation != generation
        {
            return Err(SdkError::SessionStopped(self.project_id.clone()));
        }
        Ok(status)
    }

    /// Replace the retained status and notify on change.
    ///
    /// Returns true if subscribers were notified.
    fn apply(&self, generation: u64, status: WorkflowStatus, source: ReadSource) -> bool {
        let (version, ids) = {
            let mut st = self.state();
            if st.generation != generation || st.phase != SessionPhase::Polling {
                debug!(project_id = %self.project_id, ?source, "Discarding stale read");
                return false;
            }

            let next_state = status.state();
            let previous = st.status.as_ref().map(WorkflowStatus::state);
            if let Some(previous) = previous.filter(|previous| *previous != next_state) {
                if !next_state.can_follow(previous) {
                    debug!(
                        project_id = %self.project_id,
                        from = %previous,
                        to = %next_state,
                        "Observed non-adjacent workflow transition"
                    );
                }
                info!(
                    project_id = %self.project_id,
                    from = %previous,
                    to = %next_state,
                    "Workflow state changed"
                );
            }

            if let Some(mut pending) = st.pending_command {
                if next_state != pending.issued_from {
                    st.pending_command = None;
                } else if source == ReadSource::Poll {
                    pending.ticks_left = pending.ticks_left.saturating_sub(1);
                    st.pending_command = (pending.ticks_left > 0).then_some(pending);
                }
            }

            st.last_updated = Some(Utc::now());
            if st.status.as_ref() == Some(&status) {
                return false;
            }
            let version = Self::retain(&mut st, Some(status.clone()));
            (version, st.subscribers.keys().copied().collect::<Vec<_>>())
        };

        self.dispatch(generation, version, &status, &ids);
        true
    }

    // =========================================================================
    // Command support
    // =========================================================================

    /// Keep polling at the active cadence until the command's effect shows up.
    pub(crate) fn mark_command_pending(&self) {
        {
            let mut st = self.state();
            let issued_from = st
                .status
                .as_ref()
                .map(WorkflowStatus::state)
                .unwrap_or_default();
            st.pending_command = Some(PendingCommand {
                issued_from,
                ticks_left: self.command_settle_ticks.max(1),
            });
        }
        self.wake.notify_one();
    }

    /// Reset question-derived flags after a delete, ahead of the next read.
    pub(crate) fn reset_question_flags(&self) {
        let (generation, version, status, ids) = {
            let mut st = self.state();
            let Some(mut status) = st.status.clone() else {
                return;
            };
            status.reset_question_flags();
            if st.status.as_ref() == Some(&status) {
                return;
            }
            let version = Self::retain(&mut st, Some(status.clone()));
            let ids: Vec<_> = st.subscribers.keys().copied().collect();
            (st.generation, version, status, ids)
        };
        self.dispatch(generation, version, &status, &ids);
    }
}

impl std::fmt::Debug for WorkflowSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.state();
        f.debug_struct("WorkflowSession")
            .field("project_id", &self.project_id)
            .field("phase", &st.phase)
            .field("observers", &st.observers)
            .field("subscribers", &st.subscribers.len())
            .finish()
    }
}

async fn run_poller(
    session: Weak<WorkflowSession>,
    wake: Arc<Notify>,
    cancel: CancellationToken,
    generation: u64,
) {
    loop {
        let delay = match session.upgrade() {
            Some(session) => session.next_delay(),
            None => break,
        };

        let sleep = async move {
            match delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            _ = wake.notified() => continue,

            _ = sleep => {}
        }

        let Some(session) = session.upgrade() else {
            break;
        };
        session.poll_tick(generation).await;
    }
    debug!("Workflow poller stopped");
}
