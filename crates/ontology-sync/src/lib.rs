// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ontology Sync
//!
//! Client-side synchronization for the server-side ontology extraction
//! workflow: one polling session per project shared by every attached
//! observer, control commands that refresh the session as soon as the server
//! accepts them, and on-demand gating on pending clarification questions.
//!
//! # Architecture
//!
//! - [`StatusFetcher`] / [`WorkflowCommands`]: single-round-trip reads and
//!   commands; [`HttpBackend`] implements both against the console API.
//! - [`SessionRegistry`]: owned by the host, keyed by project id. Observers
//!   attach with [`SessionRegistry::initialize`] and get a [`SessionLease`].
//! - [`WorkflowSession`]: retained status, polling task, status handlers.
//! - [`CommandGateway`]: start / cancel / delete / restart.
//! - [`QuestionGate`]: "may questions, chat or glossary generation be shown now?"
//!
//! The session only ever reflects what the server asserted. It never guesses
//! a transition and never replaces a good status with a failed read.
//!
//! # Example
//!
//! ```no_run
//! use ontology_sync::{SdkConfig, SessionRegistry};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = SessionRegistry::http(SdkConfig::localhost(3443))?;
//!
//! // Dashboard tile mounts
//! let tile = registry.initialize("project-1").await?;
//! tile.subscribe(|status| println!("tile: {}", status.state()))?;
//!
//! // Workflow page mounts; shares the same polling session
//! let page = registry.initialize("project-1").await?;
//! if let Err(e) = page.commands().start_extraction("Retail orders and inventory").await {
//!     eprintln!("{}", e.user_message());
//! }
//!
//! // Tile unmounts; the page keeps receiving updates
//! tile.stop();
//! # Ok(())
//! # }
//! ```

mod backend;
mod commands;
mod config;
mod error;
mod gate;
mod registry;
mod session;
mod types;

pub use backend::http::HttpBackend;
pub use backend::{OntologyBackend, StatusFetcher, WorkflowCommands};
pub use commands::CommandGateway;
pub use config::{DEFAULT_BASE_URL, SdkConfig, SessionPolicy};
pub use error::{NO_DATASOURCE_CONFIGURED, Result, SdkError};
pub use gate::{ObserverFlags, QuestionGate};
pub use registry::{SessionLease, SessionRegistry};
pub use session::{StatusHandler, SubscriptionId, WorkflowSession};
pub use types::{
    NextQuestion, PendingQuestionState, Question, QuestionCounts, SessionPhase, SessionView,
    TaskItem, WorkItem, WorkflowProgress, WorkflowState, WorkflowStatus,
};
