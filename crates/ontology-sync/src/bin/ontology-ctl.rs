// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ontology Control CLI
//!
//! CLI tool for observing and controlling a project's ontology workflow.
//!
//! Usage:
//!   ontology-ctl <command> <project_id> [options]
//!
//! Commands:
//!   status <project_id>               Print the current session view
//!   question <project_id>             Print the next pending question
//!   gate <project_id>                 Print the question gate state
//!   start <project_id> --description <text>
//!   cancel <project_id>
//!   delete <project_id> --yes
//!   restart <project_id>
//!   watch <project_id>                Print every status change

use std::process::ExitCode;
use std::time::Duration;

use ontology_sync::{SdkConfig, SessionLease, SessionRegistry};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

fn print_usage() {
    eprintln!(
        r#"Usage: ontology-ctl <command> <project_id> [options]

Observe and control a project's ontology extraction workflow.

COMMANDS:
    status <project_id>             Print the current session view
    question <project_id>           Print the next pending question
    gate <project_id>               Print the question gate state
    start <project_id>              Start ontology extraction
    cancel <project_id>             Cancel the running extraction
    delete <project_id>             Delete the extracted ontology
    restart <project_id>            Restart extraction
    watch <project_id>              Print every status change

START OPTIONS:
    --description <text>            Project description passed to extraction

DELETE OPTIONS:
    --yes                           Confirm deletion (required)

WATCH OPTIONS:
    --until-settled                 Exit once the workflow is complete or failed
    --timeout <seconds>             Give up after this many seconds

ENVIRONMENT:
    ONTOLOGY_API_URL                API base URL (default: http://127.0.0.1:3443)
    ONTOLOGY_API_TOKEN              Bearer token
    ONTOLOGY_POLL_INTERVAL_MS       Poll interval (default: 3000)
    RUST_LOG                        Log filter (default: warn)

EXAMPLES:
    ontology-ctl start proj_123 --description "Retail orders and inventory"
    ontology-ctl watch proj_123 --until-settled --timeout 600
    ontology-ctl delete proj_123 --yes
"#
    );
}

#[derive(Debug, PartialEq)]
enum Command {
    Status {
        project_id: String,
    },
    Question {
        project_id: String,
    },
    Gate {
        project_id: String,
    },
    Start {
        project_id: String,
        description: String,
    },
    Cancel {
        project_id: String,
    },
    Delete {
        project_id: String,
    },
    Restart {
        project_id: String,
    },
    Watch {
        project_id: String,
        until_settled: bool,
        timeout_secs: Option<u64>,
    },
}

fn parse_args() -> Result<Command, String> {
    let args: Vec<String> = std::env::args().collect();
    parse_args_from_vec(&args)
}

fn parse_args_from_vec(args: &[String]) -> Result<Command, String> {
    if args.len() < 2 {
        return Err("No command specified".to_string());
    }

    let command = args[1].as_str();
    if matches!(command, "help" | "--help" | "-h") {
        print_usage();
        std::process::exit(0);
    }

    let project_id = args.get(2).ok_or("Project ID required")?.clone();
    if project_id.starts_with("--") {
        return Err("Project ID required".to_string());
    }
    let rest = &args[3..];

    match command {
        "status" => no_options(rest).map(|_| Command::Status { project_id }),
        "question" => no_options(rest).map(|_| Command::Question { project_id }),
        "gate" => no_options(rest).map(|_| Command::Gate { project_id }),
        "cancel" => no_options(rest).map(|_| Command::Cancel { project_id }),
        "restart" => no_options(rest).map(|_| Command::Restart { project_id }),
        "start" => {
            let mut description: Option<String> = None;
            let mut i = 0;
            while i < rest.len() {
                match rest[i].as_str() {
                    "--description" => {
                        i += 1;
                        description =
                            Some(rest.get(i).ok_or("--description requires a value")?.clone());
                    }
                    arg => return Err(format!("Unknown argument: {}", arg)),
                }
                i += 1;
            }
            Ok(Command::Start {
                project_id,
                description: description.unwrap_or_default(),
            })
        }
        "delete" => {
            let mut confirmed = false;
            for arg in rest {
                match arg.as_str() {
                    "--yes" => confirmed = true,
                    arg => return Err(format!("Unknown argument: {}", arg)),
                }
            }
            if !confirmed {
                return Err("delete is destructive; pass --yes to confirm".to_string());
            }
            Ok(Command::Delete { project_id })
        }
        "watch" => {
            let mut until_settled = false;
            let mut timeout_secs = None;
            let mut i = 0;
            while i < rest.len() {
                match rest[i].as_str() {
                    "--until-settled" => until_settled = true,
                    "--timeout" => {
                        i += 1;
                        timeout_secs = Some(
                            rest.get(i)
                                .ok_or("--timeout requires a number")?
                                .parse()
                                .map_err(|_| "Invalid timeout")?,
                        );
                    }
                    arg => return Err(format!("Unknown argument: {}", arg)),
                }
                i += 1;
            }
            Ok(Command::Watch {
                project_id,
                until_settled,
                timeout_secs,
            })
        }
        other => Err(format!("Unknown command: {}", other)),
    }
}

fn no_options(rest: &[String]) -> Result<(), String> {
    match rest.first() {
        Some(arg) => Err(format!("Unknown argument: {}", arg)),
        None => Ok(()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cmd = match parse_args() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    let config = match SdkConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let registry = match SessionRegistry::http(config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to create client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = run(&registry, cmd).await;
    registry.dispose();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).map_err(|e| e.to_string())?
    );
    Ok(())
}

async fn attach(registry: &SessionRegistry, project_id: &str) -> Result<SessionLease, String> {
    let lease = registry
        .initialize(project_id)
        .await
        .map_err(|e| e.user_message())?;
    if let Some(error) = lease.fetch_error() {
        return Err(format!("Could not load workflow status: {}", error));
    }
    Ok(lease)
}

async fn run(registry: &SessionRegistry, cmd: Command) -> Result<(), String> {
    match cmd {
        Command::Status { project_id } => {
            let lease = attach(registry, &project_id).await?;
            print_json(&lease.view())?;
        }

        Command::Question { project_id } => {
            let lease = attach(registry, &project_id).await?;
            let next = lease
                .question_gate()
                .next_question()
                .await
                .map_err(|e| e.user_message())?;
            print_json(&next)?;
        }

        Command::Gate { project_id } => {
            let lease = attach(registry, &project_id).await?;
            let gate = lease.question_gate();
            let state = gate.check().await.map_err(|e| e.user_message())?;
            let glossary = gate
                .can_generate_glossary()
                .await
                .map_err(|e| e.user_message())?;
            print_json(&serde_json::json!({
                "pending": state,
                "can_generate_glossary": glossary,
            }))?;
        }

        Command::Start {
            project_id,
            description,
        } => {
            let lease = attach(registry, &project_id).await?;
            let status = lease
                .commands()
                .start_extraction(&description)
                .await
                .map_err(|e| e.user_message())?;
            print_json(&status)?;
        }

        Command::Cancel { project_id } => {
            let lease = attach(registry, &project_id).await?;
            let status = lease
                .commands()
                .cancel()
                .await
                .map_err(|e| e.user_message())?;
            print_json(&status)?;
        }

        Command::Delete { project_id } => {
            let lease = attach(registry, &project_id).await?;
            let status = lease
                .commands()
                .delete_ontology()
                .await
                .map_err(|e| e.user_message())?;
            print_json(&status)?;
        }

        Command::Restart { project_id } => {
            let lease = attach(registry, &project_id).await?;
            let status = lease
                .commands()
                .restart()
                .await
                .map_err(|e| e.user_message())?;
            print_json(&status)?;
        }

        Command::Watch {
            project_id,
            until_settled,
            timeout_secs,
        } => {
            let lease = attach(registry, &project_id).await?;
            let watching = watch(&lease, until_settled);
            match timeout_secs {
                Some(secs) => tokio::time::timeout(Duration::from_secs(secs), watching)
                    .await
                    .map_err(|_| format!("Timed out after {}s", secs))??,
                None => watching.await?,
            }
        }
    }

    Ok(())
}

async fn watch(lease: &SessionLease, until_settled: bool) -> Result<(), String> {
    let mut updates = lease.status_stream().map_err(|e| e.user_message())?;
    while let Some(status) = updates.recv().await {
        print_json(&status)?;
        if until_settled && status.state().is_terminal() {
            if let Some(error) = status.workflow_error() {
                return Err(error.to_string());
            }
            return Ok(());
        }
    }
    Err("Session stopped".to_string())
}
