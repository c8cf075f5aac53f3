// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error type tests for ontology-sync.

use ontology_sync::{NO_DATASOURCE_CONFIGURED, SdkError};

#[test]
fn test_config_error_display() {
    let err = SdkError::Config("invalid base url".to_string());
    assert!(err.to_string().contains("configuration error"));
    assert!(err.to_string().contains("invalid base url"));
}

#[test]
fn test_unreachable_error_display() {
    let err = SdkError::Unreachable("connection refused".to_string());
    assert!(err.to_string().contains("unreachable"));
    assert!(err.to_string().contains("connection refused"));
    assert!(err.is_unreachable());
}

#[test]
fn test_server_error_display() {
    let err = SdkError::Server {
        status: 500,
        code: "internal".to_string(),
        message: "Internal error".to_string(),
    };
    let display = err.to_string();
    assert!(display.contains("server error"));
    assert!(display.contains("500"));
    assert!(display.contains("Internal error"));
    assert!(!err.is_unreachable());
    assert_eq!(err.code(), Some("internal"));
}

#[test]
fn test_command_rejected_display() {
    let err = SdkError::CommandRejected {
        command: "delete",
        code: "locked".to_string(),
        message: "ontology is in use".to_string(),
    };
    assert!(err.to_string().contains("delete rejected"));
    assert_eq!(err.code(), Some("locked"));
    assert_eq!(
        err.user_message(),
        "Failed to delete the ontology workflow: ontology is in use"
    );
}

#[test]
fn test_no_datasource_user_message() {
    let err = SdkError::NoDatasourceConfigured("none".to_string());
    assert_eq!(err.code(), Some(NO_DATASOURCE_CONFIGURED));
    assert!(err.user_message().contains("datasource"));
    assert!(!err.user_message().contains("Unexpected error"));
}

#[test]
fn test_invalid_input_user_message_is_verbatim() {
    let err = SdkError::InvalidInput("A project description is required.".to_string());
    assert_eq!(err.user_message(), "A project description is required.");
    assert!(err.code().is_none());
}

#[test]
fn test_generic_user_message() {
    let err = SdkError::Serialization("expected value".to_string());
    assert!(err.user_message().starts_with("Unexpected error"));
}

#[test]
fn test_session_stopped_display() {
    let err = SdkError::SessionStopped("p1".to_string());
    assert!(err.to_string().contains("session stopped"));
    assert!(err.to_string().contains("p1"));
}

#[test]
fn test_serde_error_conversion() {
    let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
    let err: SdkError = parse.unwrap_err().into();
    assert!(matches!(err, SdkError::Serialization(_)));
}
