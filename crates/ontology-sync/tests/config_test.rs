// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration tests for ontology-sync.

use std::time::Duration;

use ontology_sync::{DEFAULT_BASE_URL, HttpBackend, SdkConfig, SessionPolicy};

#[test]
fn test_new_config() {
    let config = SdkConfig::new();

    assert_eq!(config.base_url, DEFAULT_BASE_URL);
    assert!(config.api_token.is_none());
    assert_eq!(config.connect_timeout, Duration::from_millis(10_000));
    assert_eq!(config.request_timeout, Duration::from_millis(30_000));
    assert_eq!(config.poll_interval, Duration::from_millis(3_000));
    assert_eq!(config.settled_poll_interval, Some(Duration::from_millis(15_000)));
    assert_eq!(config.policy, SessionPolicy::default());
}

#[test]
fn test_default_policy() {
    let policy = SessionPolicy::default();

    assert!(policy.require_question_gate);
    assert!(!policy.require_description_to_start);
    assert!(policy.assume_clear_on_error);
    assert_eq!(policy.command_settle_ticks, 5);
}

#[test]
fn test_builder_chain() {
    let config = SdkConfig::new()
        .with_base_url("https://console.example.com/")
        .with_api_token("token")
        .with_poll_interval(Duration::from_secs(1))
        .with_settled_poll_interval(None)
        .with_policy(SessionPolicy {
            require_question_gate: false,
            ..SessionPolicy::default()
        });

    assert_eq!(config.base_url, "https://console.example.com/");
    assert_eq!(config.api_token.as_deref(), Some("token"));
    assert_eq!(config.poll_interval, Duration::from_secs(1));
    assert!(config.settled_poll_interval.is_none());
    assert!(!config.policy.require_question_gate);
}

#[test]
fn test_backend_trims_trailing_slash() {
    let config = SdkConfig::new().with_base_url("https://console.example.com/");
    let backend = HttpBackend::new(&config).unwrap();
    assert_eq!(backend.base_url(), "https://console.example.com");
}
