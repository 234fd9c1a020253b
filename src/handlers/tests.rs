//! # Tests for Handlers
//!
//! This module contains unit tests for API handlers.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::handlers::root;
use crate::models::ServiceInfo;
use crate::server::AppState;
use axum::{Json, extract::State, http::StatusCode};
use sea_orm::DatabaseConnection;
use serde_json::Value;

fn test_state() -> AppState {
    let crypto_key =
        crate::crypto::CryptoKey::new(vec![0u8; 32]).expect("Failed to create test crypto key");
    AppState {
        config: Arc::new(AppConfig::default()),
        db: DatabaseConnection::default(),
        crypto_key,
        search_console: None,
    }
}

#[tokio::test]
async fn test_root_handler_returns_expected_service_info() {
    let Json(service_info) = root().await;

    assert_eq!(service_info.service, "dualpilot-connect");
    assert_eq!(service_info.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_root_handler_returns_valid_json() {
    let Json(service_info) = root().await;

    let json_value: Value =
        serde_json::to_value(&service_info).expect("Failed to serialize ServiceInfo");

    assert!(json_value.get("service").is_some());
    assert!(json_value.get("version").is_some());
    assert_eq!(
        json_value.get("service").unwrap().as_str().unwrap(),
        "dualpilot-connect"
    );
}

#[tokio::test]
async fn test_service_info_default() {
    let service_info = ServiceInfo::default();

    assert_eq!(service_info.service, "dualpilot-connect");
    assert_eq!(service_info.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn start_oauth_rejects_missing_user_id() {
    let result = crate::handlers::connect::start_oauth(
        State(test_state()),
        axum::extract::Query(crate::handlers::connect::StartOAuthParams {
            user_id: None,
            domain: None,
        }),
    )
    .await;

    let error = result.expect_err("missing userId must be rejected");
    assert_eq!(error.status, StatusCode::BAD_REQUEST);
    assert_eq!(error.code.as_ref(), "VALIDATION_FAILED");
}

#[tokio::test]
async fn start_oauth_without_credentials_fails_before_any_store_write() {
    // search_console is None in the test state; the handler must fail with a
    // server error before creating a pending row.
    let result = crate::handlers::connect::start_oauth(
        State(test_state()),
        axum::extract::Query(crate::handlers::connect::StartOAuthParams {
            user_id: Some("user-1".to_string()),
            domain: None,
        }),
    )
    .await;

    let error = result.expect_err("missing credentials must be rejected");
    assert_eq!(error.status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn callback_rejects_missing_parameters() {
    let result = crate::handlers::connect::oauth_callback(
        State(test_state()),
        axum::extract::Query(crate::handlers::connect::OAuthCallbackParams {
            code: None,
            state: None,
            error: None,
        }),
    )
    .await;

    let error = result.expect_err("missing code and state must be rejected");
    assert_eq!(error.status, StatusCode::BAD_REQUEST);
    assert_eq!(error.code.as_ref(), "VALIDATION_FAILED");
}

#[tokio::test]
async fn snippet_beacon_rejects_empty_domain() {
    let result = crate::handlers::snippet::verify_snippet(
        State(test_state()),
        Json(crate::handlers::snippet::SnippetVerifyRequest {
            domain: "   ".to_string(),
        }),
    )
    .await;

    let error = result.expect_err("empty domain must be rejected");
    assert_eq!(error.status, StatusCode::BAD_REQUEST);
    assert_eq!(error.code.as_ref(), "VALIDATION_FAILED");
}
