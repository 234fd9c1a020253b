//! Test utilities for database testing.
//!
//! This module provides utilities for setting up in-memory SQLite databases
//! with migrations for testing purposes.

use anyhow::Result;
use dualpilot_connect::config::AppConfig;
use dualpilot_connect::crypto::CryptoKey;
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// A 32-byte key for sealing tokens in tests.
#[allow(dead_code)]
pub fn test_crypto_key() -> CryptoKey {
    CryptoKey::new(vec![7u8; 32]).expect("Failed to create test crypto key")
}

/// Builds a test-profile configuration pointing the token exchange at
/// `token_base` (typically a wiremock server).
#[allow(dead_code)]
pub fn test_config(token_base: &str) -> AppConfig {
    AppConfig {
        profile: "test".to_string(),
        crypto_key: Some(vec![7u8; 32]),
        google_client_id: Some("test-client-id".to_string()),
        google_client_secret: Some("test-client-secret".to_string()),
        google_redirect_uri: "https://connect.dualpilot.test/connect/google/callback".to_string(),
        google_token_base: token_base.trim_end_matches('/').to_string(),
        app_base_url: "https://app.dualpilot.test".to_string(),
        ..AppConfig::default()
    }
}
