//! Connection entity model
//!
//! This module contains the SeaORM entity model for the connections table,
//! which stores one row per account-to-provider authorization attempt.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Provider slug used for Google Search Console connections.
pub const PROVIDER_GOOGLE_SEARCH_CONSOLE: &str = "google_search_console";

/// Lifecycle status of a connection row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Created by the initiator, waiting for the provider callback.
    Pending,
    /// Token exchange completed and tokens persisted.
    Connected,
    /// The exchange failed or the user denied authorization.
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Pending => "pending",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection entity representing an account's linkage to an external provider
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "connections")]
pub struct Model {
    /// Unique identifier for the connection (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Identifier of the account that owns the connection; set at creation,
    /// never changes
    pub owner_id: String,

    /// Provider slug this connection targets
    pub provider: String,

    /// External resource the connection targets (e.g. a Search Console
    /// property), optional
    pub domain: Option<String>,

    /// Lifecycle status: pending | connected | error
    pub status: String,

    /// Single-use opaque value correlating the outbound authorization request
    /// with its inbound callback
    pub state_token: String,

    /// Expiry of the state token; callbacks after this point are rejected
    pub state_expires_at: DateTimeWithTimeZone,

    /// Encrypted access token ciphertext
    pub access_token_ciphertext: Option<Vec<u8>>,

    /// Encrypted refresh token ciphertext; retained across updates even when
    /// a later exchange omits it
    pub refresh_token_ciphertext: Option<Vec<u8>>,

    /// Absolute access-token expiry (exchange time + provider lifetime)
    pub token_expires_at: Option<DateTimeWithTimeZone>,

    /// Set once by the tracking-snippet verification beacon
    pub snippet_verified_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the connection was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the connection was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
