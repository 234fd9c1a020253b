//! # Connection Repository
//!
//! Database operations for the connection record store: inserting `pending`
//! rows, looking rows up by state token, and the conditional single-row
//! updates that consume a state token exactly once.

use anyhow::{Result, anyhow};
use chrono::{Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use uuid::Uuid;

use crate::crypto::{self, CryptoKey};
use crate::models::connection::{
    self, ConnectionStatus, Entity as Connection, Model, PROVIDER_GOOGLE_SEARCH_CONSOLE,
};

/// Repository for connection database operations
pub struct ConnectionRepository {
    db: Arc<DatabaseConnection>,
    crypto_key: CryptoKey,
}

impl ConnectionRepository {
    /// Creates a new ConnectionRepository instance
    pub fn new(db: Arc<DatabaseConnection>, crypto_key: CryptoKey) -> Self {
        Self { db, crypto_key }
    }

    /// Insert a `pending` row for a freshly initiated authorization attempt.
    pub async fn create_pending(
        &self,
        owner_id: &str,
        domain: Option<&str>,
        state_token: &str,
        state_ttl_minutes: i64,
    ) -> Result<Model> {
        let now = Utc::now();
        let id = Uuid::new_v4();

        let new_connection = connection::ActiveModel {
            id: Set(id),
            owner_id: Set(owner_id.to_string()),
            provider: Set(PROVIDER_GOOGLE_SEARCH_CONSOLE.to_string()),
            domain: Set(domain.map(|d| d.to_string())),
            status: Set(ConnectionStatus::Pending.as_str().to_string()),
            state_token: Set(state_token.to_string()),
            state_expires_at: Set((now + Duration::minutes(state_ttl_minutes)).into()),
            access_token_ciphertext: Set(None),
            refresh_token_ciphertext: Set(None),
            token_expires_at: Set(None),
            snippet_verified_at: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        // Insert without RETURNING, then re-fetch: SQLite cannot unpack a UUID
        // primary key from the insert result.
        Connection::insert(new_connection)
            .exec_without_returning(&*self.db)
            .await?;

        let fetched = Connection::find_by_id(id).one(&*self.db).await?;
        fetched.ok_or_else(|| anyhow!("connection not persisted"))
    }

    /// Find the connection row matching a state token, ignoring expired states.
    ///
    /// A consumed row (status no longer `pending`) is still returned so the
    /// caller can distinguish a replay from an unknown state.
    pub async fn find_by_state_token(&self, state_token: &str) -> Result<Option<Model>> {
        let result = Connection::find()
            .filter(connection::Column::StateToken.eq(state_token))
            .filter(connection::Column::StateExpiresAt.gt(Utc::now()))
            .one(&*self.db)
            .await?;

        Ok(result)
    }

    /// Find a connection by its primary identifier.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Model>> {
        Ok(Connection::find_by_id(id).one(&*self.db).await?)
    }

    /// Persist the outcome of a successful token exchange.
    ///
    /// The update is conditional on the row still being `pending`, keyed by
    /// the row's primary identifier; a concurrent callback that already
    /// consumed the state leaves zero rows affected and the caller fails
    /// closed. When the provider response omitted a refresh token the stored
    /// ciphertext is left untouched.
    pub async fn complete_exchange(
        &self,
        existing: &Model,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_in_seconds: Option<i64>,
    ) -> Result<bool> {
        let aad = crypto::connection_aad(existing.id, &existing.owner_id, &existing.provider);

        let access_ciphertext = crypto::seal_token(&self.crypto_key, &aad, access_token)
            .map_err(|e| anyhow!("failed to seal access token: {}", e))?;

        let refresh_ciphertext = refresh_token
            .map(|token| crypto::seal_token(&self.crypto_key, &aad, token))
            .transpose()
            .map_err(|e| anyhow!("failed to seal refresh token: {}", e))?;

        let now = Utc::now();
        let token_expires_at = expires_in_seconds.map(|lifetime| now + Duration::seconds(lifetime));

        let mut update = Connection::update_many()
            .col_expr(
                connection::Column::Status,
                Expr::value(ConnectionStatus::Connected.as_str()),
            )
            .col_expr(
                connection::Column::AccessTokenCiphertext,
                Expr::value(Some(access_ciphertext)),
            )
            .col_expr(
                connection::Column::TokenExpiresAt,
                Expr::value(token_expires_at),
            )
            .col_expr(connection::Column::UpdatedAt, Expr::value(now))
            .filter(connection::Column::Id.eq(existing.id))
            .filter(connection::Column::Status.eq(ConnectionStatus::Pending.as_str()));

        if let Some(ciphertext) = refresh_ciphertext {
            update = update.col_expr(
                connection::Column::RefreshTokenCiphertext,
                Expr::value(Some(ciphertext)),
            );
        }

        let result = update.exec(&*self.db).await?;
        Ok(result.rows_affected == 1)
    }

    /// Transition a row out of `pending` into `error`, consuming its state.
    pub async fn mark_error(&self, id: Uuid) -> Result<bool> {
        let result = Connection::update_many()
            .col_expr(
                connection::Column::Status,
                Expr::value(ConnectionStatus::Error.as_str()),
            )
            .col_expr(connection::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(connection::Column::Id.eq(id))
            .filter(connection::Column::Status.eq(ConnectionStatus::Pending.as_str()))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// Decrypt the stored tokens for a connection.
    pub async fn open_tokens(&self, existing: &Model) -> Result<(Option<String>, Option<String>)> {
        let aad = crypto::connection_aad(existing.id, &existing.owner_id, &existing.provider);

        let access = existing
            .access_token_ciphertext
            .as_deref()
            .map(|ciphertext| crypto::open_token(&self.crypto_key, &aad, ciphertext))
            .transpose()
            .map_err(|e| anyhow!("failed to open access token: {}", e))?;

        let refresh = existing
            .refresh_token_ciphertext
            .as_deref()
            .map(|ciphertext| crypto::open_token(&self.crypto_key, &aad, ciphertext))
            .transpose()
            .map_err(|e| anyhow!("failed to open refresh token: {}", e))?;

        Ok((access, refresh))
    }

    /// Record a tracking-snippet verification for a domain.
    ///
    /// Only rows whose `snippet_verified_at` is still NULL are touched, so
    /// repeated identical confirmations are harmless no-ops. Returns the
    /// number of rows that were newly verified.
    pub async fn mark_snippet_verified(&self, domain: &str) -> Result<u64> {
        let now = Utc::now();

        let result = Connection::update_many()
            .col_expr(
                connection::Column::SnippetVerifiedAt,
                Expr::value(Some(now)),
            )
            .col_expr(connection::Column::UpdatedAt, Expr::value(now))
            .filter(connection::Column::Domain.eq(domain))
            .filter(connection::Column::SnippetVerifiedAt.is_null())
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected)
    }
}
