//! # Snippet Verification Beacon
//!
//! Receives the fire-and-forget beacon emitted by the embedded tracking
//! snippet the first time it runs on a customer page.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::repositories::ConnectionRepository;
use crate::server::AppState;

/// Beacon payload sent by the tracking snippet
#[derive(Debug, Deserialize, ToSchema)]
pub struct SnippetVerifyRequest {
    /// Domain the snippet is installed on
    pub domain: String,
}

/// Record that the tracking snippet is live on a domain
///
/// Idempotent: only connections not yet verified are touched, so repeated
/// beacons from the same page are harmless.
#[utoipa::path(
    post,
    path = "/snippet/verify",
    request_body = SnippetVerifyRequest,
    responses(
        (status = 204, description = "Beacon accepted"),
        (status = 400, description = "Missing or empty domain", body = ApiError)
    ),
    tag = "snippet"
)]
pub async fn verify_snippet(
    State(state): State<AppState>,
    Json(payload): Json<SnippetVerifyRequest>,
) -> Result<StatusCode, ApiError> {
    let domain = payload.domain.trim();
    if domain.is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Missing domain",
        ));
    }

    let repo = ConnectionRepository::new(Arc::new(state.db.clone()), state.crypto_key.clone());

    // Beacons are fire-and-forget from the browser's point of view; a store
    // hiccup is logged but never surfaced to the page.
    match repo.mark_snippet_verified(domain).await {
        Ok(0) => {
            tracing::debug!(%domain, "Snippet beacon for already-verified or unknown domain");
        }
        Ok(rows) => {
            tracing::info!(%domain, rows, "Snippet verified");
        }
        Err(err) => {
            tracing::warn!(%domain, ?err, "Failed to record snippet verification");
        }
    }

    Ok(StatusCode::NO_CONTENT)
}
