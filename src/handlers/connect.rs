//! # Connection Handlers
//!
//! Handlers for the Google Search Console OAuth flow: the authorization
//! initiator and the provider callback.

use crate::error::ApiError;
use crate::models::connection::{ConnectionStatus, PROVIDER_GOOGLE_SEARCH_CONSOLE};
use crate::repositories::ConnectionRepository;
use crate::search_console::SearchConsoleError;
use crate::server::AppState;
use axum::{
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use url::Url;
use utoipa::{IntoParams, ToSchema};

/// Query parameters for the authorization initiator
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct StartOAuthParams {
    /// Identifier of the account that will own the resulting connection
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    /// Search Console property the connection targets (optional)
    pub domain: Option<String>,
}

/// Query parameters delivered by the provider redirect
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct OAuthCallbackParams {
    /// One-time authorization code
    pub code: Option<String>,
    /// State token issued by the initiator
    pub state: Option<String>,
    /// Provider-reported error (e.g. `access_denied`)
    pub error: Option<String>,
}

/// Start the Google Search Console OAuth flow
///
/// Creates a `pending` connection row carrying a fresh state token and
/// redirects the browser to Google's consent screen.
#[utoipa::path(
    get,
    path = "/connect/google",
    params(StartOAuthParams),
    responses(
        (status = 302, description = "Redirect to the Google consent screen"),
        (status = 400, description = "Missing userId", body = ApiError),
        (status = 500, description = "Server credentials not configured or store failure", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn start_oauth(
    State(state): State<AppState>,
    Query(params): Query<StartOAuthParams>,
) -> Result<Response, ApiError> {
    let Some(owner_id) = params.user_id.filter(|v| !v.is_empty()) else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Missing userId",
        ));
    };

    // Fail fast before touching the store when credentials are absent.
    let Some(search_console) = state.search_console.clone() else {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Google OAuth credentials are not configured",
        ));
    };

    let state_token = generate_secure_state();

    let repo = ConnectionRepository::new(Arc::new(state.db.clone()), state.crypto_key.clone());
    let connection = repo
        .create_pending(
            &owner_id,
            params.domain.as_deref(),
            &state_token,
            state.config.state_ttl_minutes,
        )
        .await
        .map_err(|err| {
            tracing::error!(?err, "Failed to persist pending connection");
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "PERSISTENCE_FAILED",
                "Failed to create connection state",
            )
        })?;

    let authorize_url = search_console
        .build_authorize_url(&state_token)
        .map_err(|err| {
            tracing::error!(?err, "Failed to build authorization URL");
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Failed to generate authorization URL",
            )
        })?;

    validate_authorize_url(&authorize_url)?;

    tracing::info!(
        owner_id = %connection.owner_id,
        connection_id = %connection.id,
        "OAuth flow initiated"
    );

    Ok(redirect(authorize_url.as_str()))
}

/// Complete the Google Search Console OAuth flow
///
/// Validates the state token, exchanges the one-time code for tokens,
/// persists the result, and redirects the browser back into the application.
#[utoipa::path(
    get,
    path = "/connect/google/callback",
    params(OAuthCallbackParams),
    responses(
        (status = 302, description = "Redirect back into the application with a gsc=connected marker"),
        (status = 400, description = "Missing parameters or provider denial", body = ApiError),
        (status = 404, description = "Unknown or expired state token", body = ApiError),
        (status = 409, description = "State token already consumed", body = ApiError),
        (status = 502, description = "Provider rejected the code or was unreachable", body = ApiError),
        (status = 500, description = "Token persistence failed", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(params): Query<OAuthCallbackParams>,
) -> Result<Response, ApiError> {
    let repo = ConnectionRepository::new(Arc::new(state.db.clone()), state.crypto_key.clone());

    // The provider reported a denial; consume the state so it cannot be replayed.
    if let Some(provider_error) = params.error.as_deref() {
        if let Some(state_token) = params.state.as_deref()
            && let Ok(Some(connection)) = repo.find_by_state_token(state_token).await
        {
            let _ = repo.mark_error(connection.id).await;
        }

        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            &format!("provider denied authorization: {}", provider_error),
        ));
    }

    let (Some(code), Some(state_token)) = (params.code.as_deref(), params.state.as_deref()) else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "missing code or state parameter",
        ));
    };

    // State validation comes first so a forged state never burns the one-time
    // code against the provider.
    let connection = repo
        .find_by_state_token(state_token)
        .await
        .map_err(|err| {
            tracing::error!(?err, "State lookup failed");
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "PERSISTENCE_FAILED",
                "Failed to look up connection state",
            )
        })?
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "unknown or expired state token",
            )
        })?;

    if connection.status != ConnectionStatus::Pending.as_str() {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "CONFLICT",
            "state token already consumed",
        ));
    }

    let Some(search_console) = state.search_console.clone() else {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Google OAuth credentials are not configured",
        ));
    };

    let token_response = match search_console.exchange_code_for_token(code).await {
        Ok(response) => response,
        Err(err) => {
            // The code is dead either way; take the row out of `pending` so
            // the same state cannot be replayed against another code.
            let _ = repo.mark_error(connection.id).await;
            return Err(map_exchange_error(err));
        }
    };

    // The access token presence is enforced by the client.
    let access_token = token_response.access_token.as_deref().unwrap_or_default();

    let transitioned = repo
        .complete_exchange(
            &connection,
            access_token,
            token_response.refresh_token.as_deref(),
            token_response.expires_in,
        )
        .await
        .map_err(|err| {
            // The user now holds valid provider tokens that we failed to save;
            // operators need to see this distinctly from an exchange failure.
            tracing::error!(
                connection_id = %connection.id,
                ?err,
                "Token persistence failed after successful exchange"
            );
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "PERSISTENCE_FAILED",
                "Failed to persist exchanged tokens",
            )
        })?;

    if !transitioned {
        // A concurrent callback won the conditional update.
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "CONFLICT",
            "state token already consumed",
        ));
    }

    tracing::info!(
        owner_id = %connection.owner_id,
        connection_id = %connection.id,
        "Connection established"
    );

    Ok(redirect(&format!(
        "{}/?gsc=connected",
        state.config.app_base_url.trim_end_matches('/')
    )))
}

/// Build a 302 response pointing at `location`.
fn redirect(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Generate a cryptographically secure random state token
fn generate_secure_state() -> String {
    use rand::Rng;

    // 32 random bytes, well above the 128-bit entropy floor for state tokens
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);

    base64_url::encode(&bytes)
}

/// Validate authorization URL meets OAuth 2.0 and security requirements
fn validate_authorize_url(url: &Url) -> Result<(), ApiError> {
    if url.scheme() != "https" {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Generated authorization URL must use HTTPS",
        ));
    }

    // No fragment component per OAuth 2.0 RFC 6749 section 3.1
    if url.fragment().is_some() {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Generated authorization URL must not include fragment component",
        ));
    }

    if url.as_str().len() > 2048 {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Generated authorization URL exceeds maximum length of 2048 characters",
        ));
    }

    Ok(())
}

/// Map an upstream exchange failure onto the problem+json envelope.
fn map_exchange_error(err: SearchConsoleError) -> ApiError {
    match err {
        SearchConsoleError::TokenExchange { status, body } => {
            let body_snippet: String = body.chars().take(256).collect();
            ApiError::new(
                StatusCode::BAD_GATEWAY,
                "PROVIDER_ERROR",
                &format!("provider rejected the authorization code (HTTP {})", status),
            )
            .with_details(serde_json::json!({
                "provider": {
                    "name": PROVIDER_GOOGLE_SEARCH_CONSOLE,
                    "status": status,
                    "body_snippet": body_snippet,
                }
            }))
        }
        SearchConsoleError::Network(message) => {
            tracing::warn!(%message, "Provider token endpoint unreachable");
            ApiError::new(
                StatusCode::BAD_GATEWAY,
                "PROVIDER_ERROR",
                "provider token endpoint unreachable",
            )
        }
        SearchConsoleError::InvalidResponse(message) => ApiError::new(
            StatusCode::BAD_GATEWAY,
            "PROVIDER_ERROR",
            &format!("provider returned a malformed response: {}", message),
        ),
        SearchConsoleError::Configuration(message) => {
            tracing::error!(%message, "OAuth client misconfigured");
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Google OAuth client is misconfigured",
            )
        }
    }
}
