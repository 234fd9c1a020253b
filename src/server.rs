//! # Server Configuration
//!
//! This module contains the server setup and configuration for the DualPilot
//! connect service.

use anyhow::anyhow;
use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::crypto::CryptoKey;
use crate::handlers;
use crate::search_console::SearchConsoleClient;
use crate::telemetry::{self, TraceContext};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub crypto_key: CryptoKey,
    /// Absent when Google credentials are not configured (local profiles).
    pub search_console: Option<Arc<SearchConsoleClient>>,
}

impl AppState {
    /// Assemble shared state from validated configuration.
    pub fn from_config(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<Self> {
        let key_bytes = config
            .crypto_key
            .clone()
            .ok_or_else(|| anyhow!("crypto key missing from configuration"))?;
        let crypto_key =
            CryptoKey::new(key_bytes).map_err(|e| anyhow!("invalid crypto key: {}", e))?;

        let search_console = if config.google_client_id.is_some()
            && config.google_client_secret.is_some()
        {
            Some(Arc::new(SearchConsoleClient::from_config(&config)?))
        } else {
            tracing::warn!(
                profile = %config.profile,
                "Google OAuth credentials not configured; /connect/google will return an error"
            );
            None
        };

        Ok(Self {
            config: Arc::new(config),
            db,
            crypto_key,
            search_console,
        })
    }
}

/// Attach a trace context to every request so errors and logs carry a
/// correlation ID. An inbound `x-trace-id` header is honored when present.
async fn trace_context_middleware(request: Request, next: Next) -> Response {
    let trace_id = request
        .headers()
        .get("x-trace-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    telemetry::with_trace_context(TraceContext { trace_id }, next.run(request)).await
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/connect/google", get(handlers::connect::start_oauth))
        .route(
            "/connect/google/callback",
            get(handlers::connect::oauth_callback),
        )
        .route("/snippet/verify", post(handlers::snippet::verify_snippet))
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    // Resolve the configured bind address
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = config.profile.clone();

    let state = AppState::from_config(config, db)?;
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::connect::start_oauth,
        crate::handlers::connect::oauth_callback,
        crate::handlers::snippet::verify_snippet,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::error::ProviderError,
            crate::handlers::snippet::SnippetVerifyRequest,
        )
    ),
    info(
        title = "DualPilot Connect API",
        description = "Google Search Console connection service",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
