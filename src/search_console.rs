//! Google Search Console OAuth client
//!
//! Builds the consent-screen authorization URL and performs the one-shot
//! server-to-server authorization-code exchange against Google's token
//! endpoint.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::config::AppConfig;

/// Errors raised by the Search Console OAuth client.
#[derive(Debug, Error)]
pub enum SearchConsoleError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Token exchange failed with status {status}: {body}")]
    TokenExchange { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Google OAuth token response
#[derive(Debug, Deserialize)]
pub struct GoogleTokenResponse {
    pub access_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_in: Option<i64>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

/// Client for Google's OAuth endpoints, scoped to Search Console.
pub struct SearchConsoleClient {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    authorize_base: String,
    token_base: String,
    scopes: String,
    http_client: Client,
}

impl SearchConsoleClient {
    /// Build a client from configuration; fails fast when the server
    /// credentials are absent.
    pub fn from_config(config: &AppConfig) -> Result<Self, SearchConsoleError> {
        let client_id = config
            .google_client_id
            .clone()
            .ok_or_else(|| SearchConsoleError::Configuration("missing Google client ID".into()))?;
        let client_secret = config.google_client_secret.clone().ok_or_else(|| {
            SearchConsoleError::Configuration("missing Google client secret".into())
        })?;

        let http_client = Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .build()
            .map_err(|e| SearchConsoleError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client_id,
            client_secret,
            redirect_uri: config.google_redirect_uri.clone(),
            authorize_base: config.google_authorize_base.clone(),
            token_base: config.google_token_base.clone(),
            scopes: config.google_scopes.clone(),
            http_client,
        })
    }

    /// Build the consent-screen authorization URL carrying the state token.
    pub fn build_authorize_url(&self, state_token: &str) -> Result<Url, SearchConsoleError> {
        let mut url = Url::parse(&format!("{}/o/oauth2/v2/auth", self.authorize_base))
            .map_err(|e| SearchConsoleError::Configuration(format!("Invalid auth URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.scopes)
            // offline access is what makes Google issue a refresh token
            .append_pair("access_type", "offline")
            .append_pair("include_granted_scopes", "true")
            .append_pair("state", state_token);

        Ok(url)
    }

    /// Exchange an authorization code for access/refresh tokens.
    pub async fn exchange_code_for_token(
        &self,
        code: &str,
    ) -> Result<GoogleTokenResponse, SearchConsoleError> {
        let mut params = HashMap::new();
        params.insert("client_id".to_string(), self.client_id.clone());
        params.insert("client_secret".to_string(), self.client_secret.clone());
        params.insert("code".to_string(), code.to_string());
        params.insert("grant_type".to_string(), "authorization_code".to_string());
        params.insert("redirect_uri".to_string(), self.redirect_uri.clone());

        let response = self
            .http_client
            .post(format!("{}/token", self.token_base))
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| SearchConsoleError::Network(format!("Token request failed: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            return Err(SearchConsoleError::TokenExchange {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let token_response: GoogleTokenResponse = response.json().await.map_err(|e| {
            SearchConsoleError::InvalidResponse(format!("Failed to parse token response: {}", e))
        })?;

        // Authorization codes are single-use; a 200 without an access token is
        // still a dead exchange and must not be persisted.
        if token_response
            .access_token
            .as_deref()
            .unwrap_or_default()
            .is_empty()
        {
            return Err(SearchConsoleError::InvalidResponse(
                "Token response did not include an access token".to_string(),
            ));
        }

        Ok(token_response)
    }
}
