//! OAuth2 installed-app authentication for Google APIs.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Client;
use tokio::sync::RwLock;
use url::Url;

use crate::config::Config;
use crate::error::{DriveError, Result};
use crate::models::{ClientSecrets, Credentials, TokenResponse};
use crate::token::{self, Token};

/// Google Drive scope limited to files created by this app.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

/// OAuth2 client for the authorization-code flow.
#[derive(Clone, Debug)]
pub struct OAuthClient {
    credentials: Arc<Credentials>,
    http: Client,
}

impl OAuthClient {
    /// Load client credentials from a client secrets JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DriveError::CredentialsNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(DriveError::io(path, e)),
        };

        let secrets: ClientSecrets =
            serde_json::from_str(&content).map_err(|source| DriveError::CredentialsMalformed {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(secrets.into_credentials()))
    }

    /// Create a new OAuth client from credentials.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: Arc::new(credentials),
            http: Client::new(),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Build the consent URL the user opens in a browser.
    ///
    /// Offline access and the consent prompt are requested so the provider
    /// hands out a refresh token.
    pub fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<String> {
        let url = Url::parse_with_params(
            &self.credentials.auth_uri,
            &[
                ("client_id", self.credentials.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", DRIVE_SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("state", state),
            ],
        )
        .map_err(|e| DriveError::Config(format!("Invalid auth URI: {}", e)))?;

        Ok(url.into())
    }

    /// Exchange an authorization code for a token.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<Token> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .http
            .post(&self.credentials.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| DriveError::AuthorizationFailed(format!("Token exchange failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::AuthorizationFailed(format!(
                "Token exchange rejected with status {}: {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response.json().await?;
        if token_response.refresh_token.is_none() {
            tracing::warn!("No refresh token received; the token cannot be renewed once it expires");
        }

        Ok(Token::from_response(token_response, None))
    }

    /// Obtain a fresh access token using the refresh token.
    pub async fn refresh(&self, token: &Token) -> Result<Token> {
        let refresh_token = token.refresh_token.as_deref().ok_or_else(|| {
            DriveError::TokenRefreshError("Token has expired and has no refresh token".to_string())
        })?;

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(&self.credentials.token_uri)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::TokenRefreshError(format!(
                "Status {}: {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response.json().await?;
        Ok(Token::from_response(
            token_response,
            token.refresh_token.clone(),
        ))
    }
}

/// Authenticator handing out access tokens, refreshing them when needed.
#[derive(Clone)]
pub struct Authenticator {
    oauth: OAuthClient,
    token: Arc<RwLock<Token>>,
    token_path: Option<PathBuf>,
}

impl Authenticator {
    /// Create a new authenticator from a client and token.
    pub fn new(oauth: OAuthClient, token: Token) -> Self {
        Self {
            oauth,
            token: Arc::new(RwLock::new(token)),
            token_path: None,
        }
    }

    /// Load credentials and the persisted token named by `config`.
    ///
    /// Fails with [`DriveError::TokenNotFound`] when no token has been saved
    /// yet. Refreshed tokens are written back to the same file.
    pub fn from_config(config: &Config) -> Result<Self> {
        let oauth = OAuthClient::from_file(&config.credentials_path)?;
        let token = token::load_token(&config.token_path)?;
        Ok(Self::new(oauth, token).with_token_path(config.token_path.clone()))
    }

    /// Persist refreshed tokens to `path`.
    pub fn with_token_path(mut self, path: PathBuf) -> Self {
        self.token_path = Some(path);
        self
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_access_token(&self) -> Result<String> {
        {
            let token = self.token.read().await;
            if !token.is_expired() {
                return Ok(token.access_token.clone());
            }
        }

        let mut token = self.token.write().await;

        // Another caller may have refreshed while we waited for the lock.
        if !token.is_expired() {
            return Ok(token.access_token.clone());
        }

        tracing::info!("Refreshing expired access token");
        let refreshed = self.oauth.refresh(&token).await?;

        if let Some(path) = &self.token_path {
            if let Err(e) = token::persist_token(path, &refreshed) {
                tracing::warn!("Unable to save refreshed token: {}", e);
            }
        }

        *token = refreshed;
        Ok(token.access_token.clone())
    }

    /// Snapshot of the current token.
    pub async fn token(&self) -> Token {
        self.token.read().await.clone()
    }
}
