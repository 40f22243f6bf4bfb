//! Interactive OAuth2 authorization: obtain, exchange and persist a token.

use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::auth::OAuthClient;
use crate::callback::CallbackServer;
use crate::error::{DriveError, Result};
use crate::token::{self, Token};

/// Port the local callback listener binds by default.
pub const DEFAULT_CALLBACK_PORT: u16 = 8090;

/// Default bound on the interactive wait.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(300);

/// Redirect URI used for manual entry when the credentials list none.
const FALLBACK_REDIRECT_URI: &str = "http://localhost";

/// How the authorization code gets back to us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStrategy {
    /// Listen on a local port for the provider redirect.
    LocalCallback { port: u16, open_browser: bool },
    /// Ask the user to paste the code.
    Manual,
}

impl Default for AuthStrategy {
    fn default() -> Self {
        AuthStrategy::LocalCallback {
            port: DEFAULT_CALLBACK_PORT,
            open_browser: true,
        }
    }
}

/// Run the authorization-code flow and exchange the code for a token.
///
/// The wait for the code is bounded by `timeout` and by `cancel`; either
/// one ends the flow with [`DriveError::AuthorizationFailed`].
pub async fn run_interactive_authorization(
    oauth: &OAuthClient,
    strategy: &AuthStrategy,
    cancel: &CancellationToken,
    timeout: Duration,
) -> Result<Token> {
    let state = Uuid::new_v4().to_string();

    let (code, redirect_uri) = match strategy {
        AuthStrategy::LocalCallback { port, open_browser } => {
            let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, *port));
            let server = CallbackServer::bind(addr, state.clone()).await?;
            let redirect_uri = server.redirect_uri();
            let auth_url = oauth.authorization_url(&redirect_uri, &state)?;

            println!("Go to the following link in your browser and authorize the app:");
            println!("{}\n", auth_url);
            if *open_browser {
                if let Err(e) = open::that(&auth_url) {
                    tracing::warn!("Could not open a browser: {}", e);
                }
            }

            let code = server.wait_for_code(cancel, timeout).await?;
            (code, redirect_uri)
        }
        AuthStrategy::Manual => {
            let redirect_uri = oauth
                .credentials()
                .redirect_uris
                .first()
                .cloned()
                .unwrap_or_else(|| FALLBACK_REDIRECT_URI.to_string());
            let auth_url = oauth.authorization_url(&redirect_uri, &state)?;

            println!("Go to the following link in your browser and authorize the app:");
            println!("{}\n", auth_url);

            let code = prompt_for_code(cancel, timeout).await?;
            (code, redirect_uri)
        }
    };

    tracing::info!("Authorization code received, exchanging for a token");
    oauth.exchange_code(&code, &redirect_uri).await
}

/// Authorize interactively and save the token to `token_path`.
///
/// A failure to save is only a warning: the returned token is still valid
/// for the current run. Nothing is written when authorization fails.
pub async fn login(
    oauth: &OAuthClient,
    strategy: &AuthStrategy,
    token_path: &Path,
    cancel: &CancellationToken,
    timeout: Duration,
) -> Result<Token> {
    let token = run_interactive_authorization(oauth, strategy, cancel, timeout).await?;

    match token::persist_token(token_path, &token) {
        Ok(()) => tracing::info!("Token saved to {}", token_path.display()),
        Err(e) => tracing::warn!("Unable to cache OAuth token: {}", e),
    }

    Ok(token)
}

async fn prompt_for_code(cancel: &CancellationToken, timeout: Duration) -> Result<String> {
    print!("Enter the authorization code: ");
    std::io::stdout()
        .flush()
        .map_err(|e| DriveError::AuthorizationFailed(format!("Could not show the prompt: {}", e)))?;

    read_entered_code(BufReader::new(tokio::io::stdin()), cancel, timeout).await
}

/// Read one line holding the code (or the redirect URL) from `reader`.
///
/// Works the same for a terminal and for piped input. Empty input or end of
/// input is [`DriveError::UserAborted`].
pub async fn read_entered_code<R>(
    mut reader: R,
    cancel: &CancellationToken,
    timeout: Duration,
) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    tokio::select! {
        read = reader.read_line(&mut line) => {
            read.map_err(|e| DriveError::AuthorizationFailed(format!("Could not read the code: {}", e)))?;
        }
        _ = cancel.cancelled() => {
            return Err(DriveError::AuthorizationFailed("Authorization was cancelled".to_string()))
        }
        _ = tokio::time::sleep(timeout) => {
            return Err(DriveError::AuthorizationFailed(format!(
                "Timed out after {}s waiting for the authorization code",
                timeout.as_secs()
            )))
        }
    }

    parse_entered_code(&line).ok_or(DriveError::UserAborted)
}

/// Accept either the bare code or the full redirect URL containing it.
pub fn parse_entered_code(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Some(trimmed.to_string());
    }

    Url::parse(trimmed)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
        .filter(|code| !code.is_empty())
}
