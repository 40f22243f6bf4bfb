//! Short-lived local HTTP listener receiving the OAuth2 redirect.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{DriveError, Result};

/// Path the provider redirects back to.
pub const CALLBACK_PATH: &str = "/auth/callback";

/// How long teardown waits for open connections to drain.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const SUCCESS_PAGE: &str = "<!DOCTYPE html>
<html><head><title>Authorization complete</title></head>
<body><h1>Authorization successful</h1>
<p>You can close this window and return to the terminal.</p></body></html>";

const ERROR_PAGE: &str = "<!DOCTYPE html>
<html><head><title>Authorization failed</title></head>
<body><h1>Authorization failed</h1>
<p>Return to the terminal for details.</p></body></html>";

type CallbackOutcome = std::result::Result<String, String>;

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

struct CallbackState {
    expected_state: String,
    sender: Mutex<Option<oneshot::Sender<CallbackOutcome>>>,
}

impl CallbackState {
    /// Deliver the first outcome; later requests are ignored.
    fn deliver(&self, outcome: CallbackOutcome) -> bool {
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };

        match sender {
            Some(sender) => sender.send(outcome).is_ok(),
            None => false,
        }
    }
}

/// A listener that resolves exactly once with an authorization code.
///
/// The server task is stopped when the wait finishes or when the value is
/// dropped, whichever comes first.
pub struct CallbackServer {
    local_addr: SocketAddr,
    receiver: oneshot::Receiver<CallbackOutcome>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl CallbackServer {
    /// Bind the listener and start serving the callback route.
    pub async fn bind(addr: SocketAddr, expected_state: impl Into<String>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            DriveError::AuthorizationFailed(format!(
                "Failed to start callback listener on {}: {}",
                addr, e
            ))
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| DriveError::AuthorizationFailed(format!("Callback listener error: {}", e)))?;

        let (sender, receiver) = oneshot::channel();
        let state = Arc::new(CallbackState {
            expected_state: expected_state.into(),
            sender: Mutex::new(Some(sender)),
        });

        let app = Router::new()
            .route(CALLBACK_PATH, get(handle_callback))
            .with_state(state);

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await
        });

        tracing::debug!("Callback listener started on {}", local_addr);

        Ok(Self {
            local_addr,
            receiver,
            shutdown,
            task: Some(task),
        })
    }

    /// The address actually bound, useful when binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The redirect URI matching this listener.
    pub fn redirect_uri(&self) -> String {
        format!("http://{}{}", self.local_addr, CALLBACK_PATH)
    }

    /// Wait for the redirect, then stop the listener.
    ///
    /// Cancellation and timeout both surface as
    /// [`DriveError::AuthorizationFailed`].
    pub async fn wait_for_code(
        mut self,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<String> {
        let outcome = tokio::select! {
            received = &mut self.receiver => match received {
                Ok(Ok(code)) => Ok(code),
                Ok(Err(reason)) => Err(DriveError::AuthorizationFailed(reason)),
                Err(_) => Err(DriveError::AuthorizationFailed(
                    "Callback listener stopped unexpectedly".to_string(),
                )),
            },
            _ = cancel.cancelled() => Err(DriveError::AuthorizationFailed(
                "Authorization was cancelled".to_string(),
            )),
            _ = tokio::time::sleep(timeout) => Err(DriveError::AuthorizationFailed(format!(
                "Timed out after {}s waiting for the authorization callback",
                timeout.as_secs()
            ))),
        };

        self.stop().await;
        outcome
    }

    async fn stop(&mut self) {
        self.shutdown.cancel();
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await {
                Ok(Ok(Err(e))) => tracing::warn!("Callback listener error: {}", e),
                Ok(_) => {}
                Err(_) => task.abort(),
            }
        }
        tracing::debug!("Callback listener on {} stopped", self.local_addr);
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn handle_callback(
    State(state): State<Arc<CallbackState>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let outcome = match params {
        CallbackParams {
            error: Some(error), ..
        } => Err(format!("Provider returned an error: {}", error)),
        CallbackParams { state: received, .. }
            if received.as_deref() != Some(state.expected_state.as_str()) =>
        {
            Err("State parameter mismatch in authorization callback".to_string())
        }
        CallbackParams { code: Some(code), .. } if !code.is_empty() => Ok(code),
        _ => Err("No authorization code in callback URL".to_string()),
    };

    let succeeded = outcome.is_ok();
    if !state.deliver(outcome) {
        tracing::debug!("Ignoring repeated authorization callback");
    }

    if succeeded {
        Html(SUCCESS_PAGE).into_response()
    } else {
        (StatusCode::BAD_REQUEST, Html(ERROR_PAGE)).into_response()
    }
}
