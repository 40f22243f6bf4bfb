//! OAuth2 token persistence.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DriveError, Result};
use crate::models::TokenResponse;

/// Tokens are refreshed this long before they actually expire.
const EXPIRY_SKEW_SECS: i64 = 60;

/// An OAuth2 token as stored in the token file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Token {
    /// Build a token from a token endpoint response.
    ///
    /// Refresh responses usually omit the refresh token, in which case
    /// `previous_refresh` is kept.
    pub fn from_response(response: TokenResponse, previous_refresh: Option<String>) -> Self {
        let expiry = response
            .expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .map(|secs| Utc::now() + Duration::seconds(secs));

        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(previous_refresh),
            token_type: response.token_type,
            expiry,
        }
    }

    /// Whether the access token is expired or about to expire.
    ///
    /// Tokens without an expiry never expire.
    pub fn is_expired(&self) -> bool {
        match self.expiry {
            Some(expiry) => expiry <= Utc::now() + Duration::seconds(EXPIRY_SKEW_SECS),
            None => false,
        }
    }
}

/// Read a persisted token.
///
/// A missing file yields [`DriveError::TokenNotFound`] so callers can fall
/// back to the interactive login.
pub fn load_token(path: &Path) -> Result<Token> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(DriveError::TokenNotFound(path.to_path_buf()))
        }
        Err(e) => return Err(DriveError::io(path, e)),
    };

    serde_json::from_str(&content).map_err(|source| DriveError::TokenMalformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a token, readable by the owner only.
///
/// The file is truncated and rewritten in full.
pub fn persist_token(path: &Path, token: &Token) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| DriveError::io(parent, e))?;
        }
    }

    let json = serde_json::to_string_pretty(token)
        .map_err(|e| DriveError::Config(format!("Failed to serialize token: {}", e)))?;

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(|e| DriveError::io(path, e))?;
    // The create mode does not apply to a file that already exists.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(|e| DriveError::io(path, e))?;
    }
    file.write_all(json.as_bytes())
        .and_then(|_| file.write_all(b"\n"))
        .and_then(|_| file.sync_all())
        .map_err(|e| DriveError::io(path, e))?;

    tracing::debug!("Token written to {}", path.display());
    Ok(())
}

/// Delete the token file. Returns whether a file was removed.
pub fn delete_token(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(DriveError::io(path, e)),
    }
}
