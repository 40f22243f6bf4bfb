//! Error types for the drive_uploader crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while authenticating or uploading to Google Drive.
#[derive(Error, Debug)]
pub enum DriveError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Credentials file not found: {}", .0.display())]
    CredentialsNotFound(PathBuf),

    #[error("Failed to parse credentials file {}: {source}", path.display())]
    CredentialsMalformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Token file not found: {}", .0.display())]
    TokenNotFound(PathBuf),

    #[error("Token file {} is malformed: {source}", path.display())]
    TokenMalformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    #[error("Authorization aborted: no authorization code entered")]
    UserAborted,

    #[error("Token refresh failed: {0}")]
    TokenRefreshError(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Local file not found: {}", .0.display())]
    LocalFileNotFound(PathBuf),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("No remote folder recorded for the parent of {}", .0.display())]
    ParentNotFound(PathBuf),

    #[error("Upload aborted at {}: {source}", path.display())]
    WalkAborted {
        path: PathBuf,
        #[source]
        source: Box<DriveError>,
    },

    #[error("Invalid folder URL or ID: {0}")]
    InvalidFolderRef(String),
}

impl DriveError {
    /// Build an [`DriveError::Io`] for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DriveError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means the interactive login should run.
    ///
    /// A malformed token file is treated like a missing one.
    pub fn needs_login(&self) -> bool {
        matches!(
            self,
            DriveError::TokenNotFound(_) | DriveError::TokenMalformed { .. }
        )
    }
}

/// Result type alias for DriveError.
pub type Result<T> = std::result::Result<T, DriveError>;
