//! Configuration paths, resolved once at startup.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DriveError, Result};

/// Directory name under the platform configuration directory.
const APP_DIR_NAME: &str = "drive-uploader";

/// Default credentials file name inside the config directory.
pub const CREDENTIALS_FILE: &str = "credentials.json";

/// Default token file name inside the config directory.
pub const TOKEN_FILE: &str = "token.json";

/// File locations used by the auth manager and uploader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub config_dir: PathBuf,
    pub credentials_path: PathBuf,
    pub token_path: PathBuf,
}

impl Config {
    /// Resolve configuration from optional overrides.
    ///
    /// Unset paths default to files inside the config directory, which
    /// itself defaults to `<platform config dir>/drive-uploader`.
    pub fn resolve(
        config_dir: Option<PathBuf>,
        credentials_path: Option<PathBuf>,
        token_path: Option<PathBuf>,
    ) -> Result<Self> {
        let config_dir = match config_dir {
            Some(dir) => dir,
            None => default_config_dir()?,
        };

        Ok(Self {
            credentials_path: credentials_path.unwrap_or_else(|| config_dir.join(CREDENTIALS_FILE)),
            token_path: token_path.unwrap_or_else(|| config_dir.join(TOKEN_FILE)),
            config_dir,
        })
    }

    /// Create the config directory if absent, owner-only on Unix.
    pub fn ensure_config_dir(&self) -> Result<()> {
        create_private_dir(&self.config_dir)
    }
}

/// The platform default config directory for this tool.
pub fn default_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| DriveError::Config("Could not determine the user config directory".to_string()))
}

fn create_private_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }

    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }

    builder.create(path).map_err(|e| DriveError::io(path, e))?;
    tracing::info!("Created config directory {}", path.display());
    Ok(())
}
