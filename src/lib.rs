//! drive_uploader - Upload files and directory trees to Google Drive.
//!
//! This library provides functionality to:
//! - Authorize with Google via the OAuth2 authorization-code flow
//!   (local callback listener or manual code entry) and persist the token
//! - Upload a single file to Drive
//! - Mirror a local directory tree into Drive folders, reusing folders that
//!   already exist with the same name
//!
//! # Example
//!
//! ```no_run
//! use drive_uploader::{Config, DriveClient, TreeUploader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::resolve(None, None, None)?;
//!     let client = DriveClient::from_config(&config)?;
//!
//!     let summary = TreeUploader::new(&client)
//!         .upload_tree("project".as_ref())
//!         .await?;
//!     println!("{} files uploaded", summary.files);
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod callback;
pub mod client;
pub mod config;
pub mod error;
pub mod flow;
pub mod models;
pub mod target;
pub mod token;
pub mod uploader;

// Re-exports for convenience
pub use auth::{Authenticator, OAuthClient};
pub use client::DriveClient;
pub use config::Config;
pub use error::{DriveError, Result};
pub use flow::AuthStrategy;
pub use models::{Credentials, FileMetadata};
pub use target::UploadTarget;
pub use token::Token;
pub use uploader::{DriveApi, TreeUploader, UploadSummary};
