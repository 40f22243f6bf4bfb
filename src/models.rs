//! Data models for Google Drive and OAuth2 API payloads.

use serde::{Deserialize, Serialize};

/// MIME type Google Drive uses for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Google OAuth2 authorization endpoint.
pub const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google OAuth2 token endpoint.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Metadata for a file or folder in Google Drive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub web_view_link: Option<String>,
    #[serde(default, deserialize_with = "deserialize_size")]
    pub size: Option<u64>,
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt {
        Some(s) => s.parse::<u64>().map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// Outcome of looking up a folder by name, creating it when absent.
#[derive(Debug, Clone)]
pub struct FolderResolution {
    pub folder: FileMetadata,
    pub created: bool,
}

/// Response from the files.list API endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListResponse {
    #[serde(default)]
    pub files: Vec<FileMetadata>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Google API error response.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub code: u16,
    pub message: String,
}

/// OAuth2 client credentials issued by the Google Cloud console.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Layout of a downloaded client secrets file.
///
/// Desktop clients nest the fields under `installed`, web clients under `web`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ClientSecrets {
    Installed { installed: Credentials },
    Web { web: Credentials },
    Flat(Credentials),
}

impl ClientSecrets {
    pub fn into_credentials(self) -> Credentials {
        match self {
            ClientSecrets::Installed { installed } => installed,
            ClientSecrets::Web { web } => web,
            ClientSecrets::Flat(credentials) => credentials,
        }
    }
}

/// OAuth2 token endpoint response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}
