//! Google Drive API client for folder lookup and file uploads.

use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::auth::Authenticator;
use crate::config::Config;
use crate::error::{DriveError, Result};
use crate::models::{
    ApiErrorResponse, FileListResponse, FileMetadata, FolderResolution, FOLDER_MIME_TYPE,
};
use crate::uploader::DriveApi;

/// Base URL for Google Drive API v3.
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Upload URL for Google Drive API.
const UPLOAD_API_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Fields requested for every file resource.
const FILE_FIELDS: &str = "id, name, size, mimeType, webViewLink";

/// Client for interacting with Google Drive.
pub struct DriveClient {
    auth: Authenticator,
    http: Client,
    api_base: String,
    upload_base: String,
}

impl DriveClient {
    /// Create a new DriveClient.
    pub fn new(auth: Authenticator) -> Self {
        Self {
            auth,
            http: Client::new(),
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: UPLOAD_API_BASE.to_string(),
        }
    }

    /// Build a client from the credentials and token named by `config`.
    ///
    /// Fails with [`DriveError::TokenNotFound`] if nobody has logged in yet.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(Authenticator::from_config(config)?))
    }

    /// Point the client at different API endpoints.
    pub fn with_base_urls(mut self, api_base: impl Into<String>, upload_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.upload_base = upload_base.into();
        self
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }

    /// Query files using Google Drive query syntax.
    pub async fn query_files(&self, query: &str) -> Result<Vec<FileMetadata>> {
        let token = self.auth.get_access_token().await?;
        let mut all_files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(format!("{}/files", self.api_base))
                .bearer_auth(&token)
                .query(&[
                    ("q", query),
                    ("spaces", "drive"),
                    ("supportsAllDrives", "true"),
                    ("includeItemsFromAllDrives", "true"),
                    ("fields", "nextPageToken, files(id, name, size, mimeType, webViewLink)"),
                ]);

            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token)]);
            }

            tracing::debug!("Querying files: {}", query);
            let response = check_response(request.send().await?).await?;
            let list_response: FileListResponse = response.json().await?;
            all_files.extend(list_response.files);

            match list_response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(all_files)
    }

    /// Find a folder by exact name under `parent_id`, or under My Drive's
    /// root when no parent is given.
    ///
    /// If several folders match, the first one returned wins.
    pub async fn find_folder(&self, name: &str, parent_id: Option<&str>) -> Result<Option<FileMetadata>> {
        let query = format!(
            "name = '{}' and mimeType = '{}' and '{}' in parents and trashed = false",
            escape_query_value(name),
            FOLDER_MIME_TYPE,
            escape_query_value(parent_id.unwrap_or("root")),
        );
        let folders = self.query_files(&query).await?;
        Ok(folders.into_iter().next())
    }

    /// Create a folder.
    pub async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<FileMetadata> {
        let token = self.auth.get_access_token().await?;

        let mut metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE
        });
        if let Some(parent) = parent_id {
            metadata["parents"] = serde_json::json!([parent]);
        }

        tracing::debug!("Creating folder '{}' under {:?}", name, parent_id);
        let response = self
            .http
            .post(format!("{}/files", self.api_base))
            .bearer_auth(&token)
            .query(&[("supportsAllDrives", "true"), ("fields", FILE_FIELDS)])
            .json(&metadata)
            .send()
            .await?;

        let folder: FileMetadata = check_response(response).await?.json().await?;
        Ok(folder)
    }

    /// Return the matching folder, creating it if none exists.
    ///
    /// Not atomic: two concurrent callers may both create the folder.
    pub async fn find_or_create_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<FolderResolution> {
        if let Some(folder) = self.find_folder(name, parent_id).await? {
            return Ok(FolderResolution {
                folder,
                created: false,
            });
        }

        let folder = self.create_folder(name, parent_id).await?;
        Ok(FolderResolution {
            folder,
            created: true,
        })
    }

    /// Upload a file, streaming its contents from disk.
    ///
    /// The remote file is named after the local base name and placed in
    /// `parent_id` when given.
    pub async fn upload_file<P: AsRef<Path>>(
        &self,
        local_path: P,
        parent_id: Option<&str>,
    ) -> Result<FileMetadata> {
        let local_path = local_path.as_ref();
        let filename = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| DriveError::LocalFileNotFound(local_path.to_path_buf()))?;

        let file = match File::open(local_path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DriveError::LocalFileNotFound(local_path.to_path_buf()))
            }
            Err(e) => return Err(DriveError::io(local_path, e)),
        };
        let file_size = file
            .metadata()
            .await
            .map_err(|e| DriveError::io(local_path, e))?
            .len();
        let mime_type = mime_guess::from_path(local_path)
            .first_or_octet_stream()
            .to_string();

        let token = self.auth.get_access_token().await?;

        let mut metadata = serde_json::json!({ "name": filename });
        if let Some(parent) = parent_id {
            metadata["parents"] = serde_json::json!([parent]);
        }

        let metadata_part = Part::text(metadata.to_string()).mime_str("application/json")?;

        let file_part = Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), file_size)
            .file_name(filename.clone())
            .mime_str(&mime_type)?;

        let form = Form::new()
            .part("metadata", metadata_part)
            .part("file", file_part);

        tracing::debug!("Uploading {} ({} bytes, {})", local_path.display(), file_size, mime_type);
        let response = self
            .http
            .post(format!("{}/files", self.upload_base))
            .bearer_auth(&token)
            .query(&[
                ("uploadType", "multipart"),
                ("supportsAllDrives", "true"),
                ("fields", FILE_FIELDS),
            ])
            .multipart(form)
            .send()
            .await?;

        let metadata: FileMetadata = check_response(response).await?.json().await?;
        Ok(metadata)
    }
}

#[async_trait]
impl DriveApi for DriveClient {
    async fn find_or_create_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<FolderResolution> {
        DriveClient::find_or_create_folder(self, name, parent_id).await
    }

    async fn upload_file(&self, local_path: &Path, parent_id: Option<&str>) -> Result<FileMetadata> {
        DriveClient::upload_file(self, local_path, parent_id).await
    }
}

/// Turn a non-success response into [`DriveError::ApiError`].
async fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_body = response.text().await.unwrap_or_default();
    if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&error_body) {
        return Err(DriveError::ApiError {
            status: api_error.error.code,
            message: api_error.error.message,
        });
    }
    Err(DriveError::ApiError {
        status: status.as_u16(),
        message: error_body,
    })
}

/// Escape a value for use inside a single-quoted Drive query string.
fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
