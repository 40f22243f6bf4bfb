//! Mirror a local file or directory tree into Google Drive folders.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{DriveError, Result};
use crate::models::{FileMetadata, FolderResolution};
use crate::target::UploadTarget;

/// The remote operations the uploader needs.
#[async_trait]
pub trait DriveApi: Send + Sync {
    /// Find a folder by exact name under a parent, creating it when absent.
    async fn find_or_create_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<FolderResolution>;

    /// Upload one local file into an optional parent folder.
    async fn upload_file(&self, local_path: &Path, parent_id: Option<&str>) -> Result<FileMetadata>;
}

/// Local directory → remote folder id, for one tree upload.
#[derive(Debug, Default)]
pub struct FolderMap {
    folders: HashMap<PathBuf, String>,
}

impl FolderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, local_dir: PathBuf, folder_id: String) {
        self.folders.insert(local_dir, folder_id);
    }

    pub fn get(&self, local_dir: &Path) -> Option<&str> {
        self.folders.get(local_dir).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.folders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }
}

/// Counts from a completed upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    /// Remote id of the uploaded file, or of the top-level folder.
    pub remote_id: Option<String>,
    /// Browser link, for single-file uploads.
    pub web_view_link: Option<String>,
    pub folders: usize,
    pub files: usize,
}

struct Entry {
    path: PathBuf,
    is_dir: bool,
}

/// Uploads files and directory trees one request at a time.
pub struct TreeUploader<'a, D: DriveApi> {
    drive: &'a D,
}

impl<'a, D: DriveApi> TreeUploader<'a, D> {
    pub fn new(drive: &'a D) -> Self {
        Self { drive }
    }

    /// Upload a file, or a whole tree if the target is a directory.
    pub async fn upload_path(&self, target: &UploadTarget) -> Result<UploadSummary> {
        let path = target.local_path();
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DriveError::PathNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(DriveError::io(path, e)),
        };

        if metadata.is_dir() {
            return self.upload_tree_into(path, target.parent_id()).await;
        }

        let file = self.upload_single(path, target.parent_id()).await?;
        Ok(UploadSummary {
            remote_id: Some(file.id),
            web_view_link: file.web_view_link,
            folders: 0,
            files: 1,
        })
    }

    /// Upload one file and report it.
    pub async fn upload_single(&self, path: &Path, parent_id: Option<&str>) -> Result<FileMetadata> {
        let file = self.drive.upload_file(path, parent_id).await?;
        println!("Uploaded '{}' ({})", file.name, file.id);
        Ok(file)
    }

    /// Mirror the directory `root` into a new or existing top-level folder.
    pub async fn upload_tree(&self, root: &Path) -> Result<UploadSummary> {
        self.upload_tree_into(root, None).await
    }

    /// Mirror the directory `root` into a folder under `parent_id`.
    ///
    /// Directories are visited before their contents, so every parent has a
    /// remote id by the time its children are uploaded. The first failure
    /// stops the walk.
    pub async fn upload_tree_into(&self, root: &Path, parent_id: Option<&str>) -> Result<UploadSummary> {
        let root = match tokio::fs::canonicalize(root).await {
            Ok(root) => root,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DriveError::PathNotFound(root.to_path_buf()))
            }
            Err(e) => return Err(DriveError::io(root, e)),
        };
        let metadata = tokio::fs::metadata(&root)
            .await
            .map_err(|e| DriveError::io(&root, e))?;
        if !metadata.is_dir() {
            return Err(DriveError::NotADirectory(root));
        }
        if root.file_name().is_none() {
            return Err(DriveError::Config(format!(
                "Cannot name a folder after {}",
                root.display()
            )));
        }

        let mut folders = FolderMap::new();
        let mut summary = UploadSummary::default();

        let root_id = self
            .resolve_folder(&root, parent_id)
            .await
            .map_err(|e| abort(&root, e))?;
        folders.insert(root.clone(), root_id.clone());
        summary.remote_id = Some(root_id);
        summary.folders += 1;

        // Stack of entries still to visit, next one on top.
        let mut pending = read_children(&root).await.map_err(|e| abort(&root, e))?;
        pending.reverse();

        while let Some(entry) = pending.pop() {
            let parent_id = entry
                .path
                .parent()
                .and_then(|parent| folders.get(parent))
                .map(str::to_string)
                .ok_or_else(|| DriveError::ParentNotFound(entry.path.clone()))?;

            if entry.is_dir {
                let folder_id = self
                    .resolve_folder(&entry.path, Some(parent_id.as_str()))
                    .await
                    .map_err(|e| abort(&entry.path, e))?;
                folders.insert(entry.path.clone(), folder_id);
                summary.folders += 1;

                let mut children = read_children(&entry.path)
                    .await
                    .map_err(|e| abort(&entry.path, e))?;
                children.reverse();
                pending.extend(children);
            } else {
                self.upload_single(&entry.path, Some(parent_id.as_str()))
                    .await
                    .map_err(|e| abort(&entry.path, e))?;
                summary.files += 1;
            }
        }

        tracing::info!(
            "Uploaded {} file(s) into {} folder(s) from {}",
            summary.files,
            folders.len(),
            root.display()
        );
        Ok(summary)
    }

    async fn resolve_folder(&self, dir: &Path, parent_id: Option<&str>) -> Result<String> {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| DriveError::Config(format!("Cannot name a folder after {}", dir.display())))?;

        let resolution = self.drive.find_or_create_folder(&name, parent_id).await?;
        let verb = if resolution.created { "Created" } else { "Found" };
        println!("{} folder '{}' ({})", verb, resolution.folder.name, resolution.folder.id);
        Ok(resolution.folder.id)
    }
}

fn abort(path: &Path, source: DriveError) -> DriveError {
    DriveError::WalkAborted {
        path: path.to_path_buf(),
        source: Box::new(source),
    }
}

/// Files and directories directly inside `dir`, sorted by name.
///
/// Symlinks and special files are skipped.
async fn read_children(dir: &Path) -> Result<Vec<Entry>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| DriveError::io(dir, e))?;
    let mut children = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(|e| DriveError::io(dir, e))? {
        let path = entry.path();
        let file_type = entry.file_type().await.map_err(|e| DriveError::io(&path, e))?;

        if file_type.is_dir() {
            children.push(Entry { path, is_dir: true });
        } else if file_type.is_file() {
            children.push(Entry { path, is_dir: false });
        } else {
            tracing::warn!("Skipping {}: not a regular file or directory", path.display());
        }
    }

    children.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    Ok(children)
}
