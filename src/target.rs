//! Upload targets: a local path plus an optional destination folder.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{DriveError, Result};

/// Folder links as copied from the Drive web UI.
static FOLDER_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https?://drive\.google\.com/(?:drive/(?:u/\d+/)?folders/|open\?id=)([a-zA-Z0-9_-]+)",
    )
    .expect("Invalid folder URL regex")
});

static ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("Invalid ID regex"));

/// A local file or directory and the remote folder it goes into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub local_path: PathBuf,
    pub parent_id: Option<String>,
}

impl UploadTarget {
    /// Upload into My Drive's root.
    pub fn new(local_path: impl Into<PathBuf>) -> Self {
        Self {
            local_path: local_path.into(),
            parent_id: None,
        }
    }

    /// Upload into the folder named by an ID or a Drive folder URL.
    pub fn with_parent(mut self, folder: &str) -> Result<Self> {
        self.parent_id = Some(parse_folder_ref(folder)?);
        Ok(self)
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }
}

/// Extract a folder ID from a Drive folder URL, or validate a raw ID.
///
/// ```
/// use drive_uploader::target::parse_folder_ref;
///
/// let id = parse_folder_ref("https://drive.google.com/drive/u/0/folders/1abc").unwrap();
/// assert_eq!(id, "1abc");
/// assert_eq!(parse_folder_ref("1abc").unwrap(), "1abc");
/// ```
pub fn parse_folder_ref(folder: &str) -> Result<String> {
    let trimmed = folder.trim();

    if let Some(id) = FOLDER_URL_REGEX
        .captures(trimmed)
        .and_then(|captures| captures.get(1))
    {
        return Ok(id.as_str().to_string());
    }

    if ID_REGEX.is_match(trimmed) {
        return Ok(trimmed.to_string());
    }

    Err(DriveError::InvalidFolderRef(folder.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_urls() {
        assert_eq!(
            parse_folder_ref("https://drive.google.com/drive/folders/1abc-_XYZ?usp=sharing").unwrap(),
            "1abc-_XYZ"
        );
        assert_eq!(
            parse_folder_ref("http://drive.google.com/drive/u/2/folders/1abc").unwrap(),
            "1abc"
        );
        assert_eq!(
            parse_folder_ref("https://drive.google.com/open?id=1abc").unwrap(),
            "1abc"
        );
    }

    #[test]
    fn test_raw_id() {
        assert_eq!(parse_folder_ref("  1abc_DEF-2 ").unwrap(), "1abc_DEF-2");
    }

    #[test]
    fn test_rejects_other_input() {
        assert!(matches!(
            parse_folder_ref("https://example.com/folders/1abc"),
            Err(DriveError::InvalidFolderRef(_))
        ));
        assert!(parse_folder_ref("").is_err());
        assert!(parse_folder_ref("has spaces").is_err());
    }

    #[test]
    fn test_target_with_parent() {
        let target = UploadTarget::new("notes.txt")
            .with_parent("https://drive.google.com/drive/folders/1xyz")
            .unwrap();

        assert_eq!(target.local_path(), Path::new("notes.txt"));
        assert_eq!(target.parent_id(), Some("1xyz"));
        assert_eq!(UploadTarget::new("notes.txt").parent_id(), None);
    }
}
