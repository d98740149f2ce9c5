//! S3 data types returned by the transfer engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A file entry from a delimiter-scoped listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

impl FileEntry {
    /// Get the display name (last component of the key)
    pub fn display_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// Get a human-readable size string
    pub fn size_string(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;
        const TB: u64 = GB * 1024;

        if self.size >= TB {
            format!("{:.2} TB", self.size as f64 / TB as f64)
        } else if self.size >= GB {
            format!("{:.2} GB", self.size as f64 / GB as f64)
        } else if self.size >= MB {
            format!("{:.2} MB", self.size as f64 / MB as f64)
        } else if self.size >= KB {
            format!("{:.2} KB", self.size as f64 / KB as f64)
        } else {
            format!("{} B", self.size)
        }
    }
}

/// One level of the key hierarchy under a prefix
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingResult {
    pub prefix: String,
    /// Common prefixes, each ending in `/`
    pub folders: Vec<String>,
    /// Objects at this level; never folder markers, never the prefix itself
    pub files: Vec<FileEntry>,
}

/// Outcome of a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResult {
    pub key: String,
    pub size: u64,
}

/// Outcome of a successful download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResult {
    pub key: String,
    pub save_path: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteObjectResult {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFolderResult {
    /// Number of keys the store confirmed deleted
    pub deleted: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderResult {
    pub folder_key: String,
}

/// True if the key denotes an empty-directory marker
pub fn is_folder_marker(key: &str) -> bool {
    key.ends_with('/')
}

/// Build an object key from a prefix and file name.
///
/// The prefix is used verbatim; callers pass prefixes that already end in `/`.
pub fn object_key(prefix: &str, file_name: &str) -> String {
    if prefix.is_empty() {
        file_name.to_string()
    } else {
        format!("{}{}", prefix, file_name)
    }
}
