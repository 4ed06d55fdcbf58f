//! Shared data structures for the metadata cache.
//!
//! These structs represent the data model that flows between the database
//! layer and the hosting server's API layer.

use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::time::UNIX_EPOCH;

/// Visibility of a cached entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Public,
    Private,
}

impl Default for AccessLevel {
    fn default() -> Self {
        AccessLevel::Public
    }
}

impl AccessLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessLevel::Public => "public",
            AccessLevel::Private => "private",
        }
    }

    /// Parse a caller-supplied level. Anything other than "public" or
    /// "private" is a validation failure.
    pub fn parse(value: &str) -> Result<Self, CacheError> {
        match value {
            "public" => Ok(AccessLevel::Public),
            "private" => Ok(AccessLevel::Private),
            other => Err(CacheError::InvalidAccessLevel(other.to_string())),
        }
    }

    /// Lenient parse for values read back from the database.
    /// Unknown values fall open to public.
    pub(crate) fn from_db(value: &str) -> Self {
        match value {
            "private" => AccessLevel::Private,
            _ => AccessLevel::Public,
        }
    }
}

/// One cached filesystem entry. Primary key is `path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Normalized relative path (e.g. "photos/2024/img.jpg").
    pub path: String,
    /// Base name only (e.g. "img.jpg").
    pub name: String,
    /// Path of the containing directory; "" for top-level entries.
    pub parent_path: String,
    /// Size in bytes; 0 for directories.
    pub size: i64,
    /// Modification time, unix seconds.
    pub modified: i64,
    /// Creation time, unix seconds.
    pub created: i64,
    pub is_directory: bool,
    /// When this record was last written, unix seconds.
    pub last_synced: i64,
    pub access_level: AccessLevel,
}

/// The stat half of a record, collected by the scanner or by the caller
/// after a single filesystem mutation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FileStats {
    pub size: i64,
    pub modified: i64,
    pub created: i64,
    pub is_directory: bool,
}

impl FileStats {
    /// Build stats from filesystem metadata.
    ///
    /// Filesystems without creation-time support fall back to the
    /// modification time.
    pub fn from_metadata(meta: &Metadata) -> Self {
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let created = meta
            .created()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(modified);

        FileStats {
            size: if meta.is_dir() { 0 } else { meta.len() as i64 },
            modified,
            created,
            is_directory: meta.is_dir(),
        }
    }
}

/// One page of directory children plus the unpaginated total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileListing {
    pub items: Vec<FileRecord>,
    pub total: i64,
}

/// One page of name-search hits plus the unpaginated total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    pub results: Vec<FileRecord>,
    pub total: i64,
}

/// Whole-table storage aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageInfo {
    pub total_size: i64,
    pub file_count: i64,
    pub folder_count: i64,
}

/// Outcome of a bulk thumbnail generation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateReport {
    pub generated: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Outcome of a full thumbnail reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub generated: u64,
    pub deleted: u64,
    pub failed: u64,
}
