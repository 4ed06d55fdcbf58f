//! Cache configuration passed in by the hosting server.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default rescan interval for roots on local storage (10 minutes).
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Default rescan interval for externally-mounted roots (5 minutes).
/// External mounts change behind our back more often, so we rescan sooner.
pub const EXTERNAL_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Options for [`CacheService::initialize`](crate::service::CacheService::initialize).
///
/// All fields have defaults so the hosting server can deserialize a partial
/// config section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Location of the SQLite database file.
    pub db_path: PathBuf,
    /// Override for the periodic rescan interval, in milliseconds.
    pub sync_interval_ms: Option<u64>,
    /// When false the cache never initializes and every query reports
    /// not-ready, forcing callers onto the direct filesystem path.
    pub enabled: bool,
    /// Whether the source root is an external mount (NFS, SMB, USB...).
    /// Picks the shorter default rescan interval.
    pub external_mount: bool,
    /// Where thumbnails live. Defaults to a `.thumbnails` directory next
    /// to the source root.
    pub thumbnail_root: Option<PathBuf>,
    /// Number of background thumbnail workers.
    pub thumbnail_workers: usize,
    /// Capacity of the thumbnail job queue.
    pub thumbnail_queue: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        CacheOptions {
            db_path: PathBuf::from("filecache.db"),
            sync_interval_ms: None,
            enabled: true,
            external_mount: false,
            thumbnail_root: None,
            thumbnail_workers: 4,
            thumbnail_queue: 64,
        }
    }
}

impl CacheOptions {
    /// Effective rescan interval: the explicit override if set, otherwise
    /// the default for this kind of mount.
    pub fn sync_interval(&self) -> Duration {
        match self.sync_interval_ms {
            Some(ms) => Duration::from_millis(ms),
            None if self.external_mount => EXTERNAL_SYNC_INTERVAL,
            None => DEFAULT_SYNC_INTERVAL,
        }
    }
}
