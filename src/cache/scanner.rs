//! Depth-first filesystem scanner feeding the metadata store.
//!
//! The walk is an explicit worklist rather than recursion, so call-stack
//! depth is bounded no matter how deep the tree is. Each directory's
//! children are flushed as one batch before descending, keeping memory
//! proportional to a single directory's fan-out.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::CacheResult;
use crate::paths;

use super::record::FileStats;
use super::store::MetadataStore;

/// Which table a full scan writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanTarget {
    /// The live `files` table (incremental use).
    Live,
    /// The shadow table built during an atomic rebuild.
    Shadow,
}

#[derive(Debug, Clone)]
pub struct FilesystemScanner {
    root: PathBuf,
}

impl FilesystemScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FilesystemScanner { root: root.into() }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Walk the whole tree, writing one batch per directory into the store.
    ///
    /// Symbolic links are skipped entirely (not followed, not recorded).
    /// A per-entry stat failure is logged and the entry omitted; the scan
    /// itself never fails because of one unreadable file. `progress` is
    /// bumped as entries are recorded so callers can report a running count.
    pub fn scan(
        &self,
        store: &MetadataStore,
        target: ScanTarget,
        progress: &AtomicU64,
    ) -> CacheResult<u64> {
        let mut pending: VecDeque<(PathBuf, String)> = VecDeque::new();
        pending.push_back((self.root.clone(), String::new()));
        let mut scanned: u64 = 0;

        while let Some((dir, rel)) = pending.pop_front() {
            let batch = match self.collect_children(&dir, &rel) {
                Ok(batch) => batch,
                Err(err) => {
                    // One unreadable directory doesn't abort the scan.
                    eprintln!("⚠️  Skipping unreadable directory {}: {}", dir.display(), err);
                    continue;
                }
            };

            for (child_rel, stats) in &batch {
                if stats.is_directory {
                    pending.push_back((self.root.join(child_rel), child_rel.clone()));
                }
            }

            if !batch.is_empty() {
                match target {
                    ScanTarget::Live => store.add_files(&batch)?,
                    ScanTarget::Shadow => store.add_files_shadow(&batch)?,
                }
                scanned += batch.len() as u64;
                progress.fetch_add(batch.len() as u64, Ordering::Relaxed);
            }
        }

        Ok(scanned)
    }

    /// Stat the direct children of one directory.
    ///
    /// This is also the incremental path: a single-directory resync calls
    /// it directly and diffs the result against the cached children.
    pub fn collect_children(
        &self,
        dir: &PathBuf,
        rel: &str,
    ) -> std::io::Result<Vec<(String, FileStats)>> {
        let mut batch = Vec::new();

        for entry in std::fs::read_dir(dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    eprintln!("⚠️  Skipping unreadable entry in {}: {}", dir.display(), err);
                    continue;
                }
            };

            // file_type() does not follow symlinks; links are dropped here.
            let file_type = match entry.file_type() {
                Ok(ft) => ft,
                Err(err) => {
                    eprintln!("⚠️  Failed to stat {:?}: {}", entry.path(), err);
                    continue;
                }
            };
            if file_type.is_symlink() {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(meta) => meta,
                Err(err) => {
                    eprintln!("⚠️  Failed to stat {:?}: {}", entry.path(), err);
                    continue;
                }
            };

            let name = entry.file_name().to_string_lossy().to_string();
            batch.push((paths::join(rel, &name), FileStats::from_metadata(&metadata)));
        }

        Ok(batch)
    }
}
