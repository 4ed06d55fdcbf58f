//! CacheService wires the metadata store, scanner, scheduler and thumbnail
//! pipeline together and exposes the surface the hosting server calls.
//!
//! Initialization failure is deliberately non-fatal: the service comes up
//! not-ready and every query returns [`CacheError::NotReady`], which the
//! server treats as "walk the filesystem directly instead".

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::cache::access::AccessLevelResolver;
use crate::cache::record::{
    AccessLevel, FileListing, FileRecord, FileStats, SearchResults, StorageInfo, SweepReport,
};
use crate::cache::scanner::FilesystemScanner;
use crate::cache::store::MetadataStore;
use crate::cache::sync::{SyncContext, SyncScheduler};
use crate::config::CacheOptions;
use crate::error::{CacheError, CacheResult};
use crate::paths;
use crate::thumbs::pipeline::{ThumbnailPipeline, ThumbnailStatus};
use crate::thumbs::worker::{JobFailure, ThumbnailJob, ThumbnailWorkers};

pub struct CacheService {
    root: PathBuf,
    options: CacheOptions,
    ctx: Option<Arc<SyncContext>>,
    pipeline: Arc<ThumbnailPipeline>,
    scheduler: SyncScheduler,
    workers: ThumbnailWorkers,
    failures: Option<UnboundedReceiver<JobFailure>>,
}

impl CacheService {
    /// Bring the cache up for `root_dir`. Must be called inside a tokio
    /// runtime (the thumbnail workers are spawned here).
    ///
    /// A database that cannot be opened, or `enabled: false`, yields a
    /// service that reports not-ready instead of an error.
    pub fn initialize(root_dir: impl Into<PathBuf>, options: CacheOptions) -> Self {
        let root = root_dir.into();
        let pipeline = Arc::new(ThumbnailPipeline::new(
            root.clone(),
            options.thumbnail_root.clone(),
        ));
        let (workers, failures) = ThumbnailWorkers::spawn(
            Arc::clone(&pipeline),
            options.thumbnail_workers,
            options.thumbnail_queue,
        );

        let ctx = if options.enabled {
            match MetadataStore::open(&options.db_path) {
                Ok(store) => Some(Arc::new(SyncContext::new(
                    Arc::new(store),
                    FilesystemScanner::new(root.clone()),
                    Arc::clone(&pipeline),
                ))),
                Err(err) => {
                    eprintln!(
                        "❌ Metadata cache unavailable ({}), queries fall back to the filesystem",
                        err
                    );
                    None
                }
            }
        } else {
            println!("ℹ️  Metadata cache disabled by configuration");
            None
        };

        CacheService {
            root,
            options,
            ctx,
            pipeline,
            scheduler: SyncScheduler::new(),
            workers,
            failures: Some(failures),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ctx.is_some()
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn store(&self) -> CacheResult<&Arc<MetadataStore>> {
        self.ctx
            .as_ref()
            .map(|ctx| &ctx.store)
            .ok_or(CacheError::NotReady)
    }

    fn ctx(&self) -> CacheResult<&Arc<SyncContext>> {
        self.ctx.as_ref().ok_or(CacheError::NotReady)
    }

    // ---- query surface ---------------------------------------------------

    pub fn get_files(
        &self,
        parent_path: &str,
        page: usize,
        limit: usize,
        show_hidden: bool,
    ) -> CacheResult<FileListing> {
        self.store()?.get_files(parent_path, page, limit, show_hidden)
    }

    pub fn search_files(
        &self,
        query: &str,
        use_regex: bool,
        page: usize,
        limit: usize,
        show_hidden: bool,
    ) -> CacheResult<Option<SearchResults>> {
        self.store()?
            .search_files(query, use_regex, page, limit, show_hidden)
    }

    pub fn get_storage_info(&self) -> CacheResult<StorageInfo> {
        self.store()?.storage_info()
    }

    pub fn get_file_info(&self, path: &str) -> CacheResult<Option<FileRecord>> {
        self.store()?.get_file_info(path)
    }

    /// Effective visibility of `path`: private if the record or any
    /// ancestor directory record is private. Missing records fail open to
    /// public (see [`AccessLevelResolver`]).
    pub fn get_access_level(&self, path: &str) -> CacheResult<AccessLevel> {
        AccessLevelResolver::new(self.store()?).resolve(path)
    }

    /// Set the stored access level of a record. The level string is
    /// validated before any write; returns false when the path is not
    /// cached.
    pub fn update_access_level(&self, path: &str, level: &str) -> CacheResult<bool> {
        let level = AccessLevel::parse(level)?;
        self.store()?.update_access_level(path, level)
    }

    // ---- incremental mutations -------------------------------------------

    /// Record a single created/updated entry and, for images, enqueue
    /// thumbnail generation in the background.
    pub fn add_file(
        &self,
        path: &str,
        stats: FileStats,
        access_level: AccessLevel,
    ) -> CacheResult<()> {
        self.store()?.add_file(path, stats, access_level)?;
        if !stats.is_directory {
            let rel = paths::normalize(path);
            if ThumbnailPipeline::is_image_file(paths::file_name(&rel)) {
                self.workers.try_submit(ThumbnailJob::Generate(rel));
            }
        }
        Ok(())
    }

    pub fn add_files(&self, batch: &[(String, FileStats)]) -> CacheResult<()> {
        self.store()?.add_files(batch)
    }

    /// Drop a path (cascading to descendants) and queue removal of its
    /// thumbnail mirror. Returns the number of cache records removed.
    pub fn delete_file(&self, path: &str) -> CacheResult<usize> {
        let store = self.store()?;
        let record = store.get_file_info(path)?;
        let removed = store.delete_file(path)?;

        let rel = paths::normalize(path);
        let is_directory = match &record {
            Some(record) => record.is_directory,
            // Unknown path: guess from the name so stale mirrors still go.
            None => !ThumbnailPipeline::is_image_file(paths::file_name(&rel)),
        };
        if is_directory {
            self.workers.try_submit(ThumbnailJob::DeleteDirectory(rel));
        } else {
            self.workers.try_submit(ThumbnailJob::Delete(rel));
        }
        Ok(removed)
    }

    /// Rename a path (cascading to descendants) and queue the matching
    /// thumbnail move.
    pub fn rename_file(&self, old_path: &str, new_path: &str) -> CacheResult<()> {
        let store = self.store()?;
        let record = store.get_file_info(old_path)?;
        store.rename_file(old_path, new_path)?;

        let old = paths::normalize(old_path);
        let new = paths::normalize(new_path);
        let is_directory = match &record {
            Some(record) => record.is_directory,
            None => !ThumbnailPipeline::is_image_file(paths::file_name(&old)),
        };
        if is_directory {
            self.workers
                .try_submit(ThumbnailJob::RenameDirectory(old, new));
        } else {
            self.workers.try_submit(ThumbnailJob::Rename(old, new));
        }
        Ok(())
    }

    /// Rescan one directory's direct children: upsert what's on disk and
    /// cascade-delete cached children that vanished. Returns how many
    /// entries were upserted.
    pub fn sync_directory(&self, path: &str) -> CacheResult<usize> {
        let ctx = self.ctx()?;
        let rel = paths::normalize(path);
        let dir = if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(&rel)
        };

        let batch = ctx.scanner.collect_children(&dir, &rel)?;
        ctx.store.add_files(&batch)?;

        let present: std::collections::HashSet<&str> =
            batch.iter().map(|(path, _)| path.as_str()).collect();
        for (cached, _) in ctx.store.children_paths(&rel)? {
            if !present.contains(cached.as_str()) {
                ctx.store.delete_file(&cached)?;
            }
        }

        Ok(batch.len())
    }

    // ---- full rebuilds ---------------------------------------------------

    /// Full rescan into a shadow table with an atomic swap. Honors the
    /// advisory in-progress flag: `Ok(false)` means another rebuild was
    /// already running and this request was skipped.
    pub async fn rebuild_cache(&self) -> CacheResult<bool> {
        self.ctx()?.rebuild().await
    }

    pub fn is_rebuilding(&self) -> bool {
        self.ctx.as_ref().map(|c| c.is_rebuilding()).unwrap_or(false)
    }

    /// Running count of entries recorded by the current or last scan.
    pub fn scan_progress(&self) -> u64 {
        self.ctx.as_ref().map(|c| c.scan_progress()).unwrap_or(0)
    }

    pub fn last_full_sync(&self) -> CacheResult<Option<i64>> {
        self.store()?.last_full_sync()
    }

    pub fn start_periodic_sync(&mut self) {
        let interval = self.options.sync_interval();
        if let Some(ctx) = &self.ctx {
            self.scheduler.start(Arc::clone(ctx), interval);
        }
    }

    pub fn stop_periodic_sync(&mut self) {
        self.scheduler.stop();
    }

    // ---- thumbnails ------------------------------------------------------

    /// Direct access to the pipeline for synchronous path/URL derivation.
    pub fn thumbnails(&self) -> &Arc<ThumbnailPipeline> {
        &self.pipeline
    }

    /// Enqueue a thumbnail job on the bounded worker pool. False when the
    /// queue is full; the periodic reconciliation pass will catch up.
    pub fn queue_thumbnail(&self, job: ThumbnailJob) -> bool {
        self.workers.try_submit(job)
    }

    /// Take the thumbnail failure channel (once); callers that don't are
    /// still covered by the worker's own logging.
    pub fn take_thumbnail_failures(&mut self) -> Option<UnboundedReceiver<JobFailure>> {
        self.failures.take()
    }

    /// Run a full thumbnail reconciliation off the async runtime.
    pub async fn sync_thumbnails(&self) -> CacheResult<SweepReport> {
        let pipeline = Arc::clone(&self.pipeline);
        tokio::task::spawn_blocking(move || pipeline.sync_thumbnails())
            .await
            .map_err(|err| CacheError::TaskJoin(err.to_string()))
    }

    pub fn thumbnail_status(&self) -> ThumbnailStatus {
        self.pipeline.status()
    }

    /// Stop the scheduler, drain the thumbnail workers and close the
    /// database. Idempotent.
    pub async fn close(&mut self) {
        self.scheduler.stop();
        self.workers.shutdown().await;
        if let Some(ctx) = &self.ctx {
            ctx.store.close();
        }
    }
}

impl std::fmt::Debug for CacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheService")
            .field("root", &self.root)
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn options(dir: &tempfile::TempDir) -> CacheOptions {
        CacheOptions {
            db_path: dir.path().join("meta/cache.db"),
            thumbnail_root: Some(dir.path().join("thumbs")),
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn disabled_cache_reports_not_ready() {
        let dir = tempdir().unwrap();
        let opts = CacheOptions {
            enabled: false,
            ..options(&dir)
        };
        let mut service = CacheService::initialize(dir.path().join("files"), opts);

        assert!(!service.is_ready());
        assert!(matches!(
            service.get_files("", 1, 10, false),
            Err(CacheError::NotReady)
        ));
        assert!(matches!(
            service.get_storage_info(),
            Err(CacheError::NotReady)
        ));
        service.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sync_directory_upserts_and_drops_vanished_entries() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("files");
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("a.txt"), b"aa").unwrap();
        fs::write(root.join("b.txt"), b"bb").unwrap();

        let mut service = CacheService::initialize(&root, options(&dir));
        assert!(service.is_ready());

        assert_eq!(service.sync_directory("").unwrap(), 3);
        assert!(service.get_file_info("a.txt").unwrap().is_some());

        fs::remove_file(root.join("b.txt")).unwrap();
        assert_eq!(service.sync_directory("").unwrap(), 2);
        assert!(service.get_file_info("b.txt").unwrap().is_none());
        assert!(service.get_file_info("sub").unwrap().is_some());
        service.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rebuild_then_query_round_trip() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("files");
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::write(root.join("docs/report.txt"), b"hello").unwrap();

        let mut service = CacheService::initialize(&root, options(&dir));
        assert!(service.rebuild_cache().await.unwrap());

        let listing = service.get_files("docs", 1, 50, false).unwrap();
        assert_eq!(listing.total, 1);
        assert_eq!(listing.items[0].name, "report.txt");
        assert_eq!(listing.items[0].size, 5);
        assert!(service.last_full_sync().unwrap().is_some());
        service.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn access_level_validation_and_inheritance() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("files");
        fs::create_dir_all(root.join("secret/sub")).unwrap();
        fs::write(root.join("secret/sub/file.txt"), b"x").unwrap();

        let mut service = CacheService::initialize(&root, options(&dir));
        service.rebuild_cache().await.unwrap();

        assert!(matches!(
            service.update_access_level("secret", "sekrit"),
            Err(CacheError::InvalidAccessLevel(_))
        ));
        assert!(service.update_access_level("secret", "private").unwrap());
        assert_eq!(
            service.get_access_level("secret/sub/file.txt").unwrap(),
            AccessLevel::Private
        );
        // Uncached paths fail open.
        assert_eq!(
            service.get_access_level("elsewhere.txt").unwrap(),
            AccessLevel::Public
        );
        service.close().await;
    }
}
