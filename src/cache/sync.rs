//! Full-rebuild orchestration and the periodic sync scheduler.
//!
//! A rebuild scans the source tree into a shadow table and atomically
//! swaps it in, so readers never see a partially-built cache. The
//! in-progress flag is advisory: the timer, manual triggers and direct
//! callers all go through [`SyncContext::rebuild`], which skips (rather
//! than queues) when a rebuild is already running.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::error::{CacheError, CacheResult};
use crate::thumbs::pipeline::ThumbnailPipeline;

use super::scanner::{FilesystemScanner, ScanTarget};
use super::store::MetadataStore;

/// Shared state needed by a full rebuild, owned behind an `Arc` so the
/// scheduler task and direct callers use the same guard flag.
pub struct SyncContext {
    pub store: Arc<MetadataStore>,
    pub scanner: FilesystemScanner,
    pub pipeline: Arc<ThumbnailPipeline>,
    in_progress: AtomicBool,
    scanned: Arc<AtomicU64>,
}

impl SyncContext {
    pub fn new(
        store: Arc<MetadataStore>,
        scanner: FilesystemScanner,
        pipeline: Arc<ThumbnailPipeline>,
    ) -> Self {
        SyncContext {
            store,
            scanner,
            pipeline,
            in_progress: AtomicBool::new(false),
            scanned: Arc::new(AtomicU64::new(0)),
        }
    }

    /// True while a full rebuild is running.
    pub fn is_rebuilding(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Entries recorded by the current (or last) scan, for status reporting.
    pub fn scan_progress(&self) -> u64 {
        self.scanned.load(Ordering::Relaxed)
    }

    /// Rebuild the cache from a full filesystem scan.
    ///
    /// Returns `Ok(false)` when another rebuild already holds the guard
    /// flag — the request is skipped, not queued.
    pub async fn rebuild(&self) -> CacheResult<bool> {
        if self.in_progress.swap(true, Ordering::SeqCst) {
            println!("⏭️  Cache rebuild already in progress, skipping");
            return Ok(false);
        }

        let result = self.rebuild_inner().await;
        self.in_progress.store(false, Ordering::SeqCst);
        result.map(|_| true)
    }

    async fn rebuild_inner(&self) -> CacheResult<()> {
        self.scanned.store(0, Ordering::Relaxed);
        self.store.begin_shadow()?;

        let store = Arc::clone(&self.store);
        let scanner = self.scanner.clone();
        let progress = Arc::clone(&self.scanned);
        let scan = tokio::task::spawn_blocking(move || {
            scanner.scan(&store, ScanTarget::Shadow, &progress)
        })
        .await;

        let scanned = match scan {
            Ok(Ok(count)) => count,
            Ok(Err(err)) => {
                let _ = self.store.discard_shadow();
                return Err(err);
            }
            Err(join_err) => {
                let _ = self.store.discard_shadow();
                return Err(CacheError::TaskJoin(join_err.to_string()));
            }
        };

        self.store.commit_shadow()?;
        println!("✅ Cache rebuild complete: {} entries", scanned);
        Ok(())
    }
}

/// One scheduler tick: rebuild, and on success reconcile thumbnails.
async fn run_tick(ctx: Arc<SyncContext>) {
    match ctx.rebuild().await {
        Ok(true) => {
            let pipeline = Arc::clone(&ctx.pipeline);
            if let Err(err) = tokio::task::spawn_blocking(move || pipeline.sync_thumbnails()).await
            {
                eprintln!("❌ Thumbnail reconciliation task failed: {}", err);
            }
        }
        Ok(false) => {}
        Err(err) => eprintln!("❌ Periodic cache rebuild failed: {}", err),
    }
}

/// Periodic timer driving full rebuilds.
pub struct SyncScheduler {
    task: Option<JoinHandle<()>>,
}

impl SyncScheduler {
    pub fn new() -> Self {
        SyncScheduler { task: None }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Start the timer. Re-entrant calls while running are ignored.
    ///
    /// Each tick runs in its own task, so stopping the timer never
    /// interrupts a rebuild that is already underway; the guard flag in
    /// `ctx` prevents ticks from overlapping an unfinished rebuild.
    pub fn start(&mut self, ctx: Arc<SyncContext>, period: Duration) {
        if self.task.is_some() {
            return;
        }
        println!("⏱️  Periodic cache sync every {:?}", period);
        self.task = Some(tokio::spawn(async move {
            let mut timer = tokio::time::interval(period);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; consume it so the
            // first rebuild happens one full period after start.
            timer.tick().await;
            loop {
                timer.tick().await;
                tokio::spawn(run_tick(Arc::clone(&ctx)));
            }
        }));
    }

    /// Cancel the timer. An in-flight rebuild keeps running to completion.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Default for SyncScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
