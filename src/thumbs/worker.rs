//! Bounded background workers for thumbnail maintenance.
//!
//! Incremental mutations (uploads, deletes, renames) enqueue jobs here so
//! the triggering request never waits on image encoding, while a burst of
//! uploads cannot spawn unbounded work. Failures are reported on an
//! explicit channel instead of disappearing.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use super::pipeline::ThumbnailPipeline;

/// One unit of thumbnail maintenance. Paths are source-relative.
#[derive(Debug, Clone)]
pub enum ThumbnailJob {
    Generate(String),
    Delete(String),
    DeleteDirectory(String),
    Rename(String, String),
    RenameDirectory(String, String),
}

/// A job that didn't complete, delivered on the failure channel.
#[derive(Debug, Clone)]
pub struct JobFailure {
    pub job: ThumbnailJob,
    pub reason: String,
}

pub struct ThumbnailWorkers {
    tx: Option<mpsc::Sender<ThumbnailJob>>,
    handles: Vec<JoinHandle<()>>,
}

impl ThumbnailWorkers {
    /// Spawn `workers` tasks draining a queue of `queue_size` jobs.
    ///
    /// Returns the pool and the receiving end of the failure channel; the
    /// owner decides whether to log, surface, or ignore failures.
    pub fn spawn(
        pipeline: Arc<ThumbnailPipeline>,
        workers: usize,
        queue_size: usize,
    ) -> (Self, mpsc::UnboundedReceiver<JobFailure>) {
        let (tx, rx) = mpsc::channel::<ThumbnailJob>(queue_size.max(1));
        let (failure_tx, failure_rx) = mpsc::unbounded_channel();
        let rx = Arc::new(Mutex::new(rx));

        let mut handles = Vec::with_capacity(workers.max(1));
        for _ in 0..workers.max(1) {
            let rx = Arc::clone(&rx);
            let pipeline = Arc::clone(&pipeline);
            let failure_tx = failure_tx.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    // Hold the lock only while waiting for the next job.
                    let job = { rx.lock().await.recv().await };
                    let job = match job {
                        Some(job) => job,
                        None => break,
                    };

                    let pipeline = Arc::clone(&pipeline);
                    let blocking_job = job.clone();
                    let outcome = tokio::task::spawn_blocking(move || {
                        run_job(&pipeline, &blocking_job)
                    })
                    .await;

                    let result = match outcome {
                        Ok(result) => result,
                        Err(join_err) => Err(format!("worker task panicked: {}", join_err)),
                    };
                    if let Err(reason) = result {
                        eprintln!("❌ Thumbnail job failed: {}", reason);
                        let _ = failure_tx.send(JobFailure { job, reason });
                    }
                }
            }));
        }

        (
            ThumbnailWorkers {
                tx: Some(tx),
                handles,
            },
            failure_rx,
        )
    }

    /// Enqueue without waiting. Returns false when the queue is full or
    /// the pool is shut down — the caller can fall back to doing nothing;
    /// the periodic reconciliation pass will catch up.
    pub fn try_submit(&self, job: ThumbnailJob) -> bool {
        match &self.tx {
            Some(tx) => tx.try_send(job).is_ok(),
            None => false,
        }
    }

    /// Enqueue, waiting for queue space. Returns false after shutdown.
    pub async fn submit(&self, job: ThumbnailJob) -> bool {
        match &self.tx {
            Some(tx) => tx.send(job).await.is_ok(),
            None => false,
        }
    }

    /// Close the queue and wait for in-flight jobs to finish.
    pub async fn shutdown(&mut self) {
        self.tx.take();
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
    }
}

fn run_job(pipeline: &ThumbnailPipeline, job: &ThumbnailJob) -> Result<(), String> {
    match job {
        ThumbnailJob::Generate(path) => {
            // Non-images are a silent skip; a failed image is a failure.
            if ThumbnailPipeline::is_image_file(crate::paths::file_name(path))
                && !pipeline.generate_thumbnail(path)
            {
                return Err(format!("failed to generate thumbnail for {}", path));
            }
            Ok(())
        }
        ThumbnailJob::Delete(path) => {
            pipeline.delete_thumbnail(path);
            Ok(())
        }
        ThumbnailJob::DeleteDirectory(path) => {
            pipeline.delete_thumbnail_directory(path);
            Ok(())
        }
        ThumbnailJob::Rename(old, new) => {
            pipeline.rename_thumbnail(old, new);
            Ok(())
        }
        ThumbnailJob::RenameDirectory(old, new) => {
            pipeline.rename_thumbnail_directory(old, new);
            Ok(())
        }
    }
}
