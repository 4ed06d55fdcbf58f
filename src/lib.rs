//! Metadata cache and thumbnail pipeline for a web-exposed file store.
//!
//! Listings, searches and storage totals over a large directory tree are
//! too slow to answer with a recursive walk, so the hosting server keeps
//! this cache: a SQLite mirror of the tree's metadata, updated
//! incrementally on every mutation and rebuilt from scratch on a timer as
//! a defense against drift. Image thumbnails track the same tree in a
//! mirrored directory and are reconciled by the same timer.
//!
//! Entry point is [`service::CacheService`]; the HTTP layer, auth and
//! upload handling live in the hosting server, not here.

pub mod cache;
pub mod config;
pub mod error;
pub mod paths;
pub mod service;
pub mod thumbs;

pub use cache::access::AccessLevelResolver;
pub use cache::record::{
    AccessLevel, FileListing, FileRecord, FileStats, GenerateReport, SearchResults, StorageInfo,
    SweepReport,
};
pub use cache::scanner::{FilesystemScanner, ScanTarget};
pub use cache::store::MetadataStore;
pub use cache::sync::{SyncContext, SyncScheduler};
pub use config::CacheOptions;
pub use error::{CacheError, CacheResult};
pub use service::CacheService;
pub use thumbs::pipeline::{ThumbnailPipeline, ThumbnailStatus};
pub use thumbs::worker::{JobFailure, ThumbnailJob, ThumbnailWorkers};
