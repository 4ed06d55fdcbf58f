//! Thumbnail module
//!
//! This module handles derived image previews:
//! - Generating, moving and deleting mirrored thumbnails (pipeline.rs)
//! - The bounded background worker pool (worker.rs)

pub mod pipeline;
pub mod worker;
