//! Thumbnail generation and reconciliation.
//!
//! Thumbnails live in a directory tree mirroring the source tree, with the
//! original extension replaced by a single canonical extension (webp).
//! Existence on disk is the only state; orphans are found by comparing the
//! two trees.

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::cache::record::{GenerateReport, SweepReport};
use crate::paths;

/// Bounding box for generated thumbnails (longest side, aspect preserved).
const THUMBNAIL_SIZE: u32 = 300;

/// Canonical output extension.
const THUMBNAIL_EXT: &str = "webp";

/// Extensions treated as images, lowercase.
const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "gif", "webp", "tiff", "tif", "bmp"];

/// Snapshot of the pipeline for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ThumbnailStatus {
    pub source_root: String,
    pub thumbnail_root: String,
    pub thumbnail_count: u64,
}

#[derive(Debug, Clone)]
pub struct ThumbnailPipeline {
    source_root: PathBuf,
    thumb_root: PathBuf,
}

impl ThumbnailPipeline {
    /// Create a pipeline for `source_root`.
    ///
    /// Without an explicit `thumbnail_root`, thumbnails go to a
    /// `.thumbnails` directory next to the source root, created lazily on
    /// first write.
    pub fn new(source_root: impl Into<PathBuf>, thumbnail_root: Option<PathBuf>) -> Self {
        let source_root = source_root.into();
        let thumb_root = thumbnail_root.unwrap_or_else(|| match source_root.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.join(".thumbnails"),
            _ => source_root.join(".thumbnails"),
        });
        ThumbnailPipeline {
            source_root,
            thumb_root,
        }
    }

    /// Root of the thumbnail tree (getThumbnailBasePath).
    pub fn base_path(&self) -> &Path {
        &self.thumb_root
    }

    /// Extension-based image classification against the fixed allow-list.
    pub fn is_image_file(name: &str) -> bool {
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
            }
            _ => false,
        }
    }

    /// Mirrored relative path of the thumbnail for a source image;
    /// `None` for non-images.
    pub fn thumbnail_rel_path(&self, rel: &str) -> Option<String> {
        let rel = paths::normalize(rel);
        let name = paths::file_name(&rel);
        if !Self::is_image_file(name) {
            return None;
        }
        let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
        Some(paths::join(
            paths::parent(&rel),
            &format!("{}.{}", stem, THUMBNAIL_EXT),
        ))
    }

    /// Absolute path of the thumbnail for a source image.
    pub fn thumbnail_full_path(&self, rel: &str) -> Option<PathBuf> {
        Some(self.thumb_root.join(self.thumbnail_rel_path(rel)?))
    }

    /// URL path the web layer serves the thumbnail under.
    pub fn thumbnail_url(&self, rel: &str) -> Option<String> {
        Some(format!("/thumbnails/{}", self.thumbnail_rel_path(rel)?))
    }

    pub fn thumbnail_exists(&self, rel: &str) -> bool {
        self.thumbnail_full_path(rel)
            .map(|p| p.is_file())
            .unwrap_or(false)
    }

    /// Generate the thumbnail for one source image.
    ///
    /// Resizes to fit within the bounding box (never upscaling) and
    /// re-encodes to webp, creating intermediate directories as needed.
    /// Returns false — not an error — for non-images and decode/encode
    /// failures.
    pub fn generate_thumbnail(&self, rel: &str) -> bool {
        let target = match self.thumbnail_full_path(rel) {
            Some(target) => target,
            None => return false,
        };
        let source = self.source_root.join(paths::normalize(rel));

        let img = match image::open(&source) {
            Ok(img) => img,
            Err(err) => {
                eprintln!("❌ Failed to decode {}: {}", source.display(), err);
                return false;
            }
        };

        // Fit within the box, but never upscale small images.
        let resized = if img.width() > THUMBNAIL_SIZE || img.height() > THUMBNAIL_SIZE {
            img.resize(THUMBNAIL_SIZE, THUMBNAIL_SIZE, FilterType::Lanczos3)
        } else {
            img
        };
        // The webp encoder wants RGB/RGBA input.
        let resized = DynamicImage::ImageRgba8(resized.to_rgba8());

        if let Some(parent) = target.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                eprintln!("❌ Failed to create {}: {}", parent.display(), err);
                return false;
            }
        }

        match resized.save_with_format(&target, ImageFormat::WebP) {
            Ok(()) => true,
            Err(err) => {
                eprintln!("❌ Failed to encode {}: {}", target.display(), err);
                // Don't leave a truncated file behind.
                let _ = fs::remove_file(&target);
                false
            }
        }
    }

    /// Remove the thumbnail mirroring a deleted source file, then prune
    /// now-empty directories up to the thumbnail root.
    pub fn delete_thumbnail(&self, rel: &str) -> bool {
        let target = match self.thumbnail_full_path(rel) {
            Some(target) => target,
            None => return false,
        };
        if !target.is_file() {
            return false;
        }
        if let Err(err) = fs::remove_file(&target) {
            eprintln!("❌ Failed to delete {}: {}", target.display(), err);
            return false;
        }
        if let Some(parent) = target.parent() {
            self.cleanup_empty_dirs(parent);
        }
        true
    }

    /// Remove the mirrored subtree for a deleted source directory.
    pub fn delete_thumbnail_directory(&self, rel: &str) -> bool {
        let rel = paths::normalize(rel);
        if rel.is_empty() {
            // Never delete the thumbnail root itself.
            return false;
        }
        let target = self.thumb_root.join(&rel);
        if !target.is_dir() {
            return false;
        }
        if let Err(err) = fs::remove_dir_all(&target) {
            eprintln!("❌ Failed to delete {}: {}", target.display(), err);
            return false;
        }
        if let Some(parent) = target.parent() {
            self.cleanup_empty_dirs(parent);
        }
        true
    }

    /// Move a thumbnail to follow a renamed source image.
    /// No-op unless both paths are images and the source mirror exists.
    pub fn rename_thumbnail(&self, old_rel: &str, new_rel: &str) -> bool {
        let (old, new) = match (
            self.thumbnail_full_path(old_rel),
            self.thumbnail_full_path(new_rel),
        ) {
            (Some(old), Some(new)) => (old, new),
            _ => return false,
        };
        if !old.is_file() {
            return false;
        }
        if let Some(parent) = new.parent() {
            if fs::create_dir_all(parent).is_err() {
                return false;
            }
        }
        if let Err(err) = fs::rename(&old, &new) {
            eprintln!(
                "❌ Failed to move thumbnail {} -> {}: {}",
                old.display(),
                new.display(),
                err
            );
            return false;
        }
        if let Some(parent) = old.parent() {
            self.cleanup_empty_dirs(parent);
        }
        true
    }

    /// Move a mirrored subtree to follow a renamed source directory.
    pub fn rename_thumbnail_directory(&self, old_rel: &str, new_rel: &str) -> bool {
        let old_rel = paths::normalize(old_rel);
        let new_rel = paths::normalize(new_rel);
        if old_rel.is_empty() || new_rel.is_empty() {
            return false;
        }
        let old = self.thumb_root.join(&old_rel);
        let new = self.thumb_root.join(&new_rel);
        if !old.is_dir() {
            return false;
        }
        if let Some(parent) = new.parent() {
            if fs::create_dir_all(parent).is_err() {
                return false;
            }
        }
        if let Err(err) = fs::rename(&old, &new) {
            eprintln!(
                "❌ Failed to move thumbnails {} -> {}: {}",
                old.display(),
                new.display(),
                err
            );
            return false;
        }
        if let Some(parent) = old.parent() {
            self.cleanup_empty_dirs(parent);
        }
        true
    }

    /// Generate thumbnails for every image under `start` (default: the
    /// whole source tree) that doesn't have one yet. Symlinks are skipped.
    pub fn generate_all_thumbnails(&self, start: Option<&str>) -> GenerateReport {
        let mut report = GenerateReport::default();
        let base = match start {
            Some(p) => self.source_root.join(paths::normalize(p)),
            None => self.source_root.clone(),
        };
        if !base.is_dir() {
            return report;
        }

        let walker = WalkDir::new(&base)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !e.path_is_symlink());
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    eprintln!("⚠️  Skipping unreadable entry: {}", err);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !Self::is_image_file(&name) {
                continue;
            }
            let rel = match paths::relative_to(&self.source_root, entry.path()) {
                Some(rel) => rel,
                None => continue,
            };
            if self.thumbnail_exists(&rel) {
                report.skipped += 1;
            } else if self.generate_thumbnail(&rel) {
                report.generated += 1;
            } else {
                report.failed += 1;
            }
        }

        report
    }

    /// Full reconciliation: generate what's missing, then sweep orphans in
    /// both directions — mirrored directories whose source directory is
    /// gone are deleted wholesale, mirrored files whose basename matches no
    /// original under any supported extension are deleted individually.
    pub fn sync_thumbnails(&self) -> SweepReport {
        let generated = self.generate_all_thumbnails(None);
        let mut deleted: u64 = 0;

        if self.thumb_root.is_dir() {
            self.sweep_dir(&self.thumb_root, &mut deleted);
        }

        let report = SweepReport {
            generated: generated.generated,
            deleted,
            failed: generated.failed,
        };
        println!(
            "🔄 Thumbnail sync: {} generated, {} orphans deleted, {} failed",
            report.generated, report.deleted, report.failed
        );
        report
    }

    fn sweep_dir(&self, thumb_dir: &Path, deleted: &mut u64) {
        let rel = match paths::relative_to(&self.thumb_root, thumb_dir) {
            Some(rel) => rel,
            None => return,
        };
        let source_dir = self.source_root.join(&rel);

        let entries = match fs::read_dir(thumb_dir) {
            Ok(entries) => entries,
            Err(err) => {
                eprintln!("⚠️  Failed to read {}: {}", thumb_dir.display(), err);
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                let child_source = source_dir.join(entry.file_name());
                if child_source.is_dir() {
                    self.sweep_dir(&path, deleted);
                } else {
                    // Whole source directory is gone; drop its mirror.
                    *deleted += count_thumbnails(&path);
                    if let Err(err) = fs::remove_dir_all(&path) {
                        eprintln!("❌ Failed to delete {}: {}", path.display(), err);
                    }
                }
            } else if path
                .extension()
                .map(|e| e.eq_ignore_ascii_case(THUMBNAIL_EXT))
                .unwrap_or(false)
            {
                if !has_source_image(&source_dir, &path) {
                    if fs::remove_file(&path).is_ok() {
                        *deleted += 1;
                    } else {
                        eprintln!("❌ Failed to delete orphan {}", path.display());
                    }
                }
            }
        }

        // Prune this directory if the sweep emptied it.
        if thumb_dir != self.thumb_root {
            self.cleanup_empty_dirs(thumb_dir);
        }
    }

    /// Walk upward from `start`, removing empty directories, stopping at
    /// the thumbnail root boundary (the root itself is never removed).
    fn cleanup_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current != self.thumb_root && current.starts_with(&self.thumb_root) {
            match fs::read_dir(&current) {
                Ok(mut entries) => {
                    if entries.next().is_some() {
                        break;
                    }
                }
                Err(_) => break,
            }
            if fs::remove_dir(&current).is_err() {
                break;
            }
            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            }
        }
    }

    pub fn status(&self) -> ThumbnailStatus {
        let thumbnail_count = if self.thumb_root.is_dir() {
            count_thumbnails(&self.thumb_root)
        } else {
            0
        };
        ThumbnailStatus {
            source_root: self.source_root.to_string_lossy().to_string(),
            thumbnail_root: self.thumb_root.to_string_lossy().to_string(),
            thumbnail_count,
        }
    }
}

/// Does any original with this thumbnail's stem exist under a supported
/// image extension?
fn has_source_image(source_dir: &Path, thumb_path: &Path) -> bool {
    let stem = match thumb_path.file_stem() {
        Some(stem) => stem.to_string_lossy().to_string(),
        None => return false,
    };
    for ext in IMAGE_EXTENSIONS {
        if source_dir.join(format!("{}.{}", stem, ext)).is_file() {
            return true;
        }
        if source_dir
            .join(format!("{}.{}", stem, ext.to_ascii_uppercase()))
            .is_file()
        {
            return true;
        }
    }
    false
}

fn count_thumbnails(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .flatten()
        .filter(|e| e.file_type().is_file())
        .count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_png(path: &Path, width: u32, height: u32) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([120, 80, 40, 255]));
        img.save_with_format(path, ImageFormat::Png).unwrap();
    }

    fn pipeline(root: &Path) -> ThumbnailPipeline {
        ThumbnailPipeline::new(root.join("files"), Some(root.join("thumbs")))
    }

    #[test]
    fn classifies_images_by_extension() {
        assert!(ThumbnailPipeline::is_image_file("photo.jpg"));
        assert!(ThumbnailPipeline::is_image_file("photo.JPEG"));
        assert!(ThumbnailPipeline::is_image_file("scan.tif"));
        assert!(!ThumbnailPipeline::is_image_file("notes.txt"));
        assert!(!ThumbnailPipeline::is_image_file("archive.tar.gz"));
        assert!(!ThumbnailPipeline::is_image_file(".png"));
        assert!(!ThumbnailPipeline::is_image_file("noextension"));
    }

    #[test]
    fn derives_mirrored_paths() {
        let dir = tempdir().unwrap();
        let p = pipeline(dir.path());

        assert_eq!(
            p.thumbnail_rel_path("photos/2024/img.jpg").unwrap(),
            "photos/2024/img.webp"
        );
        assert_eq!(
            p.thumbnail_url("img.png").unwrap(),
            "/thumbnails/img.webp"
        );
        assert!(p.thumbnail_rel_path("notes.txt").is_none());
        assert!(p.thumbnail_url("notes.txt").is_none());
    }

    #[test]
    fn generates_and_downscales() {
        let dir = tempdir().unwrap();
        let p = pipeline(dir.path());
        write_png(&dir.path().join("files/album/big.png"), 600, 400);

        assert!(p.generate_thumbnail("album/big.png"));
        let thumb = dir.path().join("thumbs/album/big.webp");
        assert!(thumb.is_file());

        let img = image::open(&thumb).unwrap();
        assert_eq!(img.width(), 300);
        assert_eq!(img.height(), 200);
    }

    #[test]
    fn never_upscales_small_images() {
        let dir = tempdir().unwrap();
        let p = pipeline(dir.path());
        write_png(&dir.path().join("files/tiny.png"), 12, 8);

        assert!(p.generate_thumbnail("tiny.png"));
        let img = image::open(dir.path().join("thumbs/tiny.webp")).unwrap();
        assert_eq!((img.width(), img.height()), (12, 8));
    }

    #[test]
    fn non_images_are_skipped_without_output() {
        let dir = tempdir().unwrap();
        let p = pipeline(dir.path());
        fs::create_dir_all(dir.path().join("files")).unwrap();
        fs::write(dir.path().join("files/notes.txt"), b"hello").unwrap();

        assert!(!p.generate_thumbnail("notes.txt"));
        assert!(!dir.path().join("thumbs").exists());
    }

    #[test]
    fn delete_prunes_empty_directories_but_not_the_root() {
        let dir = tempdir().unwrap();
        let p = pipeline(dir.path());
        write_png(&dir.path().join("files/a/b/img.png"), 20, 20);
        assert!(p.generate_thumbnail("a/b/img.png"));

        assert!(p.delete_thumbnail("a/b/img.png"));
        assert!(!dir.path().join("thumbs/a").exists());
        assert!(dir.path().join("thumbs").is_dir());

        // Second delete is a no-op.
        assert!(!p.delete_thumbnail("a/b/img.png"));
    }

    #[test]
    fn rename_moves_the_mirror() {
        let dir = tempdir().unwrap();
        let p = pipeline(dir.path());
        write_png(&dir.path().join("files/old/img.png"), 20, 20);
        assert!(p.generate_thumbnail("old/img.png"));

        assert!(p.rename_thumbnail("old/img.png", "new/img.png"));
        assert!(dir.path().join("thumbs/new/img.webp").is_file());
        assert!(!dir.path().join("thumbs/old").exists());

        // Non-image pairs and missing mirrors are no-ops.
        assert!(!p.rename_thumbnail("a.txt", "b.txt"));
        assert!(!p.rename_thumbnail("ghost.png", "moved.png"));
    }

    #[test]
    fn rename_directory_moves_the_subtree() {
        let dir = tempdir().unwrap();
        let p = pipeline(dir.path());
        write_png(&dir.path().join("files/photos/img.png"), 20, 20);
        assert!(p.generate_thumbnail("photos/img.png"));

        assert!(p.rename_thumbnail_directory("photos", "gallery"));
        assert!(dir.path().join("thumbs/gallery/img.webp").is_file());
        assert!(!dir.path().join("thumbs/photos").exists());

        assert!(!p.rename_thumbnail_directory("missing", "anywhere"));
    }

    #[test]
    fn generate_all_reports_generated_and_skipped() {
        let dir = tempdir().unwrap();
        let p = pipeline(dir.path());
        write_png(&dir.path().join("files/a.png"), 20, 20);
        write_png(&dir.path().join("files/sub/b.png"), 20, 20);
        fs::write(dir.path().join("files/notes.txt"), b"x").unwrap();

        let first = p.generate_all_thumbnails(None);
        assert_eq!(first.generated, 2);
        assert_eq!(first.skipped, 0);
        assert_eq!(first.failed, 0);

        let second = p.generate_all_thumbnails(None);
        assert_eq!(second.generated, 0);
        assert_eq!(second.skipped, 2);
    }

    #[test]
    fn sync_deletes_orphans_in_both_directions() {
        let dir = tempdir().unwrap();
        let p = pipeline(dir.path());
        write_png(&dir.path().join("files/keep/img.png"), 20, 20);
        write_png(&dir.path().join("files/gone/img.png"), 20, 20);
        assert_eq!(p.generate_all_thumbnails(None).generated, 2);

        // Remove one source file and one whole source directory.
        fs::remove_dir_all(dir.path().join("files/gone")).unwrap();
        write_png(&dir.path().join("files/keep/extra.png"), 20, 20);
        fs::remove_file(dir.path().join("files/keep/img.png")).unwrap();

        let report = p.sync_thumbnails();
        assert_eq!(report.generated, 1); // extra.png
        assert!(report.deleted >= 2); // gone/img.webp + keep/img.webp
        assert!(dir.path().join("thumbs/keep/extra.webp").is_file());
        assert!(!dir.path().join("thumbs/gone").exists());
        assert!(!dir.path().join("thumbs/keep/img.webp").exists());
    }

    #[test]
    fn orphan_sweep_keeps_thumbnails_with_any_matching_extension() {
        let dir = tempdir().unwrap();
        let p = pipeline(dir.path());
        write_png(&dir.path().join("files/img.png"), 20, 20);
        assert!(p.generate_thumbnail("img.png"));

        // Swap the source extension; the thumbnail basename still matches.
        fs::rename(
            dir.path().join("files/img.png"),
            dir.path().join("files/img.bmp"),
        )
        .unwrap();

        let report = p.sync_thumbnails();
        assert_eq!(report.deleted, 0);
        assert!(dir.path().join("thumbs/img.webp").is_file());
    }
}
