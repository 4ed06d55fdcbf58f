//! Effective access-level resolution.
//!
//! A path is private if its own record is private or any ancestor
//! directory record is private. This runs on every file access check, so
//! it is a chain of indexed point lookups, never a table scan.
//!
//! Fail-open default: a path with no record (and no private ancestor)
//! resolves to public. This mirrors the behavior callers already depend
//! on — an entry the cache has not seen yet is reachable until marked
//! otherwise. Keep that in mind before exposing new trees through this
//! resolver.

use crate::error::CacheResult;
use crate::paths;

use super::record::AccessLevel;
use super::store::MetadataStore;

pub struct AccessLevelResolver<'a> {
    store: &'a MetadataStore,
}

impl<'a> AccessLevelResolver<'a> {
    pub fn new(store: &'a MetadataStore) -> Self {
        AccessLevelResolver { store }
    }

    /// Effective visibility of `path` after considering itself and every
    /// ancestor directory. O(depth) point lookups, short-circuiting on the
    /// first private hit.
    pub fn resolve(&self, path: &str) -> CacheResult<AccessLevel> {
        let path = paths::normalize(path);

        // The record itself first; any stored private wins immediately.
        if let Some((level, _)) = self.store.access_entry(&path)? {
            if level == AccessLevel::Private {
                return Ok(AccessLevel::Private);
            }
        }

        // Then the ancestor chain, nearest parent up to the root. Only
        // directory records count.
        for ancestor in paths::ancestors(&path) {
            if let Some((level, is_directory)) = self.store.access_entry(ancestor)? {
                if is_directory && level == AccessLevel::Private {
                    return Ok(AccessLevel::Private);
                }
            }
        }

        Ok(AccessLevel::Public)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::record::FileStats;
    use tempfile::tempdir;

    fn stats(is_directory: bool) -> FileStats {
        FileStats {
            size: 0,
            modified: 1,
            created: 1,
            is_directory,
        }
    }

    #[test]
    fn private_directory_covers_descendants() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::open(dir.path().join("cache.db")).unwrap();
        store
            .add_files(&[
                ("secret".into(), stats(true)),
                ("secret/sub".into(), stats(true)),
                ("secret/sub/file.txt".into(), stats(false)),
            ])
            .unwrap();
        store
            .update_access_level("secret", AccessLevel::Private)
            .unwrap();

        let resolver = AccessLevelResolver::new(&store);
        // file.txt was never individually marked, its ancestor decides.
        assert_eq!(
            resolver.resolve("secret/sub/file.txt").unwrap(),
            AccessLevel::Private
        );
        assert_eq!(resolver.resolve("secret").unwrap(), AccessLevel::Private);
    }

    #[test]
    fn missing_records_resolve_public() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::open(dir.path().join("cache.db")).unwrap();

        let resolver = AccessLevelResolver::new(&store);
        assert_eq!(
            resolver.resolve("never/seen/before.txt").unwrap(),
            AccessLevel::Public
        );
    }

    #[test]
    fn private_file_record_does_not_leak_onto_siblings() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::open(dir.path().join("cache.db")).unwrap();
        store
            .add_files(&[
                ("shared".into(), stats(true)),
                ("shared/mine.txt".into(), stats(false)),
                ("shared/yours.txt".into(), stats(false)),
            ])
            .unwrap();
        store
            .update_access_level("shared/mine.txt", AccessLevel::Private)
            .unwrap();

        let resolver = AccessLevelResolver::new(&store);
        assert_eq!(
            resolver.resolve("shared/mine.txt").unwrap(),
            AccessLevel::Private
        );
        assert_eq!(
            resolver.resolve("shared/yours.txt").unwrap(),
            AccessLevel::Public
        );
    }

    #[test]
    fn non_directory_ancestor_records_are_ignored() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::open(dir.path().join("cache.db")).unwrap();
        // A stale file record occupying an ancestor path (e.g. a file that
        // was replaced by a directory between scans) must not hide children.
        store
            .add_files(&[("odd".into(), stats(false))])
            .unwrap();
        store
            .update_access_level("odd", AccessLevel::Private)
            .unwrap();

        let resolver = AccessLevelResolver::new(&store);
        assert_eq!(
            resolver.resolve("odd/child.txt").unwrap(),
            AccessLevel::Public
        );
    }
}
