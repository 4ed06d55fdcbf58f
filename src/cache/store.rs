//! The MetadataStore manages the SQLite cache database.
//!
//! It mirrors filesystem metadata (one row per entry, keyed by normalized
//! relative path) so listings, searches and storage totals never need a
//! recursive walk of the source tree.

use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::{CacheError, CacheResult};
use crate::paths;

use super::record::{AccessLevel, FileListing, FileRecord, FileStats, SearchResults, StorageInfo};

/// Column list shared by every record-returning query.
const RECORD_COLUMNS: &str =
    "path, name, parent_path, size, modified, created, is_directory, last_synced, \
     COALESCE(access_level, 'public')";

/// Meta key holding the unix timestamp of the last completed full sync.
const META_LAST_FULL_SYNC: &str = "last_full_sync";

pub struct MetadataStore {
    conn: Mutex<Option<Connection>>,
    db_path: PathBuf,
}

impl MetadataStore {
    /// Open (or create) the cache database at `db_path`.
    ///
    /// The database runs in WAL mode with relaxed synchronous durability:
    /// crash-safe, but not fsync-per-write. Schema creation is idempotent
    /// and forward-migrates databases created before the `access_level`
    /// column existed.
    pub fn open(db_path: impl Into<PathBuf>) -> CacheResult<Self> {
        let db_path = db_path.into();

        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&db_path)?;

        // WAL lets readers proceed while a rebuild batch is writing.
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| {
            row.get::<_, String>(0)
        })?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Self::init_schema(&conn)?;

        println!("📁 Metadata cache initialized at: {}", db_path.display());

        Ok(MetadataStore {
            conn: Mutex::new(Some(conn)),
            db_path,
        })
    }

    /// Initialize the database schema.
    /// Creates all necessary tables and indexes if they don't exist.
    fn init_schema(conn: &Connection) -> CacheResult<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS files (
                path            TEXT PRIMARY KEY,
                name            TEXT NOT NULL,
                parent_path     TEXT NOT NULL,
                size            INTEGER NOT NULL DEFAULT 0,
                modified        INTEGER NOT NULL,
                created         INTEGER NOT NULL,
                is_directory    INTEGER NOT NULL DEFAULT 0,
                last_synced     INTEGER NOT NULL,
                access_level    TEXT DEFAULT 'public'
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS cache_meta (
                key             TEXT PRIMARY KEY,
                value           TEXT NOT NULL
            )",
            [],
        )?;

        // Add access_level column if it doesn't exist (for databases created
        // before visibility support). If the column exists, the ALTER is
        // silently ignored; existing rows pick up the 'public' default.
        let _ = conn.execute(
            "ALTER TABLE files ADD COLUMN access_level TEXT DEFAULT 'public'",
            [],
        );

        Self::create_indexes(conn)?;

        Ok(())
    }

    /// Indexes backing the two hot lookups: children-of-directory and
    /// case-insensitive name search.
    fn create_indexes(conn: &Connection) -> CacheResult<()> {
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_files_parent_path
             ON files(parent_path)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_files_name_nocase
             ON files(name COLLATE NOCASE)",
            [],
        )?;
        Ok(())
    }

    /// Get the path to the database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn guard(&self) -> MutexGuard<'_, Option<Connection>> {
        // A poisoned lock means a panic mid-operation; the connection
        // itself is still usable.
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn row_to_record(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
        Ok(FileRecord {
            path: row.get(0)?,
            name: row.get(1)?,
            parent_path: row.get(2)?,
            size: row.get(3)?,
            modified: row.get(4)?,
            created: row.get(5)?,
            is_directory: row.get::<_, i64>(6)? != 0,
            last_synced: row.get(7)?,
            access_level: AccessLevel::from_db(&row.get::<_, String>(8)?),
        })
    }

    /// Direct children of `parent_path` (not recursive), directories first
    /// then case-insensitive by name, paginated. Hidden entries (dot-files)
    /// are excluded unless `show_hidden` is set. `page` is 1-based.
    pub fn get_files(
        &self,
        parent_path: &str,
        page: usize,
        limit: usize,
        show_hidden: bool,
    ) -> CacheResult<FileListing> {
        let mut guard = self.guard();
        let conn = guard.as_mut().ok_or(CacheError::NotReady)?;

        let parent = paths::normalize(parent_path);
        let hidden = if show_hidden {
            ""
        } else {
            " AND name NOT LIKE '.%'"
        };

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM files WHERE parent_path = ?1{}", hidden),
            params![parent],
            |row| row.get(0),
        )?;

        let page = page.max(1);
        let offset = (page - 1) * limit;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM files WHERE parent_path = ?1{}
             ORDER BY is_directory DESC, name COLLATE NOCASE ASC
             LIMIT ?2 OFFSET ?3",
            RECORD_COLUMNS, hidden
        ))?;

        let items = stmt
            .query_map(
                params![parent, limit as i64, offset as i64],
                Self::row_to_record,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(FileListing { items, total })
    }

    /// Case-insensitive substring search on `name` across the whole tree.
    ///
    /// Returns `None` when `use_regex` is requested: the store never
    /// evaluates regular expressions, the caller is expected to fall back
    /// to a direct filesystem scan.
    pub fn search_files(
        &self,
        query: &str,
        use_regex: bool,
        page: usize,
        limit: usize,
        show_hidden: bool,
    ) -> CacheResult<Option<SearchResults>> {
        if use_regex {
            return Ok(None);
        }

        let mut guard = self.guard();
        let conn = guard.as_mut().ok_or(CacheError::NotReady)?;

        // Escape LIKE wildcards so a query of "100%" matches literally.
        let escaped = query
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("%{}%", escaped);

        let hidden = if show_hidden {
            ""
        } else {
            " AND name NOT LIKE '.%'"
        };

        let total: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM files WHERE name LIKE ?1 ESCAPE '\\'{}",
                hidden
            ),
            params![pattern],
            |row| row.get(0),
        )?;

        let page = page.max(1);
        let offset = (page - 1) * limit;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM files WHERE name LIKE ?1 ESCAPE '\\'{}
             ORDER BY is_directory DESC, name COLLATE NOCASE ASC
             LIMIT ?2 OFFSET ?3",
            RECORD_COLUMNS, hidden
        ))?;

        let results = stmt
            .query_map(
                params![pattern, limit as i64, offset as i64],
                Self::row_to_record,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(SearchResults { results, total }))
    }

    /// Whole-table storage aggregate in a single query.
    pub fn storage_info(&self) -> CacheResult<StorageInfo> {
        let mut guard = self.guard();
        let conn = guard.as_mut().ok_or(CacheError::NotReady)?;

        let info = conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN is_directory = 0 THEN size ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN is_directory = 0 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN is_directory = 1 THEN 1 ELSE 0 END), 0)
             FROM files",
            [],
            |row| {
                Ok(StorageInfo {
                    total_size: row.get(0)?,
                    file_count: row.get(1)?,
                    folder_count: row.get(2)?,
                })
            },
        )?;

        Ok(info)
    }

    /// Upsert a single record with an explicit access level.
    pub fn add_file(
        &self,
        path: &str,
        stats: FileStats,
        access_level: AccessLevel,
    ) -> CacheResult<()> {
        let mut guard = self.guard();
        let conn = guard.as_mut().ok_or(CacheError::NotReady)?;

        let path = paths::normalize(path);
        conn.execute(
            "INSERT INTO files
                (path, name, parent_path, size, modified, created, is_directory, last_synced, access_level)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(path) DO UPDATE SET
                name = excluded.name,
                parent_path = excluded.parent_path,
                size = excluded.size,
                modified = excluded.modified,
                created = excluded.created,
                is_directory = excluded.is_directory,
                last_synced = excluded.last_synced,
                access_level = excluded.access_level",
            params![
                path,
                paths::file_name(&path),
                paths::parent(&path),
                stats.size,
                stats.modified,
                stats.created,
                stats.is_directory as i64,
                chrono::Utc::now().timestamp(),
                access_level.as_str(),
            ],
        )?;

        Ok(())
    }

    /// Upsert a batch of scanned entries inside one transaction.
    ///
    /// Scan results carry no access level: new rows default to public and
    /// existing rows keep whatever level they already have.
    pub fn add_files(&self, batch: &[(String, FileStats)]) -> CacheResult<()> {
        let mut guard = self.guard();
        let conn = guard.as_mut().ok_or(CacheError::NotReady)?;
        Self::upsert_batch(conn, "files", batch)
    }

    fn upsert_batch(
        conn: &mut Connection,
        table: &str,
        batch: &[(String, FileStats)],
    ) -> CacheResult<()> {
        let now = chrono::Utc::now().timestamp();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {}
                    (path, name, parent_path, size, modified, created, is_directory, last_synced)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(path) DO UPDATE SET
                    name = excluded.name,
                    parent_path = excluded.parent_path,
                    size = excluded.size,
                    modified = excluded.modified,
                    created = excluded.created,
                    is_directory = excluded.is_directory,
                    last_synced = excluded.last_synced",
                table
            ))?;
            for (path, stats) in batch {
                let path = paths::normalize(path);
                stmt.execute(params![
                    path,
                    paths::file_name(&path),
                    paths::parent(&path),
                    stats.size,
                    stats.modified,
                    stats.created,
                    stats.is_directory as i64,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete the record at `path` and every descendant record.
    ///
    /// Descendants are matched on a `/` segment boundary, so deleting
    /// `docs` never touches `docs-archive`. Returns the number of rows
    /// removed; 0 when the path was never cached.
    pub fn delete_file(&self, path: &str) -> CacheResult<usize> {
        let mut guard = self.guard();
        let conn = guard.as_mut().ok_or(CacheError::NotReady)?;

        let path = paths::normalize(path);
        if path.is_empty() {
            return Ok(0);
        }

        let removed = conn.execute(
            "DELETE FROM files
             WHERE path = ?1
                OR substr(path, 1, length(?1) + 1) = ?1 || '/'",
            params![path],
        )?;
        Ok(removed)
    }

    /// Rename the record at `old_path` to `new_path`, cascading to every
    /// descendant record. Name and parent path are recomputed for each
    /// touched row.
    pub fn rename_file(&self, old_path: &str, new_path: &str) -> CacheResult<()> {
        let mut guard = self.guard();
        let conn = guard.as_mut().ok_or(CacheError::NotReady)?;

        let old = paths::normalize(old_path);
        let new = paths::normalize(new_path);
        if old.is_empty() || new.is_empty() || old == new {
            return Ok(());
        }

        let now = chrono::Utc::now().timestamp();
        let tx = conn.transaction()?;
        {
            tx.execute(
                "UPDATE files
                 SET path = ?2, name = ?3, parent_path = ?4, last_synced = ?5
                 WHERE path = ?1",
                params![old, new, paths::file_name(&new), paths::parent(&new), now],
            )?;

            // Collect descendants first, then rewrite each path by
            // substituting the old prefix. Segment boundary matching keeps
            // textually-similar siblings untouched.
            let descendants: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT path FROM files
                     WHERE substr(path, 1, length(?1) + 1) = ?1 || '/'",
                )?;
                let rows = stmt.query_map(params![old], |row| row.get(0))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };

            let mut update = tx.prepare(
                "UPDATE files
                 SET path = ?2, parent_path = ?3, last_synced = ?4
                 WHERE path = ?1",
            )?;
            for descendant in descendants {
                let rewritten = format!("{}{}", new, &descendant[old.len()..]);
                let parent = paths::parent(&rewritten).to_string();
                update.execute(params![descendant, rewritten, parent, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Paths (and directory flags) of the direct children of `parent_path`.
    /// Used by single-directory resyncs to find entries that vanished.
    pub fn children_paths(&self, parent_path: &str) -> CacheResult<Vec<(String, bool)>> {
        let mut guard = self.guard();
        let conn = guard.as_mut().ok_or(CacheError::NotReady)?;

        let parent = paths::normalize(parent_path);
        let mut stmt =
            conn.prepare("SELECT path, is_directory FROM files WHERE parent_path = ?1")?;
        let rows = stmt.query_map(params![parent], |row| {
            Ok((row.get(0)?, row.get::<_, i64>(1)? != 0))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Full record lookup; `None` when the path was never cached.
    pub fn get_file_info(&self, path: &str) -> CacheResult<Option<FileRecord>> {
        let mut guard = self.guard();
        let conn = guard.as_mut().ok_or(CacheError::NotReady)?;

        let path = paths::normalize(path);
        let record = conn
            .query_row(
                &format!("SELECT {} FROM files WHERE path = ?1", RECORD_COLUMNS),
                params![path],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// The access level stored on the record itself (not the effective
    /// level; see [`AccessLevelResolver`](super::access::AccessLevelResolver)).
    /// Missing records read as public.
    pub fn get_access_level(&self, path: &str) -> CacheResult<AccessLevel> {
        Ok(self
            .access_entry(path)?
            .map(|(level, _)| level)
            .unwrap_or_default())
    }

    /// Point lookup used by the effective-access walk: stored level plus
    /// the directory flag, or `None` when the path is not cached.
    pub fn access_entry(&self, path: &str) -> CacheResult<Option<(AccessLevel, bool)>> {
        let mut guard = self.guard();
        let conn = guard.as_mut().ok_or(CacheError::NotReady)?;

        let path = paths::normalize(path);
        let entry = conn
            .query_row(
                "SELECT COALESCE(access_level, 'public'), is_directory
                 FROM files WHERE path = ?1",
                params![path],
                |row| {
                    Ok((
                        AccessLevel::from_db(&row.get::<_, String>(0)?),
                        row.get::<_, i64>(1)? != 0,
                    ))
                },
            )
            .optional()?;
        Ok(entry)
    }

    /// Set the access level on an existing record.
    /// Returns false when no record exists at `path`.
    pub fn update_access_level(&self, path: &str, level: AccessLevel) -> CacheResult<bool> {
        let mut guard = self.guard();
        let conn = guard.as_mut().ok_or(CacheError::NotReady)?;

        let path = paths::normalize(path);
        let changed = conn.execute(
            "UPDATE files SET access_level = ?2, last_synced = ?3 WHERE path = ?1",
            params![path, level.as_str(), chrono::Utc::now().timestamp()],
        )?;
        Ok(changed > 0)
    }

    // ---- full rebuild (shadow table) -------------------------------------
    //
    // A full rescan writes into files_shadow while readers keep using the
    // live table, then commit_shadow swaps the two in one transaction.
    // Readers never observe a half-built or empty cache.

    /// Create an empty shadow table, dropping any leftover from an
    /// interrupted rebuild.
    pub fn begin_shadow(&self) -> CacheResult<()> {
        let mut guard = self.guard();
        let conn = guard.as_mut().ok_or(CacheError::NotReady)?;

        conn.execute_batch(
            "DROP TABLE IF EXISTS files_shadow;
             CREATE TABLE files_shadow (
                path            TEXT PRIMARY KEY,
                name            TEXT NOT NULL,
                parent_path     TEXT NOT NULL,
                size            INTEGER NOT NULL DEFAULT 0,
                modified        INTEGER NOT NULL,
                created         INTEGER NOT NULL,
                is_directory    INTEGER NOT NULL DEFAULT 0,
                last_synced     INTEGER NOT NULL,
                access_level    TEXT DEFAULT 'public'
             );",
        )?;
        Ok(())
    }

    /// Batch insert into the shadow table (one transaction per batch).
    pub fn add_files_shadow(&self, batch: &[(String, FileStats)]) -> CacheResult<()> {
        let mut guard = self.guard();
        let conn = guard.as_mut().ok_or(CacheError::NotReady)?;
        Self::upsert_batch(conn, "files_shadow", batch)
    }

    /// Atomically replace the live table with the shadow table.
    ///
    /// Access levels survive the rebuild: private markings are copied over
    /// by path before the swap, since a filesystem scan cannot know them.
    pub fn commit_shadow(&self) -> CacheResult<()> {
        let mut guard = self.guard();
        let conn = guard.as_mut().ok_or(CacheError::NotReady)?;

        let tx = conn.transaction()?;
        tx.execute_batch(
            "UPDATE files_shadow
             SET access_level = 'private'
             WHERE path IN (SELECT path FROM files WHERE access_level = 'private');
             DROP TABLE files;
             ALTER TABLE files_shadow RENAME TO files;",
        )?;
        Self::create_indexes(&tx)?;
        tx.execute(
            "INSERT INTO cache_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![META_LAST_FULL_SYNC, chrono::Utc::now().timestamp().to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Drop a shadow table after a failed scan.
    pub fn discard_shadow(&self) -> CacheResult<()> {
        let mut guard = self.guard();
        let conn = guard.as_mut().ok_or(CacheError::NotReady)?;
        conn.execute("DROP TABLE IF EXISTS files_shadow", [])?;
        Ok(())
    }

    /// Unix timestamp of the last completed full sync, if any.
    pub fn last_full_sync(&self) -> CacheResult<Option<i64>> {
        let mut guard = self.guard();
        let conn = guard.as_mut().ok_or(CacheError::NotReady)?;

        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM cache_meta WHERE key = ?1",
                params![META_LAST_FULL_SYNC],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.and_then(|v| v.parse().ok()))
    }

    /// Flush and close the underlying connection. Idempotent; queries after
    /// close report `NotReady`.
    pub fn close(&self) {
        let mut guard = self.guard();
        if let Some(conn) = guard.take() {
            let _ = conn.close();
        }
    }
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore")
            .field("db_path", &self.db_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn stats(size: i64, is_directory: bool) -> FileStats {
        FileStats {
            size,
            modified: 1000,
            created: 900,
            is_directory,
        }
    }

    fn open_store(dir: &tempfile::TempDir) -> MetadataStore {
        MetadataStore::open(dir.path().join("cache.db")).unwrap()
    }

    #[test]
    fn add_then_get_round_trip() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        store
            .add_file("a/b.txt", stats(10, false), AccessLevel::Private)
            .unwrap();

        let record = store.get_file_info("a/b.txt").unwrap().unwrap();
        assert_eq!(record.name, "b.txt");
        assert_eq!(record.parent_path, "a");
        assert_eq!(record.size, 10);
        assert_eq!(record.modified, 1000);
        assert_eq!(record.created, 900);
        assert!(!record.is_directory);
        assert_eq!(record.access_level, AccessLevel::Private);
    }

    #[test]
    fn get_files_lists_direct_children_sorted() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        store
            .add_files(&[
                ("a".into(), stats(0, true)),
                ("a/zeta.txt".into(), stats(1, false)),
                ("a/Beta.txt".into(), stats(1, false)),
                ("a/sub".into(), stats(0, true)),
                ("a/sub/nested.txt".into(), stats(1, false)),
                ("a/.hidden".into(), stats(1, false)),
            ])
            .unwrap();

        let listing = store.get_files("a", 1, 50, false).unwrap();
        assert_eq!(listing.total, 3);
        let names: Vec<&str> = listing.items.iter().map(|r| r.name.as_str()).collect();
        // Directories first, then case-insensitive name order.
        assert_eq!(names, vec!["sub", "Beta.txt", "zeta.txt"]);

        let with_hidden = store.get_files("a", 1, 50, true).unwrap();
        assert_eq!(with_hidden.total, 4);
    }

    #[test]
    fn pagination_covers_everything_without_duplicates() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let batch: Vec<(String, FileStats)> = (0..25)
            .map(|i| (format!("dir/file{:02}.txt", i), stats(1, false)))
            .collect();
        store.add_files(&batch).unwrap();

        let mut seen = std::collections::HashSet::new();
        for page in 1..=3 {
            let listing = store.get_files("dir", page, 10, false).unwrap();
            assert_eq!(listing.total, 25);
            for item in listing.items {
                assert!(seen.insert(item.path));
            }
        }
        assert_eq!(seen.len(), 25);
    }

    #[test]
    fn rename_cascades_and_spares_textual_siblings() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        store
            .add_files(&[
                ("docs".into(), stats(0, true)),
                ("docs/x.txt".into(), stats(5, false)),
                ("docs/sub".into(), stats(0, true)),
                ("docs/sub/y.txt".into(), stats(5, false)),
                ("docs-archive".into(), stats(0, true)),
                ("docs-archive/z.txt".into(), stats(5, false)),
            ])
            .unwrap();

        store.rename_file("docs", "papers").unwrap();

        assert!(store.get_file_info("docs/x.txt").unwrap().is_none());
        let moved = store.get_file_info("papers/sub/y.txt").unwrap().unwrap();
        assert_eq!(moved.parent_path, "papers/sub");
        assert_eq!(moved.name, "y.txt");

        // The sibling sharing a textual prefix is untouched.
        assert!(store.get_file_info("docs-archive/z.txt").unwrap().is_some());

        let listing = store.get_files("papers", 1, 50, false).unwrap();
        let names: Vec<&str> = listing.items.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["sub", "x.txt"]);
    }

    #[test]
    fn delete_cascades_and_spares_textual_siblings() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        store
            .add_files(&[
                ("docs".into(), stats(0, true)),
                ("docs/x.txt".into(), stats(5, false)),
                ("docs/sub".into(), stats(0, true)),
                ("docs/sub/y.txt".into(), stats(5, false)),
                ("docs-archive".into(), stats(0, true)),
            ])
            .unwrap();

        let removed = store.delete_file("docs").unwrap();
        assert_eq!(removed, 4);
        assert!(store.get_file_info("docs").unwrap().is_none());
        assert!(store.get_file_info("docs/sub/y.txt").unwrap().is_none());
        assert!(store.get_file_info("docs-archive").unwrap().is_some());

        // Deleting an uncached path is a no-op.
        assert_eq!(store.delete_file("nope").unwrap(), 0);
    }

    #[test]
    fn search_matches_substring_case_insensitively() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        store
            .add_files(&[
                ("Report_Final.pdf".into(), stats(1, false)),
                ("notes/report-draft.txt".into(), stats(1, false)),
                ("other.txt".into(), stats(1, false)),
                ("100%.txt".into(), stats(1, false)),
            ])
            .unwrap();

        let hits = store
            .search_files("report", false, 1, 50, false)
            .unwrap()
            .unwrap();
        assert_eq!(hits.total, 2);

        // LIKE wildcards in the query are treated literally.
        let exact = store
            .search_files("100%", false, 1, 50, false)
            .unwrap()
            .unwrap();
        assert_eq!(exact.total, 1);
        assert_eq!(exact.results[0].name, "100%.txt");
    }

    #[test]
    fn regex_search_always_signals_fallback() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        store
            .add_file("match.txt", stats(1, false), AccessLevel::Public)
            .unwrap();

        assert!(store
            .search_files("match", true, 1, 50, false)
            .unwrap()
            .is_none());
        assert!(store
            .search_files(".*", true, 1, 50, true)
            .unwrap()
            .is_none());
    }

    #[test]
    fn storage_info_aggregates_files_and_folders() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        store
            .add_files(&[
                ("a".into(), stats(0, true)),
                ("a/one.bin".into(), stats(100, false)),
                ("a/two.bin".into(), stats(50, false)),
            ])
            .unwrap();

        let info = store.storage_info().unwrap();
        assert_eq!(info.total_size, 150);
        assert_eq!(info.file_count, 2);
        assert_eq!(info.folder_count, 1);
    }

    #[test]
    fn update_access_level_reports_missing_records() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        assert!(!store
            .update_access_level("ghost", AccessLevel::Private)
            .unwrap());

        store
            .add_file("real.txt", stats(1, false), AccessLevel::Public)
            .unwrap();
        assert!(store
            .update_access_level("real.txt", AccessLevel::Private)
            .unwrap());
        assert_eq!(
            store.get_access_level("real.txt").unwrap(),
            AccessLevel::Private
        );
    }

    #[test]
    fn batch_upsert_preserves_existing_access_level() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        store
            .add_file("secret.txt", stats(1, false), AccessLevel::Private)
            .unwrap();
        // A rescan of the same entry must not reset visibility.
        store
            .add_files(&[("secret.txt".into(), stats(2, false))])
            .unwrap();

        let record = store.get_file_info("secret.txt").unwrap().unwrap();
        assert_eq!(record.size, 2);
        assert_eq!(record.access_level, AccessLevel::Private);
    }

    #[test]
    fn shadow_swap_replaces_contents_and_keeps_private_marks() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        store
            .add_files(&[
                ("stale.txt".into(), stats(1, false)),
                ("kept".into(), stats(0, true)),
                ("kept/file.txt".into(), stats(1, false)),
            ])
            .unwrap();
        store.update_access_level("kept", AccessLevel::Private).unwrap();

        store.begin_shadow().unwrap();
        store
            .add_files_shadow(&[
                ("kept".into(), stats(0, true)),
                ("kept/file.txt".into(), stats(1, false)),
                ("fresh.txt".into(), stats(1, false)),
            ])
            .unwrap();
        store.commit_shadow().unwrap();

        assert!(store.get_file_info("stale.txt").unwrap().is_none());
        assert!(store.get_file_info("fresh.txt").unwrap().is_some());
        assert_eq!(
            store.get_access_level("kept").unwrap(),
            AccessLevel::Private
        );
        assert!(store.last_full_sync().unwrap().is_some());
    }

    #[test]
    fn forward_migrates_databases_without_access_level() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("old.db");

        // Simulate a database created before visibility support.
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute_batch(
                "CREATE TABLE files (
                    path TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    parent_path TEXT NOT NULL,
                    size INTEGER NOT NULL DEFAULT 0,
                    modified INTEGER NOT NULL,
                    created INTEGER NOT NULL,
                    is_directory INTEGER NOT NULL DEFAULT 0,
                    last_synced INTEGER NOT NULL
                 );
                 INSERT INTO files VALUES ('legacy.txt', 'legacy.txt', '', 3, 1, 1, 0, 1);",
            )
            .unwrap();
        }

        let store = MetadataStore::open(&db_path).unwrap();
        let record = store.get_file_info("legacy.txt").unwrap().unwrap();
        assert_eq!(record.access_level, AccessLevel::Public);
        assert!(store
            .update_access_level("legacy.txt", AccessLevel::Private)
            .unwrap());
    }

    #[test]
    fn close_is_idempotent_and_queries_report_not_ready() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        store.close();
        store.close();
        assert!(matches!(
            store.get_file_info("x"),
            Err(CacheError::NotReady)
        ));
    }
}
