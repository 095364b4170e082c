//! The database façade: owns a data directory, opens and caches one
//! [`Collection`] per `.grid` file, and manages their shared lifecycle.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::collection::Collection;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::flock::FileLock;

/// File extension of collection files. Informational only: block storage is
/// content-sniffed, never extension-sniffed.
pub const COLLECTION_EXT: &str = "grid";

const LOCK_FILE: &str = "emberdb.lock";

#[derive(Debug)]
pub struct Database {
    config: Config,
    /// Held for the lifetime of the instance; a second process opening the
    /// same directory fails fast instead of corrupting the files.
    _lock: FileLock,
    /// Default compression for collections opened after this point.
    compression: AtomicBool,
    /// Loaded collections. The mutex guards only the registry itself.
    collections: Mutex<HashMap<String, Arc<Collection>>>,
}

/// Point-in-time snapshot of database state.
#[derive(Clone, Debug)]
pub struct Stats {
    pub dir: PathBuf,
    pub collection_count: usize,
    pub collections: HashMap<String, CollectionStats>,
}

#[derive(Clone, Debug)]
pub struct CollectionStats {
    pub name: String,
    pub memtable_size: usize,
    pub index_size: usize,
    pub path: PathBuf,
}

impl Database {
    /// Opens a database rooted at the given directory, creating the
    /// directory if missing.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_config(Config::new(dir))
    }

    /// Opens a database with custom configuration.
    pub fn open_with_config(config: Config) -> Result<Self> {
        fs::create_dir_all(&config.dir)?;

        let lock = FileLock::lock(config.dir.join(LOCK_FILE))
            .map_err(|e| Error::Lock(format!("{}: {e}", config.dir.display())))?;

        Ok(Self {
            compression: AtomicBool::new(config.compression),
            config,
            _lock: lock,
            collections: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the cached handle for a collection, opening and recovering
    /// `dir/<name>.grid` on first access.
    pub fn collection(&self, name: &str) -> Result<Arc<Collection>> {
        let mut collections = self.collections.lock()?;
        if let Some(collection) = collections.get(name) {
            return Ok(Arc::clone(collection));
        }

        let path = self.config.dir.join(format!("{name}.{COLLECTION_EXT}"));
        let collection = Arc::new(Collection::open(
            name,
            &path,
            self.compression.load(Ordering::Relaxed),
            self.config.sync_on_commit,
        )?);
        collections.insert(name.to_string(), Arc::clone(&collection));
        Ok(collection)
    }

    /// Base names of every collection file in the directory, loaded or not.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.config.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(COLLECTION_EXT) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Pre-loads every listed collection, warning and continuing on
    /// individual failures.
    pub fn load_all(&self) -> Result<()> {
        for name in self.list()? {
            if let Err(e) = self.collection(&name) {
                tracing::warn!(collection = %name, error = %e, "failed to load collection");
            }
        }
        Ok(())
    }

    /// Changes the compression default for collections opened later and
    /// flips every already-loaded collection.
    pub fn set_compression(&self, enabled: bool) -> Result<()> {
        self.compression.store(enabled, Ordering::Relaxed);
        let collections = self.collections.lock()?;
        for collection in collections.values() {
            collection.set_compression(enabled);
        }
        Ok(())
    }

    /// Closes every loaded collection. Closing continues past failures; the
    /// first error is returned.
    pub fn close(&self) -> Result<()> {
        let collections = self.collections.lock()?;
        let mut first_error = None;
        for (name, collection) in collections.iter() {
            if let Err(e) = collection.close() {
                tracing::warn!(collection = %name, error = %e, "failed to close collection");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Snapshot of per-collection counters for the loaded collections.
    pub fn stats(&self) -> Stats {
        let collections = self.collections.lock().unwrap();
        let per_collection: HashMap<String, CollectionStats> = collections
            .iter()
            .map(|(name, collection)| {
                (
                    name.clone(),
                    CollectionStats {
                        name: name.clone(),
                        memtable_size: collection.size(),
                        index_size: collection.index_size(),
                        path: collection.path().to_path_buf(),
                    },
                )
            })
            .collect();
        Stats {
            dir: self.config.dir.clone(),
            collection_count: per_collection.len(),
            collections: per_collection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{key_of, Record, Value};
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::TempDir;

    fn record(fields: &[(&str, Value)]) -> Record {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_basic_operations() {
        let dir = TempDir::new().expect("tempdir failed");
        let db = Database::open(dir.path()).expect("open failed");

        let users = db.collection("users").expect("collection failed");
        let key = users
            .insert(record(&[
                ("id", Value::from("1")),
                ("name", Value::from("Alice")),
                ("age", Value::Int64(30)),
            ]))
            .expect("insert failed");
        assert_eq!(key, "1");

        users.commit().expect("commit failed");

        let found = users.find("1").expect("find failed");
        assert_eq!(found["name"], Value::from("Alice"));
        assert_eq!(found["age"], Value::Int64(30));
    }

    #[test]
    fn test_collection_handle_is_cached() {
        let dir = TempDir::new().expect("tempdir failed");
        let db = Database::open(dir.path()).expect("open failed");

        let first = db.collection("users").expect("collection failed");
        let second = db.collection("users").expect("collection failed");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_durability_across_reopen() {
        let dir = TempDir::new().expect("tempdir failed");

        {
            let db = Database::open(dir.path()).expect("open failed");
            let users = db.collection("users").expect("collection failed");
            users
                .insert(record(&[
                    ("id", Value::from("1")),
                    ("name", Value::from("Charlie")),
                ]))
                .expect("insert failed");
            users.commit().expect("commit failed");

            // Inserted but never committed: must not survive the reopen.
            users
                .insert(record(&[("id", Value::from("2"))]))
                .expect("insert failed");
            db.close().expect("close failed");
        }

        let db = Database::open(dir.path()).expect("reopen failed");
        let users = db.collection("users").expect("collection failed");
        let found = users.find("1").expect("find after reopen failed");
        assert_eq!(found["name"], Value::from("Charlie"));
        assert_eq!(users.find("2"), Err(Error::NotFound));
    }

    #[test]
    fn test_escapes_survive_reopen() {
        let dir = TempDir::new().expect("tempdir failed");
        let original = record(&[
            ("id", Value::from("1")),
            ("name", Value::from("O'Neill, Jack")),
            ("bio", Value::from("Line 1\nLine 2")),
            ("path", Value::from(r"C:\Users\Admin")),
        ]);

        {
            let db = Database::open(dir.path()).expect("open failed");
            let users = db.collection("users").expect("collection failed");
            users.insert(original.clone()).expect("insert failed");
            users.commit().expect("commit failed");
            db.close().expect("close failed");
        }

        let db = Database::open(dir.path()).expect("reopen failed");
        let users = db.collection("users").expect("collection failed");
        let found = users.find("1").expect("find failed");
        assert_eq!(found["name"], original["name"]);
        assert_eq!(found["bio"], original["bio"]);
        assert_eq!(found["path"], original["path"]);
    }

    #[test]
    fn test_last_writer_wins_across_reopen() {
        let dir = TempDir::new().expect("tempdir failed");

        {
            let db = Database::open(dir.path()).expect("open failed");
            let users = db.collection("users").expect("collection failed");
            users
                .insert(record(&[("id", Value::from("1")), ("v", Value::Int64(1))]))
                .expect("insert failed");
            users.commit().expect("commit failed");
            users
                .insert(record(&[("id", Value::from("1")), ("v", Value::Int64(2))]))
                .expect("insert failed");
            users.commit().expect("commit failed");
            db.close().expect("close failed");
        }

        let db = Database::open(dir.path()).expect("reopen failed");
        let users = db.collection("users").expect("collection failed");
        let found = users.find("1").expect("find failed");
        assert_eq!(found["v"], Value::Int64(2));
        assert_eq!(users.index_size(), 1);
    }

    #[test]
    fn test_mixed_compression_reopen() {
        let dir = TempDir::new().expect("tempdir failed");

        {
            let db = Database::open(dir.path()).expect("open failed");
            let users = db.collection("users").expect("collection failed");

            users.set_compression(true);
            users
                .insert(record(&[("id", Value::from("1"))]))
                .expect("insert failed");
            users.commit().expect("commit failed");

            users.set_compression(false);
            users
                .insert(record(&[("id", Value::from("2"))]))
                .expect("insert failed");
            users.commit().expect("commit failed");
            db.close().expect("close failed");
        }

        let db = Database::open(dir.path()).expect("reopen failed");
        let users = db.collection("users").expect("collection failed");
        assert!(users.find("1").is_ok());
        assert!(users.find("2").is_ok());
        assert_eq!(users.index_size(), 2);
    }

    #[test]
    fn test_recovery_tolerates_trailing_garbage() {
        let dir = TempDir::new().expect("tempdir failed");
        let path;

        {
            let db = Database::open(dir.path()).expect("open failed");
            let users = db.collection("users").expect("collection failed");
            users
                .insert(record(&[("id", Value::from("1"))]))
                .expect("insert failed");
            users.commit().expect("commit failed");
            path = users.path().to_path_buf();
            db.close().expect("close failed");
        }

        // Simulate an interrupted commit: seven junk bytes at the tail,
        // starting with a partial gzip header.
        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .expect("open file failed");
        file.write_all(&[0x1f, 0x8b, 0x42, 0x00, 0x99, 0x7f, 0x03])
            .expect("append failed");
        drop(file);

        let db = Database::open(dir.path()).expect("reopen failed");
        let users = db.collection("users").expect("collection failed");
        assert!(users.find("1").is_ok());
    }

    #[test]
    fn test_commits_append_after_recovered_tail() {
        let dir = TempDir::new().expect("tempdir failed");

        {
            let db = Database::open(dir.path()).expect("open failed");
            let users = db.collection("users").expect("collection failed");
            users
                .insert(record(&[("id", Value::from("1"))]))
                .expect("insert failed");
            users.commit().expect("commit failed");
            db.close().expect("close failed");
        }

        {
            let db = Database::open(dir.path()).expect("reopen failed");
            let users = db.collection("users").expect("collection failed");
            users
                .insert(record(&[("id", Value::from("2"))]))
                .expect("insert failed");
            users.commit().expect("commit failed");
            db.close().expect("close failed");
        }

        let db = Database::open(dir.path()).expect("reopen failed");
        let users = db.collection("users").expect("collection failed");
        assert!(users.find("1").is_ok());
        assert!(users.find("2").is_ok());
    }

    #[test]
    fn test_list_collections() {
        let dir = TempDir::new().expect("tempdir failed");
        let db = Database::open(dir.path()).expect("open failed");

        db.collection("users").expect("collection failed");
        db.collection("orders").expect("collection failed");
        // A stray non-collection file is ignored.
        std::fs::write(dir.path().join("notes.txt"), b"x").expect("write failed");

        assert_eq!(db.list().expect("list failed"), vec!["orders", "users"]);
    }

    #[test]
    fn test_load_all() {
        let dir = TempDir::new().expect("tempdir failed");

        {
            let db = Database::open(dir.path()).expect("open failed");
            for name in ["a", "b"] {
                let collection = db.collection(name).expect("collection failed");
                collection
                    .insert(record(&[("id", Value::from("1"))]))
                    .expect("insert failed");
                collection.commit().expect("commit failed");
            }
            db.close().expect("close failed");
        }

        let db = Database::open(dir.path()).expect("reopen failed");
        db.load_all().expect("load_all failed");
        let stats = db.stats();
        assert_eq!(stats.collection_count, 2);
        assert_eq!(stats.collections.len(), 2);
        assert_eq!(stats.collections["a"].index_size, 1);
    }

    #[test]
    fn test_stats() {
        let dir = TempDir::new().expect("tempdir failed");
        let db = Database::open(dir.path()).expect("open failed");

        let users = db.collection("users").expect("collection failed");
        users
            .insert(record(&[("id", Value::from("1"))]))
            .expect("insert failed");
        users
            .insert(record(&[("id", Value::from("2"))]))
            .expect("insert failed");
        users.commit().expect("commit failed");
        users
            .insert(record(&[("id", Value::from("3"))]))
            .expect("insert failed");

        let stats = db.stats();
        assert_eq!(stats.dir, dir.path());
        assert_eq!(stats.collection_count, 1);
        let users_stats = &stats.collections["users"];
        assert_eq!(users_stats.memtable_size, 1);
        assert_eq!(users_stats.index_size, 2);
        assert!(users_stats.path.ends_with("users.grid"));
    }

    #[test]
    fn test_close_makes_collections_unusable() {
        let dir = TempDir::new().expect("tempdir failed");
        let db = Database::open(dir.path()).expect("open failed");

        let users = db.collection("users").expect("collection failed");
        db.close().expect("close failed");
        assert_eq!(
            users.insert(record(&[("id", Value::from("1"))])),
            Err(Error::Closed)
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_exclusive_directory_access() {
        let dir = TempDir::new().expect("tempdir failed");

        let db = Database::open(dir.path()).expect("open failed");
        match Database::open(dir.path()) {
            Err(Error::Lock(_)) => {}
            other => panic!("expected lock error, got {other:?}"),
        }

        drop(db);
        Database::open(dir.path()).expect("reopen after drop failed");
    }

    #[test]
    fn test_database_compression_default() {
        let dir = TempDir::new().expect("tempdir failed");
        let db = Database::open_with_config(Config::new(dir.path()).compression(true))
            .expect("open failed");

        let users = db.collection("users").expect("collection failed");
        users
            .insert(record(&[("id", Value::from("1"))]))
            .expect("insert failed");
        users.commit().expect("commit failed");

        let bytes = std::fs::read(users.path()).expect("read failed");
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn test_set_compression_flips_loaded_collections() {
        let dir = TempDir::new().expect("tempdir failed");
        let db = Database::open(dir.path()).expect("open failed");
        let users = db.collection("users").expect("collection failed");

        db.set_compression(true).expect("set_compression failed");
        users
            .insert(record(&[("id", Value::from("1"))]))
            .expect("insert failed");
        users.commit().expect("commit failed");

        let bytes = std::fs::read(users.path()).expect("read failed");
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn test_batch_insert_indexes_every_key() {
        let dir = TempDir::new().expect("tempdir failed");
        let db = Database::open(dir.path()).expect("open failed");
        let products = db.collection("products").expect("collection failed");

        for i in 0..100 {
            products
                .insert(record(&[
                    ("id", Value::Int64(i)),
                    ("name", Value::from("Product")),
                    ("price", Value::Float64(i as f64 * 1.99)),
                ]))
                .expect("insert failed");
        }
        products.commit().expect("commit failed");

        assert_eq!(products.index_size(), 100);
        let mut all_keys: Vec<_> = products
            .all()
            .expect("all failed")
            .iter()
            .filter_map(key_of)
            .collect();
        all_keys.sort();
        assert_eq!(all_keys.len(), 100);
    }

    #[test]
    fn test_compact_then_reopen() {
        let dir = TempDir::new().expect("tempdir failed");

        {
            let db = Database::open(dir.path()).expect("open failed");
            let users = db.collection("users").expect("collection failed");
            for i in 0..3 {
                users
                    .insert(record(&[("id", Value::Int64(i)), ("v", Value::Int64(i))]))
                    .expect("insert failed");
                users.commit().expect("commit failed");
            }
            users.compact().expect("compact failed");
            db.close().expect("close failed");
        }

        let db = Database::open(dir.path()).expect("reopen failed");
        let users = db.collection("users").expect("collection failed");
        assert_eq!(users.index_size(), 3);
        for i in 0..3 {
            let found = users.find(&i.to_string()).expect("find failed");
            assert_eq!(found["v"], Value::Int64(i));
        }
    }
}
