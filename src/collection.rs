//! A collection is one named storage unit: an append-only file of blocks,
//! an insertion-ordered memtable of uncommitted records, and an in-memory
//! index mapping each primary key to the location of the block that last
//! wrote it.
//!
//! One reader-writer lock guards the memtable, the index, the compression
//! flag and the file slot. Point lookups copy the block location out under
//! the shared lock and release it before touching the disk: stored blocks
//! are immutable until `compact`, and `compact` needs the exclusive lock,
//! so a location captured under the shared lock can never race a truncate.

use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::compress;
use crate::error::{Error, Result};
use crate::grid;
use crate::record::{key_of, Record, Value};
use crate::recovery;

/// Addresses the byte range holding one stored block in a collection file.
/// Reading exactly `length` bytes at `offset` yields a complete block,
/// gzip-wrapped or raw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockLocation {
    pub offset: u64,
    pub length: u64,
}

/// State behind the collection lock.
#[derive(Debug)]
struct Inner {
    /// None once the collection is closed.
    file: Option<Arc<File>>,
    /// Uncommitted records in insertion order. Shadows the index.
    memtable: Vec<Record>,
    /// Key to the location of the newest block containing it.
    index: HashMap<String, BlockLocation>,
    /// Applies to future commits only.
    compression: bool,
}

#[derive(Debug)]
pub struct Collection {
    name: String,
    path: PathBuf,
    sync_on_commit: bool,
    inner: RwLock<Inner>,
}

impl Collection {
    /// Opens or creates the collection file and rebuilds the index from its
    /// contents. The file cursor is left at the end, ready for appends.
    pub(crate) fn open(
        name: &str,
        path: &Path,
        compression: bool,
        sync_on_commit: bool,
    ) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut index = HashMap::new();
        recovery::load_index(&file, &mut index)?;

        Ok(Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            sync_on_commit,
            inner: RwLock::new(Inner {
                file: Some(Arc::new(file)),
                memtable: Vec::new(),
                index,
                compression,
            }),
        })
    }

    /// Appends a record to the memtable and returns its key. The `id` field
    /// is coerced to its textual rendering so the stored form and the key
    /// always agree.
    pub fn insert(&self, mut record: Record) -> Result<String> {
        let key = key_of(&record).ok_or(Error::MissingId)?;
        record.insert("id".to_string(), Value::Text(key.clone()));

        let mut inner = self.inner.write()?;
        if inner.file.is_none() {
            return Err(Error::Closed);
        }
        inner.memtable.push(record);
        Ok(key)
    }

    /// Returns the latest visible record for a key: the newest memtable
    /// occurrence if any, otherwise the record decoded from the indexed
    /// block. The shared lock is released before the block read.
    pub fn find(&self, key: &str) -> Result<Record> {
        let (location, file) = {
            let inner = self.inner.read()?;
            let file = inner.file.as_ref().ok_or(Error::Closed)?;

            for record in inner.memtable.iter().rev() {
                if key_of(record).as_deref() == Some(key) {
                    return Ok(record.clone());
                }
            }

            match inner.index.get(key) {
                Some(location) => (*location, Arc::clone(file)),
                None => return Err(Error::NotFound),
            }
        };

        let raw = read_block_raw(&file, location)?;
        match grid::decode_one(&raw, key)? {
            Some(record) => Ok(record),
            None => Err(Error::Inconsistency(format!(
                "index maps key {key:?} to block at offset {} that does not contain it",
                location.offset
            ))),
        }
    }

    /// Replaces the record stored under `key`. The record's `id` is forced
    /// to the given key. A key still in the memtable is replaced in its
    /// slot; a committed key is re-inserted so the next commit shadows the
    /// stored version.
    pub fn update(&self, key: &str, mut record: Record) -> Result<()> {
        record.insert("id".to_string(), Value::Text(key.to_string()));

        let mut inner = self.inner.write()?;
        if inner.file.is_none() {
            return Err(Error::Closed);
        }

        if let Some(slot) = inner
            .memtable
            .iter()
            .rposition(|r| key_of(r).as_deref() == Some(key))
        {
            inner.memtable[slot] = record;
            return Ok(());
        }

        if inner.index.contains_key(key) {
            inner.memtable.push(record);
            return Ok(());
        }

        Err(Error::NotFound)
    }

    /// Removes every memtable occurrence of the key and its index entry.
    /// The stored rows remain on disk until the next compact; they are
    /// unreachable without an index entry.
    pub fn delete(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.write()?;
        if inner.file.is_none() {
            return Err(Error::Closed);
        }

        let before = inner.memtable.len();
        inner
            .memtable
            .retain(|record| key_of(record).as_deref() != Some(key));
        let in_memtable = inner.memtable.len() != before;
        let in_index = inner.index.remove(key).is_some();

        if !in_memtable && !in_index {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    /// Flushes the memtable as one new block: encode, optionally gzip,
    /// append, fsync, index, clear. A no-op when the memtable is empty. On
    /// any error the memtable is left untouched so the caller may retry.
    pub fn commit(&self) -> Result<()> {
        let mut inner = self.inner.write()?;
        self.commit_locked(&mut inner)
    }

    fn commit_locked(&self, inner: &mut Inner) -> Result<()> {
        let file = Arc::clone(inner.file.as_ref().ok_or(Error::Closed)?);
        if inner.memtable.is_empty() {
            return Ok(());
        }

        let raw = grid::encode(&self.name, &inner.memtable)?;
        let data = if inner.compression {
            compress::compress(&raw)?
        } else {
            raw
        };

        let mut handle: &File = &file;
        let offset = handle.seek(SeekFrom::End(0))?;
        handle.write_all(&data)?;
        if self.sync_on_commit {
            file.sync_all()?;
        }

        let location = BlockLocation {
            offset,
            length: data.len() as u64,
        };
        let rows = inner.memtable.len();
        for record in &inner.memtable {
            if let Some(key) = key_of(record) {
                inner.index.insert(key, location);
            }
        }
        inner.memtable.clear();

        tracing::debug!(
            collection = %self.name,
            rows,
            bytes = location.length,
            offset = location.offset,
            "committed block"
        );
        Ok(())
    }

    /// Produces every currently visible record: the memtable newest to
    /// oldest, then each indexed block's records. A stored record is only
    /// visible while the index still maps its key to that exact block, so
    /// stale versions in older blocks never surface.
    pub fn all(&self) -> Result<Vec<Record>> {
        let inner = self.inner.read()?;
        self.visible_locked(&inner)
    }

    fn visible_locked(&self, inner: &Inner) -> Result<Vec<Record>> {
        let file = inner.file.as_ref().ok_or(Error::Closed)?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut records = Vec::new();

        for record in inner.memtable.iter().rev() {
            if let Some(key) = key_of(record) {
                if seen.insert(key) {
                    records.push(record.clone());
                }
            }
        }

        let mut visited: HashSet<BlockLocation> = HashSet::new();
        for location in inner.index.values() {
            if !visited.insert(*location) {
                continue;
            }
            let raw = read_block_raw(file, *location)?;
            for record in grid::decode_all(&raw)? {
                let Some(key) = key_of(&record) else {
                    continue;
                };
                if inner.index.get(&key) != Some(location) {
                    continue;
                }
                if seen.insert(key) {
                    records.push(record);
                }
            }
        }

        Ok(records)
    }

    /// Rewrites the file as a single block holding exactly the visible set.
    /// Memtable state wins over stored state. Not crash-safe: a crash
    /// between the truncate and the commit loses the stored blocks.
    pub fn compact(&self) -> Result<()> {
        let mut inner = self.inner.write()?;
        let file = Arc::clone(inner.file.as_ref().ok_or(Error::Closed)?);

        let visible = self.visible_locked(&inner)?;

        file.set_len(0)?;
        (&*file).seek(SeekFrom::Start(0))?;

        inner.index.clear();
        inner.memtable = visible;

        if inner.memtable.is_empty() {
            return Ok(());
        }

        tracing::debug!(collection = %self.name, rows = inner.memtable.len(), "compacting");
        self.commit_locked(&mut inner)
    }

    /// Changes compression for future commits. Stored blocks are untouched.
    pub fn set_compression(&self, enabled: bool) {
        self.inner.write().unwrap().compression = enabled;
    }

    /// Number of uncommitted records in the memtable.
    pub fn size(&self) -> usize {
        self.inner.read().unwrap().memtable.len()
    }

    /// Number of indexed keys.
    pub fn index_size(&self) -> usize {
        self.inner.read().unwrap().index.len()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Releases the file handle. Subsequent operations fail with `Closed`.
    /// Uncommitted memtable records are discarded.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.write()?;
        inner.file.take();
        Ok(())
    }
}

/// Reads a stored block by its location and strips the gzip wrapping when
/// the magic bytes say so.
fn read_block_raw(file: &File, location: BlockLocation) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; location.length as usize];
    read_exact_at(file, &mut buf, location.offset)?;
    if compress::is_gzip(&buf) {
        compress::decompress(&buf)
    } else {
        Ok(buf)
    }
}

/// Positional read that leaves the append cursor alone. Concurrent readers
/// may call this on the same handle without synchronization.
#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    // seek_read moves the stream cursor, which is fine: the append path
    // always seeks to the end under the exclusive lock before writing.
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "block extends past end of file",
                ))
            }
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
