//! Append-only key/value log ("bitcask-shaped" store).
//!
//! On-disk entry format, big-endian throughout:
//! `[u32 key_len][u32 value_len][key bytes][value bytes]`. The in-memory
//! index maps each key to the file position and length of its most recent
//! value; later writes for the same key shadow earlier ones without
//! reclaiming the earlier bytes. No compaction is ever performed.
//!
//! Keys are raw byte strings, not `str`: the progress log keys chunk start
//! offsets as big-endian `u64` bytes, which are not valid UTF-8 in general.

mod log;

use log::Log;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BitcaskError {
    #[error("key not found")]
    NotFound,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BitcaskError>;

#[derive(Debug, Clone, Copy)]
struct ValueMeta {
    pos: u64,
    len: u32,
}

type KeyVal = HashMap<Vec<u8>, ValueMeta>;

/// An append-only log-structured key/value store with an in-memory index.
pub struct Bitcask {
    log: Log,
    path: PathBuf,
    index: RwLock<KeyVal>,
}

impl Bitcask {
    /// Opens (creating if absent) the log at `path`, replaying it to build
    /// the in-memory index. Stops replay at the first short read, leaving
    /// the index reflecting only the entries that were fully readable.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let log = Log::open(&path)?;
        let index = log.replay()?;
        Ok(Self {
            log,
            path,
            index: RwLock::new(index),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.index.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empties the log file and the in-memory index, atomically with
    /// respect to the log's own lock.
    pub fn reset(&self) -> Result<()> {
        let mut index = self.index.write().unwrap();
        self.log.truncate()?;
        *index = HashMap::new();
        Ok(())
    }

    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.index.read().unwrap().keys().cloned().collect()
    }

    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let index = self.index.read().unwrap();
        let meta = index.get(key).ok_or(BitcaskError::NotFound)?;
        self.log.read_value(meta.pos, meta.len)
    }

    /// Calls `f(key, value)` for each entry; stops early if `f` returns `true`.
    pub fn fetch<F: FnMut(&[u8], &[u8]) -> bool>(&self, mut f: F) -> Result<()> {
        let index = self.index.read().unwrap();
        for (k, meta) in index.iter() {
            let data = self.log.read_value(meta.pos, meta.len)?;
            if f(k, &data) {
                break;
            }
        }
        Ok(())
    }

    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let (pos, len) = self.log.append(key, value)?;
        self.index
            .write()
            .unwrap()
            .insert(key.to_vec(), ValueMeta { pos, len });
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        self.log.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.xz3");

        {
            let bc = Bitcask::open(&path).unwrap();
            bc.set(b"test", b"value1").unwrap();
            bc.set(b"test2", b"value2").unwrap();
            bc.set(b"test3", b"").unwrap();
            bc.set(b"test4", b"value5").unwrap();
            bc.close().unwrap();
        }

        let bc = Bitcask::open(&path).unwrap();
        assert_eq!(bc.len(), 4);
        assert_eq!(bc.get(b"test").unwrap(), b"value1");
        assert_eq!(bc.get(b"test2").unwrap(), b"value2");
        assert_eq!(bc.get(b"test3").unwrap(), Vec::<u8>::new());
        assert_eq!(bc.get(b"test4").unwrap(), b"value5");
        assert!(matches!(bc.get(b"missing"), Err(BitcaskError::NotFound)));
    }

    #[test]
    fn last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let bc = Bitcask::open(dir.path().join("a.xz3")).unwrap();
        bc.set(b"k", b"first").unwrap();
        bc.set(b"k", b"second").unwrap();
        assert_eq!(bc.get(b"k").unwrap(), b"second");
        assert_eq!(bc.len(), 1);
    }

    #[test]
    fn reset_empties_file_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.xz3");
        let bc = Bitcask::open(&path).unwrap();
        bc.set(b"k", b"v").unwrap();
        bc.reset().unwrap();
        assert_eq!(bc.len(), 0);
        assert!(matches!(bc.get(b"k"), Err(BitcaskError::NotFound)));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn binary_keys_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let bc = Bitcask::open(dir.path().join("a.xz3")).unwrap();
        let key = 123_456_789u64.to_be_bytes();
        let value = 42u64.to_be_bytes();
        bc.set(&key, &value).unwrap();
        assert_eq!(bc.get(&key).unwrap(), value);
    }

    #[test]
    fn tail_torn_entry_is_ignored_on_reopen() {
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.xz3");

        {
            let bc = Bitcask::open(&path).unwrap();
            bc.set(b"good", b"value").unwrap();
            bc.close().unwrap();
        }
        // Append a truncated entry header: a key_len that promises more
        // bytes than follow.
        {
            let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&(100u32).to_be_bytes()).unwrap();
            f.write_all(&(5u32).to_be_bytes()).unwrap();
            f.write_all(b"short").unwrap();
        }

        let bc = Bitcask::open(&path).unwrap();
        assert_eq!(bc.len(), 1);
        assert_eq!(bc.get(b"good").unwrap(), b"value");
    }
}
