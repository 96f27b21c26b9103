use super::{KeyVal, Result, ValueMeta};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

/// The append-only file backing a [`super::Bitcask`]. All file positioning
/// is serialized behind a single lock; concurrent seek+read/write on one
/// file handle would otherwise race.
pub(super) struct Log {
    file: Mutex<File>,
}

impl Log {
    pub(super) fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Replays the log from the start, building the in-memory index. Stops
    /// at the first short read of any field (header or payload), leaving
    /// the index reflecting only fully-readable entries.
    pub(super) fn replay(&self) -> Result<KeyVal> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(0))?;
        let mut kv = KeyVal::new();

        loop {
            let mut key_len_buf = [0u8; 4];
            if !read_exact_or_stop(&mut *file, &mut key_len_buf)? {
                break;
            }
            let key_len = u32::from_be_bytes(key_len_buf);

            let mut value_len_buf = [0u8; 4];
            if !read_exact_or_stop(&mut *file, &mut value_len_buf)? {
                break;
            }
            let value_len = u32::from_be_bytes(value_len_buf);

            let mut key = vec![0u8; key_len as usize];
            if !read_exact_or_stop(&mut *file, &mut key)? {
                break;
            }

            let pos = file.stream_position()?;
            if value_len > 0 {
                let end = pos + value_len as u64;
                let file_len = file.metadata()?.len();
                if end > file_len {
                    break;
                }
                file.seek(SeekFrom::Start(end))?;
            }

            kv.insert(key, ValueMeta { pos, len: value_len });
        }
        Ok(kv)
    }

    pub(super) fn read_value(&self, pos: u64, len: u32) -> Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(pos))?;
        let mut buf = vec![0u8; len as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub(super) fn append(&self, key: &[u8], value: &[u8]) -> Result<(u64, u32)> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::End(0))?;
        file.write_all(&(key.len() as u32).to_be_bytes())?;
        let value_len = value.len() as u32;
        file.write_all(&value_len.to_be_bytes())?;
        file.write_all(key)?;
        let pos = file.stream_position()?;
        if value_len > 0 {
            file.write_all(value)?;
        }
        Ok((pos, value_len))
    }

    pub(super) fn truncate(&self) -> Result<()> {
        let mut file = self.file.lock().unwrap();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    pub(super) fn close(self) -> Result<()> {
        drop(self.file.into_inner().unwrap());
        Ok(())
    }
}

/// Reads exactly `buf.len()` bytes, returning `Ok(false)` on EOF with zero
/// bytes read (clean end of log) or any short read (torn tail), and
/// propagating genuine I/O errors.
fn read_exact_or_stop(file: &mut File, buf: &mut [u8]) -> io::Result<bool> {
    let mut read = 0;
    while read < buf.len() {
        match file.read(&mut buf[read..]) {
            Ok(0) => return Ok(false),
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}
