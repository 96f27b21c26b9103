//! Single-writer file sink fed by a bounded channel of file-data records.
//!
//! Grounded on the original engine's `Chunk`/`FileData` (one file handle,
//! one writer goroutine, writes arrive out of chunk order but monotonically
//! within a chunk), using a `StorageWriter` positional-write idiom
//! (`write_at` on Unix needs no mutex because `pwrite(2)` is atomic;
//! non-Unix targets fall back to a seek+write pair guarded by a lock).

use crate::progress::ProgressTracker;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;

const CHANNEL_CAPACITY: usize = 100;

/// One write: `data` belongs at absolute file offset `pos`, and `start` is
/// the byte offset this chunk's range began at (so the progress tracker can
/// compute how far into the chunk this write reaches).
#[derive(Debug, Clone)]
pub struct FileData {
    pub pos: u64,
    pub data: Vec<u8>,
    pub start: u64,
}

impl FileData {
    pub fn new(pos: u64, data: &[u8], start: u64) -> Self {
        Self {
            pos,
            data: data.to_vec(),
            start,
        }
    }

    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    /// Bytes completed within this chunk counting from `start`, inclusive
    /// of this write.
    pub fn offset_len(&self) -> u64 {
        (self.pos - self.start) + self.data.len() as u64
    }
}

/// Handle used by producers (transfer threads) to hand off writes and to
/// signal that no more writes are coming.
#[derive(Clone)]
pub struct ChunkWriterHandle {
    sender: SyncSender<FileData>,
}

impl ChunkWriterHandle {
    pub fn send(&self, data: FileData) -> Result<(), std::sync::mpsc::SendError<FileData>> {
        self.sender.send(data)
    }
}

/// The single-writer side: owns the file handle exclusively. Call
/// [`ChunkWriter::spawn`] to get a handle plus a join handle for the
/// background writer thread.
pub struct ChunkWriter {
    file: PositionalFile,
    receiver: Receiver<FileData>,
    progress: Option<Arc<ProgressTracker>>,
    path: std::path::PathBuf,
}

impl ChunkWriter {
    /// Opens (or creates) `path` read-write without truncating, so resumed
    /// downloads keep whatever bytes are already on disk.
    pub fn open(path: &Path, progress: Option<Arc<ProgressTracker>>) -> io::Result<(Self, ChunkWriterHandle)> {
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

        let (sender, receiver) = sync_channel(CHANNEL_CAPACITY);
        let writer = Self {
            file: PositionalFile::new(file),
            receiver,
            progress,
            path: path.to_path_buf(),
        };
        Ok((writer, ChunkWriterHandle { sender }))
    }

    /// Drains the channel until the sender side is dropped/closed, writing
    /// each record at its absolute position. Syncs and returns on close or
    /// on the first I/O error (the caller is expected to treat that as a
    /// job-level abort).
    pub fn run(mut self) {
        while let Ok(record) = self.receiver.recv() {
            if let Err(err) = self.file.write_at(record.pos, &record.data) {
                tracing::error!(path = %self.path.display(), error = %err, "chunk writer I/O error");
                return;
            }
            if let Some(progress) = &self.progress {
                progress.update_status(&record);
            }
        }
        if let Err(err) = self.file.sync() {
            tracing::warn!(path = %self.path.display(), error = %err, "file sync failed");
        }
    }
}

/// Closes the sender half, which drains the channel and lets the writer
/// thread exit after flushing.
pub fn exit(handle: ChunkWriterHandle) {
    drop(handle);
}

#[cfg(unix)]
struct PositionalFile(File);

#[cfg(unix)]
impl PositionalFile {
    fn new(file: File) -> Self {
        Self(file)
    }

    fn write_at(&self, pos: u64, data: &[u8]) -> io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.0.write_all_at(data, pos)
    }

    fn sync(&self) -> io::Result<()> {
        self.0.sync_all()
    }
}

#[cfg(not(unix))]
struct PositionalFile(std::sync::Mutex<File>);

#[cfg(not(unix))]
impl PositionalFile {
    fn new(file: File) -> Self {
        Self(std::sync::Mutex::new(file))
    }

    fn write_at(&self, pos: u64, data: &[u8]) -> io::Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start(pos))?;
        file.write_all(data)
    }

    fn sync(&self) -> io::Result<()> {
        self.0.lock().unwrap().sync_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_len_tracks_progress_within_chunk() {
        let d = FileData::new(110, b"hello", 100);
        assert_eq!(d.offset_len(), 15);
    }

    #[test]
    fn writes_land_at_absolute_positions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");

        let (writer, handle) = ChunkWriter::open(&path, None).unwrap();
        let join = std::thread::spawn(move || writer.run());

        handle.send(FileData::new(5, b"world", 0)).unwrap();
        handle.send(FileData::new(0, b"hello", 0)).unwrap();
        exit(handle);
        join.join().unwrap();

        let contents = fs::read(&path).unwrap();
        assert_eq!(&contents, b"helloworld");
    }

    #[test]
    fn interleaved_chunks_do_not_corrupt_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");

        let (writer, handle) = ChunkWriter::open(&path, None).unwrap();
        let join = std::thread::spawn(move || writer.run());

        // Two independent, non-overlapping chunks; writes interleaved.
        handle.send(FileData::new(0, b"AAAA", 0)).unwrap();
        handle.send(FileData::new(8, b"BBBB", 8)).unwrap();
        handle.send(FileData::new(4, b"AAAA", 0)).unwrap();
        handle.send(FileData::new(12, b"BBBB", 8)).unwrap();
        exit(handle);
        join.join().unwrap();

        let contents = fs::read(&path).unwrap();
        assert_eq!(&contents, b"AAAAAAAABBBBBBBB");
    }
}
