//! Progress tracker: the bitcask-backed resume log for one download job.
//!
//! Grounded on the original engine's `Progress`: a bitcask keyed by chunk
//! start offset (big-endian `u64`) mapping to completed length within that
//! chunk (also big-endian `u64`), plus a reserved `"status"` key holding
//! opaque job metadata used to decide resume-vs-fresh-start.

use crate::bitcask::Bitcask;
use crate::chunk_writer::FileData;
use crate::progress_sink::ProgressSink;
use crate::rangeplan::add_uncovered;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

const STATUS_KEY: &[u8] = b"status";

/// Wraps a per-job bitcask log and (optionally) a UI progress bar.
pub struct ProgressTracker {
    cache: Bitcask,
    sink: Option<Box<dyn ProgressSink>>,
    bar_id: Option<u64>,
    last_update: Mutex<Instant>,
}

impl ProgressTracker {
    /// Opens the bitcask log at `path` with its extension swapped to `ext`.
    /// If the log is empty, persists `metadata` under `"status"`. If it
    /// already holds a `"status"` value that byte-equals `metadata`, the
    /// existing log is adopted (resume). Otherwise it's truncated and
    /// reseeded with the new metadata (fresh start).
    pub fn init_cache(
        path: &Path,
        ext: &str,
        metadata: &[u8],
        sink: Option<Box<dyn ProgressSink>>,
        bar_id: Option<u64>,
    ) -> crate::bitcask::Result<Self> {
        let cache_path = path.with_extension(ext);
        let cache = Bitcask::open(&cache_path)?;

        if !cache.is_empty() {
            match cache.get(STATUS_KEY) {
                Ok(existing) if existing == metadata => {
                    // Resume: leave the log as-is.
                }
                _ => {
                    tracing::info!(path = %cache_path.display(), "restart from cache info");
                    cache.reset()?;
                    cache.set(STATUS_KEY, metadata)?;
                }
            }
        } else {
            cache.set(STATUS_KEY, metadata)?;
        }

        Ok(Self {
            cache,
            sink,
            bar_id,
            last_update: Mutex::new(Instant::now()),
        })
    }

    /// Builds the full `[0, total)` chunk partition, then removes every
    /// chunk the log already reports as complete, advancing the UI bar to
    /// the already-completed byte total. Returns the residual map of
    /// missing `start -> end` intervals.
    pub fn get_tasks(&self, total: u64, chunk_size: u64) -> BTreeMap<u64, u64> {
        let mut tasks = BTreeMap::new();
        if total == 0 {
            return tasks;
        }
        add_uncovered(&mut tasks, 0, total, chunk_size);

        if self.cache.len() > 1 {
            let mut completed = Vec::new();
            let mut last_len = 0u64;

            for (&start, &end) in tasks.iter() {
                let key = start.to_be_bytes();
                let Ok(value) = self.cache.get(&key) else {
                    continue;
                };
                if value.len() != 8 {
                    continue;
                }
                let length = u64::from_be_bytes(value.try_into().unwrap());
                if length + start >= end {
                    completed.push(start);
                    last_len += length;
                }
            }

            tracing::info!(completed = completed.len(), "found cached completed chunks");
            for start in completed {
                tasks.remove(&start);
            }

            if let (Some(sink), Some(bar_id)) = (&self.sink, self.bar_id) {
                sink.set_current(bar_id, last_len);
            }
        }
        tasks
    }

    /// Persists `record.start -> record.offset_len()` (last-write-wins) and
    /// advances the UI bar by `record.data_len()` bytes.
    pub fn update_status(&self, record: &FileData) {
        let key = record.start.to_be_bytes();
        let value = record.offset_len().to_be_bytes();
        if let Err(err) = self.cache.set(&key, &value) {
            tracing::error!(error = %err, "failed to persist progress");
        }

        if let (Some(sink), Some(bar_id)) = (&self.sink, self.bar_id) {
            let mut last = self.last_update.lock().unwrap();
            let elapsed = last.elapsed();
            *last = Instant::now();
            sink.advance(bar_id, record.data_len() as u64, elapsed);
        }
    }

    pub fn close(self) -> crate::bitcask::Result<()> {
        self.cache.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_cache_fresh_seeds_status() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("movie.mp4");
        let tracker = ProgressTracker::init_cache(&target, "xz3", b"meta-v1", None, None).unwrap();
        assert_eq!(tracker.cache.get(STATUS_KEY).unwrap(), b"meta-v1");
    }

    #[test]
    fn init_cache_resumes_when_metadata_matches() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("movie.mp4");
        {
            let tracker =
                ProgressTracker::init_cache(&target, "xz3", b"meta-v1", None, None).unwrap();
            tracker.update_status(&FileData::new(10, b"hello", 0));
        }
        let tracker = ProgressTracker::init_cache(&target, "xz3", b"meta-v1", None, None).unwrap();
        assert_eq!(tracker.cache.len(), 2);
    }

    #[test]
    fn init_cache_resets_when_metadata_differs() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("movie.mp4");
        {
            let tracker =
                ProgressTracker::init_cache(&target, "xz3", b"meta-v1", None, None).unwrap();
            tracker.update_status(&FileData::new(10, b"hello", 0));
        }
        let tracker = ProgressTracker::init_cache(&target, "xz3", b"meta-v2", None, None).unwrap();
        assert_eq!(tracker.cache.len(), 1);
        assert_eq!(tracker.cache.get(STATUS_KEY).unwrap(), b"meta-v2");
    }

    #[test]
    fn get_tasks_removes_completed_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("movie.mp4");
        let tracker = ProgressTracker::init_cache(&target, "xz3", b"meta", None, None).unwrap();

        // Chunk [0,10) fully completed.
        tracker.update_status(&FileData::new(10, &vec![0u8; 10], 0));
        let residual = tracker.get_tasks(25, 10);
        assert_eq!(residual.len(), 2);
        assert!(!residual.contains_key(&0));
        assert!(residual.contains_key(&10));
        assert!(residual.contains_key(&20));
    }

    #[test]
    fn get_tasks_zero_total_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("movie.mp4");
        let tracker = ProgressTracker::init_cache(&target, "xz3", b"meta", None, None).unwrap();
        assert!(tracker.get_tasks(0, 10).is_empty());
    }
}
