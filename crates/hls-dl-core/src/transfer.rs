//! Streams ranged (and whole-resource) GETs into the chunk writer's
//! channel, honoring pause and cancellation.
//!
//! Grounded on the original engine's `Transfer.DownloadPerThread`/
//! `DownloadMtiThread`: a manual read loop (here, libcurl's write callback
//! stands in for the Go `Read` loop) that spins at 1-second waits while the
//! enclosing job is paused, and a semaphore-bounded fan-out across ranges.

use crate::chunk_writer::{ChunkWriterHandle, FileData};
use crate::http_client::{DoOutcome, HttpClient, SegmentError};
use crate::task::{AtomicStatus, TaskStatus};
use crate::util::HeaderMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::sync_channel;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A transfer engine bound to one job: one URL, one client, one status
/// flag, one output channel.
pub struct Transfer {
    client: Arc<HttpClient>,
    url: String,
    headers: Arc<HeaderMap>,
    chunk_size: usize,
    status: Arc<AtomicStatus>,
    cancel: Arc<AtomicBool>,
}

impl Transfer {
    pub fn new(
        client: Arc<HttpClient>,
        url: String,
        headers: Arc<HeaderMap>,
        chunk_size: usize,
        status: Arc<AtomicStatus>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            client,
            url,
            headers,
            chunk_size,
            status,
            cancel,
        }
    }

    /// Streams `[start, end]` (inclusive) into `write`, or the whole
    /// resource unranged when `start == 0 && end == 0`. Reads stall (1s
    /// spin) while the job's status isn't `Running`; a cancelled job or a
    /// closed write channel end the transfer without error.
    pub fn download_one(
        &self,
        write: &ChunkWriterHandle,
        start: u64,
        end: u64,
    ) -> Result<(), SegmentError> {
        let range = if end != 0 { Some((start, end)) } else { None };
        let offset = std::sync::atomic::AtomicU64::new(start);

        let outcome = self.client.get(&self.url, &self.headers, range, |data| {
            if self.cancel.load(Ordering::SeqCst) {
                return false;
            }
            while self.status.load() != TaskStatus::Running {
                if self.cancel.load(Ordering::SeqCst) {
                    return false;
                }
                thread::sleep(Duration::from_secs(1));
            }

            if data.is_empty() {
                return true;
            }
            let pos = offset.load(Ordering::SeqCst);
            let record = FileData::new(pos, data, start);
            if write.send(record).is_err() {
                return false;
            }
            let new_offset = pos + data.len() as u64;
            offset.store(new_offset, Ordering::SeqCst);

            if end != 0 && new_offset > end {
                return false;
            }
            true
        })?;

        match outcome {
            DoOutcome::Cancelled => Ok(()),
            DoOutcome::Completed(code) if code == 200 || code == 206 => Ok(()),
            DoOutcome::Completed(code) => Err(SegmentError::Http(code)),
        }
    }

    /// Fans `ranges` out over up to `thread_size` concurrent
    /// `download_one` calls. Errors are last-writer-wins; the function
    /// waits for every range before returning.
    pub fn download_multi(
        self: &Arc<Self>,
        write: &ChunkWriterHandle,
        thread_size: usize,
        ranges: BTreeMap<u64, u64>,
    ) -> Result<(), SegmentError> {
        let thread_size = thread_size.max(1);
        let (permit_tx, permit_rx) = sync_channel::<()>(thread_size);
        for _ in 0..thread_size {
            permit_tx.send(()).unwrap();
        }

        let last_error: Arc<std::sync::Mutex<Option<SegmentError>>> =
            Arc::new(std::sync::Mutex::new(None));
        let mut handles = Vec::with_capacity(ranges.len());

        for (start, end) in ranges {
            if self.cancel.load(Ordering::SeqCst) {
                break;
            }
            permit_rx.recv().unwrap();

            let this = Arc::clone(self);
            let write = write.clone();
            let permit_tx = permit_tx.clone();
            let last_error = Arc::clone(&last_error);

            handles.push(thread::spawn(move || {
                if !this.cancel.load(Ordering::SeqCst) {
                    if let Err(err) = this.download_one(&write, start, end) {
                        tracing::error!(start, end, error = %err, "download_one failed");
                        *last_error.lock().unwrap() = Some(err);
                    }
                }
                let _ = permit_tx.send(());
            }));
        }

        for handle in handles {
            let _ = handle.join();
        }

        tracing::info!("download_multi exit");
        let result = last_error.lock().unwrap().take();
        match result {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_writer::ChunkWriter;

    fn running_transfer(url: &str) -> (Arc<Transfer>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(HttpClient::new(
            Duration::from_secs(5),
            0,
            Arc::new(AtomicBool::new(false)),
        ));
        let status = Arc::new(AtomicStatus::new(TaskStatus::Running));
        let transfer = Arc::new(Transfer::new(
            client,
            url.to_string(),
            Arc::new(HeaderMap::new()),
            8192,
            status,
            Arc::new(AtomicBool::new(false)),
        ));
        (transfer, dir)
    }

    #[test]
    fn download_one_against_unreachable_host_is_an_error() {
        let (transfer, _dir) = running_transfer("http://127.0.0.1:1");
        let dir = tempfile::tempdir().unwrap();
        let (writer, handle) = ChunkWriter::open(&dir.path().join("out.bin"), None).unwrap();
        thread::spawn(move || writer.run());
        let result = transfer.download_one(&handle, 0, 0);
        assert!(result.is_err());
    }

    #[test]
    fn download_one_cancelled_up_front_returns_ok() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = Arc::new(AtomicBool::new(true));
        let client = Arc::new(HttpClient::new(Duration::from_secs(5), 0, Arc::clone(&cancel)));
        let status = Arc::new(AtomicStatus::new(TaskStatus::Running));
        let transfer = Transfer::new(
            client,
            "http://127.0.0.1:1".to_string(),
            Arc::new(HeaderMap::new()),
            8192,
            status,
            cancel,
        );
        let (writer, handle) = ChunkWriter::open(&dir.path().join("out.bin"), None).unwrap();
        thread::spawn(move || writer.run());
        assert!(transfer.download_one(&handle, 0, 100).is_ok());
    }
}
