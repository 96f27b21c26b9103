//! A single download job: one URL, one output file, one progress log.
//!
//! Grounded on the original engine's `download.Job`/`Job.work`: probe the
//! resource once, decide ranged-vs-single based on `Accept-Ranges` and
//! size, hand the chosen path to a [`crate::transfer::Transfer`] feeding a
//! [`crate::chunk_writer::ChunkWriter`].

use crate::chunk_writer::ChunkWriter;
use crate::config::DownloadConfig;
use crate::http_client::HttpClient;
use crate::progress::ProgressTracker;
use crate::progress_sink::ProgressSink;
use crate::task::{AtomicStatus, Task, TaskStatus};
use crate::transfer::Transfer;
use crate::util::{generate_unique_filename, HeaderMap};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const JOB_TYPE: &str = "download";
const STATUS_SUFFIX: &str = "xz3";

/// Resumption metadata, persisted both as a task manager record (`extra`)
/// and as the progress log's `status` entry, field-named to match the
/// original engine's wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    #[serde(rename = "Url")]
    pub url: String,
    #[serde(rename = "FileName")]
    pub file_name: String,
    #[serde(rename = "SourceFile")]
    pub source_file: String,
}

pub struct DownloadJob {
    cfg: Arc<DownloadConfig>,
    info: JobInfo,
    client: Arc<HttpClient>,
    headers: Arc<HeaderMap>,
    status: Arc<AtomicStatus>,
    cancel: Arc<AtomicBool>,
    sink: Option<Arc<dyn ProgressSink>>,
    last_err: Mutex<Option<String>>,
}

impl DownloadJob {
    /// Builds a fresh job for `url`, writing to `filename` unless `force`
    /// is false and a unique name must be derived to avoid colliding with
    /// an existing file or its stale progress log.
    pub fn new(
        url: String,
        filename: String,
        force: bool,
        cfg: Arc<DownloadConfig>,
        sink: Option<Arc<dyn ProgressSink>>,
    ) -> Self {
        let source = filename.clone();
        let resolved = if force {
            filename
        } else {
            generate_unique_filename(std::path::Path::new(&filename), STATUS_SUFFIX)
                .to_string_lossy()
                .into_owned()
        };
        Self::from_info(
            JobInfo {
                url,
                file_name: resolved,
                source_file: source,
            },
            cfg,
            sink,
        )
    }

    /// Rebuilds a job from a cached [`JobInfo`] (e.g. a task manager
    /// `extra` payload), for resuming a download that was interrupted
    /// before completion.
    pub fn from_cache(
        extra: &[u8],
        cfg: Arc<DownloadConfig>,
        sink: Option<Arc<dyn ProgressSink>>,
    ) -> anyhow::Result<Self> {
        let info: JobInfo = serde_json::from_slice(extra)?;
        Ok(Self::from_info(info, cfg, sink))
    }

    fn from_info(info: JobInfo, cfg: Arc<DownloadConfig>, sink: Option<Arc<dyn ProgressSink>>) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let client = Arc::new(HttpClient::new(
            Duration::from_secs(cfg.conn_timeout),
            cfg.retry_count,
            Arc::clone(&cancel),
        ));
        let mut headers = HeaderMap::new();
        for (k, v) in &cfg.headers {
            headers.set(k, v);
        }
        Self {
            cfg,
            info,
            client,
            headers: Arc::new(headers),
            status: Arc::new(AtomicStatus::new(TaskStatus::Pending)),
            cancel,
            sink,
            last_err: Mutex::new(None),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.info.file_name
    }

    fn work(&self) -> anyhow::Result<()> {
        let probe = self.client.probe(&self.info.url, &self.headers)?;
        let Some(probe) = probe else {
            return Ok(()); // cancelled before the opening request ran.
        };
        if probe.status != 200 {
            anyhow::bail!("{} responded with status {}", self.info.url, probe.status);
        }

        let content_length = probe.content_length.unwrap_or(0);
        tracing::info!(
            content_length,
            accepts_ranges = probe.accepts_ranges,
            "opening request resolved"
        );

        let bar_id = self
            .sink
            .as_ref()
            .map(|sink| sink.add_bar(&self.info.file_name, content_length));

        let ranged = probe.accepts_ranges
            && content_length > self.cfg.chunk_size
            && self.cfg.thread_size > 1;

        let metadata = serde_json::to_vec(&self.info)?;
        let progress = if ranged {
            Some(Arc::new(ProgressTracker::init_cache(
                std::path::Path::new(&self.info.source_file),
                STATUS_SUFFIX,
                &metadata,
                self.sink.as_ref().map(|s| dyn_clone_sink(s)),
                bar_id,
            )?))
        } else {
            None
        };

        let (writer, handle) = ChunkWriter::open(
            std::path::Path::new(&self.info.file_name),
            progress.clone(),
        )?;
        let writer_join = std::thread::spawn(move || writer.run());

        let transfer = Arc::new(Transfer::new(
            Arc::clone(&self.client),
            self.info.url.clone(),
            Arc::clone(&self.headers),
            self.cfg.chunk_size as usize,
            Arc::clone(&self.status),
            Arc::clone(&self.cancel),
        ));

        let result = if ranged {
            let tasks = progress
                .as_ref()
                .expect("progress tracker initialized for ranged path")
                .get_tasks(content_length, self.cfg.chunk_size);
            if tasks.is_empty() {
                tracing::info!("download already complete per cached progress");
                Ok(())
            } else {
                tracing::info!(remaining = tasks.len(), "resuming ranged download");
                transfer
                    .download_multi(&handle, self.cfg.thread_size, tasks)
                    .map_err(anyhow::Error::from)
            }
        } else {
            tracing::info!("starting single-stream download");
            transfer
                .download_one(&handle, 0, 0)
                .map_err(anyhow::Error::from)
        };

        crate::chunk_writer::exit(handle);
        let _ = writer_join.join();

        if let Some(progress) = progress {
            if let Ok(tracker) = Arc::try_unwrap(progress) {
                let _ = tracker.close();
            }
        }

        if self.cancel.load(Ordering::SeqCst) {
            if let Some(bar_id) = bar_id {
                if let Some(sink) = &self.sink {
                    sink.abort(bar_id);
                }
            }
            tracing::warn!("download job cancelled");
            return Ok(());
        }

        match &result {
            Ok(()) => {
                if let Some(bar_id) = bar_id {
                    if let Some(sink) = &self.sink {
                        sink.complete(bar_id);
                    }
                }
            }
            Err(err) => {
                *self.last_err.lock().unwrap() = Some(err.to_string());
                if let Some(bar_id) = bar_id {
                    if let Some(sink) = &self.sink {
                        sink.abort(bar_id);
                    }
                }
                // An error with the context still live invalidates whatever
                // partial state is cached; remove it so a rebooted attempt
                // starts fresh rather than trusting stale ranges.
                let cache_path =
                    std::path::Path::new(&self.info.source_file).with_extension(STATUS_SUFFIX);
                let _ = std::fs::remove_file(&cache_path);
            }
        }
        result
    }
}

/// [`ProgressSink`] trait objects aren't `Clone`; this threads the same
/// `Arc` through as a boxed reference so [`ProgressTracker::init_cache`]
/// can keep its non-`Arc` signature while the job keeps its own handle for
/// completion/abort calls.
fn dyn_clone_sink(sink: &Arc<dyn ProgressSink>) -> Box<dyn ProgressSink> {
    Box::new(SinkRef(Arc::clone(sink)))
}

struct SinkRef(Arc<dyn ProgressSink>);

impl ProgressSink for SinkRef {
    fn add_bar(&self, name: &str, total: u64) -> crate::progress_sink::BarId {
        self.0.add_bar(name, total)
    }
    fn set_current(&self, bar: crate::progress_sink::BarId, current: u64) {
        self.0.set_current(bar, current);
    }
    fn advance(&self, bar: crate::progress_sink::BarId, delta: u64, elapsed: Duration) {
        self.0.advance(bar, delta, elapsed);
    }
    fn complete(&self, bar: crate::progress_sink::BarId) {
        self.0.complete(bar);
    }
    fn abort(&self, bar: crate::progress_sink::BarId) {
        self.0.abort(bar);
    }
}

impl Task for DownloadJob {
    fn status(&self) -> TaskStatus {
        self.status.load()
    }

    fn start(&self) -> anyhow::Result<()> {
        self.status.store(TaskStatus::Running);
        let result = self.work();

        if self.status.load() == TaskStatus::Running {
            let final_status = if result.is_ok() {
                TaskStatus::Completed
            } else {
                TaskStatus::Aborted
            };
            self.status.store(final_status);
        }
        self.cancel.store(true, Ordering::SeqCst);
        result
    }

    fn stop(&self) -> anyhow::Result<()> {
        self.status.store(TaskStatus::Paused);
        Ok(())
    }

    fn resume(&self) -> anyhow::Result<()> {
        self.status.store(TaskStatus::Running);
        Ok(())
    }

    fn exit(&self) -> anyhow::Result<()> {
        self.cancel.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn extra(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.info)?)
    }

    fn type_name(&self) -> &'static str {
        JOB_TYPE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_keeps_name_when_force() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("movie.mp4");
        std::fs::write(&target, b"existing").unwrap();
        let job = DownloadJob::new(
            "http://example.invalid/movie.mp4".to_string(),
            target.to_string_lossy().into_owned(),
            true,
            Arc::new(DownloadConfig::default()),
            None,
        );
        assert_eq!(job.file_name(), target.to_string_lossy());
    }

    #[test]
    fn new_job_derives_unique_name_when_target_exists() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("movie.mp4");
        std::fs::write(&target, b"existing").unwrap();
        let job = DownloadJob::new(
            "http://example.invalid/movie.mp4".to_string(),
            target.to_string_lossy().into_owned(),
            false,
            Arc::new(DownloadConfig::default()),
            None,
        );
        assert_eq!(job.file_name(), dir.path().join("movie_1.mp4").to_string_lossy());
    }

    #[test]
    fn extra_round_trips_through_from_cache() {
        let job = DownloadJob::new(
            "http://example.invalid/movie.mp4".to_string(),
            "/tmp/does-not-matter.mp4".to_string(),
            true,
            Arc::new(DownloadConfig::default()),
            None,
        );
        let extra = job.extra().unwrap();
        let rebuilt = DownloadJob::from_cache(&extra, Arc::new(DownloadConfig::default()), None).unwrap();
        assert_eq!(rebuilt.file_name(), job.file_name());
        assert_eq!(rebuilt.status(), TaskStatus::Pending);
    }

    #[test]
    fn unreachable_host_aborts_and_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("movie.mp4");
        let mut cfg = DownloadConfig::default();
        cfg.retry_count = 0;
        let job = DownloadJob::new(
            "http://127.0.0.1:1/movie.mp4".to_string(),
            target.to_string_lossy().into_owned(),
            true,
            Arc::new(cfg),
            None,
        );
        assert!(job.start().is_err());
        assert_eq!(job.status(), TaskStatus::Aborted);
    }
}
