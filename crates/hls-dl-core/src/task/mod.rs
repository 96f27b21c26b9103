//! The task lifecycle: a small state machine plus the trait every
//! schedulable unit of work (a download job, a playlist job) implements.
//!
//! Grounded on the original engine's `task.Task`/`task.Status`/
//! `task.NewTaskMap`, reimagined as an explicit registry value instead of a
//! package-level global map.

use crate::config::DownloadConfig;
use crate::progress_sink::ProgressSink;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum TaskStatus {
    Pending = 0,
    Running = 1,
    Paused = 2,
    Completed = 3,
    Aborted = 4,
}

impl TaskStatus {
    fn from_i32(v: i32) -> Self {
        match v {
            0 => TaskStatus::Pending,
            1 => TaskStatus::Running,
            2 => TaskStatus::Paused,
            3 => TaskStatus::Completed,
            _ => TaskStatus::Aborted,
        }
    }
}

/// An atomically readable/writable [`TaskStatus`], shared between a task's
/// worker thread and whoever calls `stop`/`resume`/inspects progress.
#[derive(Debug)]
pub struct AtomicStatus(AtomicI32);

impl AtomicStatus {
    pub fn new(initial: TaskStatus) -> Self {
        Self(AtomicI32::new(initial as i32))
    }

    pub fn load(&self) -> TaskStatus {
        TaskStatus::from_i32(self.0.load(Ordering::SeqCst))
    }

    pub fn store(&self, status: TaskStatus) {
        self.0.store(status as i32, Ordering::SeqCst);
    }
}

/// One schedulable unit of work submitted to a [`crate::task_manager::TaskManager`].
pub trait Task: Send + Sync {
    fn status(&self) -> TaskStatus;
    /// Runs the task to completion (blocking). Called once by a worker
    /// thread; returning hands the worker back to the pool.
    fn start(&self) -> anyhow::Result<()>;
    /// Requests a soft pause; the task's own run loop polls for this.
    fn stop(&self) -> anyhow::Result<()>;
    fn resume(&self) -> anyhow::Result<()>;
    /// Requests the task abandon its work and return from `start` promptly.
    fn exit(&self) -> anyhow::Result<()>;
    /// Opaque resumption state, persisted alongside `status`/`type_name`.
    fn extra(&self) -> anyhow::Result<Vec<u8>>;
    fn type_name(&self) -> &'static str;
}

/// Persisted per-task record in the task manager's cache.
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkInfo {
    pub status: TaskStatus,
    pub extra: Vec<u8>,
    #[serde(rename = "type")]
    pub type_name: String,
}

type Factory = Box<
    dyn Fn(&Arc<DownloadConfig>, Option<Arc<dyn ProgressSink>>, &[u8]) -> anyhow::Result<Box<dyn Task>>
        + Send
        + Sync,
>;

/// A `Type -> factory` table for reconstructing tasks from a cache's
/// `WorkInfo.extra` payload. An explicit value rather than a process-global
/// map, per idiomatic Rust. A factory takes the same inputs the original's
/// `task.NewTaskMap` entries take (`ctx, displayOpt, cfg, value`), minus
/// `ctx` (a reconstructed job owns its own cancellation flag): `cfg` and
/// `sink` carry the ambient config/UI a job needs, `extra` is the persisted
/// `WorkInfo.extra` payload (e.g. `DownloadJob::from_cache`'s input).
/// No production caller invokes `create` yet (the playlist pipeline always
/// re-enqueues from a freshly parsed manifest rather than resuming from
/// this registry), but the capability is specified and kept available for
/// a future caller.
pub struct TaskRegistry {
    factories: HashMap<&'static str, Factory>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, type_name: &'static str, factory: F)
    where
        F: Fn(&Arc<DownloadConfig>, Option<Arc<dyn ProgressSink>>, &[u8]) -> anyhow::Result<Box<dyn Task>>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(type_name, Box::new(factory));
    }

    pub fn create(
        &self,
        type_name: &str,
        cfg: &Arc<DownloadConfig>,
        sink: Option<Arc<dyn ProgressSink>>,
        extra: &[u8],
    ) -> anyhow::Result<Box<dyn Task>> {
        let factory = self
            .factories
            .get(type_name)
            .ok_or_else(|| anyhow::anyhow!("no task factory registered for type {type_name}"))?;
        factory(cfg, sink, extra)
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}
