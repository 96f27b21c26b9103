//! Worker pool draining a rendezvous job channel, backed by a bitcask
//! status cache.
//!
//! Grounded on the original engine's `task.manager`: an ordered map of
//! live tasks, a channel of `*worker` records (here `Option<(name, task)>`,
//! a `None` standing in for the Go nil-shutdown-signal), and a cache that
//! is deleted on close only if every recorded task reached `Completed`.

use crate::bitcask::Bitcask;
use crate::task::{Task, TaskStatus, WorkInfo};
use crate::util::OrderedMap;
use std::path::Path;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

type WorkRecord = Option<(String, Arc<dyn Task>)>;

pub struct TaskManager {
    cache: Bitcask,
    tasks: OrderedMap<Arc<dyn Task>>,
    sender: Mutex<Option<SyncSender<WorkRecord>>>,
    receiver: Arc<Mutex<Receiver<WorkRecord>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: Mutex<usize>,
}

impl TaskManager {
    /// Opens (or creates) the status cache at `status_path` and starts
    /// `thread_size` (minimum 1) workers draining the job channel.
    pub fn new(status_path: &Path, thread_size: usize) -> crate::bitcask::Result<Arc<Self>> {
        let cache = Bitcask::open(status_path)?;
        let (sender, receiver) = sync_channel(0);
        let manager = Arc::new(Self {
            cache,
            tasks: OrderedMap::new(),
            sender: Mutex::new(Some(sender)),
            receiver: Arc::new(Mutex::new(receiver)),
            workers: Mutex::new(Vec::new()),
            worker_count: Mutex::new(0),
        });
        manager.spawn_workers(thread_size.max(1));
        Ok(manager)
    }

    fn spawn_workers(self: &Arc<Self>, n: usize) {
        let mut workers = self.workers.lock().unwrap();
        for _ in 0..n {
            let manager = Arc::clone(self);
            workers.push(thread::spawn(move || manager.worker_loop()));
        }
        *self.worker_count.lock().unwrap() += n;
    }

    fn worker_loop(self: Arc<Self>) {
        loop {
            let received = {
                let rx = self.receiver.lock().unwrap();
                rx.recv()
            };
            let Ok(Some((name, task))) = received else {
                return;
            };
            if let Err(err) = task.start() {
                tracing::error!(task = %name, error = %err, "task run failed");
            }
            self.persist(&name, &task);
            self.tasks.delete(&name);
        }
    }

    fn persist(&self, name: &str, task: &Arc<dyn Task>) {
        let info = WorkInfo {
            status: task.status(),
            extra: task.extra().unwrap_or_default(),
            type_name: task.type_name().to_string(),
        };
        match serde_json::to_vec(&info) {
            Ok(bytes) => {
                if let Err(err) = self.cache.set(name.as_bytes(), &bytes) {
                    tracing::error!(task = name, error = %err, "failed to persist task state");
                }
            }
            Err(err) => tracing::error!(task = name, error = %err, "failed to serialize task state"),
        }
    }

    /// Registers `task` under `name` and enqueues it for a worker. Errors
    /// if `name` is already in use, or if the manager has been closed.
    /// The enqueue blocks (rendezvous channel) until a worker is free —
    /// this is the pool's intended backpressure.
    pub fn new_task(&self, name: &str, task: Arc<dyn Task>) -> anyhow::Result<()> {
        if self.tasks.get(name).is_some() {
            anyhow::bail!("task {name} already exists");
        }
        self.tasks.set(name, Arc::clone(&task));
        self.persist(name, &task);

        let sender_guard = self.sender.lock().unwrap();
        let sender = sender_guard
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("task manager is closed"))?;
        sender
            .send(Some((name.to_string(), task)))
            .map_err(|_| anyhow::anyhow!("task manager is closed"))
    }

    pub fn get_task(&self, name: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(name)
    }

    pub fn exit_task(&self, name: &str) -> anyhow::Result<()> {
        self.tasks.get(name).map_or(Ok(()), |task| task.exit())
    }

    pub fn stop_task(&self, name: &str) -> anyhow::Result<()> {
        self.tasks.get(name).map_or(Ok(()), |task| task.stop())
    }

    pub fn resume_task(&self, name: &str) -> anyhow::Result<()> {
        self.tasks.get(name).map_or(Ok(()), |task| task.resume())
    }

    /// Stops every live task (insertion order); runs all of them even if
    /// one errors, returning the first error encountered, if any.
    pub fn stop_all(&self) -> anyhow::Result<()> {
        let mut first_err = None;
        for (_, task) in self.tasks.entries() {
            if let Err(err) = task.stop() {
                tracing::error!(error = %err, "stop failed");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    pub fn resume_all(&self) -> anyhow::Result<()> {
        let mut first_err = None;
        for (_, task) in self.tasks.entries() {
            if let Err(err) = task.resume() {
                tracing::error!(error = %err, "resume failed");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Snapshot of live tasks in insertion order.
    pub fn get_all(&self) -> Vec<(String, Arc<dyn Task>)> {
        self.tasks.entries()
    }

    /// Grows or shrinks the worker pool to `new_max_workers` (minimum 1).
    /// Shrinking sends shutdown signals rather than killing threads
    /// mid-task; the affected workers exit once they finish whatever
    /// they're running and next see a `None`.
    pub fn resize(self: &Arc<Self>, new_max_workers: usize) {
        let new_max_workers = new_max_workers.max(1);
        let mut count = self.worker_count.lock().unwrap();
        if new_max_workers == *count {
            return;
        }

        if new_max_workers > *count {
            let to_add = new_max_workers - *count;
            let mut workers = self.workers.lock().unwrap();
            for _ in 0..to_add {
                let manager = Arc::clone(self);
                workers.push(thread::spawn(move || manager.worker_loop()));
            }
        } else {
            let to_remove = *count - new_max_workers;
            if let Some(sender) = self.sender.lock().unwrap().as_ref() {
                for _ in 0..to_remove {
                    let _ = sender.send(None);
                }
            }
        }
        *count = new_max_workers;
    }

    /// Closes the job channel and waits for every worker to drain, then
    /// deletes the status cache if every task it recorded finished
    /// `Completed` — otherwise the cache is left for a future resume.
    pub fn close(&self) -> anyhow::Result<()> {
        self.sender.lock().unwrap().take();
        let handles: Vec<_> = self.workers.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
        self.clean_cache()
    }

    fn clean_cache(&self) -> anyhow::Result<()> {
        let mut incomplete = false;
        self.cache.fetch(|_key, value| {
            if let Ok(info) = serde_json::from_slice::<WorkInfo>(value) {
                if info.status != TaskStatus::Completed {
                    incomplete = true;
                    return true;
                }
            }
            false
        })?;
        if !incomplete {
            let _ = std::fs::remove_file(self.cache.path());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::AtomicStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingTask {
        status: AtomicStatus,
        started: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Task for CountingTask {
        fn status(&self) -> TaskStatus {
            self.status.load()
        }
        fn start(&self) -> anyhow::Result<()> {
            self.status.store(TaskStatus::Running);
            self.started.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            if self.fail {
                self.status.store(TaskStatus::Aborted);
                anyhow::bail!("boom");
            }
            self.status.store(TaskStatus::Completed);
            Ok(())
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
            Ok(())
        }
        fn extra(&self) -> anyhow::Result<Vec<u8>> {
            Ok(Vec::new())
        }
        fn type_name(&self) -> &'static str {
            "counting"
        }
    }

    fn task(started: &Arc<AtomicUsize>, fail: bool) -> Arc<dyn Task> {
        Arc::new(CountingTask {
            status: AtomicStatus::new(TaskStatus::Pending),
            started: Arc::clone(started),
            fail,
        })
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TaskManager::new(&dir.path().join("m.cache"), 2).unwrap();
        let started = Arc::new(AtomicUsize::new(0));
        manager.new_task("a", task(&started, false)).unwrap();
        assert!(manager.new_task("a", task(&started, false)).is_err());
        manager.close().unwrap();
    }

    #[test]
    fn cache_is_deleted_when_all_tasks_complete() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("m.cache");
        let manager = TaskManager::new(&cache_path, 3).unwrap();
        let started = Arc::new(AtomicUsize::new(0));
        for i in 0..5 {
            manager
                .new_task(&format!("t{i}"), task(&started, false))
                .unwrap();
        }
        manager.close().unwrap();
        assert_eq!(started.load(Ordering::SeqCst), 5);
        assert!(!cache_path.exists());
    }

    #[test]
    fn cache_survives_when_a_task_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("m.cache");
        let manager = TaskManager::new(&cache_path, 1).unwrap();
        let started = Arc::new(AtomicUsize::new(0));
        manager.new_task("ok", task(&started, false)).unwrap();
        manager.new_task("bad", task(&started, true)).unwrap();
        manager.close().unwrap();
        assert!(cache_path.exists());
    }

    #[test]
    fn resize_down_then_up_still_drains_all_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TaskManager::new(&dir.path().join("m.cache"), 4).unwrap();
        manager.resize(1);
        manager.resize(3);
        let started = Arc::new(AtomicUsize::new(0));
        for i in 0..6 {
            manager
                .new_task(&format!("t{i}"), task(&started, false))
                .unwrap();
        }
        manager.close().unwrap();
        assert_eq!(started.load(Ordering::SeqCst), 6);
    }
}
