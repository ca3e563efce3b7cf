// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Thread pool executing pre-registered tasks by id.
//!
//! Tasks are registered once under a [`TaskId`] and scheduled by emitting
//! that id onto one of two priority queues. Ids are much cheaper to copy and
//! queue than task objects, and re-emitting the same id is how bridges keep
//! at most one forwarding pass in flight per reader.

use crate::error::{Error, Result};
use crate::runtime::task_queue::{ConsumedReason, PriorityTaskQueue};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Identifier of one registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

impl TaskId {
    /// Allocate a process-unique task id.
    pub fn unique() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered task body.
pub type Task = Arc<dyn Fn() + Send + Sync>;

type SlotMap = Arc<Mutex<HashMap<TaskId, Task>>>;

/// Fixed pool of worker threads consuming registered task ids.
///
/// Created disabled; [`enable`](Self::enable) spawns the workers. Emitting
/// onto a disabled pool is a silent drop (the caller observes the disable
/// separately); emitting an unregistered id is an error.
pub struct SlotThreadPool {
    num_threads: usize,
    slots: SlotMap,
    queue: Arc<PriorityTaskQueue>,
    enabled: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl SlotThreadPool {
    /// Create a pool with `num_threads` workers (not yet running).
    pub fn new(num_threads: usize) -> Self {
        tracing::debug!("creating thread pool with {num_threads} threads");
        Self {
            num_threads: num_threads.max(1),
            slots: Arc::new(Mutex::new(HashMap::new())),
            queue: Arc::new(PriorityTaskQueue::new()),
            enabled: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Register `task` under `task_id`. Duplicate registration is rejected.
    pub fn register(&self, task_id: TaskId, task: Task) -> Result<()> {
        let mut slots = self.slots.lock();
        if slots.contains_key(&task_id) {
            return Err(Error::Inconsistency(format!(
                "task slot {task_id} already registered"
            )));
        }
        slots.insert(task_id, task);
        Ok(())
    }

    /// Remove a registered task. Pending emissions of the id become no-ops.
    pub fn unregister(&self, task_id: TaskId) {
        self.slots.lock().remove(&task_id);
    }

    /// Schedule `task_id` at priority 0.
    pub fn emit(&self, task_id: TaskId) -> Result<()> {
        self.emit_with_priority(task_id, 0)
    }

    /// Schedule `task_id` at the given priority (0 beats 1).
    ///
    /// Emitting onto a disabled pool drops the id silently.
    pub fn emit_with_priority(&self, task_id: TaskId, priority: usize) -> Result<()> {
        if priority >= crate::runtime::PRIORITY_LEVELS {
            return Err(Error::Inconsistency(format!(
                "priority {priority} not allowed"
            )));
        }
        if !self.slots.lock().contains_key(&task_id) {
            return Err(Error::UnknownSlot(task_id));
        }
        self.queue.produce(task_id, priority);
        Ok(())
    }

    /// Spawn the worker threads. Idempotent.
    pub fn enable(&self) {
        if self.enabled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.queue.enable();

        let mut workers = self.workers.lock();
        for index in 0..self.num_threads {
            let queue = Arc::clone(&self.queue);
            let slots = Arc::clone(&self.slots);
            match std::thread::Builder::new()
                .name(format!("proxy-worker-{index}"))
                .spawn(move || worker_routine(&queue, &slots))
            {
                Ok(handle) => workers.push(handle),
                Err(err) => tracing::error!("failed to spawn worker thread: {err}"),
            }
        }
    }

    /// Close the queues and join every worker. Idempotent.
    ///
    /// Workers exit as soon as their current task returns.
    pub fn disable(&self) {
        if !self.enabled.swap(false, Ordering::AcqRel) {
            return;
        }
        self.queue.disable();

        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
    }

    /// Whether the workers are running.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Wait until priority 0 has drained or `timeout` elapses (zero timeout
    /// waits without limit).
    pub fn wait_all_consumed(&self, timeout: Duration) -> ConsumedReason {
        self.queue.wait_all_consumed(timeout)
    }
}

impl Drop for SlotThreadPool {
    fn drop(&mut self) {
        self.disable();
    }
}

impl fmt::Debug for SlotThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotThreadPool")
            .field("num_threads", &self.num_threads)
            .field("slots", &self.slots.lock().len())
            .field("enabled", &self.enabled.load(Ordering::Relaxed))
            .finish()
    }
}

fn worker_routine(queue: &PriorityTaskQueue, slots: &Mutex<HashMap<TaskId, Task>>) {
    loop {
        let task_id = match queue.consume() {
            Ok(task_id) => task_id,
            Err(_) => break, // queue disabled
        };

        // Clone the task out so the slot map is not held during execution.
        let task = slots.lock().get(&task_id).cloned();
        match task {
            Some(task) => task(),
            // Unregistered between emit and consume: benign.
            None => tracing::debug!("task {task_id} no longer registered, skipping"),
        }
    }
}
