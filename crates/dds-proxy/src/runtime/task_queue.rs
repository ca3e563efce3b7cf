// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Two-priority blocking task-id queue.
//!
//! Priority 0 is drained fully before priority 1 is polled: a consumer only
//! looks at priority 1 when priority 0 is empty. Producers never block.

use crate::error::{Error, Result};
use crate::runtime::TaskId;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Number of priority levels. Priority 0 beats priority 1.
pub const PRIORITY_LEVELS: usize = 2;

/// Why [`PriorityTaskQueue::wait_all_consumed`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumedReason {
    /// Priority 0 is empty.
    Drained,
    /// The timeout elapsed first.
    TimedOut,
    /// The queue was disabled while waiting.
    Disabled,
}

struct QueueState {
    queues: [VecDeque<TaskId>; PRIORITY_LEVELS],
    enabled: bool,
}

/// Blocking queue of task ids with two priorities.
pub struct PriorityTaskQueue {
    state: Mutex<QueueState>,
    /// Signaled on produce and on disable.
    available: Condvar,
    /// Signaled whenever priority 0 becomes empty.
    drained: Condvar,
}

impl PriorityTaskQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                queues: [VecDeque::new(), VecDeque::new()],
                enabled: true,
            }),
            available: Condvar::new(),
            drained: Condvar::new(),
        }
    }

    /// Enqueue `task_id` at `priority`.
    ///
    /// Returns `false` when the queue is disabled (the id is dropped).
    pub fn produce(&self, task_id: TaskId, priority: usize) -> bool {
        debug_assert!(priority < PRIORITY_LEVELS);
        let mut state = self.state.lock();
        if !state.enabled {
            return false;
        }
        state.queues[priority].push_back(task_id);
        drop(state);
        self.available.notify_one();
        true
    }

    /// Take the next task id, blocking while both queues are empty.
    ///
    /// Returns [`Error::Disabled`] as soon as the queue is closed; ids
    /// still queued at that point are kept, not handed out.
    pub fn consume(&self) -> Result<TaskId> {
        let mut state = self.state.lock();
        loop {
            if !state.enabled {
                return Err(Error::Disabled);
            }
            if let Some(task_id) = state.queues[0].pop_front() {
                if state.queues[0].is_empty() {
                    self.drained.notify_all();
                }
                return Ok(task_id);
            }
            if let Some(task_id) = state.queues[1].pop_front() {
                return Ok(task_id);
            }
            self.available.wait(&mut state);
        }
    }

    /// Close the queue: consumers stop taking ids, pending ids stay.
    pub fn disable(&self) {
        let mut state = self.state.lock();
        state.enabled = false;
        drop(state);
        self.available.notify_all();
        self.drained.notify_all();
    }

    /// Reopen a previously disabled queue.
    pub fn enable(&self) {
        self.state.lock().enabled = true;
    }

    /// Wait until priority 0 is empty, the timeout elapses, or the queue is
    /// disabled. A zero timeout waits without limit.
    pub fn wait_all_consumed(&self, timeout: Duration) -> ConsumedReason {
        let deadline = if timeout.is_zero() {
            None
        } else {
            Some(Instant::now() + timeout)
        };

        let mut state = self.state.lock();
        loop {
            if state.queues[0].is_empty() {
                return ConsumedReason::Drained;
            }
            if !state.enabled {
                return ConsumedReason::Disabled;
            }
            match deadline {
                Some(deadline) => {
                    if self.drained.wait_until(&mut state, deadline).timed_out() {
                        return if state.queues[0].is_empty() {
                            ConsumedReason::Drained
                        } else {
                            ConsumedReason::TimedOut
                        };
                    }
                }
                None => self.drained.wait(&mut state),
            }
        }
    }
}

impl Default for PriorityTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_within_priority() {
        let queue = PriorityTaskQueue::new();
        queue.produce(TaskId(1), 0);
        queue.produce(TaskId(2), 0);
        queue.produce(TaskId(3), 0);

        assert_eq!(queue.consume().expect("task"), TaskId(1));
        assert_eq!(queue.consume().expect("task"), TaskId(2));
        assert_eq!(queue.consume().expect("task"), TaskId(3));
    }

    #[test]
    fn test_priority_zero_first() {
        let queue = PriorityTaskQueue::new();
        queue.produce(TaskId(10), 1);
        queue.produce(TaskId(1), 0);
        queue.produce(TaskId(11), 1);
        queue.produce(TaskId(2), 0);

        assert_eq!(queue.consume().expect("task"), TaskId(1));
        assert_eq!(queue.consume().expect("task"), TaskId(2));
        assert_eq!(queue.consume().expect("task"), TaskId(10));
        assert_eq!(queue.consume().expect("task"), TaskId(11));
    }

    #[test]
    fn test_consume_blocks_until_produce() {
        let queue = Arc::new(PriorityTaskQueue::new());
        let producer = Arc::clone(&queue);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.produce(TaskId(7), 0);
        });

        assert_eq!(queue.consume().expect("task"), TaskId(7));
        handle.join().expect("producer");
    }

    #[test]
    fn test_disable_unblocks_consumer() {
        let queue = Arc::new(PriorityTaskQueue::new());
        let closer = Arc::clone(&queue);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            closer.disable();
        });

        assert!(matches!(queue.consume(), Err(Error::Disabled)));
        handle.join().expect("closer");
    }

    #[test]
    fn test_produce_on_disabled_is_dropped() {
        let queue = PriorityTaskQueue::new();
        queue.disable();
        assert!(!queue.produce(TaskId(1), 0));
    }

    #[test]
    fn test_wait_all_consumed() {
        let queue = Arc::new(PriorityTaskQueue::new());
        queue.produce(TaskId(1), 0);

        assert_eq!(
            queue.wait_all_consumed(Duration::from_millis(10)),
            ConsumedReason::TimedOut
        );

        queue.consume().expect("task");
        assert_eq!(
            queue.wait_all_consumed(Duration::from_millis(10)),
            ConsumedReason::Drained
        );
    }
}
