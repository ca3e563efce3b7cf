// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Forwarding runtime: the slotted thread pool and its task queues.

mod slot_pool;
mod task_queue;

pub use slot_pool::{SlotThreadPool, Task, TaskId};
pub use task_queue::{ConsumedReason, PriorityTaskQueue, PRIORITY_LEVELS};

/// Maintenance work (registry sweeps) runs below forwarding work.
pub const PRIORITY_FORWARD: usize = 0;
/// See [`PRIORITY_FORWARD`].
pub const PRIORITY_MAINTENANCE: usize = 1;
