// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Proxy errors.
//!
//! Constructors fail synchronously and surface errors to the caller. Runtime
//! event handlers (discovery, data-available) never propagate: they log and
//! mark state instead.

use crate::runtime::TaskId;
use thiserror::Error;

/// Result alias for proxy operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Proxy errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or unsupported configuration. Fatal to the current load
    /// attempt, never to an already-running proxy.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Endpoint or participant creation failed; the owning bridge stays
    /// disabled.
    #[error("initialization error: {0}")]
    Initialization(String),

    /// Duplicate participant id or duplicate task slot. Fatal at
    /// construction.
    #[error("inconsistency: {0}")]
    Inconsistency(String),

    /// Emit on a task id that was never registered.
    #[error("task slot {0} not registered")]
    UnknownSlot(TaskId),

    /// Consume on a stopped queue; internal signal that ends a worker loop.
    #[error("queue disabled")]
    Disabled,

    /// A writer failed to publish. Logged per peer; delivery to other peers
    /// proceeds.
    #[error("transport error: {0}")]
    Transport(String),

    /// Operation not implemented for this participant kind.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Payload pool refused an allocation (hard cap reached).
    #[error("payload pool exhausted: requested {requested} bytes")]
    PoolExhausted { requested: usize },

    /// A payload handle was released more than once.
    #[error("payload released twice (handle {0})")]
    DoubleRelease(u32),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
