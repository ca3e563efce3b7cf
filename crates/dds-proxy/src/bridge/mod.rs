// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bridges: the per-topic forwarding objects.
//!
//! A bridge owns one set of reader/writer endpoints across every participant
//! and moves samples between them through the shared payload pool. Data
//! topics get a [`DataBridge`]; RPC services get an [`RpcBridge`] that
//! additionally correlates requests and replies.

mod data;
mod registry;
mod rpc;

pub use data::DataBridge;
pub use registry::{RegistryEntry, ServiceRegistry};
pub use rpc::RpcBridge;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle of a bridge.
///
/// `Created → Enabled ⇄ Disabled → Destroyed`; endpoint creation happens
/// once, on the first enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Constructed, endpoints not yet created.
    Created,
    /// Forwarding.
    Enabled,
    /// Endpoints exist but forwarding is off.
    Disabled,
    /// Endpoints dropped; terminal.
    Destroyed,
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Forwarding counters of one bridge.
#[derive(Debug, Default)]
pub struct BridgeStats {
    pub samples_forwarded: AtomicU64,
    pub bytes_forwarded: AtomicU64,
    pub write_errors: AtomicU64,
}

impl BridgeStats {
    pub fn record_forward(&self, bytes: u64) {
        self.samples_forwarded.fetch_add(1, Ordering::Relaxed);
        self.bytes_forwarded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BridgeStatsSnapshot {
        BridgeStatsSnapshot {
            samples_forwarded: self.samples_forwarded.load(Ordering::Relaxed),
            bytes_forwarded: self.bytes_forwarded.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`BridgeStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeStatsSnapshot {
    pub samples_forwarded: u64,
    pub bytes_forwarded: u64,
    pub write_errors: u64,
}

/// The two bridge shapes the orchestrator owns.
pub enum Bridge {
    Data(DataBridge),
    Rpc(RpcBridge),
}

impl Bridge {
    pub fn enable(&self) -> crate::error::Result<()> {
        match self {
            Self::Data(bridge) => bridge.enable(),
            Self::Rpc(bridge) => bridge.enable(),
        }
    }

    pub fn disable(&self) {
        match self {
            Self::Data(bridge) => bridge.disable(),
            Self::Rpc(bridge) => bridge.disable(),
        }
    }

    pub fn state(&self) -> BridgeState {
        match self {
            Self::Data(bridge) => bridge.state(),
            Self::Rpc(bridge) => bridge.state(),
        }
    }

    pub fn stats(&self) -> BridgeStatsSnapshot {
        match self {
            Self::Data(bridge) => bridge.stats(),
            Self::Rpc(bridge) => bridge.stats(),
        }
    }

    pub fn as_rpc(&self) -> Option<&RpcBridge> {
        match self {
            Self::Rpc(bridge) => Some(bridge),
            Self::Data(_) => None,
        }
    }
}

impl fmt::Display for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(bridge) => bridge.fmt(f),
            Self::Rpc(bridge) => bridge.fmt(f),
        }
    }
}
