// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # dds-proxy
//!
//! A pub/sub proxy: samples published on a topic in one messaging
//! participant are delivered to matching subscribers on every other
//! participant, subject to a dynamic allow/block topic policy. Data topics
//! are forwarded many-to-many; RPC topics additionally correlate requests
//! and replies across participants.
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                          DdsProxy (facade)                         |
//! +--------------------------------------------------------------------+
//! |  DdsPipe: discovery-driven bridge lifecycle + topic policy          |
//! |    Bridge::Data  - one reader/writer pair per participant           |
//! |    Bridge::Rpc   - proxy client/server quartets + ServiceRegistry   |
//! +--------------------------------------------------------------------+
//! |  SlotThreadPool: pre-registered forwarding tasks, two priorities    |
//! |  PayloadPool:    refcounted zero-copy buffers, shared by bridges    |
//! +--------------------------------------------------------------------+
//! |  Participants (echo, ...): Readers in, Writers out, discovery up    |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dds_proxy::{DdsProxy, ProxyConfig};
//!
//! let config = ProxyConfig::from_file("DDS_PROXY_CONFIGURATION.yaml")?;
//! let proxy = DdsProxy::new(config)?;
//! proxy.start()?;
//! // ... reload_configuration() on file change, stop() on shutdown ...
//! proxy.stop();
//! # Ok::<(), dds_proxy::Error>(())
//! ```
//!
//! ## Concurrency model
//!
//! Plain preemptive threads, no async runtime: N pool workers execute
//! forwarding passes, transport threads only flag data and schedule task
//! ids, and one caller thread at a time drives discovery and reloads.
//! Lock order, outermost first: pipe state, bridge lifecycle, service
//! registry, payload pool. Workers never take the pipe lock.
//!
//! ## Observability
//!
//! The library emits `tracing` events and never installs a global
//! subscriber; the binary initializes `tracing_subscriber` once at startup.

pub mod bridge;
pub mod config;
pub mod discovery;
pub mod error;
pub mod filter;
pub mod participant;
pub mod payload;
pub mod pipe;
pub mod proxy;
pub mod reload;
pub mod role;
pub mod runtime;
pub mod types;

pub use config::{ConfigError, ProxyConfig};
pub use error::{Error, Result};
pub use filter::{AllowedTopicList, TopicFilter};
pub use payload::{Payload, PayloadPool};
pub use pipe::{DdsPipe, ReloadOutcome};
pub use proxy::DdsProxy;
pub use role::RoleCoordinator;
pub use runtime::{SlotThreadPool, TaskId};
pub use types::{Guid, ParticipantId, Sample, SampleIdentity, TopicId, TopicKind};

/// Configuration file used when none is given on the command line.
pub const DEFAULT_CONFIGURATION_FILE_NAME: &str = "DDS_PROXY_CONFIGURATION.yaml";

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
