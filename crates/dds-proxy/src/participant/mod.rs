// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Participant capability: the seam between the forwarding fabric and the
//! transports it bridges.
//!
//! A participant is one local endpoint of some transport. The fabric only
//! ever sees it through three traits: [`Participant`] produces
//! [`Reader`]s and [`Writer`]s for a topic; readers yield samples when
//! polled; writers consume them. External entities observed by a participant
//! are reported into the `DiscoveryDatabase`, never created through it.

mod database;
mod echo;
mod factory;

pub use database::ParticipantsDatabase;
pub use echo::{
    EchoParticipant, EchoPublisher, EchoRpcClient, EchoRpcServer, EchoSubscriber, ReceivedSample,
};
pub use factory::{CreatedParticipant, ParticipantFactory};

use crate::error::Result;
use crate::types::{Guid, ParticipantId, Sample, TopicId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Closed set of participant kinds the factory can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantKind {
    /// In-process loopback transport. Islands of publishers/subscribers that
    /// only the proxy connects.
    Echo,
    /// Generic pub/sub transport (wire protocol out of scope here).
    PubSub,
    /// Wire-transport-based participant (wire protocol out of scope here).
    WireTransport,
}

impl fmt::Display for ParticipantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Echo => f.write_str("echo"),
            Self::PubSub => f.write_str("pubsub"),
            Self::WireTransport => f.write_str("wire_transport"),
        }
    }
}

/// Non-blocking notification invoked by transport threads when a reader has
/// data. Implementations must only set a flag and schedule work.
pub type DataAvailableCallback = Box<dyn Fn() + Send + Sync>;

/// A local endpoint of some transport, able to create readers and writers.
pub trait Participant: Send + Sync {
    fn id(&self) -> &ParticipantId;

    fn kind(&self) -> ParticipantKind;

    /// Create a reader yielding the samples that arrive at this participant
    /// on `topic`.
    fn create_reader(&self, topic: &TopicId) -> Result<Arc<dyn Reader>>;

    /// Create a writer republishing samples into this participant on
    /// `topic`.
    fn create_writer(&self, topic: &TopicId) -> Result<Arc<dyn Writer>>;
}

/// Subscription endpoint for one topic inside one participant.
///
/// `take` hands out each sample exactly once. A reader is shared between the
/// participant that created it and the bridge that forwards through it.
pub trait Reader: Send + Sync {
    fn guid(&self) -> Guid;

    fn topic(&self) -> &TopicId;

    fn participant_id(&self) -> &ParticipantId;

    /// Take the next pending sample, if any. Never blocks.
    fn take(&self) -> Result<Option<Sample>>;

    /// Install the data-available callback. Replaces any previous one.
    fn set_data_callback(&self, callback: DataAvailableCallback);

    /// Remove the data-available callback (bridge teardown).
    fn clear_data_callback(&self);
}

/// Publication endpoint for one topic inside one participant.
pub trait Writer: Send + Sync {
    fn guid(&self) -> Guid;

    fn topic(&self) -> &TopicId;

    fn participant_id(&self) -> &ParticipantId;

    /// Publish one sample. May block on the transport.
    fn write(&self, sample: &Sample) -> Result<()>;
}
