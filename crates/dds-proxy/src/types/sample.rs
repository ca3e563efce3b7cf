// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sample: one delivered unit of user data plus its metadata.

use crate::payload::Payload;
use crate::types::Guid;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Participant identifier, unique within a process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Reliability kind of a writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reliability {
    #[default]
    BestEffort,
    Reliable,
}

/// Durability kind of a writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    #[default]
    Volatile,
    TransientLocal,
}

/// Forwarding-relevant QoS of a writer, carried with every sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QosSnapshot {
    pub reliability: Reliability,
    pub durability: Durability,
}

impl QosSnapshot {
    /// RPC endpoints are reliable + volatile: a request sent with no server
    /// listening is lost, which is why service bridges gate on availability.
    pub fn rpc() -> Self {
        Self {
            reliability: Reliability::Reliable,
            durability: Durability::Volatile,
        }
    }
}

/// Instance liveliness carried by a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleKind {
    #[default]
    Alive,
    NotAlive,
}

/// Unique identifier of a written sample: writer GUID + sequence number.
///
/// Used for request/reply correlation across participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SampleIdentity {
    pub writer_guid: Guid,
    pub sequence_number: i64,
}

impl SampleIdentity {
    pub fn new(writer_guid: Guid, sequence_number: i64) -> Self {
        Self {
            writer_guid,
            sequence_number,
        }
    }

    /// Zero/null identity.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.writer_guid.is_zero() && self.sequence_number == 0
    }
}

impl fmt::Display for SampleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.writer_guid, self.sequence_number)
    }
}

/// Write parameters carried by RPC samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteParams {
    /// Identity of this sample.
    pub sample_identity: SampleIdentity,
    /// Identity of the request this sample answers (replies only).
    pub related_sample_identity: SampleIdentity,
}

/// One delivered unit: pooled payload bytes plus metadata.
///
/// While a sample traverses a bridge, `receiver_participant` names the
/// participant that took it from the wire; it is never equal to the
/// participant a bridge republishes it through.
#[derive(Debug)]
pub struct Sample {
    pub payload: Payload,
    pub source_guid: Guid,
    /// Source timestamp, nanoseconds since the UNIX epoch.
    pub source_timestamp_ns: u64,
    pub kind: SampleKind,
    /// Opaque key bytes of the instance this sample belongs to.
    pub instance_handle: Vec<u8>,
    pub writer_qos: QosSnapshot,
    /// Participant that received this sample from its transport.
    pub receiver_participant: ParticipantId,
    /// Present on RPC samples only.
    pub write_params: Option<WriteParams>,
}

impl Sample {
    /// Identity of this sample, if it carries write parameters.
    pub fn identity(&self) -> Option<SampleIdentity> {
        self.write_params.map(|wp| wp.sample_identity)
    }

    /// Related identity of this sample, if it carries write parameters.
    pub fn related_identity(&self) -> Option<SampleIdentity> {
        self.write_params.map(|wp| wp.related_sample_identity)
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sample{{{} bytes; from {}; via {}}}",
            self.payload.len(),
            self.source_guid,
            self.receiver_participant
        )
    }
}
