// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic identity types.
//!
//! A [`TopicId`] identifies one forwarding channel: name, type name and kind.
//! RPC services are carried over a pair of topics derived from the service
//! name with the `rq/` (request) and `rr/` (reply) prefixes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of request topics of an RPC service.
pub const REQUEST_TOPIC_PREFIX: &str = "rq/";
/// Prefix of reply topics of an RPC service.
pub const REPLY_TOPIC_PREFIX: &str = "rr/";

/// What a topic carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TopicKind {
    /// Plain data samples, many-to-many, unidirectional.
    #[default]
    Data,
    /// Requests of an RPC service.
    RpcRequest,
    /// Replies of an RPC service.
    RpcReply,
}

/// Structural topic identity.
///
/// Equality is structural: two `TopicId`s are the same topic iff name, type
/// name and kind all match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicId {
    /// Topic name.
    pub name: String,
    /// Type name of the payload carried on this topic.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Topic kind.
    #[serde(default)]
    pub kind: TopicKind,
}

impl TopicId {
    /// Create a data topic.
    pub fn data(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            kind: TopicKind::Data,
        }
    }

    /// Whether this topic belongs to an RPC service.
    pub fn is_rpc(&self) -> bool {
        !matches!(self.kind, TopicKind::Data)
    }

    /// Service name for RPC topics (topic name with the `rq/`/`rr/` prefix
    /// stripped). Returns `None` for data topics.
    pub fn service_name(&self) -> Option<&str> {
        match self.kind {
            TopicKind::Data => None,
            TopicKind::RpcRequest => self
                .name
                .strip_prefix(REQUEST_TOPIC_PREFIX)
                .or(Some(&self.name)),
            TopicKind::RpcReply => self
                .name
                .strip_prefix(REPLY_TOPIC_PREFIX)
                .or(Some(&self.name)),
        }
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.type_name)
    }
}

/// Topic pair of an RPC service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RpcTopic {
    /// Service name, without prefixes.
    pub service_name: String,
    /// Request topic (`rq/<service>`).
    pub request_topic: TopicId,
    /// Reply topic (`rr/<service>`).
    pub reply_topic: TopicId,
}

impl RpcTopic {
    /// Build the topic pair of a service.
    pub fn new(service_name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let service_name = service_name.into();
        let type_name = type_name.into();
        Self {
            request_topic: TopicId {
                name: format!("{REQUEST_TOPIC_PREFIX}{service_name}"),
                type_name: type_name.clone(),
                kind: TopicKind::RpcRequest,
            },
            reply_topic: TopicId {
                name: format!("{REPLY_TOPIC_PREFIX}{service_name}"),
                type_name,
                kind: TopicKind::RpcReply,
            },
            service_name,
        }
    }

    /// Reconstruct the service topic pair from either of its topics.
    ///
    /// Returns `None` for data topics.
    pub fn from_topic(topic: &TopicId) -> Option<Self> {
        let service = topic.service_name()?;
        Some(Self::new(service, topic.type_name.clone()))
    }
}

impl fmt::Display for RpcTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.service_name, self.request_topic.type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_structural_equality() {
        let a = TopicId::data("chatter", "String");
        let b = TopicId::data("chatter", "String");
        let c = TopicId::data("chatter", "Int32");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_rpc_topic_pair() {
        let rpc = RpcTopic::new("add", "AddTwoInts");

        assert_eq!(rpc.request_topic.name, "rq/add");
        assert_eq!(rpc.reply_topic.name, "rr/add");
        assert_eq!(rpc.request_topic.kind, TopicKind::RpcRequest);
        assert_eq!(rpc.reply_topic.kind, TopicKind::RpcReply);
    }

    #[test]
    fn test_rpc_topic_from_either_side() {
        let rpc = RpcTopic::new("add", "AddTwoInts");

        let from_request = RpcTopic::from_topic(&rpc.request_topic).expect("request side");
        let from_reply = RpcTopic::from_topic(&rpc.reply_topic).expect("reply side");

        assert_eq!(from_request, rpc);
        assert_eq!(from_reply, rpc);
        assert!(RpcTopic::from_topic(&TopicId::data("chatter", "String")).is_none());
    }

    #[test]
    fn test_service_name() {
        let rpc = RpcTopic::new("add", "AddTwoInts");
        assert_eq!(rpc.request_topic.service_name(), Some("add"));
        assert_eq!(rpc.reply_topic.service_name(), Some("add"));
        assert_eq!(TopicId::data("add", "AddTwoInts").service_name(), None);
    }
}
