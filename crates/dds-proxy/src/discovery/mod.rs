// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery database: the in-memory index of observed endpoints.
//!
//! Participants report the external entities they see (publishers,
//! subscribers, servers, clients); the orchestrator subscribes to the
//! add/update/remove notifications and drives bridge lifecycle from them.
//! The proxy's own endpoints are never inserted here.

use crate::types::{Guid, ParticipantId, QosSnapshot, TopicId, TopicKind};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;

/// Direction of an observed endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    Reader,
    Writer,
}

/// One observed endpoint: who, where, what topic, which direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    pub guid: Guid,
    pub topic: TopicId,
    pub kind: EndpointKind,
    /// Participant through which this endpoint is reachable.
    pub discoverer: ParticipantId,
    pub qos: QosSnapshot,
}

impl EndpointInfo {
    /// A real (non-proxy) RPC server announces itself as a reader of a
    /// request topic.
    pub fn is_rpc_server(&self) -> bool {
        self.kind == EndpointKind::Reader && self.topic.kind == TopicKind::RpcRequest
    }
}

impl fmt::Display for EndpointInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.kind {
            EndpointKind::Reader => "reader",
            EndpointKind::Writer => "writer",
        };
        write!(f, "{dir} {} on {} via {}", self.guid, self.topic, self.discoverer)
    }
}

type EndpointCallback = Box<dyn Fn(&EndpointInfo) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    added: Vec<EndpointCallback>,
    updated: Vec<EndpointCallback>,
    removed: Vec<EndpointCallback>,
}

/// Observed-endpoint index with add/update/remove subscriptions.
///
/// Notifications run synchronously on the reporting thread, after the
/// endpoint map lock has been released, so callbacks may read the database.
#[derive(Default)]
pub struct DiscoveryDatabase {
    endpoints: RwLock<HashMap<Guid, EndpointInfo>>,
    callbacks: RwLock<Callbacks>,
}

impl DiscoveryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a newly observed endpoint and notify subscribers.
    ///
    /// Reporting a guid that is already present updates it instead (the
    /// transport saw the same endpoint again, possibly with changed QoS).
    pub fn add_endpoint(&self, info: EndpointInfo) {
        let previous = self
            .endpoints
            .write()
            .insert(info.guid, info.clone());

        let callbacks = self.callbacks.read();
        match previous {
            None => {
                tracing::debug!("endpoint added: {info}");
                for callback in &callbacks.added {
                    callback(&info);
                }
            }
            Some(old) if old != info => {
                tracing::debug!("endpoint updated: {info}");
                for callback in &callbacks.updated {
                    callback(&info);
                }
            }
            Some(_) => {}
        }
    }

    /// Record a QoS change on a known endpoint and notify subscribers.
    pub fn update_endpoint_qos(&self, guid: Guid, qos: QosSnapshot) {
        let updated = {
            let mut endpoints = self.endpoints.write();
            match endpoints.get_mut(&guid) {
                Some(info) if info.qos != qos => {
                    info.qos = qos;
                    Some(info.clone())
                }
                _ => None,
            }
        };

        if let Some(info) = updated {
            tracing::debug!("endpoint qos changed: {info}");
            for callback in &self.callbacks.read().updated {
                callback(&info);
            }
        }
    }

    /// Remove an endpoint and notify subscribers. Unknown guids are ignored.
    pub fn erase_endpoint(&self, guid: Guid) {
        let removed = self.endpoints.write().remove(&guid);
        if let Some(info) = removed {
            tracing::debug!("endpoint removed: {info}");
            for callback in &self.callbacks.read().removed {
                callback(&info);
            }
        }
    }

    pub fn get(&self, guid: Guid) -> Option<EndpointInfo> {
        self.endpoints.read().get(&guid).cloned()
    }

    /// Every currently observed endpoint.
    pub fn endpoints(&self) -> Vec<EndpointInfo> {
        self.endpoints.read().values().cloned().collect()
    }

    /// Observed endpoints on one topic.
    pub fn endpoints_on_topic(&self, topic: &TopicId) -> Vec<EndpointInfo> {
        self.endpoints
            .read()
            .values()
            .filter(|info| &info.topic == topic)
            .cloned()
            .collect()
    }

    pub fn on_endpoint_added(&self, callback: EndpointCallback) {
        self.callbacks.write().added.push(callback);
    }

    pub fn on_endpoint_updated(&self, callback: EndpointCallback) {
        self.callbacks.write().updated.push(callback);
    }

    pub fn on_endpoint_removed(&self, callback: EndpointCallback) {
        self.callbacks.write().removed.push(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Durability, Reliability};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn endpoint(name: &str, counter: u32, kind: EndpointKind) -> EndpointInfo {
        EndpointInfo {
            guid: Guid::for_local_endpoint(name, counter),
            topic: TopicId::data("chatter", "String"),
            kind,
            discoverer: ParticipantId::from(name),
            qos: QosSnapshot::default(),
        }
    }

    #[test]
    fn test_add_notifies() {
        let db = DiscoveryDatabase::new();
        let added = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&added);
        db.on_endpoint_added(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        db.add_endpoint(endpoint("p0", 1, EndpointKind::Writer));
        assert_eq!(added.load(Ordering::SeqCst), 1);
        assert_eq!(db.endpoints().len(), 1);
    }

    #[test]
    fn test_re_add_same_is_silent() {
        let db = DiscoveryDatabase::new();
        let added = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&added);
        db.on_endpoint_added(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let info = endpoint("p0", 1, EndpointKind::Writer);
        db.add_endpoint(info.clone());
        db.add_endpoint(info);
        assert_eq!(added.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_qos_update_notifies() {
        let db = DiscoveryDatabase::new();
        let updated = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&updated);
        db.on_endpoint_updated(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let info = endpoint("p0", 1, EndpointKind::Writer);
        db.add_endpoint(info.clone());

        db.update_endpoint_qos(
            info.guid,
            QosSnapshot {
                reliability: Reliability::Reliable,
                durability: Durability::TransientLocal,
            },
        );
        assert_eq!(updated.load(Ordering::SeqCst), 1);

        // Same QoS again: no notification.
        db.update_endpoint_qos(
            info.guid,
            QosSnapshot {
                reliability: Reliability::Reliable,
                durability: Durability::TransientLocal,
            },
        );
        assert_eq!(updated.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_erase_notifies_once() {
        let db = DiscoveryDatabase::new();
        let removed = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&removed);
        db.on_endpoint_removed(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let info = endpoint("p0", 1, EndpointKind::Reader);
        db.add_endpoint(info.clone());
        db.erase_endpoint(info.guid);
        db.erase_endpoint(info.guid);
        assert_eq!(removed.load(Ordering::SeqCst), 1);
        assert!(db.endpoints().is_empty());
    }

    #[test]
    fn test_rpc_server_detection() {
        let server_request_reader = EndpointInfo {
            guid: Guid::for_local_endpoint("c", 1),
            topic: crate::types::RpcTopic::new("add", "AddTwoInts").request_topic,
            kind: EndpointKind::Reader,
            discoverer: ParticipantId::from("c"),
            qos: QosSnapshot::rpc(),
        };
        assert!(server_request_reader.is_rpc_server());

        let data_reader = endpoint("p0", 2, EndpointKind::Reader);
        assert!(!data_reader.is_rpc_server());
    }
}
