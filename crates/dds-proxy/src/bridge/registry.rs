// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request-to-origin correlation table of an RPC bridge.
//!
//! One registry exists per proxy-client participant. When a request is
//! forwarded through that participant, the identity it was forwarded under
//! is recorded here together with where the request came from; the reply
//! consults the table to find its way back. Registration strictly precedes
//! the forwarded write, so a reply arriving immediately still correlates.

use crate::types::{ParticipantId, RpcTopic, SampleIdentity};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Where a forwarded request came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    /// Proxy-server participant that received the original request.
    pub origin_participant: ParticipantId,
    /// Identity the original requester used.
    pub origin_identity: SampleIdentity,
    /// When the entry was recorded.
    pub enqueued: Instant,
}

/// Correlation table: forwarded-request identity → origin.
///
/// All critical sections are O(1); the registry mutex ranks below the
/// payload pool and above the bridge lock in the crate's lock order.
pub struct ServiceRegistry {
    participant: ParticipantId,
    topic: RpcTopic,
    entries: Mutex<HashMap<SampleIdentity, RegistryEntry>>,
}

impl ServiceRegistry {
    pub fn new(participant: ParticipantId, topic: RpcTopic) -> Self {
        Self {
            participant,
            topic,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Participant whose proxy-client path this registry serves.
    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    /// Record a forwarded request. Must happen before the request is
    /// written.
    pub fn add(
        &self,
        forwarded_identity: SampleIdentity,
        origin_participant: ParticipantId,
        origin_identity: SampleIdentity,
    ) {
        let previous = self.entries.lock().insert(
            forwarded_identity,
            RegistryEntry {
                origin_participant,
                origin_identity,
                enqueued: Instant::now(),
            },
        );
        if previous.is_some() {
            tracing::warn!(
                "service {}: request identity {forwarded_identity} reused before its reply",
                self.topic
            );
        }
    }

    /// Remove and return the entry a reply relates to, if any.
    pub fn take(&self, related_identity: &SampleIdentity) -> Option<RegistryEntry> {
        self.entries.lock().remove(related_identity)
    }

    /// Drop entries older than `max_age`; returns how many were removed.
    ///
    /// Outstanding requests whose server vanished would otherwise pin their
    /// entries forever.
    pub fn sweep(&self, max_age: Duration) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.enqueued.elapsed() <= max_age);
        before - entries.len()
    }

    /// Drop every entry (bridge disable).
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl fmt::Display for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "registry[{} @ {}]: {} outstanding",
            self.topic,
            self.participant,
            self.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Guid;

    fn registry() -> ServiceRegistry {
        ServiceRegistry::new(
            ParticipantId::from("b"),
            RpcTopic::new("add", "AddTwoInts"),
        )
    }

    fn identity(name: &str, seq: i64) -> SampleIdentity {
        SampleIdentity::new(Guid::for_local_endpoint(name, 1), seq)
    }

    #[test]
    fn test_add_then_take() {
        let registry = registry();
        let forwarded = identity("fwd", 1);
        let origin = identity("client", 41);

        registry.add(forwarded, ParticipantId::from("a"), origin);
        assert_eq!(registry.len(), 1);

        let entry = registry.take(&forwarded).expect("entry");
        assert_eq!(entry.origin_participant, ParticipantId::from("a"));
        assert_eq!(entry.origin_identity, origin);

        // Removed after delivery.
        assert!(registry.take(&forwarded).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_take_unknown() {
        let registry = registry();
        assert!(registry.take(&identity("nobody", 9)).is_none());
    }

    #[test]
    fn test_clear_on_disable() {
        let registry = registry();
        registry.add(identity("fwd", 1), ParticipantId::from("a"), identity("c", 1));
        registry.add(identity("fwd", 2), ParticipantId::from("a"), identity("c", 2));

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sweep_expires_old_entries() {
        let registry = registry();
        registry.add(identity("fwd", 1), ParticipantId::from("a"), identity("c", 1));

        assert_eq!(registry.sweep(Duration::from_secs(60)), 0);
        assert_eq!(registry.len(), 1);

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(registry.sweep(Duration::from_millis(1)), 1);
        assert!(registry.is_empty());
    }
}
