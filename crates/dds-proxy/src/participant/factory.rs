// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Participant factory: builds participants from configuration.

use crate::config::ParticipantConfig;
use crate::discovery::DiscoveryDatabase;
use crate::error::{Error, Result};
use crate::participant::{EchoParticipant, Participant, ParticipantKind};
use crate::payload::PayloadPool;
use crate::types::ParticipantId;
use std::sync::Arc;

/// A participant built by the factory.
///
/// The variant keeps the concrete type reachable: the echo kind exposes a
/// local attachment surface (publishers, subscribers, RPC handles) that the
/// `Participant` trait deliberately does not carry.
pub enum CreatedParticipant {
    Echo(Arc<EchoParticipant>),
}

impl std::fmt::Debug for CreatedParticipant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Echo(participant) => f.debug_tuple("Echo").field(participant.id()).finish(),
        }
    }
}

impl CreatedParticipant {
    pub fn id(&self) -> &ParticipantId {
        match self {
            Self::Echo(participant) => participant.id(),
        }
    }

    pub fn as_dyn(&self) -> Arc<dyn Participant> {
        match self {
            Self::Echo(participant) => Arc::clone(participant) as Arc<dyn Participant>,
        }
    }

    pub fn echo(&self) -> Option<Arc<EchoParticipant>> {
        match self {
            Self::Echo(participant) => Some(Arc::clone(participant)),
        }
    }
}

/// Builds participants of the closed kind set.
#[derive(Debug, Default)]
pub struct ParticipantFactory;

impl ParticipantFactory {
    pub fn new() -> Self {
        Self
    }

    /// Create a participant from its configuration.
    ///
    /// Kinds whose wire transports are not linked into this build are
    /// rejected with an unsupported error; the proxy core treats every kind
    /// through the same capability.
    pub fn create_participant(
        &self,
        config: &ParticipantConfig,
        payload_pool: Arc<PayloadPool>,
        discovery: Arc<DiscoveryDatabase>,
    ) -> Result<CreatedParticipant> {
        let id = ParticipantId::new(config.id.clone());
        match config.kind {
            ParticipantKind::Echo => Ok(CreatedParticipant::Echo(EchoParticipant::new(
                id,
                payload_pool,
                discovery,
            ))),
            ParticipantKind::PubSub | ParticipantKind::WireTransport => {
                Err(Error::Unsupported(format!(
                    "participant kind {} is not available in this build",
                    config.kind
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_builds_echo() {
        let factory = ParticipantFactory::new();
        let config = ParticipantConfig {
            kind: ParticipantKind::Echo,
            id: "p0".into(),
            qos: Default::default(),
        };

        let created = factory
            .create_participant(
                &config,
                PayloadPool::new(),
                Arc::new(DiscoveryDatabase::new()),
            )
            .expect("echo participant");
        assert_eq!(created.id(), &ParticipantId::from("p0"));
        assert!(created.echo().is_some());
        assert_eq!(created.as_dyn().kind(), ParticipantKind::Echo);
    }

    #[test]
    fn test_factory_rejects_unlinked_kinds() {
        let factory = ParticipantFactory::new();
        let config = ParticipantConfig {
            kind: ParticipantKind::WireTransport,
            id: "w0".into(),
            qos: Default::default(),
        };

        let err = factory
            .create_participant(
                &config,
                PayloadPool::new(),
                Arc::new(DiscoveryDatabase::new()),
            )
            .expect_err("unsupported kind");
        assert!(matches!(err, Error::Unsupported(_)));
    }
}
