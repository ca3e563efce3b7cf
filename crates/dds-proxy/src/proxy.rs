// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Proxy facade: builds the whole fabric from one configuration.

use crate::config::{ConfigError, ProxyConfig};
use crate::discovery::DiscoveryDatabase;
use crate::error::{Error, Result};
use crate::participant::{EchoParticipant, ParticipantFactory, ParticipantsDatabase};
use crate::payload::PayloadPool;
use crate::pipe::{DdsPipe, ReloadOutcome};
use crate::runtime::SlotThreadPool;
use crate::types::ParticipantId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The proxy: participants, databases, thread pool and pipe, wired up.
///
/// Construction creates the participants (duplicate ids are a configuration
/// error) and the disabled pipe; [`start`](Self::start) turns forwarding on.
pub struct DdsProxy {
    configuration: Mutex<ProxyConfig>,
    discovery: Arc<DiscoveryDatabase>,
    payload_pool: Arc<PayloadPool>,
    participants: Arc<ParticipantsDatabase>,
    thread_pool: Arc<SlotThreadPool>,
    echo_participants: HashMap<ParticipantId, Arc<EchoParticipant>>,
    pipe: DdsPipe,
}

impl DdsProxy {
    pub fn new(configuration: ProxyConfig) -> Result<Self> {
        tracing::debug!("creating proxy");
        configuration.validate()?;

        let discovery = Arc::new(DiscoveryDatabase::new());
        let payload_pool = PayloadPool::new();
        let participants = Arc::new(ParticipantsDatabase::new());
        let thread_pool = Arc::new(SlotThreadPool::new(configuration.number_of_threads()));
        let factory = ParticipantFactory::new();

        let mut echo_participants = HashMap::new();
        for participant_config in &configuration.participants {
            let created = factory.create_participant(
                participant_config,
                Arc::clone(&payload_pool),
                Arc::clone(&discovery),
            )?;
            let id = created.id().clone();
            tracing::info!(
                "participant created with id {id} and kind {}",
                participant_config.kind
            );

            if let Some(echo) = created.echo() {
                echo_participants.insert(id.clone(), echo);
            }
            participants
                .add_participant(id.clone(), created.as_dyn())
                .map_err(|_| {
                    Error::Config(ConfigError::Invalid(format!(
                        "participant ids must be unique, {id} is duplicated"
                    )))
                })?;
        }

        let pipe = DdsPipe::new(
            configuration.allowed_topics(),
            configuration.builtin_topics.clone(),
            Arc::clone(&discovery),
            Arc::clone(&payload_pool),
            Arc::clone(&participants),
            Arc::clone(&thread_pool),
        );

        tracing::debug!("proxy created");
        Ok(Self {
            configuration: Mutex::new(configuration),
            discovery,
            payload_pool,
            participants,
            thread_pool,
            echo_participants,
            pipe,
        })
    }

    /// Enable every topic bridge. Idempotent.
    pub fn start(&self) -> Result<()> {
        self.pipe.enable()?;
        tracing::info!("proxy started");
        Ok(())
    }

    /// Disable every bridge and park the workers. Returns once no bridge
    /// can issue another write. Idempotent.
    pub fn stop(&self) {
        self.pipe.disable();
        self.thread_pool.disable();
        tracing::info!("proxy stopped");
    }

    /// Apply a new configuration.
    ///
    /// Only the topic policy and builtin topics are reloadable; a changed
    /// participant set is ignored with a warning.
    pub fn reload_configuration(&self, new_configuration: ProxyConfig) -> Result<ReloadOutcome> {
        new_configuration.validate()?;

        {
            let current = self.configuration.lock();
            if current.participants != new_configuration.participants {
                tracing::warn!(
                    "participant set changed in reloaded configuration; \
                     participants are fixed at startup and the change is ignored"
                );
            }
        }

        let outcome = self.pipe.reload_configuration(
            new_configuration.allowed_topics(),
            new_configuration.builtin_topics.clone(),
        )?;
        *self.configuration.lock() = new_configuration;
        Ok(outcome)
    }

    /// The echo participant registered under `id`, if any. This is the
    /// local attachment surface of the loopback kind.
    pub fn echo_participant(&self, id: &ParticipantId) -> Option<Arc<EchoParticipant>> {
        self.echo_participants.get(id).cloned()
    }

    pub fn discovery(&self) -> &Arc<DiscoveryDatabase> {
        &self.discovery
    }

    pub fn payload_pool(&self) -> &Arc<PayloadPool> {
        &self.payload_pool
    }

    pub fn participants(&self) -> &Arc<ParticipantsDatabase> {
        &self.participants
    }

    pub fn pipe(&self) -> &DdsPipe {
        &self.pipe
    }
}

impl Drop for DdsProxy {
    fn drop(&mut self) {
        self.stop();
        self.participants.clear();
    }
}

impl fmt::Display for DdsProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DdsProxy{{{} participants; {}}}",
            self.participants.len(),
            self.pipe
        )
    }
}

impl fmt::Debug for DdsProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParticipantConfig;
    use crate::participant::ParticipantKind;

    fn pair_config() -> ProxyConfig {
        ProxyConfig {
            participants: vec![
                ParticipantConfig {
                    kind: ParticipantKind::Echo,
                    id: "p0".into(),
                    qos: Default::default(),
                },
                ParticipantConfig {
                    kind: ParticipantKind::Echo,
                    id: "p1".into(),
                    qos: Default::default(),
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_construction_registers_participants() {
        let proxy = DdsProxy::new(pair_config()).expect("proxy");
        assert_eq!(proxy.participants().len(), 2);
        assert!(proxy
            .echo_participant(&ParticipantId::from("p0"))
            .is_some());
        assert!(proxy
            .echo_participant(&ParticipantId::from("missing"))
            .is_none());
    }

    #[test]
    fn test_duplicate_ids_rejected_at_construction() {
        let mut config = pair_config();
        config.participants[1].id = "p0".into();
        let err = DdsProxy::new(config).expect_err("duplicate ids");
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_start_stop_cycle() {
        let proxy = DdsProxy::new(pair_config()).expect("proxy");
        proxy.start().expect("start");
        proxy.start().expect("start twice");
        proxy.stop();
        proxy.stop();
    }

    #[test]
    fn test_reload_same_configuration_is_no_change() {
        let proxy = DdsProxy::new(pair_config()).expect("proxy");
        let outcome = proxy
            .reload_configuration(pair_config())
            .expect("reload");
        // Same policy, same builtins.
        assert_eq!(outcome, ReloadOutcome::NoChange);
    }
}
