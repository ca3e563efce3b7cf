// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Orchestrator: owns every bridge and drives their lifecycle.
//!
//! The pipe subscribes to the discovery database. Observed data topics get a
//! [`DataBridge`]; observed RPC topics get an [`RpcBridge`] keyed by their
//! request topic. Bridges are enabled and disabled as the topic policy, the
//! pipe's own running state, and (for RPC) server availability change.
//!
//! Discovery callbacks and configuration reloads are serialized by the
//! pipe's state lock; forwarding workers never touch it.

use crate::bridge::{Bridge, BridgeState, DataBridge, RpcBridge};
use crate::discovery::{DiscoveryDatabase, EndpointInfo};
use crate::error::{Error, Result};
use crate::filter::AllowedTopicList;
use crate::participant::ParticipantsDatabase;
use crate::payload::PayloadPool;
use crate::runtime::SlotThreadPool;
use crate::types::{RpcTopic, TopicId, TopicKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// Result of a configuration reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The new policy was applied.
    Applied,
    /// The new configuration equals the current one.
    NoChange,
}

struct PipeState {
    allowed: AllowedTopicList,
    builtin_topics: Vec<TopicId>,
    /// All bridges, keyed by topic; RPC bridges by their request topic.
    bridges: HashMap<TopicId, Bridge>,
    enabled: bool,
}

struct PipeInner {
    discovery: Arc<DiscoveryDatabase>,
    participants: Arc<ParticipantsDatabase>,
    payload_pool: Arc<PayloadPool>,
    thread_pool: Arc<SlotThreadPool>,
    state: Mutex<PipeState>,
}

/// The forwarding fabric's control plane.
pub struct DdsPipe {
    inner: Arc<PipeInner>,
}

impl DdsPipe {
    /// Build the pipe, subscribe to discovery, and pre-create bridges for
    /// builtin topics and everything already observed. Starts disabled.
    pub fn new(
        allowed: AllowedTopicList,
        builtin_topics: Vec<TopicId>,
        discovery: Arc<DiscoveryDatabase>,
        payload_pool: Arc<PayloadPool>,
        participants: Arc<ParticipantsDatabase>,
        thread_pool: Arc<SlotThreadPool>,
    ) -> Self {
        let inner = Arc::new(PipeInner {
            discovery: Arc::clone(&discovery),
            participants,
            payload_pool,
            thread_pool,
            state: Mutex::new(PipeState {
                allowed,
                builtin_topics: builtin_topics.clone(),
                bridges: HashMap::new(),
                enabled: false,
            }),
        });

        let added = Arc::downgrade(&inner);
        discovery.on_endpoint_added(Box::new(move |info| {
            if let Some(inner) = Weak::upgrade(&added) {
                inner.on_endpoint_added(info);
            }
        }));
        let updated = Arc::downgrade(&inner);
        discovery.on_endpoint_updated(Box::new(move |info| {
            if let Some(inner) = Weak::upgrade(&updated) {
                inner.on_endpoint_updated(info);
            }
        }));
        let removed = Arc::downgrade(&inner);
        discovery.on_endpoint_removed(Box::new(move |info| {
            if let Some(inner) = Weak::upgrade(&removed) {
                inner.on_endpoint_removed(info);
            }
        }));

        {
            let mut state = inner.state.lock();
            for topic in builtin_topics {
                inner.ensure_bridge(&mut state, &topic);
            }
            // Endpoints observed before the pipe existed.
            for info in inner.discovery.endpoints() {
                inner.absorb_endpoint(&mut state, &info);
            }
        }

        Self { inner }
    }

    /// Start forwarding: run the workers and enable every allowed bridge.
    /// Idempotent.
    pub fn enable(&self) -> Result<()> {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        if state.enabled {
            return Ok(());
        }
        state.enabled = true;
        inner.thread_pool.enable();

        for (topic, bridge) in &state.bridges {
            if state.allowed.is_allowed(&policy_topic(topic)) {
                if let Err(err) = bridge.enable() {
                    tracing::error!("bridge for {topic} failed to enable: {err}");
                }
            }
        }
        tracing::info!("pipe enabled ({} bridges)", state.bridges.len());
        Ok(())
    }

    /// Stop forwarding: disable every bridge. Returns once no bridge can
    /// issue another write. Idempotent.
    pub fn disable(&self) {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        if !state.enabled {
            return;
        }
        state.enabled = false;

        for bridge in state.bridges.values() {
            bridge.disable();
        }
        tracing::info!("pipe disabled");
    }

    /// Apply a new topic policy.
    ///
    /// Newly blocked topics get their bridges disabled; newly allowed ones
    /// are enabled (and created, for builtin topics). Partial failures are
    /// reported as an error; changes already applied are not rolled back.
    pub fn reload_configuration(
        &self,
        new_allowed: AllowedTopicList,
        new_builtin_topics: Vec<TopicId>,
    ) -> Result<ReloadOutcome> {
        let inner = &self.inner;
        let mut state = inner.state.lock();

        let same_builtins = {
            let mut current = state.builtin_topics.clone();
            let mut new = new_builtin_topics.clone();
            current.sort_by(topic_order);
            new.sort_by(topic_order);
            current == new
        };
        if state.allowed == new_allowed && same_builtins {
            return Ok(ReloadOutcome::NoChange);
        }

        state.allowed = new_allowed;
        for topic in &new_builtin_topics {
            if !state.builtin_topics.contains(topic) {
                state.builtin_topics.push(topic.clone());
                inner.ensure_bridge(&mut state, topic);
            }
        }

        let mut failures = 0usize;
        let enabled = state.enabled;
        for (topic, bridge) in &state.bridges {
            let allowed = state.allowed.is_allowed(&policy_topic(topic));
            if allowed && enabled {
                if let Err(err) = bridge.enable() {
                    failures += 1;
                    tracing::error!("bridge for {topic} failed to enable: {err}");
                }
            } else if !allowed {
                bridge.disable();
            }
        }

        if failures > 0 {
            return Err(Error::Initialization(format!(
                "{failures} bridge(s) failed to apply the new configuration"
            )));
        }
        tracing::info!("configuration reloaded: {}", state.allowed);
        Ok(ReloadOutcome::Applied)
    }

    /// States of every bridge, keyed by topic. Inspector surface.
    pub fn bridge_states(&self) -> Vec<(TopicId, BridgeState)> {
        let state = self.inner.state.lock();
        let mut states: Vec<_> = state
            .bridges
            .iter()
            .map(|(topic, bridge)| (topic.clone(), bridge.state()))
            .collect();
        states.sort_by(|a, b| topic_order(&a.0, &b.0));
        states
    }

    /// State of the bridge owning `topic`, if any.
    pub fn bridge_state(&self, topic: &TopicId) -> Option<BridgeState> {
        let key = bridge_key(topic);
        self.inner.state.lock().bridges.get(&key).map(Bridge::state)
    }
}

impl Drop for DdsPipe {
    fn drop(&mut self) {
        self.disable();
        // Dropping the bridges destroys them.
        self.inner.state.lock().bridges.clear();
    }
}

impl fmt::Display for DdsPipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        writeln!(
            f,
            "DdsPipe{{{}; {} bridges}}",
            if state.enabled { "enabled" } else { "disabled" },
            state.bridges.len()
        )?;
        for (topic, bridge) in &state.bridges {
            writeln!(f, "  {topic}: {bridge}")?;
        }
        Ok(())
    }
}

/// Key under which a topic's bridge is stored: RPC topics collapse onto
/// their request topic.
fn bridge_key(topic: &TopicId) -> TopicId {
    match RpcTopic::from_topic(topic) {
        Some(rpc) => rpc.request_topic,
        None => topic.clone(),
    }
}

/// Topic the policy is consulted with: RPC bridges match by service name.
fn policy_topic(key: &TopicId) -> TopicId {
    match key.kind {
        TopicKind::Data => key.clone(),
        TopicKind::RpcRequest | TopicKind::RpcReply => TopicId::data(
            key.service_name().unwrap_or(&key.name),
            key.type_name.clone(),
        ),
    }
}

fn topic_order(a: &TopicId, b: &TopicId) -> std::cmp::Ordering {
    (&a.name, &a.type_name).cmp(&(&b.name, &b.type_name))
}

impl PipeInner {
    /// Create the bridge for `topic` if it does not exist yet.
    fn ensure_bridge(&self, state: &mut PipeState, topic: &TopicId) {
        let key = bridge_key(topic);
        state.bridges.entry(key).or_insert_with(|| {
            match RpcTopic::from_topic(topic) {
                Some(rpc) => Bridge::Rpc(RpcBridge::new(
                    rpc,
                    Arc::clone(&self.participants),
                    Arc::clone(&self.payload_pool),
                    Arc::clone(&self.thread_pool),
                )),
                None => Bridge::Data(DataBridge::new(
                    topic.clone(),
                    Arc::clone(&self.participants),
                    Arc::clone(&self.payload_pool),
                    Arc::clone(&self.thread_pool),
                )),
            }
        });
    }

    /// Fold one observed endpoint into the bridge set.
    fn absorb_endpoint(&self, state: &mut PipeState, info: &EndpointInfo) {
        let key = bridge_key(&info.topic);
        self.ensure_bridge(state, &info.topic);

        let enabled = state.enabled;
        let allowed = state.allowed.is_allowed(&policy_topic(&key));
        let Some(bridge) = state.bridges.get(&key) else {
            return;
        };

        if info.is_rpc_server() {
            if let Some(rpc) = bridge.as_rpc() {
                rpc.discovered_service(info.discoverer.clone(), info.guid.prefix);
            }
        }

        if enabled && allowed {
            if let Err(err) = bridge.enable() {
                tracing::error!("bridge for {} failed to enable: {err}", info.topic);
            }
        }
    }

    fn on_endpoint_added(&self, info: &EndpointInfo) {
        let mut state = self.state.lock();
        self.absorb_endpoint(&mut state, info);
    }

    /// Forwarding-relevant QoS changed: cycle the bridge so endpoints renew
    /// their matching.
    fn on_endpoint_updated(&self, info: &EndpointInfo) {
        let state = self.state.lock();
        let key = bridge_key(&info.topic);
        if let Some(bridge) = state.bridges.get(&key) {
            if bridge.state() == BridgeState::Enabled {
                tracing::debug!("qos change on {}: cycling bridge", info.topic);
                bridge.disable();
                if let Err(err) = bridge.enable() {
                    tracing::error!("bridge for {} failed to re-enable: {err}", info.topic);
                }
            }
        }
    }

    fn on_endpoint_removed(&self, info: &EndpointInfo) {
        let state = self.state.lock();
        let key = bridge_key(&info.topic);
        let Some(bridge) = state.bridges.get(&key) else {
            return;
        };

        if info.is_rpc_server() {
            if let Some(rpc) = bridge.as_rpc() {
                rpc.removed_service(&info.discoverer, &info.guid.prefix);
            }
            return;
        }

        // A data topic nobody observes anymore stops forwarding, unless it
        // was asked for explicitly.
        if info.topic.kind == TopicKind::Data
            && !state.builtin_topics.contains(&info.topic)
            && self.discovery.endpoints_on_topic(&info.topic).is_empty()
        {
            tracing::debug!("last endpoint on {} gone, disabling bridge", info.topic);
            bridge.disable();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::TopicFilter;

    fn empty_pipe(allowed: AllowedTopicList) -> DdsPipe {
        DdsPipe::new(
            allowed,
            Vec::new(),
            Arc::new(DiscoveryDatabase::new()),
            PayloadPool::new(),
            Arc::new(ParticipantsDatabase::new()),
            Arc::new(SlotThreadPool::new(2)),
        )
    }

    #[test]
    fn test_zero_participants_idles() {
        let pipe = empty_pipe(AllowedTopicList::allow_all());
        pipe.enable().expect("enable");
        pipe.enable().expect("enable twice");
        pipe.disable();
        pipe.disable();
        assert!(pipe.bridge_states().is_empty());
    }

    #[test]
    fn test_reload_no_change() {
        let pipe = empty_pipe(AllowedTopicList::new(
            vec![TopicFilter::name("chatter")],
            Vec::new(),
        ));

        let same = AllowedTopicList::new(vec![TopicFilter::name("chatter")], Vec::new());
        assert_eq!(
            pipe.reload_configuration(same, Vec::new()).expect("reload"),
            ReloadOutcome::NoChange
        );

        let different = AllowedTopicList::new(vec![TopicFilter::name("other")], Vec::new());
        assert_eq!(
            pipe.reload_configuration(different, Vec::new())
                .expect("reload"),
            ReloadOutcome::Applied
        );
    }

    #[test]
    fn test_bridge_key_collapses_rpc_pair() {
        let rpc = RpcTopic::new("add", "AddTwoInts");
        assert_eq!(bridge_key(&rpc.request_topic), rpc.request_topic);
        assert_eq!(bridge_key(&rpc.reply_topic), rpc.request_topic);

        let data = TopicId::data("chatter", "String");
        assert_eq!(bridge_key(&data), data);
    }

    #[test]
    fn test_policy_topic_uses_service_name() {
        let rpc = RpcTopic::new("add", "AddTwoInts");
        let policy = policy_topic(&rpc.request_topic);
        assert_eq!(policy.name, "add");
        assert_eq!(policy.kind, TopicKind::Data);
    }
}
