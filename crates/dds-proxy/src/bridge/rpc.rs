// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bridge for one RPC service.
//!
//! Per participant the bridge owns a proxy server (request reader + reply
//! writer, facing local clients) and a proxy client (request writer + reply
//! reader, facing local servers), plus one [`ServiceRegistry`] per
//! proxy-client path.
//!
//! Services are reliable + volatile: a request written with no server
//! listening is lost for good, so the bridge tracks the reachable servers
//! per participant and only forwards while at least one is available. When
//! the last server disappears the bridge disables itself; endpoints are kept
//! for a later re-enable.

use crate::bridge::{BridgeState, BridgeStats, BridgeStatsSnapshot, ServiceRegistry};
use crate::error::{Error, Result};
use crate::participant::{ParticipantsDatabase, Reader, Writer};
use crate::payload::PayloadPool;
use crate::runtime::{SlotThreadPool, TaskId, PRIORITY_FORWARD, PRIORITY_MAINTENANCE};
use crate::types::{
    Guid, GuidPrefix, ParticipantId, RpcTopic, Sample, SampleIdentity, WriteParams,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Registry entries older than this are dropped by the maintenance sweep.
const REGISTRY_ENTRY_MAX_AGE: Duration = Duration::from_secs(300);
/// Outstanding entries per registry that trigger a sweep.
const REGISTRY_SWEEP_THRESHOLD: usize = 1024;

/// Whether a proxy-side reader carries requests or replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderRole {
    Request,
    Reply,
}

struct WriterSlot {
    writer: Arc<dyn Writer>,
    sequence: AtomicI64,
}

impl WriterSlot {
    fn new(writer: Arc<dyn Writer>) -> Self {
        Self {
            writer,
            sequence: AtomicI64::new(0),
        }
    }

    fn next_identity(&self) -> SampleIdentity {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        SampleIdentity::new(self.writer.guid(), sequence)
    }
}

#[derive(Default)]
struct RpcEndpoints {
    /// Proxy-server side: requests arriving from local clients.
    request_readers: BTreeMap<ParticipantId, Arc<dyn Reader>>,
    /// Proxy-server side: replies going back to local clients.
    reply_writers: BTreeMap<ParticipantId, Arc<WriterSlot>>,
    /// Proxy-client side: replies arriving from local servers.
    reply_readers: BTreeMap<ParticipantId, Arc<dyn Reader>>,
    /// Proxy-client side: requests going out to local servers.
    request_writers: BTreeMap<ParticipantId, Arc<WriterSlot>>,
}

struct ReaderSlot {
    task_id: TaskId,
    reader: Arc<dyn Reader>,
    role: ReaderRole,
    participant: ParticipantId,
    emitted: bool,
    transmit_guard: Arc<Mutex<()>>,
}

struct RpcBridgeInner {
    topic: RpcTopic,
    participants: Arc<ParticipantsDatabase>,
    payload_pool: Arc<PayloadPool>,
    thread_pool: Arc<SlotThreadPool>,
    /// Orchestrator intent: the topic is allowed and the pipe is running.
    allowed: AtomicBool,
    /// Actual forwarding state: `allowed` and at least one server reachable.
    enabled: AtomicBool,
    init_done: AtomicBool,
    destroyed: AtomicBool,
    lifecycle: Mutex<()>,
    endpoints: RwLock<RpcEndpoints>,
    registries: RwLock<BTreeMap<ParticipantId, Arc<ServiceRegistry>>>,
    current_servers: Mutex<BTreeMap<ParticipantId, BTreeSet<GuidPrefix>>>,
    tasks: Mutex<HashMap<Guid, ReaderSlot>>,
    sweep_task: Mutex<Option<TaskId>>,
    on_transmission: RwLock<()>,
    stats: BridgeStats,
}

/// Per-service forwarding object with request/reply correlation.
pub struct RpcBridge {
    inner: Arc<RpcBridgeInner>,
}

impl RpcBridge {
    /// Create the bridge disabled; endpoints are created on the first
    /// enable that finds a reachable server.
    pub fn new(
        topic: RpcTopic,
        participants: Arc<ParticipantsDatabase>,
        payload_pool: Arc<PayloadPool>,
        thread_pool: Arc<SlotThreadPool>,
    ) -> Self {
        tracing::debug!("creating rpc bridge for {topic}");
        Self {
            inner: Arc::new(RpcBridgeInner {
                topic,
                participants,
                payload_pool,
                thread_pool,
                allowed: AtomicBool::new(false),
                enabled: AtomicBool::new(false),
                init_done: AtomicBool::new(false),
                destroyed: AtomicBool::new(false),
                lifecycle: Mutex::new(()),
                endpoints: RwLock::new(RpcEndpoints::default()),
                registries: RwLock::new(BTreeMap::new()),
                current_servers: Mutex::new(BTreeMap::new()),
                tasks: Mutex::new(HashMap::new()),
                sweep_task: Mutex::new(None),
                on_transmission: RwLock::new(()),
                stats: BridgeStats::default(),
            }),
        }
    }

    pub fn topic(&self) -> &RpcTopic {
        &self.inner.topic
    }

    /// Allow forwarding. Takes effect once at least one server is
    /// reachable; until then the bridge stays disabled.
    pub fn enable(&self) -> Result<()> {
        self.inner.allowed.store(true, Ordering::Release);
        self.inner.try_activate(&self.inner)
    }

    /// Forbid forwarding and deactivate.
    pub fn disable(&self) {
        self.inner.allowed.store(false, Ordering::Release);
        self.inner.deactivate();
    }

    /// A real server for this service became reachable through
    /// `participant`.
    pub fn discovered_service(&self, participant: ParticipantId, server: GuidPrefix) {
        {
            let mut servers = self.inner.current_servers.lock();
            servers.entry(participant.clone()).or_default().insert(server);
        }
        tracing::debug!(
            "service {}: server discovered via {participant}",
            self.inner.topic
        );
        if let Err(err) = self.inner.try_activate(&self.inner) {
            tracing::error!("service {} cannot activate: {err}", self.inner.topic);
        }
    }

    /// A server went away. Disables the bridge when it was the last one.
    pub fn removed_service(&self, participant: &ParticipantId, server: &GuidPrefix) {
        {
            let mut servers = self.inner.current_servers.lock();
            if let Some(set) = servers.get_mut(participant) {
                set.remove(server);
                if set.is_empty() {
                    servers.remove(participant);
                }
            }
        }
        tracing::debug!(
            "service {}: server removed from {participant}",
            self.inner.topic
        );
        if !self.inner.servers_available() {
            self.inner.deactivate();
        }
    }

    pub fn state(&self) -> BridgeState {
        let inner = &self.inner;
        if inner.destroyed.load(Ordering::Acquire) {
            BridgeState::Destroyed
        } else if inner.enabled.load(Ordering::Acquire) {
            BridgeState::Enabled
        } else if inner.init_done.load(Ordering::Acquire) {
            BridgeState::Disabled
        } else {
            BridgeState::Created
        }
    }

    pub fn stats(&self) -> BridgeStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Disable, then drop endpoints, registries and tasks. Terminal.
    pub fn destroy(&self) {
        self.disable();
        let inner = &self.inner;
        let _guard = inner.lifecycle.lock();
        if inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        for (_, slot) in inner.tasks.lock().drain() {
            slot.reader.clear_data_callback();
            inner.thread_pool.unregister(slot.task_id);
        }
        if let Some(task_id) = inner.sweep_task.lock().take() {
            inner.thread_pool.unregister(task_id);
        }
        let mut endpoints = inner.endpoints.write();
        endpoints.request_readers.clear();
        endpoints.reply_writers.clear();
        endpoints.reply_readers.clear();
        endpoints.request_writers.clear();
        inner.registries.write().clear();
        tracing::debug!("rpc bridge destroyed: {}", inner.topic);
    }
}

impl Drop for RpcBridge {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Display for RpcBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let servers: usize = self
            .inner
            .current_servers
            .lock()
            .values()
            .map(|set| set.len())
            .sum();
        write!(
            f,
            "RpcBridge{{{} [{}] servers: {servers}}}",
            self.inner.topic,
            self.state()
        )
    }
}

impl RpcBridgeInner {
    fn servers_available(&self) -> bool {
        self.current_servers
            .lock()
            .values()
            .any(|set| !set.is_empty())
    }

    /// Enable forwarding if the orchestrator allows it and a server is
    /// reachable. The first successful activation creates the endpoints.
    fn try_activate(&self, self_arc: &Arc<RpcBridgeInner>) -> Result<()> {
        let _guard = self.lifecycle.lock();
        if self.destroyed.load(Ordering::Acquire)
            || self.enabled.load(Ordering::Acquire)
            || !self.allowed.load(Ordering::Acquire)
            || !self.servers_available()
        {
            return Ok(());
        }

        if !self.init_done.load(Ordering::Acquire) {
            self.init(self_arc)?;
            self.init_done.store(true, Ordering::Release);
        }

        self.enabled.store(true, Ordering::Release);
        tracing::info!("rpc bridge enabled: {}", self.topic);
        self.kick_idle_readers();
        Ok(())
    }

    /// Stop forwarding and forget outstanding correlations. Endpoints stay.
    fn deactivate(&self) {
        let _guard = self.lifecycle.lock();
        if !self.enabled.swap(false, Ordering::AcqRel) {
            return;
        }
        let _exclusive = self.on_transmission.write();
        for registry in self.registries.read().values() {
            registry.clear();
        }
        tracing::info!("rpc bridge disabled: {}", self.topic);
    }

    /// Create the proxy-server and proxy-client endpoint quartets on every
    /// participant. Runs once, under the lifecycle lock.
    fn init(&self, self_arc: &Arc<RpcBridgeInner>) -> Result<()> {
        let mut endpoints = self.endpoints.write();
        let mut registries = self.registries.write();

        for (participant_id, participant) in self.participants.all() {
            // Proxy server: receive requests from local clients, return
            // their replies.
            match participant.create_reader(&self.topic.request_topic) {
                Ok(reader) => {
                    endpoints
                        .request_readers
                        .insert(participant_id.clone(), Arc::clone(&reader));
                    self.create_slot(self_arc, reader, ReaderRole::Request, &participant_id)?;
                }
                Err(Error::Unsupported(_)) => continue,
                Err(err) => return Err(init_error(&self.topic, &participant_id, err)),
            }
            let reply_writer = participant
                .create_writer(&self.topic.reply_topic)
                .map_err(|err| init_error(&self.topic, &participant_id, err))?;
            endpoints
                .reply_writers
                .insert(participant_id.clone(), Arc::new(WriterSlot::new(reply_writer)));

            // Proxy client: forward requests to local servers, collect
            // their replies.
            let reply_reader = participant
                .create_reader(&self.topic.reply_topic)
                .map_err(|err| init_error(&self.topic, &participant_id, err))?;
            endpoints
                .reply_readers
                .insert(participant_id.clone(), Arc::clone(&reply_reader));
            self.create_slot(self_arc, reply_reader, ReaderRole::Reply, &participant_id)?;

            let request_writer = participant
                .create_writer(&self.topic.request_topic)
                .map_err(|err| init_error(&self.topic, &participant_id, err))?;
            endpoints
                .request_writers
                .insert(participant_id.clone(), Arc::new(WriterSlot::new(request_writer)));

            registries.insert(
                participant_id.clone(),
                Arc::new(ServiceRegistry::new(
                    participant_id.clone(),
                    self.topic.clone(),
                )),
            );
        }

        // Maintenance sweep runs below forwarding priority.
        let sweep_id = TaskId::unique();
        let sweep_bridge = Arc::downgrade(self_arc);
        self.thread_pool.register(
            sweep_id,
            Arc::new(move || {
                if let Some(bridge) = sweep_bridge.upgrade() {
                    bridge.sweep_registries();
                }
            }),
        )?;
        *self.sweep_task.lock() = Some(sweep_id);

        Ok(())
    }

    fn create_slot(
        &self,
        self_arc: &Arc<RpcBridgeInner>,
        reader: Arc<dyn Reader>,
        role: ReaderRole,
        participant_id: &ParticipantId,
    ) -> Result<()> {
        let guid = reader.guid();
        let task_id = TaskId::unique();

        let task_bridge = Arc::downgrade(self_arc);
        self.thread_pool.register(
            task_id,
            Arc::new(move || {
                if let Some(bridge) = task_bridge.upgrade() {
                    bridge.transmit(guid);
                }
            }),
        )?;

        let callback_bridge = Arc::downgrade(self_arc);
        reader.set_data_callback(Box::new(move || {
            if let Some(bridge) = callback_bridge.upgrade() {
                bridge.on_data_available(guid);
            }
        }));

        self.tasks.lock().insert(
            guid,
            ReaderSlot {
                task_id,
                reader,
                role,
                participant: participant_id.clone(),
                emitted: false,
                transmit_guard: Arc::new(Mutex::new(())),
            },
        );
        Ok(())
    }

    fn on_data_available(&self, reader_guid: Guid) {
        if !self.enabled.load(Ordering::Acquire) {
            return;
        }

        let task_id = {
            let mut tasks = self.tasks.lock();
            let Some(slot) = tasks.get_mut(&reader_guid) else {
                return;
            };
            if slot.emitted {
                return;
            }
            slot.emitted = true;
            slot.task_id
        };

        if let Err(err) = self.thread_pool.emit_with_priority(task_id, PRIORITY_FORWARD) {
            tracing::warn!("cannot schedule rpc forwarding for {}: {err}", self.topic);
        }
    }

    fn kick_idle_readers(&self) {
        let mut scheduled = Vec::new();
        {
            let mut tasks = self.tasks.lock();
            for slot in tasks.values_mut() {
                if !slot.emitted {
                    slot.emitted = true;
                    scheduled.push(slot.task_id);
                }
            }
        }
        for task_id in scheduled {
            if let Err(err) = self.thread_pool.emit_with_priority(task_id, PRIORITY_FORWARD) {
                tracing::warn!("cannot schedule rpc forwarding for {}: {err}", self.topic);
            }
        }
    }

    fn transmit(&self, reader_guid: Guid) {
        let _on_transmission = self.on_transmission.read();

        let (reader, role, participant, guard) = {
            let tasks = self.tasks.lock();
            match tasks.get(&reader_guid) {
                Some(slot) => (
                    Arc::clone(&slot.reader),
                    slot.role,
                    slot.participant.clone(),
                    Arc::clone(&slot.transmit_guard),
                ),
                None => return,
            }
        };
        let _transmit = guard.lock();

        loop {
            if !self.enabled.load(Ordering::Acquire) || self.destroyed.load(Ordering::Acquire) {
                self.clear_emitted(reader_guid);
                return;
            }

            let sample = match reader.take() {
                Ok(Some(sample)) => Some(sample),
                Ok(None) => {
                    let mut tasks = self.tasks.lock();
                    let Some(slot) = tasks.get_mut(&reader_guid) else {
                        return;
                    };
                    match reader.take() {
                        Ok(Some(sample)) => Some(sample),
                        _ => {
                            slot.emitted = false;
                            return;
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!("take failed on {}: {err}", self.topic);
                    self.clear_emitted(reader_guid);
                    return;
                }
            };

            if let Some(sample) = sample {
                match role {
                    ReaderRole::Request => self.forward_request(&participant, sample),
                    ReaderRole::Reply => self.forward_reply(&participant, sample),
                }
            }
        }
    }

    fn clear_emitted(&self, reader_guid: Guid) {
        if let Some(slot) = self.tasks.lock().get_mut(&reader_guid) {
            slot.emitted = false;
        }
    }

    /// Forward a client request through every proxy client in contact with
    /// a server. The registry entry is recorded before the write so a reply
    /// arriving instantly still correlates.
    fn forward_request(&self, origin: &ParticipantId, mut sample: Sample) {
        let Some(origin_identity) = sample.identity() else {
            tracing::warn!(
                "request without identity on {} discarded",
                self.topic
            );
            self.release(&mut sample);
            return;
        };

        let targets: Vec<(ParticipantId, Arc<WriterSlot>, Arc<ServiceRegistry>)> = {
            let servers = self.current_servers.lock();
            let endpoints = self.endpoints.read();
            let registries = self.registries.read();
            endpoints
                .request_writers
                .iter()
                .filter(|(participant, _)| *participant != origin)
                .filter(|(participant, _)| {
                    servers.get(*participant).is_some_and(|set| !set.is_empty())
                })
                .filter_map(|(participant, slot)| {
                    registries.get(participant).map(|registry| {
                        (participant.clone(), Arc::clone(slot), Arc::clone(registry))
                    })
                })
                .collect()
        };

        if targets.is_empty() {
            tracing::warn!(
                "request on {} dropped: no server in reach",
                self.topic
            );
            self.release(&mut sample);
            return;
        }

        let bytes = sample.payload.len() as u64;
        for (participant, writer_slot, registry) in targets {
            let forwarded_identity = writer_slot.next_identity();
            registry.add(forwarded_identity, origin.clone(), origin_identity);

            match self.payload_pool.share(&sample.payload) {
                Ok(payload) => {
                    let forwarded = resample(
                        &sample,
                        payload,
                        WriteParams {
                            sample_identity: forwarded_identity,
                            related_sample_identity: SampleIdentity::zero(),
                        },
                    );
                    match writer_slot.writer.write(&forwarded) {
                        Ok(()) => self.stats.record_forward(bytes),
                        Err(err) => {
                            // Entry stays until a reply arrives or the
                            // bridge is disabled.
                            self.stats.record_write_error();
                            tracing::warn!(
                                "request write to {participant} failed on {}: {err}",
                                self.topic
                            );
                        }
                    }
                }
                Err(err) => tracing::error!("payload share failed: {err}"),
            }

            if registry.len() > REGISTRY_SWEEP_THRESHOLD {
                self.schedule_sweep();
            }
        }

        self.release(&mut sample);
    }

    /// Route a server reply back to the proxy server the request entered
    /// through.
    fn forward_reply(&self, from: &ParticipantId, mut sample: Sample) {
        let Some(related) = sample.related_identity() else {
            tracing::warn!("reply without related identity on {} discarded", self.topic);
            self.release(&mut sample);
            return;
        };

        let entry = {
            let registries = self.registries.read();
            registries.get(from).and_then(|registry| registry.take(&related))
        };

        let Some(entry) = entry else {
            tracing::warn!(
                "uncorrelated reply {related} on {} discarded",
                self.topic
            );
            self.release(&mut sample);
            return;
        };

        let writer_slot = {
            let endpoints = self.endpoints.read();
            endpoints.reply_writers.get(&entry.origin_participant).cloned()
        };

        match writer_slot {
            Some(writer_slot) => match self.payload_pool.share(&sample.payload) {
                Ok(payload) => {
                    let bytes = payload.len() as u64;
                    let reply = resample(
                        &sample,
                        payload,
                        WriteParams {
                            sample_identity: writer_slot.next_identity(),
                            related_sample_identity: entry.origin_identity,
                        },
                    );
                    match writer_slot.writer.write(&reply) {
                        Ok(()) => self.stats.record_forward(bytes),
                        Err(err) => {
                            self.stats.record_write_error();
                            tracing::warn!(
                                "reply write to {} failed on {}: {err}",
                                entry.origin_participant,
                                self.topic
                            );
                        }
                    }
                }
                Err(err) => tracing::error!("payload share failed: {err}"),
            },
            None => tracing::warn!(
                "reply for unknown origin {} on {} discarded",
                entry.origin_participant,
                self.topic
            ),
        }

        self.release(&mut sample);
    }

    fn schedule_sweep(&self) {
        if let Some(task_id) = *self.sweep_task.lock() {
            if let Err(err) = self
                .thread_pool
                .emit_with_priority(task_id, PRIORITY_MAINTENANCE)
            {
                tracing::debug!("cannot schedule registry sweep: {err}");
            }
        }
    }

    fn sweep_registries(&self) {
        for registry in self.registries.read().values() {
            let removed = registry.sweep(REGISTRY_ENTRY_MAX_AGE);
            if removed > 0 {
                tracing::debug!("{registry}: swept {removed} stale entries");
            }
        }
    }

    fn release(&self, sample: &mut Sample) {
        if let Err(err) = self.payload_pool.release_payload(&mut sample.payload) {
            tracing::error!("payload release failed on {}: {err}", self.topic);
        }
    }
}

fn init_error(topic: &RpcTopic, participant: &ParticipantId, err: Error) -> Error {
    Error::Initialization(format!("rpc endpoints for {topic} in {participant}: {err}"))
}

fn resample(sample: &Sample, payload: crate::payload::Payload, params: WriteParams) -> Sample {
    Sample {
        payload,
        source_guid: sample.source_guid,
        source_timestamp_ns: sample.source_timestamp_ns,
        kind: sample.kind,
        instance_handle: sample.instance_handle.clone(),
        writer_qos: sample.writer_qos,
        receiver_participant: sample.receiver_participant.clone(),
        write_params: Some(params),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DiscoveryDatabase;
    use crate::participant::EchoParticipant;

    struct Fixture {
        pool: Arc<PayloadPool>,
        threads: Arc<SlotThreadPool>,
        participants: Arc<ParticipantsDatabase>,
        client_side: Arc<EchoParticipant>,
        server_side: Arc<EchoParticipant>,
    }

    fn fixture() -> Fixture {
        let pool = PayloadPool::new();
        let discovery = Arc::new(DiscoveryDatabase::new());
        let participants = Arc::new(ParticipantsDatabase::new());
        let threads = Arc::new(SlotThreadPool::new(2));
        threads.enable();

        let client_side = EchoParticipant::new(
            ParticipantId::from("a"),
            Arc::clone(&pool),
            Arc::clone(&discovery),
        );
        let server_side = EchoParticipant::new(
            ParticipantId::from("c"),
            Arc::clone(&pool),
            Arc::clone(&discovery),
        );
        participants
            .add_participant(ParticipantId::from("a"), client_side.clone())
            .expect("a");
        participants
            .add_participant(ParticipantId::from("c"), server_side.clone())
            .expect("c");

        Fixture {
            pool,
            threads,
            participants,
            client_side,
            server_side,
        }
    }

    fn bridge(fx: &Fixture) -> RpcBridge {
        RpcBridge::new(
            RpcTopic::new("add", "AddTwoInts"),
            Arc::clone(&fx.participants),
            Arc::clone(&fx.pool),
            Arc::clone(&fx.threads),
        )
    }

    #[test]
    fn test_stays_disabled_without_servers() {
        let fx = fixture();
        let bridge = bridge(&fx);

        bridge.enable().expect("enable");
        assert_eq!(bridge.state(), BridgeState::Created);
    }

    #[test]
    fn test_activates_when_server_appears() {
        let fx = fixture();
        let bridge = bridge(&fx);
        bridge.enable().expect("enable");

        let server = fx.server_side.rpc_server("add", "AddTwoInts");
        bridge.discovered_service(ParticipantId::from("c"), server.guid_prefix());
        assert_eq!(bridge.state(), BridgeState::Enabled);

        bridge.removed_service(&ParticipantId::from("c"), &server.guid_prefix());
        assert_eq!(bridge.state(), BridgeState::Disabled);
    }

    #[test]
    fn test_round_trip_correlation() {
        let fx = fixture();
        let bridge = bridge(&fx);
        bridge.enable().expect("enable");

        let server = fx.server_side.rpc_server("add", "AddTwoInts");
        bridge.discovered_service(ParticipantId::from("c"), server.guid_prefix());

        let client = fx.client_side.rpc_client("add", "AddTwoInts");
        let request_id = client.send_request(&[41]).expect("request");

        let request = server
            .recv_request(Duration::from_millis(500))
            .expect("request forwarded");
        assert_eq!(request.bytes(), &[41]);
        let forwarded_id = request.identity().expect("forwarded identity");
        // The proxy rewrites the identity on the way out.
        assert_ne!(forwarded_id, request_id);

        server
            .send_reply(&[42], forwarded_id)
            .expect("reply");

        let reply = client
            .recv_reply(Duration::from_millis(500))
            .expect("reply delivered");
        assert_eq!(reply.bytes(), &[42]);
        assert_eq!(reply.related_identity(), Some(request_id));
    }

    #[test]
    fn test_uncorrelated_reply_discarded() {
        let fx = fixture();
        let bridge = bridge(&fx);
        bridge.enable().expect("enable");

        let server = fx.server_side.rpc_server("add", "AddTwoInts");
        bridge.discovered_service(ParticipantId::from("c"), server.guid_prefix());

        let client = fx.client_side.rpc_client("add", "AddTwoInts");
        server
            .send_reply(&[9], SampleIdentity::new(Guid::for_local_endpoint("x", 1), 77))
            .expect("stray reply");

        assert!(client.recv_reply(Duration::from_millis(200)).is_none());
    }

    #[test]
    fn test_no_request_forwarded_after_all_servers_gone() {
        let fx = fixture();
        let bridge = bridge(&fx);
        bridge.enable().expect("enable");

        let server = fx.server_side.rpc_server("add", "AddTwoInts");
        bridge.discovered_service(ParticipantId::from("c"), server.guid_prefix());
        bridge.removed_service(&ParticipantId::from("c"), &server.guid_prefix());
        assert_eq!(bridge.state(), BridgeState::Disabled);

        let client = fx.client_side.rpc_client("add", "AddTwoInts");
        client.send_request(&[1]).expect("request");
        assert!(server.recv_request(Duration::from_millis(200)).is_none());
    }
}
