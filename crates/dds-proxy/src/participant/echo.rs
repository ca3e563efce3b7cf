// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process loopback participant.
//!
//! An echo participant is an isolated island: entities attached to it
//! (publishers, subscribers, RPC clients and servers) can only reach
//! entities on other participants through the proxy. Locally published
//! samples feed the proxy-facing readers; proxy-facing writers feed the
//! locally attached subscribers. Attaching or detaching an entity is
//! reported to the discovery database like any transport would.

use crate::discovery::{DiscoveryDatabase, EndpointInfo, EndpointKind};
use crate::error::Result;
use crate::participant::{
    DataAvailableCallback, Participant, ParticipantKind, Reader, Writer,
};
use crate::payload::{Payload, PayloadPool};
use crate::types::{
    Guid, GuidPrefix, ParticipantId, QosSnapshot, RpcTopic, Sample, SampleIdentity, SampleKind,
    TopicId, WriteParams,
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

struct LocalSubscriber {
    guid: Guid,
    sender: Sender<Sample>,
}

#[derive(Default)]
struct TopicBus {
    /// Proxy-facing readers: receive locally published samples.
    proxy_readers: Vec<Arc<EchoReader>>,
    /// Test-facing consumers: receive what proxy writers republish here.
    local_subscribers: Vec<LocalSubscriber>,
}

struct EchoInner {
    id: ParticipantId,
    pool: Arc<PayloadPool>,
    discovery: Arc<DiscoveryDatabase>,
    buses: Mutex<HashMap<TopicId, TopicBus>>,
    entity_counter: AtomicU32,
}

impl EchoInner {
    fn next_guid(&self) -> Guid {
        let counter = self.entity_counter.fetch_add(1, Ordering::Relaxed) + 1;
        Guid::for_local_endpoint(self.id.as_str(), counter)
    }

    fn make_sample(
        &self,
        payload: Payload,
        source_guid: Guid,
        qos: QosSnapshot,
        write_params: Option<WriteParams>,
    ) -> Sample {
        Sample {
            payload,
            source_guid,
            source_timestamp_ns: now_ns(),
            kind: SampleKind::Alive,
            instance_handle: Vec::new(),
            writer_qos: qos,
            receiver_participant: self.id.clone(),
            write_params,
        }
    }

    /// Hand a locally produced sample to every proxy-facing reader on the
    /// topic. Callbacks fire outside the bus lock.
    fn deliver_to_readers(&self, topic: &TopicId, sample: Sample) {
        let readers: Vec<Arc<EchoReader>> = {
            let mut buses = self.buses.lock();
            let bus = buses.entry(topic.clone()).or_default();
            // Drop readers nobody else holds anymore.
            bus.proxy_readers.retain(|r| Arc::strong_count(r) > 1);
            bus.proxy_readers.clone()
        };

        match readers.len() {
            0 => drop(sample), // nobody listening yet; payload returns to the pool
            1 => readers[0].push(sample),
            _ => {
                for reader in &readers[1..] {
                    match self.pool.share(&sample.payload) {
                        Ok(payload) => reader.push(clone_sample(&sample, payload)),
                        Err(err) => tracing::error!("payload share failed: {err}"),
                    }
                }
                readers[0].push(sample);
            }
        }
    }

    /// Republish a sample from a proxy writer to the local subscribers.
    fn deliver_to_subscribers(&self, topic: &TopicId, sample: &Sample) -> Result<()> {
        let subscribers: Vec<(Guid, Sender<Sample>)> = {
            let mut buses = self.buses.lock();
            let bus = buses.entry(topic.clone()).or_default();
            bus.local_subscribers
                .iter()
                .map(|s| (s.guid, s.sender.clone()))
                .collect()
        };

        for (guid, sender) in subscribers {
            let payload = self.pool.share(&sample.payload)?;
            let mut delivered = clone_sample(sample, payload);
            delivered.receiver_participant = self.id.clone();
            if sender.send(delivered).is_err() {
                tracing::debug!("subscriber {guid} gone, dropping sample");
            }
        }
        Ok(())
    }

    fn remove_subscriber(&self, topic: &TopicId, guid: Guid) {
        let mut buses = self.buses.lock();
        if let Some(bus) = buses.get_mut(topic) {
            bus.local_subscribers.retain(|s| s.guid != guid);
        }
    }
}

fn clone_sample(sample: &Sample, payload: Payload) -> Sample {
    Sample {
        payload,
        source_guid: sample.source_guid,
        source_timestamp_ns: sample.source_timestamp_ns,
        kind: sample.kind,
        instance_handle: sample.instance_handle.clone(),
        writer_qos: sample.writer_qos,
        receiver_participant: sample.receiver_participant.clone(),
        write_params: sample.write_params,
    }
}

/// Loopback participant kind.
pub struct EchoParticipant {
    inner: Arc<EchoInner>,
}

impl EchoParticipant {
    pub fn new(
        id: ParticipantId,
        pool: Arc<PayloadPool>,
        discovery: Arc<DiscoveryDatabase>,
    ) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(EchoInner {
                id,
                pool,
                discovery,
                buses: Mutex::new(HashMap::new()),
                entity_counter: AtomicU32::new(0),
            }),
        })
    }

    /// Attach a local publisher on `topic`. Announced to discovery as an
    /// observed writer endpoint.
    pub fn create_publisher(&self, topic: &TopicId) -> EchoPublisher {
        self.create_publisher_with_qos(topic, QosSnapshot::default())
    }

    pub fn create_publisher_with_qos(&self, topic: &TopicId, qos: QosSnapshot) -> EchoPublisher {
        let guid = self.inner.next_guid();
        self.inner.discovery.add_endpoint(EndpointInfo {
            guid,
            topic: topic.clone(),
            kind: EndpointKind::Writer,
            discoverer: self.inner.id.clone(),
            qos,
        });
        EchoPublisher {
            inner: Arc::clone(&self.inner),
            topic: topic.clone(),
            guid,
            qos,
        }
    }

    /// Attach a local subscriber on `topic`. Announced to discovery as an
    /// observed reader endpoint.
    pub fn create_subscriber(&self, topic: &TopicId) -> EchoSubscriber {
        let guid = self.inner.next_guid();
        let (sender, receiver) = unbounded();
        self.inner
            .buses
            .lock()
            .entry(topic.clone())
            .or_default()
            .local_subscribers
            .push(LocalSubscriber { guid, sender });
        self.inner.discovery.add_endpoint(EndpointInfo {
            guid,
            topic: topic.clone(),
            kind: EndpointKind::Reader,
            discoverer: self.inner.id.clone(),
            qos: QosSnapshot::default(),
        });
        EchoSubscriber {
            inner: Arc::clone(&self.inner),
            topic: topic.clone(),
            guid,
            receiver,
        }
    }

    /// Attach a local RPC client for `service`.
    pub fn rpc_client(&self, service: &str, type_name: &str) -> EchoRpcClient {
        let rpc = RpcTopic::new(service, type_name);
        let request_guid = self.inner.next_guid();
        let reply_guid = self.inner.next_guid();
        let (sender, receiver) = unbounded();

        self.inner
            .buses
            .lock()
            .entry(rpc.reply_topic.clone())
            .or_default()
            .local_subscribers
            .push(LocalSubscriber {
                guid: reply_guid,
                sender,
            });

        self.inner.discovery.add_endpoint(EndpointInfo {
            guid: request_guid,
            topic: rpc.request_topic.clone(),
            kind: EndpointKind::Writer,
            discoverer: self.inner.id.clone(),
            qos: QosSnapshot::rpc(),
        });
        self.inner.discovery.add_endpoint(EndpointInfo {
            guid: reply_guid,
            topic: rpc.reply_topic.clone(),
            kind: EndpointKind::Reader,
            discoverer: self.inner.id.clone(),
            qos: QosSnapshot::rpc(),
        });

        EchoRpcClient {
            inner: Arc::clone(&self.inner),
            rpc,
            request_guid,
            reply_guid,
            sequence: AtomicI64::new(0),
            replies: receiver,
        }
    }

    /// Attach a local (real) RPC server for `service`. Its request reader is
    /// what discovery reports as a reachable server.
    pub fn rpc_server(&self, service: &str, type_name: &str) -> EchoRpcServer {
        let rpc = RpcTopic::new(service, type_name);
        let counter = self.inner.entity_counter.fetch_add(1, Ordering::Relaxed) + 1;
        // Servers get their own guid prefix: availability is tracked per
        // server instance, not per hosting participant.
        let server_tag = format!("{}#srv{}", self.inner.id, counter);
        let request_guid = Guid::for_local_endpoint(&server_tag, 1);
        let reply_guid = Guid::for_local_endpoint(&server_tag, 2);
        let (sender, receiver) = unbounded();

        self.inner
            .buses
            .lock()
            .entry(rpc.request_topic.clone())
            .or_default()
            .local_subscribers
            .push(LocalSubscriber {
                guid: request_guid,
                sender,
            });

        self.inner.discovery.add_endpoint(EndpointInfo {
            guid: request_guid,
            topic: rpc.request_topic.clone(),
            kind: EndpointKind::Reader,
            discoverer: self.inner.id.clone(),
            qos: QosSnapshot::rpc(),
        });
        self.inner.discovery.add_endpoint(EndpointInfo {
            guid: reply_guid,
            topic: rpc.reply_topic.clone(),
            kind: EndpointKind::Writer,
            discoverer: self.inner.id.clone(),
            qos: QosSnapshot::rpc(),
        });

        EchoRpcServer {
            inner: Arc::clone(&self.inner),
            rpc,
            request_guid,
            reply_guid,
            sequence: AtomicI64::new(0),
            requests: receiver,
            closed: AtomicBool::new(false),
        }
    }
}

impl Participant for EchoParticipant {
    fn id(&self) -> &ParticipantId {
        &self.inner.id
    }

    fn kind(&self) -> ParticipantKind {
        ParticipantKind::Echo
    }

    fn create_reader(&self, topic: &TopicId) -> Result<Arc<dyn Reader>> {
        let reader = Arc::new(EchoReader {
            guid: self.inner.next_guid(),
            topic: topic.clone(),
            participant: self.inner.id.clone(),
            queue: Mutex::new(VecDeque::new()),
            callback: RwLock::new(None),
        });
        self.inner
            .buses
            .lock()
            .entry(topic.clone())
            .or_default()
            .proxy_readers
            .push(Arc::clone(&reader));
        Ok(reader)
    }

    fn create_writer(&self, topic: &TopicId) -> Result<Arc<dyn Writer>> {
        Ok(Arc::new(EchoWriter {
            inner: Arc::clone(&self.inner),
            guid: self.inner.next_guid(),
            topic: topic.clone(),
        }))
    }
}

/// Proxy-facing reader endpoint of an echo participant.
struct EchoReader {
    guid: Guid,
    topic: TopicId,
    participant: ParticipantId,
    queue: Mutex<VecDeque<Sample>>,
    callback: RwLock<Option<DataAvailableCallback>>,
}

impl EchoReader {
    fn push(&self, sample: Sample) {
        self.queue.lock().push_back(sample);
        // Transport-thread notification: must stay non-blocking.
        if let Some(callback) = self.callback.read().as_ref() {
            callback();
        }
    }
}

impl Reader for EchoReader {
    fn guid(&self) -> Guid {
        self.guid
    }

    fn topic(&self) -> &TopicId {
        &self.topic
    }

    fn participant_id(&self) -> &ParticipantId {
        &self.participant
    }

    fn take(&self) -> Result<Option<Sample>> {
        Ok(self.queue.lock().pop_front())
    }

    fn set_data_callback(&self, callback: DataAvailableCallback) {
        *self.callback.write() = Some(callback);
    }

    fn clear_data_callback(&self) {
        *self.callback.write() = None;
    }
}

/// Proxy-facing writer endpoint of an echo participant.
struct EchoWriter {
    inner: Arc<EchoInner>,
    guid: Guid,
    topic: TopicId,
}

impl Writer for EchoWriter {
    fn guid(&self) -> Guid {
        self.guid
    }

    fn topic(&self) -> &TopicId {
        &self.topic
    }

    fn participant_id(&self) -> &ParticipantId {
        &self.inner.id
    }

    fn write(&self, sample: &Sample) -> Result<()> {
        self.inner.deliver_to_subscribers(&self.topic, sample)
    }
}

/// One sample received by a test-facing handle.
///
/// Dropping it returns the payload acquisition to the pool.
pub struct ReceivedSample {
    sample: Sample,
}

impl ReceivedSample {
    pub fn bytes(&self) -> &[u8] {
        self.sample.payload.bytes()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes().to_vec()
    }

    pub fn source_guid(&self) -> Guid {
        self.sample.source_guid
    }

    /// Identity of this sample (RPC requests and replies).
    pub fn identity(&self) -> Option<SampleIdentity> {
        self.sample.identity()
    }

    /// Identity of the request this sample answers (RPC replies).
    pub fn related_identity(&self) -> Option<SampleIdentity> {
        self.sample.related_identity()
    }
}

/// Test-facing publisher attached to an echo participant.
pub struct EchoPublisher {
    inner: Arc<EchoInner>,
    topic: TopicId,
    guid: Guid,
    qos: QosSnapshot,
}

impl EchoPublisher {
    pub fn guid(&self) -> Guid {
        self.guid
    }

    /// Publish one sample carrying `bytes`.
    pub fn publish(&self, bytes: &[u8]) -> Result<()> {
        let payload = self.inner.pool.get_payload_from(bytes)?;
        let sample = self.inner.make_sample(payload, self.guid, self.qos, None);
        self.inner.deliver_to_readers(&self.topic, sample);
        Ok(())
    }

    /// Change the publisher's forwarding-relevant QoS; observed by the proxy
    /// as an endpoint QoS change.
    pub fn set_qos(&mut self, qos: QosSnapshot) {
        self.qos = qos;
        self.inner.discovery.update_endpoint_qos(self.guid, qos);
    }
}

impl Drop for EchoPublisher {
    fn drop(&mut self) {
        self.inner.discovery.erase_endpoint(self.guid);
    }
}

/// Test-facing subscriber attached to an echo participant.
pub struct EchoSubscriber {
    inner: Arc<EchoInner>,
    topic: TopicId,
    guid: Guid,
    receiver: Receiver<Sample>,
}

impl EchoSubscriber {
    pub fn guid(&self) -> Guid {
        self.guid
    }

    /// Wait up to `timeout` for the next sample.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ReceivedSample> {
        self.receiver
            .recv_timeout(timeout)
            .ok()
            .map(|sample| ReceivedSample { sample })
    }

    /// Non-blocking receive.
    pub fn try_recv(&self) -> Option<ReceivedSample> {
        self.receiver
            .try_recv()
            .ok()
            .map(|sample| ReceivedSample { sample })
    }
}

impl Drop for EchoSubscriber {
    fn drop(&mut self) {
        self.inner.remove_subscriber(&self.topic, self.guid);
        self.inner.discovery.erase_endpoint(self.guid);
        // Unread samples return their payloads when the channel drops.
    }
}

/// Test-facing RPC client attached to an echo participant.
pub struct EchoRpcClient {
    inner: Arc<EchoInner>,
    rpc: RpcTopic,
    request_guid: Guid,
    reply_guid: Guid,
    sequence: AtomicI64,
    replies: Receiver<Sample>,
}

impl EchoRpcClient {
    /// Send one request; returns the identity replies will relate to.
    pub fn send_request(&self, bytes: &[u8]) -> Result<SampleIdentity> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let identity = SampleIdentity::new(self.request_guid, sequence);

        let payload = self.inner.pool.get_payload_from(bytes)?;
        let sample = self.inner.make_sample(
            payload,
            self.request_guid,
            QosSnapshot::rpc(),
            Some(WriteParams {
                sample_identity: identity,
                related_sample_identity: SampleIdentity::zero(),
            }),
        );
        self.inner
            .deliver_to_readers(&self.rpc.request_topic, sample);
        Ok(identity)
    }

    /// Wait up to `timeout` for the next reply.
    pub fn recv_reply(&self, timeout: Duration) -> Option<ReceivedSample> {
        self.replies
            .recv_timeout(timeout)
            .ok()
            .map(|sample| ReceivedSample { sample })
    }
}

impl Drop for EchoRpcClient {
    fn drop(&mut self) {
        self.inner
            .remove_subscriber(&self.rpc.reply_topic, self.reply_guid);
        self.inner.discovery.erase_endpoint(self.request_guid);
        self.inner.discovery.erase_endpoint(self.reply_guid);
    }
}

/// Test-facing RPC server attached to an echo participant.
pub struct EchoRpcServer {
    inner: Arc<EchoInner>,
    rpc: RpcTopic,
    request_guid: Guid,
    reply_guid: Guid,
    sequence: AtomicI64,
    requests: Receiver<Sample>,
    closed: AtomicBool,
}

impl EchoRpcServer {
    /// Prefix under which this server is tracked as available.
    pub fn guid_prefix(&self) -> GuidPrefix {
        self.request_guid.prefix
    }

    /// Wait up to `timeout` for the next request.
    pub fn recv_request(&self, timeout: Duration) -> Option<ReceivedSample> {
        self.requests
            .recv_timeout(timeout)
            .ok()
            .map(|sample| ReceivedSample { sample })
    }

    /// Answer the request identified by `related`.
    pub fn send_reply(&self, bytes: &[u8], related: SampleIdentity) -> Result<()> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let payload = self.inner.pool.get_payload_from(bytes)?;
        let sample = self.inner.make_sample(
            payload,
            self.reply_guid,
            QosSnapshot::rpc(),
            Some(WriteParams {
                sample_identity: SampleIdentity::new(self.reply_guid, sequence),
                related_sample_identity: related,
            }),
        );
        self.inner.deliver_to_readers(&self.rpc.reply_topic, sample);
        Ok(())
    }

    /// Detach the server: its endpoints disappear from discovery and the
    /// proxy stops counting it as available. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner
            .remove_subscriber(&self.rpc.request_topic, self.request_guid);
        self.inner.discovery.erase_endpoint(self.request_guid);
        self.inner.discovery.erase_endpoint(self.reply_guid);
    }
}

impl Drop for EchoRpcServer {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Arc<EchoParticipant>, Arc<PayloadPool>, Arc<DiscoveryDatabase>) {
        let pool = PayloadPool::new();
        let discovery = Arc::new(DiscoveryDatabase::new());
        let participant = EchoParticipant::new(
            ParticipantId::from("p0"),
            Arc::clone(&pool),
            Arc::clone(&discovery),
        );
        (participant, pool, discovery)
    }

    #[test]
    fn test_publisher_feeds_proxy_reader() {
        let (participant, pool, _discovery) = setup();
        let topic = TopicId::data("chatter", "String");

        let reader = participant.create_reader(&topic).expect("reader");
        let publisher = participant.create_publisher(&topic);
        publisher.publish(b"hello").expect("publish");

        let sample = reader.take().expect("take").expect("sample");
        assert_eq!(sample.payload.bytes(), b"hello");
        assert_eq!(sample.source_guid, publisher.guid());
        assert_eq!(sample.receiver_participant, ParticipantId::from("p0"));
        assert!(reader.take().expect("take").is_none());

        drop(sample);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_writer_feeds_local_subscriber() {
        let (participant, pool, _discovery) = setup();
        let topic = TopicId::data("chatter", "String");

        let subscriber = participant.create_subscriber(&topic);
        let writer = participant.create_writer(&topic).expect("writer");

        let payload = pool.get_payload_from(b"out").expect("payload");
        let sample = Sample {
            payload,
            source_guid: Guid::for_local_endpoint("elsewhere", 1),
            source_timestamp_ns: 1,
            kind: SampleKind::Alive,
            instance_handle: Vec::new(),
            writer_qos: QosSnapshot::default(),
            receiver_participant: ParticipantId::from("p1"),
            write_params: None,
        };
        writer.write(&sample).expect("write");
        drop(sample);

        let received = subscriber
            .recv_timeout(Duration::from_millis(100))
            .expect("delivered");
        assert_eq!(received.bytes(), b"out");
        drop(received);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_no_local_echo_between_publisher_and_subscriber() {
        let (participant, _pool, _discovery) = setup();
        let topic = TopicId::data("chatter", "String");

        let subscriber = participant.create_subscriber(&topic);
        let publisher = participant.create_publisher(&topic);
        publisher.publish(b"hello").expect("publish");

        // Islands: only the proxy connects local entities.
        assert!(subscriber.recv_timeout(Duration::from_millis(50)).is_none());
    }

    #[test]
    fn test_data_callback_fires_on_publish() {
        let (participant, _pool, _discovery) = setup();
        let topic = TopicId::data("chatter", "String");

        let reader = participant.create_reader(&topic).expect("reader");
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        reader.set_data_callback(Box::new(move || {
            flag.store(true, Ordering::SeqCst);
        }));

        participant
            .create_publisher(&topic)
            .publish(b"x")
            .expect("publish");
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_discovery_reports_attach_and_detach() {
        let (participant, _pool, discovery) = setup();
        let topic = TopicId::data("chatter", "String");

        let publisher = participant.create_publisher(&topic);
        let subscriber = participant.create_subscriber(&topic);
        assert_eq!(discovery.endpoints().len(), 2);

        drop(publisher);
        drop(subscriber);
        assert!(discovery.endpoints().is_empty());
    }

    #[test]
    fn test_rpc_server_announces_request_reader() {
        let (participant, _pool, discovery) = setup();
        let server = participant.rpc_server("add", "AddTwoInts");

        let servers: Vec<_> = discovery
            .endpoints()
            .into_iter()
            .filter(|e| e.is_rpc_server())
            .collect();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].guid.prefix, server.guid_prefix());

        server.close();
        assert!(discovery.endpoints().iter().all(|e| !e.is_rpc_server()));
    }

    #[test]
    fn test_two_servers_have_distinct_prefixes() {
        let (participant, _pool, _discovery) = setup();
        let first = participant.rpc_server("add", "AddTwoInts");
        let second = participant.rpc_server("add", "AddTwoInts");
        assert_ne!(first.guid_prefix(), second.guid_prefix());
    }

    #[test]
    fn test_rpc_request_carries_identity() {
        let (participant, pool, _discovery) = setup();
        let rpc = RpcTopic::new("add", "AddTwoInts");

        let request_reader = participant.create_reader(&rpc.request_topic).expect("reader");
        let client = participant.rpc_client("add", "AddTwoInts");

        let identity = client.send_request(&[41]).expect("request");
        let sample = request_reader.take().expect("take").expect("sample");
        assert_eq!(sample.identity(), Some(identity));
        assert_eq!(sample.payload.bytes(), &[41]);

        drop(sample);
        assert_eq!(pool.outstanding(), 0);
    }
}
