// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bridge for one data topic.
//!
//! For every participant the bridge owns one reader (samples entering the
//! fabric there) and one writer (samples leaving it there); participants
//! that only support one direction contribute only that direction. Each
//! reader has a pre-registered forwarding task; the data-available callback
//! raises an `emitted` flag and schedules the task, and the task drains the
//! reader, republishing each sample through every other participant's
//! writer.
//!
//! Guarantees:
//! - at most one forwarding pass per reader is queued or running,
//! - per-source-writer sample order is preserved,
//! - after `disable` returns, no further writes are issued.

use crate::bridge::{BridgeState, BridgeStats, BridgeStatsSnapshot};
use crate::error::{Error, Result};
use crate::participant::{ParticipantsDatabase, Reader, Writer};
use crate::payload::PayloadPool;
use crate::runtime::{SlotThreadPool, TaskId, PRIORITY_FORWARD};
use crate::types::{Guid, ParticipantId, Sample, TopicId};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct ReaderSlot {
    task_id: TaskId,
    reader: Arc<dyn Reader>,
    /// True while a forwarding pass for this reader is queued or running.
    emitted: bool,
    /// Serializes forwarding passes of this reader.
    transmit_guard: Arc<Mutex<()>>,
}

#[derive(Default)]
struct Endpoints {
    readers: BTreeMap<ParticipantId, Arc<dyn Reader>>,
    writers: BTreeMap<ParticipantId, Arc<dyn Writer>>,
}

struct DataBridgeInner {
    topic: TopicId,
    participants: Arc<ParticipantsDatabase>,
    payload_pool: Arc<PayloadPool>,
    thread_pool: Arc<SlotThreadPool>,
    enabled: AtomicBool,
    init_done: AtomicBool,
    destroyed: AtomicBool,
    /// Serializes enable/disable/destroy.
    lifecycle: Mutex<()>,
    endpoints: RwLock<Endpoints>,
    tasks: Mutex<HashMap<Guid, ReaderSlot>>,
    /// Shared while transmitting; exclusive in disable.
    on_transmission: RwLock<()>,
    stats: BridgeStats,
}

/// Per-topic forwarding object for data topics.
pub struct DataBridge {
    inner: Arc<DataBridgeInner>,
}

impl DataBridge {
    /// Create the bridge disabled; no endpoints exist until the first
    /// enable.
    pub fn new(
        topic: TopicId,
        participants: Arc<ParticipantsDatabase>,
        payload_pool: Arc<PayloadPool>,
        thread_pool: Arc<SlotThreadPool>,
    ) -> Self {
        tracing::debug!("creating data bridge for {topic}");
        Self {
            inner: Arc::new(DataBridgeInner {
                topic,
                participants,
                payload_pool,
                thread_pool,
                enabled: AtomicBool::new(false),
                init_done: AtomicBool::new(false),
                destroyed: AtomicBool::new(false),
                lifecycle: Mutex::new(()),
                endpoints: RwLock::new(Endpoints::default()),
                tasks: Mutex::new(HashMap::new()),
                on_transmission: RwLock::new(()),
                stats: BridgeStats::default(),
            }),
        }
    }

    pub fn topic(&self) -> &TopicId {
        &self.inner.topic
    }

    /// Start forwarding. The first enable creates the endpoints; on an init
    /// failure the bridge stays disabled and the error is returned.
    /// Enabling an enabled bridge is a no-op.
    pub fn enable(&self) -> Result<()> {
        let inner = &self.inner;
        let _guard = inner.lifecycle.lock();
        if inner.destroyed.load(Ordering::Acquire) {
            tracing::warn!("enable on destroyed bridge {}", inner.topic);
            return Ok(());
        }
        if inner.enabled.load(Ordering::Acquire) {
            return Ok(());
        }

        if !inner.init_done.load(Ordering::Acquire) {
            inner.init(&self.inner)?;
            inner.init_done.store(true, Ordering::Release);
        }

        inner.enabled.store(true, Ordering::Release);
        tracing::info!("data bridge enabled: {}", inner.topic);

        // Samples may have queued up while disabled; schedule a pass per
        // idle reader.
        inner.kick_idle_readers();
        Ok(())
    }

    /// Stop forwarding. Blocks until no in-flight pass can issue another
    /// write. Disabling a disabled bridge is a no-op.
    pub fn disable(&self) {
        let inner = &self.inner;
        let _guard = inner.lifecycle.lock();
        if !inner.enabled.swap(false, Ordering::AcqRel) {
            return;
        }
        // Taking the transmission lock exclusively waits out every running
        // pass; new passes observe the cleared flag and exit immediately.
        let _exclusive = inner.on_transmission.write();
        tracing::info!("data bridge disabled: {}", inner.topic);
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

    /// Disable, then drop endpoints and forwarding tasks. Terminal.
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
        let mut endpoints = inner.endpoints.write();
        endpoints.readers.clear();
        endpoints.writers.clear();
        tracing::debug!("data bridge destroyed: {}", inner.topic);
    }
}

impl Drop for DataBridge {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Display for DataBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let endpoints = self.inner.endpoints.read();
        write!(
            f,
            "DataBridge{{{} [{}] readers: {}, writers: {}}}",
            self.inner.topic,
            self.state(),
            endpoints.readers.len(),
            endpoints.writers.len()
        )
    }
}

impl DataBridgeInner {
    /// Create endpoints on every registered participant. Runs once, under
    /// the lifecycle lock.
    fn init(&self, self_arc: &Arc<DataBridgeInner>) -> Result<()> {
        let mut endpoints = self.endpoints.write();
        for (participant_id, participant) in self.participants.all() {
            match participant.create_writer(&self.topic) {
                Ok(writer) => {
                    endpoints.writers.insert(participant_id.clone(), writer);
                }
                Err(Error::Unsupported(reason)) => {
                    tracing::debug!("{participant_id} cannot write {}: {reason}", self.topic);
                }
                Err(err) => {
                    return Err(Error::Initialization(format!(
                        "writer for {} in {participant_id}: {err}",
                        self.topic
                    )));
                }
            }

            match participant.create_reader(&self.topic) {
                Ok(reader) => {
                    endpoints
                        .readers
                        .insert(participant_id.clone(), Arc::clone(&reader));
                    self.create_slot(self_arc, reader)?;
                }
                Err(Error::Unsupported(reason)) => {
                    tracing::debug!("{participant_id} cannot read {}: {reason}", self.topic);
                }
                Err(err) => {
                    return Err(Error::Initialization(format!(
                        "reader for {} in {participant_id}: {err}",
                        self.topic
                    )));
                }
            }
        }
        Ok(())
    }

    /// Register the forwarding task of one reader and hook its
    /// data-available callback.
    fn create_slot(&self, self_arc: &Arc<DataBridgeInner>, reader: Arc<dyn Reader>) -> Result<()> {
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

        // The reader keeps only a weak backref; the bridge may be destroyed
        // while the participant (and its callback) is still alive.
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
                emitted: false,
                transmit_guard: Arc::new(Mutex::new(())),
            },
        );
        Ok(())
    }

    /// Transport-thread notification: flag the reader and schedule its task.
    /// Never blocks beyond two short critical sections.
    fn on_data_available(&self, reader_guid: Guid) {
        if !self.enabled.load(Ordering::Acquire) {
            // Samples stay queued in the reader; enable() reschedules.
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
            tracing::warn!("cannot schedule forwarding for {}: {err}", self.topic);
        }
    }

    /// Schedule a pass for every reader whose flag is down.
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
                tracing::warn!("cannot schedule forwarding for {}: {err}", self.topic);
            }
        }
    }

    /// Forwarding pass: drain `reader` and republish through every other
    /// participant's writer. Runs on a pool worker.
    fn transmit(&self, reader_guid: Guid) {
        // Shared for the whole pass: disable takes this exclusively.
        let _on_transmission = self.on_transmission.read();

        let (reader, guard) = {
            let tasks = self.tasks.lock();
            match tasks.get(&reader_guid) {
                Some(slot) => (Arc::clone(&slot.reader), Arc::clone(&slot.transmit_guard)),
                None => return, // reader removed
            }
        };
        // One pass at a time per reader, even if a stale emission raced.
        let _transmit = guard.lock();

        loop {
            if !self.enabled.load(Ordering::Acquire) || self.destroyed.load(Ordering::Acquire) {
                self.clear_emitted(reader_guid);
                return;
            }

            let sample = match reader.take() {
                Ok(Some(sample)) => Some(sample),
                Ok(None) => {
                    // Re-check under the flag lock: a sample arriving after
                    // the empty take but before the flag clears must not be
                    // stranded.
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
                self.forward(sample);
            }
        }
    }

    fn clear_emitted(&self, reader_guid: Guid) {
        if let Some(slot) = self.tasks.lock().get_mut(&reader_guid) {
            slot.emitted = false;
        }
    }

    /// Republish one sample through every eligible peer writer, then return
    /// the payload acquisition taken by the reader.
    fn forward(&self, mut sample: Sample) {
        let source = sample.receiver_participant.clone();
        let writers: Vec<(ParticipantId, Arc<dyn Writer>)> = {
            let endpoints = self.endpoints.read();
            endpoints
                .writers
                .iter()
                .filter(|(participant_id, _)| **participant_id != source)
                .map(|(participant_id, writer)| (participant_id.clone(), Arc::clone(writer)))
                .collect()
        };

        let bytes = sample.payload.len() as u64;
        for (participant_id, writer) in writers {
            match writer.write(&sample) {
                Ok(()) => self.stats.record_forward(bytes),
                Err(err) => {
                    // One failing peer must not starve the others.
                    self.stats.record_write_error();
                    tracing::warn!(
                        "write to {participant_id} failed on {}: {err}",
                        self.topic
                    );
                }
            }
        }

        if let Err(err) = self.payload_pool.release_payload(&mut sample.payload) {
            tracing::error!("payload release failed on {}: {err}", self.topic);
        }
    }
}
