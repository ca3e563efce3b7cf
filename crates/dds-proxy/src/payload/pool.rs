// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Slot-based payload pool with per-acquisition reference counts.
//!
//! Each live payload occupies one slot; the slot's refcount equals the number
//! of outstanding acquisitions (one `get_payload` plus any number of
//! `share`s). Releasing the last acquisition recycles the buffer capacity.
//!
//! Double releases of a slot are a hard error surfaced to the caller.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

/// Handle to a pool slot.
///
/// Internal: payloads carry it so release can find the slot without a map
/// lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SlotHandle(u32);

/// One pooled buffer with its metadata.
///
/// A `Payload` cannot be cloned; sharing goes through
/// [`PayloadPool::share`], which bumps the slot refcount. Dropping a payload
/// that was never explicitly released returns its acquisition to the pool.
pub struct Payload {
    data: Option<Arc<Vec<u8>>>,
    len: u32,
    handle: Option<SlotHandle>,
    owner: Weak<PayloadPool>,
}

impl Payload {
    /// Payload carrying no bytes.
    pub fn empty() -> Self {
        Self {
            data: None,
            len: 0,
            handle: None,
            owner: Weak::new(),
        }
    }

    /// Number of bytes carried.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Borrow the payload bytes.
    pub fn bytes(&self) -> &[u8] {
        match &self.data {
            Some(data) => &data[..self.len as usize],
            None => &[],
        }
    }

    /// Whether the payload is backed by a pool slot.
    pub fn is_pooled(&self) -> bool {
        self.handle.is_some()
    }

    fn release_internal(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            // Empty or already-released payload: releasing again is benign.
            return Ok(());
        };
        let data = self.data.take();
        self.len = 0;
        // The payload's own strong reference must be gone before the pool
        // decides whether the buffer can be reclaimed.
        drop(data);

        if let Some(pool) = self.owner.upgrade() {
            pool.release_slot(handle)?;
        }
        Ok(())
    }
}

impl Drop for Payload {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(err) = self.release_internal() {
                tracing::error!("payload dropped with inconsistent refcount: {err}");
            }
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("len", &self.len)
            .field("pooled", &self.handle.is_some())
            .finish()
    }
}

struct Slot {
    refs: u32,
    data: Option<Arc<Vec<u8>>>,
}

struct PoolState {
    slots: Vec<Slot>,
    free_slots: Vec<usize>,
    /// Recycled buffer capacity, largest last.
    spare_buffers: Vec<Vec<u8>>,
    reserved_bytes: usize,
    acquired: u64,
    released: u64,
}

/// Acquisition/release accounting, checked at shutdown by tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolAccounting {
    pub acquired: u64,
    pub released: u64,
    pub reserved_bytes: usize,
}

/// Reference-counted buffer allocator shared by every bridge.
pub struct PayloadPool {
    state: Mutex<PoolState>,
    /// Hard cap on reserved bytes; `None` means unbounded.
    max_reserved_bytes: Option<usize>,
    weak_self: Weak<PayloadPool>,
}

impl PayloadPool {
    /// Create an unbounded pool.
    pub fn new() -> Arc<Self> {
        Self::with_capacity(None)
    }

    /// Create a pool with a hard cap on total reserved bytes.
    ///
    /// With a cap configured, `get_payload` fails with
    /// [`Error::PoolExhausted`] once the cap would be exceeded.
    pub fn with_capacity(max_reserved_bytes: Option<usize>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            state: Mutex::new(PoolState {
                slots: Vec::new(),
                free_slots: Vec::new(),
                spare_buffers: Vec::new(),
                reserved_bytes: 0,
                acquired: 0,
                released: 0,
            }),
            max_reserved_bytes,
            weak_self: weak.clone(),
        })
    }

    /// Acquire a payload of `size` zeroed bytes. Refcount starts at 1.
    pub fn get_payload(&self, size: usize) -> Result<Payload> {
        self.acquire(size, |buf| buf.resize(size, 0))
    }

    /// Acquire a payload holding a copy of `bytes`. Refcount starts at 1.
    pub fn get_payload_from(&self, bytes: &[u8]) -> Result<Payload> {
        self.acquire(bytes.len(), |buf| buf.extend_from_slice(bytes))
    }

    /// Alias `source`: returns a new payload over the same bytes and bumps
    /// the slot refcount. Must be paired with exactly one release.
    pub fn share(&self, source: &Payload) -> Result<Payload> {
        let Some(handle) = source.handle else {
            // Sharing an empty payload yields another empty payload.
            return Ok(Payload::empty());
        };

        let mut state = self.state.lock();
        let slot = state
            .slots
            .get_mut(handle.0 as usize)
            .ok_or(Error::DoubleRelease(handle.0))?;
        if slot.refs == 0 {
            return Err(Error::DoubleRelease(handle.0));
        }
        slot.refs += 1;
        state.acquired += 1;

        Ok(Payload {
            data: source.data.clone(),
            len: source.len,
            handle: Some(handle),
            owner: self.weak_self.clone(),
        })
    }

    /// Release one acquisition of `payload`.
    ///
    /// On the last release the buffer capacity returns to the free list.
    /// Releasing an already-released payload object is benign; driving a
    /// slot's refcount below zero is a hard error.
    pub fn release_payload(&self, payload: &mut Payload) -> Result<()> {
        payload.release_internal()
    }

    /// Acquisitions minus releases; zero when every payload has been
    /// returned.
    pub fn outstanding(&self) -> u64 {
        let state = self.state.lock();
        state.acquired - state.released
    }

    pub fn accounting(&self) -> PoolAccounting {
        let state = self.state.lock();
        PoolAccounting {
            acquired: state.acquired,
            released: state.released,
            reserved_bytes: state.reserved_bytes,
        }
    }

    fn acquire(&self, size: usize, fill: impl FnOnce(&mut Vec<u8>)) -> Result<Payload> {
        if size == 0 {
            // Zero length means no bytes, and no bytes need no slot.
            return Ok(Payload::empty());
        }
        let len = u32::try_from(size).map_err(|_| Error::PoolExhausted { requested: size })?;

        let mut state = self.state.lock();
        if let Some(cap) = self.max_reserved_bytes {
            if state.reserved_bytes + size > cap {
                return Err(Error::PoolExhausted { requested: size });
            }
        }

        // Reuse recycled capacity when any buffer is large enough.
        let mut buf = match state.spare_buffers.iter().position(|b| b.capacity() >= size) {
            Some(pos) => state.spare_buffers.swap_remove(pos),
            None => Vec::with_capacity(size),
        };
        buf.clear();
        fill(&mut buf);

        let arc = Arc::new(buf);
        let index = match state.free_slots.pop() {
            Some(index) => {
                state.slots[index] = Slot {
                    refs: 1,
                    data: Some(arc.clone()),
                };
                index
            }
            None => {
                state.slots.push(Slot {
                    refs: 1,
                    data: Some(arc.clone()),
                });
                state.slots.len() - 1
            }
        };
        state.reserved_bytes += size;
        state.acquired += 1;

        let handle = u32::try_from(index).map_err(|_| Error::PoolExhausted { requested: size })?;
        Ok(Payload {
            data: Some(arc),
            len,
            handle: Some(SlotHandle(handle)),
            owner: self.weak_self.clone(),
        })
    }

    fn release_slot(&self, handle: SlotHandle) -> Result<()> {
        let mut state = self.state.lock();
        let slot = state
            .slots
            .get_mut(handle.0 as usize)
            .ok_or(Error::DoubleRelease(handle.0))?;
        if slot.refs == 0 {
            return Err(Error::DoubleRelease(handle.0));
        }
        slot.refs -= 1;
        state.released += 1;

        let slot = &mut state.slots[handle.0 as usize];
        if slot.refs == 0 {
            if let Some(arc) = slot.data.take() {
                state.reserved_bytes = state.reserved_bytes.saturating_sub(arc.len());
                // All payload references are gone at refcount zero, so the
                // unwrap recovers the buffer; a failure here means a caller
                // kept bytes alive past its release, which only costs reuse.
                if let Ok(buf) = Arc::try_unwrap(arc) {
                    state.spare_buffers.push(buf);
                }
            }
            state.free_slots.push(handle.0 as usize);
        }
        Ok(())
    }
}

impl fmt::Debug for PayloadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PayloadPool")
            .field("slots", &state.slots.len())
            .field("reserved_bytes", &state.reserved_bytes)
            .field("acquired", &state.acquired)
            .field("released", &state.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_and_release() {
        let pool = PayloadPool::new();
        let mut payload = pool.get_payload_from(b"hello").expect("acquire");

        assert_eq!(payload.bytes(), b"hello");
        assert_eq!(payload.len(), 5);
        assert!(payload.is_pooled());
        assert_eq!(pool.outstanding(), 1);

        pool.release_payload(&mut payload).expect("release");
        assert_eq!(pool.outstanding(), 0);
        assert!(payload.bytes().is_empty());
    }

    #[test]
    fn test_share_aliases_bytes() {
        let pool = PayloadPool::new();
        let mut original = pool.get_payload_from(b"shared").expect("acquire");
        let mut alias = pool.share(&original).expect("share");

        assert_eq!(alias.bytes(), b"shared");
        assert_eq!(pool.outstanding(), 2);

        pool.release_payload(&mut original).expect("release");
        // Alias keeps the bytes alive after the original release.
        assert_eq!(alias.bytes(), b"shared");
        assert_eq!(pool.outstanding(), 1);

        pool.release_payload(&mut alias).expect("release");
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_release_twice_is_benign_on_same_object() {
        let pool = PayloadPool::new();
        let mut payload = pool.get_payload_from(b"x").expect("acquire");
        pool.release_payload(&mut payload).expect("first release");
        pool.release_payload(&mut payload).expect("second release is a no-op");
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_capacity_recycled() {
        let pool = PayloadPool::new();
        let mut payload = pool.get_payload_from(&[0xAB; 256]).expect("acquire");
        pool.release_payload(&mut payload).expect("release");

        let second = pool.get_payload_from(&[0xCD; 100]).expect("acquire");
        assert_eq!(second.bytes(), &[0xCD; 100]);
        // Recycled capacity, not a fresh allocation.
        assert!(pool.state.lock().spare_buffers.is_empty());
    }

    #[test]
    fn test_exhausted_only_with_cap() {
        let pool = PayloadPool::with_capacity(Some(64));
        let first = pool.get_payload(48).expect("within cap");

        let err = pool.get_payload(32).expect_err("cap exceeded");
        assert!(matches!(err, Error::PoolExhausted { requested: 32 }));

        drop(first);
        assert_eq!(pool.outstanding(), 0);
        pool.get_payload(32).expect("fits after release");
    }

    #[test]
    fn test_drop_releases_acquisition() {
        let pool = PayloadPool::new();
        {
            let _payload = pool.get_payload_from(b"scoped").expect("acquire");
            assert_eq!(pool.outstanding(), 1);
        }
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_empty_payload_share() {
        let pool = PayloadPool::new();
        let empty = Payload::empty();
        let alias = pool.share(&empty).expect("share empty");
        assert!(alias.is_empty());
        assert!(!alias.is_pooled());
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_concurrent_get_release_balance() {
        let pool = PayloadPool::new();
        let mut handles = Vec::new();
        for t in 0..4 {
            let pool = Arc::clone(&pool);
            handles.push(std::thread::spawn(move || {
                for i in 0..200 {
                    let data = vec![t as u8; (i % 32) + 1];
                    let original = pool.get_payload_from(&data).expect("acquire");
                    let alias = pool.share(&original).expect("share");
                    assert_eq!(alias.bytes(), &data[..]);
                    drop(original);
                    drop(alias);
                }
            }));
        }
        for handle in handles {
            handle.join().expect("worker");
        }
        assert_eq!(pool.outstanding(), 0);
    }
}
