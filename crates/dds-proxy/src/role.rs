// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Master/slave role coordination.
//!
//! The proxy can run as one of a redundant pair. The master forwards; the
//! slave watches the master's heartbeats and promotes itself when they stop.
//! The heartbeat transport itself is a collaborator: whoever receives a
//! heartbeat calls [`RoleCoordinator::observe_heartbeat`].

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

struct HeartbeatState {
    last_heartbeat: Option<Instant>,
}

/// Explicit role state, passed into construction instead of living in
/// process globals.
pub struct RoleCoordinator {
    master: AtomicBool,
    state: Mutex<HeartbeatState>,
    heartbeat: Condvar,
}

impl RoleCoordinator {
    pub fn new(master: bool) -> Self {
        Self {
            master: AtomicBool::new(master),
            state: Mutex::new(HeartbeatState {
                last_heartbeat: None,
            }),
            heartbeat: Condvar::new(),
        }
    }

    pub fn is_master(&self) -> bool {
        self.master.load(Ordering::Acquire)
    }

    /// Record a heartbeat from the current master.
    pub fn observe_heartbeat(&self) {
        let mut state = self.state.lock();
        state.last_heartbeat = Some(Instant::now());
        drop(state);
        self.heartbeat.notify_all();
    }

    /// Block until `keepalive` elapses with no heartbeat, then take over
    /// the master role and return `true`.
    ///
    /// Returns `false` immediately when already master.
    pub fn wait_for_failover(&self, keepalive: Duration) -> bool {
        if self.is_master() {
            return false;
        }

        let mut state = self.state.lock();
        let mut deadline = Instant::now() + keepalive;
        loop {
            let seen = state.last_heartbeat;
            if self.heartbeat.wait_until(&mut state, deadline).timed_out()
                && state.last_heartbeat == seen
            {
                self.master.store(true, Ordering::Release);
                tracing::warn!(
                    "no heartbeat within {}ms, taking over as master",
                    keepalive.as_millis()
                );
                return true;
            }
            if let Some(last) = state.last_heartbeat {
                deadline = last + keepalive;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_master_never_waits() {
        let coordinator = RoleCoordinator::new(true);
        assert!(coordinator.is_master());
        assert!(!coordinator.wait_for_failover(Duration::from_millis(10)));
    }

    #[test]
    fn test_slave_promotes_on_silence() {
        let coordinator = RoleCoordinator::new(false);
        assert!(!coordinator.is_master());

        assert!(coordinator.wait_for_failover(Duration::from_millis(20)));
        assert!(coordinator.is_master());
    }

    #[test]
    fn test_heartbeats_postpone_failover() {
        let coordinator = Arc::new(RoleCoordinator::new(false));
        let beats = Arc::clone(&coordinator);

        let feeder = thread::spawn(move || {
            for _ in 0..5 {
                thread::sleep(Duration::from_millis(10));
                beats.observe_heartbeat();
            }
        });

        let start = Instant::now();
        assert!(coordinator.wait_for_failover(Duration::from_millis(40)));
        // Promotion had to outlast the heartbeat stream.
        assert!(start.elapsed() >= Duration::from_millis(50));

        feeder.join().expect("feeder");
    }
}
