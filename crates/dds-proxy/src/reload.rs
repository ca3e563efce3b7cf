// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Configuration reload triggers.
//!
//! Two sources re-read the configuration file at runtime: a watcher that
//! polls the file's modification time, and an optional periodic timer. Both
//! run on their own background thread and hand the event to a callback; the
//! callback does the actual reload and swallows its own errors.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use crate::error::{Error, Result};

/// How often the file watcher checks the configuration file.
pub const WATCH_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Watches one file's mtime and fires a callback on change.
///
/// Polling avoids OS-specific watcher machinery; half a second of latency is
/// irrelevant for configuration edits.
pub struct ConfigFileWatcher {
    path: PathBuf,
    poll_interval: Duration,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ConfigFileWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: WATCH_POLL_INTERVAL,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Start watching. Fails if already running or if the file is missing.
    pub fn start<F>(&mut self, callback: F) -> Result<()>
    where
        F: Fn(&Path) + Send + 'static,
    {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(Error::Inconsistency("file watcher already running".into()));
        }
        let mut last_mtime = mtime(&self.path).ok_or_else(|| {
            self.running.store(false, Ordering::Release);
            Error::Initialization(format!("cannot watch {}: file not found", self.path.display()))
        })?;

        let path = self.path.clone();
        let poll_interval = self.poll_interval;
        let running = Arc::clone(&self.running);
        let handle = std::thread::Builder::new()
            .name("config-watcher".into())
            .spawn(move || {
                while running.load(Ordering::Acquire) {
                    std::thread::sleep(poll_interval);
                    let Some(current) = mtime(&path) else {
                        continue; // file temporarily gone (editor save)
                    };
                    if current != last_mtime {
                        last_mtime = current;
                        tracing::info!(
                            "configuration file {} changed, reloading",
                            path.display()
                        );
                        callback(&path);
                    }
                }
            })?;
        self.thread = Some(handle);
        Ok(())
    }

    /// Stop the watcher thread and join it. Idempotent.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                tracing::error!("config watcher thread panicked");
            }
        }
    }
}

impl Drop for ConfigFileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

/// Fires a callback every `period`, until stopped.
pub struct PeriodicReloader {
    period: Duration,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PeriodicReloader {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    pub fn start<F>(&mut self, callback: F) -> Result<()>
    where
        F: Fn() + Send + 'static,
    {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(Error::Inconsistency(
                "periodic reloader already running".into(),
            ));
        }

        let period = self.period;
        let running = Arc::clone(&self.running);
        let handle = std::thread::Builder::new()
            .name("periodic-reload".into())
            .spawn(move || {
                // Wake in small steps so stop() is prompt even for long
                // periods.
                let step = period.min(Duration::from_millis(200));
                let mut elapsed = Duration::ZERO;
                while running.load(Ordering::Acquire) {
                    std::thread::sleep(step);
                    elapsed += step;
                    if elapsed >= period {
                        elapsed = Duration::ZERO;
                        tracing::info!("periodic timer raised, reloading configuration");
                        callback();
                    }
                }
            })?;
        self.thread = Some(handle);
        Ok(())
    }

    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                tracing::error!("periodic reload thread panicked");
            }
        }
    }
}

impl Drop for PeriodicReloader {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_watcher_requires_existing_file() {
        let mut watcher = ConfigFileWatcher::new("/definitely/not/here.yaml");
        assert!(watcher.start(|_| {}).is_err());
    }

    #[test]
    fn test_watcher_fires_on_change() {
        let dir = std::env::temp_dir().join(format!("proxy-watch-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("tmp dir");
        let file = dir.join("config.yaml");
        std::fs::write(&file, "version: v4.0\n").expect("write");

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);

        let mut watcher = ConfigFileWatcher::new(&file);
        watcher.poll_interval = Duration::from_millis(20);
        watcher
            .start(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .expect("start");

        // mtime granularity can be coarse; rewrite until observed.
        for i in 0..50 {
            std::thread::sleep(Duration::from_millis(30));
            if fired.load(Ordering::SeqCst) > 0 {
                break;
            }
            std::fs::write(&file, format!("version: v4.0\n# rev {i}\n")).expect("rewrite");
        }
        assert!(fired.load(Ordering::SeqCst) > 0);

        watcher.stop();
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_periodic_fires() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);

        let mut reloader = PeriodicReloader::new(Duration::from_millis(30));
        reloader
            .start(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .expect("start");

        std::thread::sleep(Duration::from_millis(120));
        reloader.stop();
        assert!(fired.load(Ordering::SeqCst) >= 2);
    }
}
