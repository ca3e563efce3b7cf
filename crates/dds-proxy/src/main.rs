// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Proxy CLI.
//!
//! ```bash
//! # Run as the active half of a redundant pair
//! dds-proxy master -c proxy.yaml
//!
//! # Run as standby, taking over after 1s of master silence
//! dds-proxy slave 1000 -c proxy.yaml
//!
//! # Reload the configuration every 30s in addition to the file watcher
//! dds-proxy master -c proxy.yaml -r 30000
//! ```

use clap::{Parser, ValueEnum};
use dds_proxy::reload::{ConfigFileWatcher, PeriodicReloader};
use dds_proxy::{DdsProxy, ProxyConfig, RoleCoordinator, DEFAULT_CONFIGURATION_FILE_NAME};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessExitCode {
    Success = 0,
    Generic = 1,
    InvalidArguments = 2,
    RequiredArgumentMissing = 3,
    ExecutionFailure = 4,
}

impl From<ProcessExitCode> for ExitCode {
    fn from(code: ProcessExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Role {
    /// Forward traffic and publish keepalive heartbeats.
    Master,
    /// Stand by; take over when the master goes silent.
    Slave,
}

/// Pub/sub proxy - bridges data and RPC topics between participants
#[derive(Debug, Parser)]
#[command(name = "dds-proxy", version, about)]
struct Args {
    /// Role in a redundant pair
    #[arg(value_enum)]
    role: Role,

    /// Keepalive interval in milliseconds (slave only)
    keepalive_interval_ms: Option<u64>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload the configuration periodically (milliseconds, 0 disables)
    #[arg(short = 'r', long = "reload-time")]
    reload_time: Option<u64>,

    /// Stop after this long (milliseconds, 0 means run until signalled)
    #[arg(short = 't', long = "timeout")]
    timeout: Option<u64>,

    /// Tracing filter directives, e.g. "dds_proxy=debug"
    #[arg(long)]
    log_filter: Option<String>,

    /// Log verbosity when no filter is given (error, warn, info, debug)
    #[arg(long, default_value = "info")]
    log_verbosity: String,
}

const DEFAULT_KEEPALIVE_INTERVAL_MS: u64 = 5000;

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // Help and version are successful exits, not argument errors.
            use clap::error::ErrorKind;
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ProcessExitCode::Success,
                ErrorKind::MissingRequiredArgument => ProcessExitCode::RequiredArgumentMissing,
                _ => ProcessExitCode::InvalidArguments,
            };
            let _ = err.print();
            return code.into();
        }
    };

    init_logging(&args);

    match run(args) {
        Ok(code) => code.into(),
        Err(code) => code.into(),
    }
}

fn init_logging(args: &Args) {
    let filter = match &args.log_filter {
        Some(filter) => EnvFilter::try_new(filter),
        None => EnvFilter::try_new(&args.log_verbosity),
    }
    .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run(args: Args) -> Result<ProcessExitCode, ProcessExitCode> {
    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => {
            tracing::info!(
                "no configuration file given, using default file {DEFAULT_CONFIGURATION_FILE_NAME}"
            );
            PathBuf::from(DEFAULT_CONFIGURATION_FILE_NAME)
        }
    };

    if !config_path.is_file() {
        tracing::error!(
            "file '{}' does not exist or is not accessible",
            config_path.display()
        );
        return Err(ProcessExitCode::RequiredArgumentMissing);
    }

    tracing::info!("starting proxy execution");

    let mut configuration = ProxyConfig::from_file(&config_path).map_err(|err| {
        tracing::error!(
            "error loading configuration from file {}: {err}",
            config_path.display()
        );
        ProcessExitCode::ExecutionFailure
    })?;

    // Command line beats file for the runtime knobs.
    if let Some(reload_time) = args.reload_time {
        configuration.reload_time_ms = reload_time;
    }
    if let Some(timeout) = args.timeout {
        configuration.timeout_ms = timeout;
    }
    if let Some(xml) = &configuration.xml_configuration {
        tracing::info!("passing through {} bytes of transport profile XML", xml.len());
    }
    let reload_time_ms = configuration.reload_time_ms;
    let timeout_ms = configuration.timeout_ms;

    let proxy = Arc::new(DdsProxy::new(configuration).map_err(|err| {
        tracing::error!("error initializing proxy: {err}");
        ProcessExitCode::ExecutionFailure
    })?);

    // Role coordination. The heartbeat wire is a collaborator; a slave that
    // hears nothing within the keepalive window promotes itself.
    let coordinator = Arc::new(RoleCoordinator::new(args.role == Role::Master));
    let failover_monitor = (!coordinator.is_master()).then(|| {
        let coordinator = Arc::clone(&coordinator);
        let keepalive = Duration::from_millis(
            args.keepalive_interval_ms
                .unwrap_or(DEFAULT_KEEPALIVE_INTERVAL_MS),
        );
        std::thread::Builder::new()
            .name("failover-monitor".into())
            .spawn(move || {
                if coordinator.wait_for_failover(keepalive) {
                    tracing::warn!("promoted to master");
                }
            })
            .expect("spawning failover monitor")
    });

    // Reload triggers: file watcher always, periodic timer on request.
    let reload_proxy = Arc::clone(&proxy);
    let mut watcher = ConfigFileWatcher::new(&config_path);
    watcher
        .start(move |path| match ProxyConfig::from_file(path) {
            Ok(new_configuration) => {
                if let Err(err) = reload_proxy.reload_configuration(new_configuration) {
                    tracing::warn!("error applying reloaded configuration: {err}");
                }
            }
            Err(err) => {
                tracing::warn!("error reloading configuration file: {err}");
            }
        })
        .map_err(|err| {
            tracing::error!("cannot watch configuration file: {err}");
            ProcessExitCode::ExecutionFailure
        })?;

    let mut periodic = None;
    if reload_time_ms > 0 {
        let reload_proxy = Arc::clone(&proxy);
        let path = config_path.clone();
        let mut reloader = PeriodicReloader::new(Duration::from_millis(reload_time_ms));
        reloader
            .start(move || match ProxyConfig::from_file(&path) {
                Ok(new_configuration) => {
                    if let Err(err) = reload_proxy.reload_configuration(new_configuration) {
                        tracing::warn!("error applying reloaded configuration: {err}");
                    }
                }
                Err(err) => {
                    tracing::warn!("error reloading configuration file: {err}");
                }
            })
            .map_err(|err| {
                tracing::error!("cannot start periodic reload: {err}");
                ProcessExitCode::ExecutionFailure
            })?;
        periodic = Some(reloader);
    }

    // SIGINT/SIGTERM initiate graceful shutdown.
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .map_err(|err| {
        tracing::error!("cannot install signal handler: {err}");
        ProcessExitCode::Generic
    })?;

    proxy.start().map_err(|err| {
        tracing::error!("error starting proxy: {err}");
        ProcessExitCode::ExecutionFailure
    })?;
    tracing::info!("proxy running ({})", if coordinator.is_master() { "master" } else { "slave" });

    match timeout_ms {
        0 => {
            let _ = shutdown_rx.recv();
            tracing::info!("shutdown signal received");
        }
        timeout => {
            match shutdown_rx.recv_timeout(Duration::from_millis(timeout)) {
                Ok(()) => tracing::info!("shutdown signal received"),
                Err(_) => tracing::info!("timeout reached, shutting down"),
            }
        }
    }

    // Stop reload sources before the proxy so no reload races the teardown.
    if let Some(mut reloader) = periodic.take() {
        reloader.stop();
    }
    watcher.stop();

    proxy.stop();
    drop(failover_monitor); // monitor thread ends with the process

    tracing::info!("proxy execution finished correctly");
    Ok(ProcessExitCode::Success)
}
