// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the moxa-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon Management Module
//!
//! Runs the long-lived services of the gateway logger:
//!
//! - Poller: reads the gateway periodically and rewrites the snapshot file
//! - Listener: Modbus TCP server receiving gateway writes, plus a flusher
//!   rewriting the snapshot file when registers changed
//! - Backup: copies the snapshot file to the backup directory every N minutes
//! - Heartbeat: periodic debug message
//!
//! Each service runs as an independent Tokio task. A shared `running` flag
//! coordinates shutdown; every loop checks it at least every
//! [`SHUTDOWN_POLL`].
//!
//! ## Usage
//!
//! ```no_run
//! use moxa_gateway::{config::Config, daemon::launch_daemon::Daemon};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let config = Config::from_file("moxa.yaml")?;
//!
//!     let mut daemon = Daemon::new();
//!     daemon.launch(&config).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     daemon.shutdown();
//!     daemon.join().await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::backup::{prune_backups, write_backup};
use crate::config::Config;
use crate::error::GatewayError;
use crate::modbus::{listener, read_snapshot, RegisterFile};
use crate::registers::{Endianness, RegisterMap};

/// Longest delay between two checks of the running flag
pub const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

/// How long `join` waits for each task
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep for `duration`, waking early when `running` is cleared
///
/// Returns `true` if the daemon is still running after the sleep. A duration
/// too large to be represented as a deadline sleeps until shutdown.
pub async fn sleep_while_running(running: &AtomicBool, duration: Duration) -> bool {
    let deadline = Instant::now().checked_add(duration);
    while running.load(Ordering::SeqCst) {
        let step = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return true;
                }
                (deadline - now).min(SHUTDOWN_POLL)
            }
            None => SHUTDOWN_POLL,
        };
        time::sleep(step).await;
    }
    false
}

/// Watch a server task until shutdown is requested or the server stops
///
/// On shutdown the server is aborted. A server ending on its own while the
/// daemon is still running is reported as an error.
async fn supervise_server(
    name: &str,
    server_handle: JoinHandle<std::io::Result<()>>,
    running: Arc<AtomicBool>,
) -> Result<()> {
    while running.load(Ordering::SeqCst) && !server_handle.is_finished() {
        time::sleep(SHUTDOWN_POLL).await;
    }

    if server_handle.is_finished() && running.load(Ordering::SeqCst) {
        return match server_handle.await {
            Ok(Ok(())) => Err(anyhow!("{} stopped unexpectedly", name)),
            Ok(Err(err)) => Err(err).with_context(|| format!("{} failed", name)),
            Err(err) => Err(anyhow!("{} panicked: {}", name, err)),
        };
    }

    info!("Shutting down {}...", name);
    server_handle.abort();
    match time::timeout(JOIN_TIMEOUT, server_handle).await {
        Ok(_) => info!("{} shut down successfully", name),
        Err(_) => warn!("{} shutdown timed out, forcing termination", name),
    }
    Ok(())
}

/// Write the register file contents to the snapshot file
fn flush_register_file(
    registers: &RegisterFile,
    map: &RegisterMap,
    endianness: Endianness,
    output: &Path,
) -> Result<()> {
    let snapshot = registers.snapshot(map, endianness, Utc::now())?;
    snapshot.write_to(output)?;
    debug!("Flushed {} channel values to {}", snapshot.len(), output.display());
    Ok(())
}

/// Task manager for the gateway services
///
/// # Fields
///
/// * `tasks` - Handles of the spawned tasks
/// * `running` - Flag shared with every task to coordinate shutdown
/// * `map` - Register layout shared by the poller and the listener
/// * `register_file` - Register file of the listener, when listen mode is active
/// * `listen_address` - Address the listener is bound to
pub struct Daemon {
    tasks: Vec<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
    map: Arc<RegisterMap>,
    register_file: Option<Arc<RegisterFile>>,
    listen_address: Option<SocketAddr>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    /// Create a daemon using the AMCS register layout
    pub fn new() -> Self {
        Self::with_map(RegisterMap::amcs())
    }

    /// Create a daemon using a custom register layout
    pub fn with_map(map: RegisterMap) -> Self {
        Daemon {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            map: Arc::new(map),
            register_file: None,
            listen_address: None,
        }
    }

    /// Launch all configured tasks
    ///
    /// * Listener and flusher - If `config.listener.enabled` is `true`
    /// * Poller - If `config.polling.enabled` is `true`
    /// * Backup - If `config.backup.enabled` is `true`
    /// * Heartbeat - Always
    ///
    /// # Errors
    ///
    /// Fails if the listener cannot bind to its address.
    pub async fn launch(&mut self, config: &Config) -> Result<()> {
        if config.listener.enabled {
            self.start_listener(config).await?;
        } else if config.polling.enabled {
            self.start_poller(config)?;
        }

        if config.backup.enabled {
            self.start_backup(config)?;
        }

        self.start_heartbeat()?;

        info!("Daemon launched with {} tasks", self.tasks.len());
        Ok(())
    }

    /// Periodically read the gateway and rewrite the snapshot file
    ///
    /// Failed reads are logged and retried at the next cycle. The interval is
    /// measured from the start of a read, so slow reads do not drift the
    /// schedule.
    fn start_poller(&mut self, config: &Config) -> Result<()> {
        info!(
            "Starting poller for {} every {}s",
            config.gateway.socket_address(),
            config.polling.interval_secs
        );

        let gateway = config.gateway.clone();
        let endianness = config.decoding;
        let output = config.output.path.clone();
        let interval = config.polling.interval();
        let map = self.map.clone();
        let running = self.running.clone();

        let task = tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                let started = Instant::now();
                match read_snapshot(&gateway, &map, endianness).await {
                    Ok(snapshot) => match snapshot.write_to(&output) {
                        Ok(()) => info!(
                            "Wrote {} channel values to {}",
                            snapshot.len(),
                            output.display()
                        ),
                        Err(err) => error!("Failed to write {}: {}", output.display(), err),
                    },
                    Err(err) => error!("Gateway read failed: {}", err),
                }

                let remaining = interval.saturating_sub(started.elapsed());
                if !sleep_while_running(&running, remaining).await {
                    break;
                }
            }
            info!("Poller stopped");
            Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Start the Modbus listener and the snapshot flusher
    ///
    /// The socket is bound before the task is spawned so that a port already
    /// in use, or a privileged port without root rights, fails the launch.
    async fn start_listener(&mut self, config: &Config) -> Result<()> {
        let bind_address = config.listener.bind_address();
        let tcp_listener = TcpListener::bind(bind_address.as_str())
            .await
            .with_context(|| format!("Failed to bind Modbus listener to {}", bind_address))?;
        let local_address = tcp_listener.local_addr()?;
        info!(
            "Starting Modbus listener on {} (address base {})",
            local_address, config.listener.address_base
        );

        let registers = Arc::new(RegisterFile::for_map(&self.map));
        self.register_file = Some(registers.clone());
        self.listen_address = Some(local_address);

        let running = self.running.clone();
        let address_base = config.listener.address_base;
        let server_registers = registers.clone();
        let server_handle =
            tokio::spawn(listener::serve(tcp_listener, server_registers, address_base));
        let task = tokio::spawn(supervise_server("Modbus listener", server_handle, running));
        self.tasks.push(task);

        self.start_flusher(config, registers);
        Ok(())
    }

    /// Rewrite the snapshot file whenever the register file changed
    ///
    /// At most one rewrite happens per flush interval. Pending changes are
    /// flushed once more on shutdown.
    fn start_flusher(&mut self, config: &Config, registers: Arc<RegisterFile>) {
        let map = self.map.clone();
        let endianness = config.decoding;
        let output = config.output.path.clone();
        let interval = config.listener.flush_interval();
        let running = self.running.clone();

        let task = tokio::spawn(async move {
            loop {
                let still_running = sleep_while_running(&running, interval).await;
                if registers.take_dirty() {
                    if let Err(err) = flush_register_file(&registers, &map, endianness, &output) {
                        error!("Failed to write {}: {:#}", output.display(), err);
                    }
                }
                if !still_running {
                    break;
                }
            }
            Ok(())
        });
        self.tasks.push(task);
    }

    /// Copy the snapshot file to the backup directory every N minutes
    fn start_backup(&mut self, config: &Config) -> Result<()> {
        info!(
            "Starting backups of {} to {} every {} min",
            config.output.path.display(),
            config.backup.directory.display(),
            config.backup.every_min
        );
        self.spawn_backup(
            config.output.path.clone(),
            config.backup.directory.clone(),
            config.backup.keep,
            config.backup.interval(),
        );
        Ok(())
    }

    fn spawn_backup(
        &mut self,
        source: PathBuf,
        directory: PathBuf,
        keep: usize,
        interval: Duration,
    ) {
        let running = self.running.clone();
        let task = tokio::spawn(async move {
            while sleep_while_running(&running, interval).await {
                match write_backup(&source, &directory, Utc::now()) {
                    Ok(_) => {
                        if let Err(err) = prune_backups(&directory, keep) {
                            error!("Failed to prune backups: {}", err);
                        }
                    }
                    Err(GatewayError::MissingSnapshot(path)) => {
                        warn!("No snapshot at {} yet, skipping backup", path.display());
                    }
                    Err(err) => error!("Backup failed: {}", err),
                }
            }
            Ok(())
        });

        self.tasks.push(task);
    }

    /// Log a debug message every minute while the daemon runs
    fn start_heartbeat(&mut self) -> Result<()> {
        info!("Starting heartbeat monitor");

        let running = self.running.clone();
        let task = tokio::spawn(async move {
            while sleep_while_running(&running, Duration::from_secs(60)).await {
                debug!("Daemon heartbeat: running");
            }
            Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Address the listener is bound to, when listen mode is active
    pub fn listen_address(&self) -> Option<SocketAddr> {
        self.listen_address
    }

    /// Register file of the listener, when listen mode is active
    pub fn register_file(&self) -> Option<Arc<RegisterFile>> {
        self.register_file.clone()
    }

    /// Whether shutdown has not been requested yet
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Wait until one of the tasks stops while the daemon is still running
    ///
    /// Every task runs until shutdown, so an early exit means a service
    /// failed or panicked. Returns immediately if shutdown was requested.
    pub async fn wait_for_task_exit(&self) {
        while self.is_running() && !self.tasks.iter().any(JoinHandle::is_finished) {
            time::sleep(SHUTDOWN_POLL).await;
        }
    }

    /// Signal every task to stop
    ///
    /// This only signals the tasks; call [`Daemon::join`] to wait for them.
    pub fn shutdown(&self) {
        info!("Shutting down daemon tasks");
        self.running.store(false, Ordering::SeqCst);
    }

    /// Wait for all tasks to complete
    ///
    /// Each task gets [`JOIN_TIMEOUT`] to finish. Task failures and panics are
    /// logged but do not fail the join.
    pub async fn join(self) -> Result<()> {
        for task in self.tasks {
            match time::timeout(JOIN_TIMEOUT, task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => error!("Task failed: {:#}", e),
                Ok(Err(e)) => error!("Task panicked: {}", e),
                Err(_) => warn!("Task did not complete within timeout period, may be hung"),
            }
        }
        Ok(())
    }
}
