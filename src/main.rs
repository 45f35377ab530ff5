// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the moxa-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the AMCS Moxa gateway logger
use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::{error, info};
use std::path::PathBuf;

use moxa_gateway::config::{self, Config, ConfigOverrides};
use moxa_gateway::daemon::{read_once, Daemon};
use moxa_gateway::registers::{ByteOrder, RegisterMap, WordOrder};

/// Console log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warning => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

/// Read AMCS tags from the Moxa gateway and export channel/value pairs
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to a configuration to validate and exit
    #[arg(long)]
    validate_config: Option<PathBuf>,

    /// Output the configuration schema as JSON and exit
    #[arg(long)]
    show_config_schema: bool,

    /// IP or hostname of the Moxa MB3270I (e.g. 192.168.10.11)
    #[arg(long)]
    host: Option<String>,

    /// Modbus TCP port of the gateway (default: 502)
    #[arg(long)]
    port: Option<u16>,

    /// Unit ID / Slave ID exposed by the Moxa (default: 1)
    #[arg(long)]
    unit_id: Option<u8>,

    /// Max number of registers per Modbus read (default: 120, must be <= 125)
    #[arg(long)]
    chunk_size: Option<u16>,

    /// Added to every register offset on the wire (0 for 0-based, 1 for 1-based)
    #[arg(long)]
    address_offset: Option<u16>,

    /// Register word order for 32-bit values (default: big)
    #[arg(long, value_enum)]
    word_order: Option<WordOrder>,

    /// Byte order inside a 16-bit register (default: big)
    #[arg(long, value_enum)]
    byte_order: Option<ByteOrder>,

    /// TCP timeout in seconds (default: 3.0)
    #[arg(long)]
    timeout: Option<f64>,

    /// Destination text file for `CHANNEL | VALUE` lines
    #[arg(long)]
    output: Option<PathBuf>,

    /// Poll the gateway continuously instead of reading once
    #[arg(long)]
    daemon: bool,

    /// Delay between two reads in daemon mode, in seconds (default: 60)
    #[arg(long)]
    poll_interval_sec: Option<u64>,

    /// Copy the snapshot file to the backup directory every N minutes (implies --daemon)
    #[arg(long)]
    backup_every_min: Option<u64>,

    /// Backup directory (default: /var/log/moxa_backups)
    #[arg(long)]
    backup_dir: Option<PathBuf>,

    /// Number of backups to keep, 0 keeps all of them
    #[arg(long)]
    backup_keep: Option<usize>,

    /// Run as a Modbus TCP server receiving the gateway writes
    #[arg(long)]
    listen: bool,

    /// Listen address in listen mode (default: 0.0.0.0)
    #[arg(long)]
    listen_address: Option<String>,

    /// Listen port in listen mode (default: 502)
    #[arg(long)]
    listen_port: Option<u16>,

    /// Subtracted from incoming addresses in listen mode (40001 for 4xxxx, 0 for 0-based)
    #[arg(long)]
    address_base: Option<u16>,

    /// Console log level
    #[arg(long, value_enum, ignore_case = true, default_value = "info")]
    log_level: LogLevel,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            host: self.host.clone(),
            port: self.port,
            unit_id: self.unit_id,
            timeout_secs: self.timeout,
            chunk_size: self.chunk_size,
            address_offset: self.address_offset,
            word_order: self.word_order,
            byte_order: self.byte_order,
            output: self.output.clone(),
            daemon: self.daemon,
            poll_interval_secs: self.poll_interval_sec,
            backup_every_min: self.backup_every_min,
            backup_dir: self.backup_dir.clone(),
            backup_keep: self.backup_keep,
            listen: self.listen,
            listen_address: self.listen_address.clone(),
            listen_port: self.listen_port,
            address_base: self.address_base,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        args.log_level.into()
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if args.show_config_schema {
        return config::output_config_schema();
    }

    if let Some(validate_path) = &args.validate_config {
        if !validate_path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file does not exist: {}",
                validate_path.display()
            ));
        }

        Config::from_file(validate_path)
            .map_err(|err| anyhow::anyhow!("Configuration validation failed: {:#}", err))?;
        println!("Configuration file is valid: {}", validate_path.display());
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_args(&args.overrides());
    config.validate()?;

    if config.is_daemon() {
        run_daemon(&config).await
    } else {
        read_once(&config, &RegisterMap::amcs())
            .await
            .map(|_| ())
            .inspect_err(|err| error!("{:#}", err))
    }
}

/// Run the configured services until SIGINT or SIGTERM
///
/// A service stopping on its own ends the process with an error so that the
/// supervisor restarts it.
async fn run_daemon(config: &Config) -> Result<()> {
    info!("Starting in daemon mode");
    let mut daemon = Daemon::new();
    daemon.launch(config).await?;

    let result = tokio::select! {
        signal = wait_for_shutdown_signal() => {
            match &signal {
                Ok(()) => info!("Received shutdown signal, terminating daemon"),
                Err(err) => error!("Error waiting for shutdown signal: {}", err),
            }
            signal
        }
        _ = daemon.wait_for_task_exit() => {
            error!("A daemon task stopped unexpectedly, terminating");
            Err(anyhow::anyhow!("daemon task stopped unexpectedly"))
        }
    };

    daemon.shutdown();
    daemon.join().await?;
    result
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        // launchd stops jobs with SIGTERM
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}
