// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the moxa-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the Moxa gateway service
//!
//! The configuration is backed by an optional YAML file validated against an
//! embedded JSON schema. Command line flags override file values.
//!
//! ## Configuration Structure
//!
//! - `gateway`: Modbus TCP connection to the Moxa MB3270I
//! - `decoding`: Word and byte order of 32-bit values
//! - `output`: Snapshot file location
//! - `polling`: Continuous polling of the gateway
//! - `listener`: Modbus TCP server receiving gateway writes
//! - `backup`: Periodic copies of the snapshot file
//!
//! ## Usage
//!
//! ```no_run
//! use moxa_gateway::config::{Config, ConfigOverrides};
//!
//! let mut config = Config::from_file("moxa.yaml").unwrap();
//! config.apply_args(&ConfigOverrides {
//!     host: Some("192.168.10.11".to_string()),
//!     backup_every_min: Some(5),
//!     ..Default::default()
//! });
//! config.validate().unwrap();
//! ```

pub mod backup;
pub mod gateway;
pub mod listener;
pub mod polling;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};

use crate::registers::{ByteOrder, Endianness, WordOrder};

pub use backup::BackupConfig;
pub use gateway::GatewayConfig;
pub use listener::ListenerConfig;
pub use polling::{OutputConfig, PollingConfig};
pub use utils::{is_valid_ip_address, output_config_schema};

/// JSON schema the YAML configuration is validated against
pub const CONFIG_SCHEMA: &str = include_str!("../../resources/config.schema.json");

/// Root configuration structure.
///
/// Every section falls back to its defaults when missing from the file, so
/// an empty mapping is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Connection to the gateway
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Register layout of 32-bit values
    #[serde(default)]
    pub decoding: Endianness,

    /// Snapshot file
    #[serde(default)]
    pub output: OutputConfig,

    /// Continuous polling
    #[serde(default)]
    pub polling: PollingConfig,

    /// Listen mode
    #[serde(default)]
    pub listener: ListenerConfig,

    /// Periodic backups
    #[serde(default)]
    pub backup: BackupConfig,
}

/// Values given on the command line, applied on top of the file configuration
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub unit_id: Option<u8>,
    pub timeout_secs: Option<f64>,
    pub chunk_size: Option<u16>,
    pub address_offset: Option<u16>,
    pub word_order: Option<WordOrder>,
    pub byte_order: Option<ByteOrder>,
    pub output: Option<PathBuf>,
    pub daemon: bool,
    pub poll_interval_secs: Option<u64>,
    pub backup_every_min: Option<u64>,
    pub backup_dir: Option<PathBuf>,
    pub backup_keep: Option<usize>,
    pub listen: bool,
    pub listen_address: Option<String>,
    pub listen_port: Option<u16>,
    pub address_base: Option<u16>,
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let sample_path = path.as_ref().with_extension("sample.yaml");
        debug!("Creating sample configuration file at {:?}", sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file
    ///
    /// A missing file is created with default values. The content is
    /// validated against [`CONFIG_SCHEMA`] before deserialisation, then
    /// against [`utils::validate_specific_rules`]. On validation failure a
    /// `<name>.sample.yaml` file with defaults is written next to it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(
                "Configuration file not found at {:?}, creating one with default values",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        let config = match Self::from_yaml_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration error in {}: {:#}", path.display(), err);
                if let Err(e) = Self::create_sample_config(path) {
                    error!("Failed to create sample config: {}", e);
                }
                return Err(err.context(format!("Invalid configuration file {}", path.display())));
            }
        };

        Ok(config)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        // Validate the generic document first so schema errors point at the YAML
        let yaml_value: serde_yml::Value =
            serde_yml::from_str(contents).context("Failed to parse YAML configuration")?;
        let json_value = serde_json::to_value(&yaml_value)
            .context("Failed to convert YAML to JSON for validation")?;

        let schema: serde_json::Value =
            serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;
        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)?;

        debug!("Validating configuration against schema");
        if let Err(error) = validator.validate(&json_value) {
            anyhow::bail!("Configuration validation failed: {}", error);
        }

        debug!("Schema validation passed, deserializing into Config structure");
        let config: Config =
            serde_yml::from_str(contents).context("Failed to deserialize configuration")?;

        utils::validate_specific_rules(&config)?;
        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory {:?}", parent)
                })?;
            }
        }

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Run the rules that the JSON schema cannot express
    pub fn validate(&self) -> Result<()> {
        utils::validate_specific_rules(self)
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only values explicitly provided on the command line override the
    /// configuration. Mode selection follows these rules:
    ///
    /// * `listen` enables the listener and disables polling
    /// * `daemon` enables polling
    /// * `backup_every_min` enables backups, and polling unless the listener is enabled
    pub fn apply_args(&mut self, args: &ConfigOverrides) {
        if let Some(host) = &args.host {
            debug!("Overriding gateway host from command line: {}", host);
            self.gateway.host = host.clone();
        }
        if let Some(port) = args.port {
            debug!("Overriding gateway port from command line: {}", port);
            self.gateway.port = port;
        }
        if let Some(unit_id) = args.unit_id {
            debug!("Overriding unit id from command line: {}", unit_id);
            self.gateway.unit_id = unit_id;
        }
        if let Some(timeout) = args.timeout_secs {
            debug!("Overriding timeout from command line: {}s", timeout);
            self.gateway.timeout_secs = timeout;
        }
        if let Some(chunk_size) = args.chunk_size {
            debug!("Overriding chunk size from command line: {}", chunk_size);
            self.gateway.chunk_size = chunk_size;
        }
        if let Some(offset) = args.address_offset {
            debug!("Overriding address offset from command line: {}", offset);
            self.gateway.address_offset = offset;
        }

        if let Some(word_order) = args.word_order {
            debug!("Overriding word order from command line: {:?}", word_order);
            self.decoding.word_order = word_order;
        }
        if let Some(byte_order) = args.byte_order {
            debug!("Overriding byte order from command line: {:?}", byte_order);
            self.decoding.byte_order = byte_order;
        }

        if let Some(output) = &args.output {
            debug!("Overriding output file from command line: {:?}", output);
            self.output.path = output.clone();
        }

        // Listener settings
        if args.listen {
            debug!("Listen mode requested from command line");
            self.listener.enabled = true;
            self.polling.enabled = false;
        }
        if let Some(address) = &args.listen_address {
            debug!("Overriding listen address from command line: {}", address);
            self.listener.address = address.clone();
        }
        if let Some(port) = args.listen_port {
            debug!("Overriding listen port from command line: {}", port);
            self.listener.port = port;
        }
        if let Some(base) = args.address_base {
            debug!("Overriding address base from command line: {}", base);
            self.listener.address_base = base;
        }

        // Polling settings
        if args.daemon && !self.listener.enabled {
            self.polling.enabled = true;
        }
        if let Some(interval) = args.poll_interval_secs {
            debug!("Overriding poll interval from command line: {}s", interval);
            self.polling.interval_secs = interval;
        }

        // Backup settings
        if let Some(every_min) = args.backup_every_min {
            debug!("Enabling backups every {} minutes from command line", every_min);
            self.backup.enabled = true;
            self.backup.every_min = every_min;
            if !self.listener.enabled {
                self.polling.enabled = true;
            }
        }
        if let Some(dir) = &args.backup_dir {
            debug!("Overriding backup directory from command line: {:?}", dir);
            self.backup.directory = dir.clone();
        }
        if let Some(keep) = args.backup_keep {
            debug!("Overriding backup retention from command line: {}", keep);
            self.backup.keep = keep;
        }
    }

    /// Whether the configuration describes a long running service
    pub fn is_daemon(&self) -> bool {
        self.polling.enabled || self.listener.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::from_yaml_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.gateway.port, 502);
        assert_eq!(config.backup.directory, PathBuf::from("/var/log/moxa_backups"));
        assert!(!config.is_daemon());
    }

    #[test]
    fn test_partial_document() {
        let yaml = r#"
gateway:
  host: 10.0.0.5
  chunk_size: 100
decoding:
  word_order: little
backup:
  enabled: true
  every_min: 10
polling:
  enabled: true
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.gateway.host, "10.0.0.5");
        assert_eq!(config.gateway.chunk_size, 100);
        assert_eq!(config.gateway.unit_id, 1);
        assert_eq!(config.decoding.word_order, WordOrder::Little);
        assert_eq!(config.decoding.byte_order, ByteOrder::Big);
        assert_eq!(config.backup.every_min, 10);
    }

    #[test]
    fn test_schema_rejects_unknown_and_invalid_values() {
        assert!(Config::from_yaml_str("gateway:\n  colour: red\n").is_err());
        assert!(Config::from_yaml_str("decoding:\n  word_order: middle\n").is_err());
        assert!(Config::from_yaml_str("gateway:\n  chunk_size: 500\n").is_err());
    }

    #[test]
    fn test_backup_flag_implies_polling() {
        let mut config = Config::default();
        config.apply_args(&ConfigOverrides {
            backup_every_min: Some(5),
            backup_dir: Some(PathBuf::from("/tmp/moxa")),
            ..Default::default()
        });
        assert!(config.backup.enabled);
        assert!(config.polling.enabled);
        assert!(!config.listener.enabled);
        assert_eq!(config.backup.directory, PathBuf::from("/tmp/moxa"));
    }

    #[test]
    fn test_listen_overrides_polling() {
        let mut config = Config::default();
        config.polling.enabled = true;
        config.apply_args(&ConfigOverrides {
            listen: true,
            listen_port: Some(1502),
            backup_every_min: Some(1),
            ..Default::default()
        });
        assert!(config.listener.enabled);
        assert!(!config.polling.enabled);
        assert_eq!(config.listener.port, 1502);
        assert!(config.backup.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("moxa.yaml");

        let mut config = Config::default();
        config.gateway.host = "moxa.local".to_string();
        config.listener.address_base = 0;
        config.save_to_file(&path).unwrap();

        let reloaded = Config::from_file(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.yaml");
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());
    }
}
