// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the moxa-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! Schema output and the validation rules the JSON schema cannot express.

use anyhow::{Context, Result};
use log::debug;

use super::{Config, CONFIG_SCHEMA};
use crate::modbus::client::MAX_REGISTERS_PER_REQUEST;

/// Output the embedded JSON schema to the console.
///
/// ### Example
///
/// ```bash
/// ./moxa_gateway --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema: serde_json::Value =
        serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;
    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;
    println!("{}", formatted_schema);
    Ok(())
}

/// Check if a string is a valid IP address
///
/// Accepts IPv4 and IPv6 literals plus the special value "localhost".
pub fn is_valid_ip_address(addr: &str) -> bool {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }
    matches!(addr, "localhost")
}

/// Validates the configuration against rules not covered by the JSON schema.
///
/// ### Validation Rules
///
/// - **Gateway**: host must not be empty, timeout must be a positive finite
///   number, chunk size must be within 1..=125
/// - **Polling**: interval must be non-zero when polling is enabled
/// - **Listener**: bind address must be an IP address, flush interval must be
///   non-zero
/// - **Backup**: interval must be non-zero when backups are enabled
/// - **Modes**: polling and listening are mutually exclusive
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    let gateway = &config.gateway;
    if gateway.host.trim().is_empty() {
        anyhow::bail!("Gateway host must not be empty");
    }
    if !gateway.timeout_secs.is_finite() || gateway.timeout_secs <= 0.0 {
        anyhow::bail!(
            "Gateway timeout must be a positive number of seconds, got {}",
            gateway.timeout_secs
        );
    }
    if gateway.chunk_size == 0 || gateway.chunk_size > MAX_REGISTERS_PER_REQUEST {
        anyhow::bail!(
            "Chunk size must be between 1 and {}, got {}",
            MAX_REGISTERS_PER_REQUEST,
            gateway.chunk_size
        );
    }

    if config.polling.enabled && config.polling.interval_secs == 0 {
        anyhow::bail!("Poll interval must be at least one second");
    }

    if !is_valid_ip_address(&config.listener.address) {
        anyhow::bail!(
            "Invalid listener address: {}",
            config.listener.address
        );
    }
    if config.listener.flush_interval_ms == 0 {
        anyhow::bail!("Listener flush interval must be at least one millisecond");
    }

    if config.backup.enabled && config.backup.every_min == 0 {
        anyhow::bail!("Backup interval must be at least one minute");
    }

    if config.polling.enabled && config.listener.enabled {
        anyhow::bail!("Polling and listen modes cannot be enabled at the same time");
    }

    if config.output.path.as_os_str().is_empty() {
        anyhow::bail!("Output path must not be empty");
    }

    Ok(())
}
