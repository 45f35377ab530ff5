// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the moxa-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP listener configuration
//!
//! In listen mode the service acts as a Modbus server receiving the
//! registers written by the gateway.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the Modbus TCP listener.
///
/// # Fields
///
/// * `enabled` - Run in listen mode instead of polling the gateway
/// * `address` - Network address to bind to (default: 0.0.0.0)
/// * `port` - TCP port (default: 502, needs root; use >= 1024 for a user agent)
/// * `address_base` - Subtracted from incoming addresses (40001 for 4xxxx, 0 for zero-based)
/// * `flush_interval_ms` - Minimum delay between two rewrites of the snapshot file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
    pub address_base: u16,
    pub flush_interval_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "0.0.0.0".to_string(),
            port: 502,
            address_base: 40001,
            flush_interval_ms: 200,
        }
    }
}

impl ListenerConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn bind_address(&self) -> String {
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}
