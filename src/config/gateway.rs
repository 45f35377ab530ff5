// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the moxa-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Connection settings for the Moxa MB3270I gateway

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration of the Modbus TCP connection to the gateway.
///
/// # Example
///
/// ```
/// use moxa_gateway::config::GatewayConfig;
///
/// let gateway = GatewayConfig {
///     host: "192.168.10.11".to_string(),
///     port: 502,
///     ..Default::default()
/// };
/// assert_eq!(gateway.socket_address(), "192.168.10.11:502");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// IP address or host name of the gateway
    pub host: String,

    /// Modbus TCP port of the gateway (standard port is 502)
    pub port: u16,

    /// Unit / slave id exposed by the gateway
    pub unit_id: u8,

    /// Timeout applied to the connection and to every request, in seconds
    pub timeout_secs: f64,

    /// Maximum number of registers per read request (1..=125)
    pub chunk_size: u16,

    /// Added to every zero-based FID offset on the wire.
    ///
    /// Use 0 for gateways where offset 0 is register 40001, 1 for gateways
    /// expecting one-based numbering.
    pub address_offset: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "192.168.10.11".to_string(),
            port: 502,
            unit_id: 1,
            timeout_secs: 3.0,
            chunk_size: 120,
            address_offset: 0,
        }
    }
}

impl GatewayConfig {
    /// `host:port` string suitable for name resolution
    pub fn socket_address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            // Bare IPv6 literal
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Request timeout as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs).unwrap_or(Duration::from_secs(3))
    }
}
