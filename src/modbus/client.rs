// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the moxa-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP client side: pulling the AMCS registers from the Moxa gateway
//!
//! The gateway exposes the AMCS data as holding registers (function code 3).
//! A Modbus request carries at most 125 registers, so every block is read in
//! chunks of `chunk_size` registers.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use tokio::net::lookup_host;
use tokio::time::timeout;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::registers::{Endianness, RegisterMap};
use crate::snapshot::Snapshot;

/// Largest register count allowed in a single FC3 request
pub const MAX_REGISTERS_PER_REQUEST: u16 = 125;

/// Source of holding registers
///
/// Implemented by [`ModbusTcpReader`] for real gateways; tests provide
/// in-memory implementations.
#[async_trait]
pub trait RegisterReader: Send {
    /// Read `count` holding registers starting at `address`
    async fn read_holding_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>>;
}

/// Parameters controlling how blocks are fetched and decoded
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadOptions {
    /// Maximum registers per request (1..=125)
    pub chunk_size: u16,
    /// Added to every zero-based block offset on the wire
    pub address_offset: u16,
    pub endianness: Endianness,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            chunk_size: 120,
            address_offset: 0,
            endianness: Endianness::default(),
        }
    }
}

/// Read `count` registers starting at `start`, honoring Modbus limits
///
/// Requests of at most `chunk_size` registers are issued back to back. A
/// response carrying a different number of registers than requested aborts
/// the read. Reading zero registers performs no I/O and succeeds whatever the
/// chunk size.
pub async fn read_registers<R: RegisterReader + ?Sized>(
    reader: &mut R,
    start: u16,
    count: u16,
    chunk_size: u16,
) -> Result<Vec<u16>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    if !(1..=MAX_REGISTERS_PER_REQUEST).contains(&chunk_size) {
        return Err(GatewayError::InvalidConfig(format!(
            "chunk size must be between 1 and {MAX_REGISTERS_PER_REQUEST}, got {chunk_size}"
        )));
    }

    let mut registers = Vec::with_capacity(count as usize);
    let mut already_read: u16 = 0;
    while already_read < count {
        let this_read = chunk_size.min(count - already_read);
        let address = start.checked_add(already_read).ok_or_else(|| {
            GatewayError::InvalidConfig(format!(
                "register range {start}+{count} exceeds the Modbus address space"
            ))
        })?;
        let chunk = reader.read_holding_registers(address, this_read).await?;
        if chunk.len() != this_read as usize {
            return Err(GatewayError::ShortResponse {
                address,
                expected: this_read as usize,
                actual: chunk.len(),
            });
        }
        registers.extend_from_slice(&chunk);
        already_read += this_read;
    }
    Ok(registers)
}

/// Read every block of `map` and decode it into a snapshot
pub async fn collect_snapshot<R: RegisterReader + ?Sized>(
    reader: &mut R,
    map: &RegisterMap,
    options: ReadOptions,
) -> Result<Snapshot> {
    let mut snapshot = Snapshot::new(Utc::now());
    for block in map.blocks() {
        let wire_start = block.start.checked_add(options.address_offset).ok_or_else(|| {
            GatewayError::InvalidConfig(format!(
                "address offset {} moves {} out of range",
                options.address_offset, block.label
            ))
        })?;
        info!(
            "Reading {} ({} channels starting at {})",
            block.label,
            block.channels.len(),
            wire_start
        );
        let raw = read_registers(reader, wire_start, block.register_count(), options.chunk_size)
            .await?;
        snapshot.push_block(block, &raw, options.endianness)?;
    }
    // Timestamp reflects the end of the acquisition
    snapshot.generated_at = Utc::now();
    Ok(snapshot)
}

/// Modbus TCP connection to the gateway
pub struct ModbusTcpReader {
    ctx: Context,
    peer: SocketAddr,
    timeout: Duration,
}

impl ModbusTcpReader {
    /// Connect to the gateway described by `config`
    ///
    /// The host name is resolved and every resolved address is tried in
    /// turn until one accepts the connection within the configured timeout.
    pub async fn connect(config: &GatewayConfig) -> Result<Self> {
        let address = config.socket_address();
        let request_timeout = config.timeout();
        let connect_err = |source: std::io::Error| GatewayError::Connect {
            address: address.clone(),
            source,
        };

        let candidates: Vec<SocketAddr> = lookup_host(address.as_str())
            .await
            .map_err(connect_err)?
            .collect();

        let mut last_error = std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "host name did not resolve to any address",
        );
        for peer in candidates {
            debug!("Connecting to Modbus gateway at {} (unit {})", peer, config.unit_id);
            match timeout(request_timeout, tcp::connect_slave(peer, Slave(config.unit_id))).await
            {
                Ok(Ok(ctx)) => {
                    info!("Connected to Modbus gateway at {}", peer);
                    return Ok(Self {
                        ctx,
                        peer,
                        timeout: request_timeout,
                    });
                }
                Ok(Err(err)) => {
                    warn!("Connection to {} failed: {}", peer, err);
                    last_error = err;
                }
                Err(_) => {
                    warn!("Connection to {} timed out after {:?}", peer, request_timeout);
                    last_error = std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("connection timed out after {request_timeout:?}"),
                    );
                }
            }
        }
        Err(connect_err(last_error))
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Close the connection
    pub async fn close(mut self) {
        if let Err(err) = self.ctx.disconnect().await {
            debug!("Error while closing connection to {}: {}", self.peer, err);
        }
    }
}

#[async_trait]
impl RegisterReader for ModbusTcpReader {
    async fn read_holding_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>> {
        debug!("Reading {} holding registers starting from address {}", count, address);
        match timeout(self.timeout, self.ctx.read_holding_registers(address, count)).await {
            Ok(Ok(Ok(registers))) => Ok(registers),
            Ok(Ok(Err(code))) => Err(GatewayError::Exception {
                address,
                count,
                code,
            }),
            Ok(Err(err)) => Err(GatewayError::Transport {
                address,
                message: err.to_string(),
            }),
            Err(_) => Err(GatewayError::Timeout {
                address,
                timeout: self.timeout,
            }),
        }
    }
}

/// Connect, read the full register map once and disconnect
pub async fn read_snapshot(
    config: &GatewayConfig,
    map: &RegisterMap,
    endianness: Endianness,
) -> Result<Snapshot> {
    let mut reader = ModbusTcpReader::connect(config).await?;
    let options = ReadOptions {
        chunk_size: config.chunk_size,
        address_offset: config.address_offset,
        endianness,
    };
    let result = collect_snapshot(&mut reader, map, options).await;
    reader.close().await;
    result
}
