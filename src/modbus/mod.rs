// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the moxa-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP plumbing for the Moxa gateway
//!
//! To avoid confusion with the master/slave terminology this module uses the
//! terms "server" and "client". In poll mode this service is the client and
//! the Moxa gateway is the server; in listen mode the roles are swapped and
//! the gateway pushes its registers to us.

pub mod client;
pub mod listener;

pub use client::{
    collect_snapshot, read_registers, read_snapshot, ModbusTcpReader, ReadOptions, RegisterReader,
};
pub use listener::{GatewayListenerService, RegisterFile};
