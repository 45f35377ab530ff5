// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the moxa-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! AMCS data logger for the Moxa MB3270I Modbus/TCP gateway
//!
//! Pulls (or receives) the AMCS measurement registers through the Moxa
//! gateway and dumps them to a pipe-delimited text file in the format
//! `CHANNEL | VALUE`, with optional periodic backups of that file.

pub mod backup;
pub mod config;
pub mod daemon;
pub mod error;
pub mod modbus;
pub mod registers;
pub mod snapshot;

pub use error::{GatewayError, Result};
pub use registers::RegisterMap;
pub use snapshot::{ChannelValue, Reading, Snapshot};
