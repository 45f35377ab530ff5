// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the moxa-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Error types for gateway communication and snapshot handling
//!
//! Library code returns [`GatewayError`]; the binary and the configuration
//! layer wrap it in `anyhow::Error` with additional context.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio_modbus::ExceptionCode;

/// Main error type for gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// TCP connection to the gateway could not be established
    #[error("Unable to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// A Modbus request did not complete in time
    #[error("Modbus request at address {address} timed out after {timeout:?}")]
    Timeout { address: u16, timeout: Duration },

    /// Transport level failure (broken connection, codec error)
    #[error("Modbus transport error at address {address}: {message}")]
    Transport { address: u16, message: String },

    /// The gateway answered with a Modbus exception
    #[error("Modbus error while reading addr {address} (count {count}): {code:?}")]
    Exception {
        address: u16,
        count: u16,
        code: ExceptionCode,
    },

    /// The gateway returned fewer registers than requested
    #[error("Expected {expected} registers at address {address}, got {actual}")]
    ShortResponse {
        address: u16,
        expected: usize,
        actual: usize,
    },

    /// A decoded block did not have the expected size
    #[error("Expected {expected} registers for {label}, got {actual}")]
    RegisterCountMismatch {
        label: String,
        expected: usize,
        actual: usize,
    },

    /// A backup was requested before any snapshot was written
    #[error("Snapshot file {0} does not exist yet")]
    MissingSnapshot(PathBuf),

    /// Filesystem errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid runtime parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
