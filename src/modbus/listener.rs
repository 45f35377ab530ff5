// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the moxa-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP server side: receiving the AMCS registers pushed by the gateway
//!
//! In this mode the Moxa gateway (or the AMCS PLC behind it) acts as the
//! Modbus client and writes the FID registers into this service. Incoming
//! addresses use the Siemens 4xxxx convention by default:
//!
//! | Incoming      | FID offsets  | Block |
//! |---------------|--------------|-------|
//! | 40001..41320  | 0..1319      | AI    |
//! | 42001..42088  | 2000..2087   | AO    |
//! | 43001..43102  | 3000..3101   | HC    |
//! | 44001..44104  | 4000..4103   | TK    |
//!
//! Supported function codes:
//! - 0x10: Write Multiple Registers
//! - 0x06: Write Single Register
//! - 0x03: Read Holding Registers (read back of the register file)
//!
//! Any other function code is answered with an IllegalFunction exception.

use std::{
    future,
    io,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use tokio::net::TcpListener;
use tokio_modbus::prelude::*;
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};

use crate::error::Result;
use crate::registers::{Endianness, RegisterMap};
use crate::snapshot::Snapshot;

/// Default address base for Siemens style 4xxxx holding register numbers
pub const SIEMENS_ADDRESS_BASE: u16 = 40001;

/// Translate an incoming Modbus address into a register file index
///
/// Addresses at or above `base` are shifted down by `base`; lower addresses
/// are taken as zero-based offsets.
pub fn map_address(address: u16, base: u16) -> usize {
    if address >= base {
        (address - base) as usize
    } else {
        address as usize
    }
}

/// Fixed-size register file shared between connections
///
/// Words are initialised to zero. The dirty flag records whether a write
/// happened since the last [`RegisterFile::take_dirty`].
#[derive(Debug)]
pub struct RegisterFile {
    words: Mutex<Vec<u16>>,
    dirty: AtomicBool,
}

impl RegisterFile {
    pub fn new(size: usize) -> Self {
        Self {
            words: Mutex::new(vec![0; size]),
            dirty: AtomicBool::new(false),
        }
    }

    /// Register file large enough for every block of `map`
    pub fn for_map(map: &RegisterMap) -> Self {
        Self::new(map.register_span())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u16>> {
        self.words.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store `values` starting at `index`
    ///
    /// Words falling outside the file are dropped. Returns the number of
    /// words actually stored.
    pub fn write(&self, index: usize, values: &[u16]) -> usize {
        let mut words = self.lock();
        let mut stored = 0;
        for (i, value) in values.iter().enumerate() {
            if let Some(slot) = words.get_mut(index + i) {
                *slot = *value;
                stored += 1;
            }
        }
        if stored > 0 {
            self.dirty.store(true, Ordering::SeqCst);
        }
        if stored < values.len() {
            debug!(
                "Ignored {} words beyond the register file (index {}, size {})",
                values.len() - stored,
                index,
                words.len()
            );
        }
        stored
    }

    /// Copy `count` words starting at `index`, or `None` if out of range
    pub fn read(&self, index: usize, count: usize) -> Option<Vec<u16>> {
        let words = self.lock();
        words.get(index..index.checked_add(count)?).map(<[u16]>::to_vec)
    }

    /// Return and clear the dirty flag
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }

    /// Decode the current register contents
    pub fn snapshot(
        &self,
        map: &RegisterMap,
        endianness: Endianness,
        generated_at: DateTime<Utc>,
    ) -> Result<Snapshot> {
        let words = self.lock();
        let mut snapshot = Snapshot::new(generated_at);
        for block in map.blocks() {
            let start = (block.start as usize).min(words.len());
            let end = block.end().min(words.len());
            snapshot.push_block(block, &words[start..end], endianness)?;
        }
        Ok(snapshot)
    }
}

/// Modbus service storing gateway writes into a [`RegisterFile`]
///
/// One instance is created per connection; all of them share the same
/// register file.
#[derive(Debug, Clone)]
pub struct GatewayListenerService {
    registers: Arc<RegisterFile>,
    address_base: u16,
}

impl GatewayListenerService {
    pub fn new(registers: Arc<RegisterFile>, address_base: u16) -> Self {
        Self {
            registers,
            address_base,
        }
    }

    fn handle(&self, req: Request<'static>) -> std::result::Result<Response, ExceptionCode> {
        match req {
            Request::WriteMultipleRegisters(addr, values) => {
                let index = map_address(addr, self.address_base);
                debug!(
                    "Writing {} values starting from address {} (index {})",
                    values.len(),
                    addr,
                    index
                );
                self.registers.write(index, &values);
                Ok(Response::WriteMultipleRegisters(addr, values.len() as u16))
            }
            Request::WriteSingleRegister(addr, value) => {
                let index = map_address(addr, self.address_base);
                debug!("Writing value {} to address {} (index {})", value, addr, index);
                self.registers.write(index, std::slice::from_ref(&value));
                Ok(Response::WriteSingleRegister(addr, value))
            }
            Request::ReadHoldingRegisters(addr, cnt) => {
                let index = map_address(addr, self.address_base);
                self.registers
                    .read(index, cnt as usize)
                    .map(Response::ReadHoldingRegisters)
                    .ok_or_else(|| {
                        error!(
                            "Exception::IllegalDataAddress - {} registers at {} are out of range",
                            cnt, addr
                        );
                        ExceptionCode::IllegalDataAddress
                    })
            }
            _ => {
                error!("Exception::IllegalFunction - Unimplemented function code in request: {req:?}");
                Err(ExceptionCode::IllegalFunction)
            }
        }
    }
}

impl tokio_modbus::server::Service for GatewayListenerService {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<std::result::Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        debug!("Received Modbus request: {:?}", req);
        future::ready(self.handle(req))
    }
}

/// Accept gateway connections on `listener` until the task is dropped
pub async fn serve(
    listener: TcpListener,
    registers: Arc<RegisterFile>,
    address_base: u16,
) -> io::Result<()> {
    if let Ok(local) = listener.local_addr() {
        info!("Modbus listener accepting connections on {}", local);
    }
    let server = Server::new(listener);
    let service = GatewayListenerService::new(registers, address_base);

    let on_connected = move |stream, socket_addr: SocketAddr| {
        let service = service.clone();
        info!("Gateway connected from {}", socket_addr);
        async move { accept_tcp_connection(stream, socket_addr, move |_| Ok(Some(service.clone()))) }
    };
    let on_process_error = |err| {
        error!("Modbus listener error: {err}");
    };

    server.serve(&on_connected, on_process_error).await
}
