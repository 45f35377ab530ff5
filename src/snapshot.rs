// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the moxa-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Channel snapshots and their text representation
//!
//! A snapshot is rendered as a pipe-delimited text file:
//!
//! ```text
//! # AMCS snapshot generated 2025-06-01 08:30:00 UTC
//! AI.0000 | 12.500
//! HC.0171 | 4242
//! ```

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use log::debug;
use tempfile::NamedTempFile;

use crate::error::Result;
use crate::registers::{decode_block, Endianness, RegisterBlock};

/// Decoded value of one channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelValue {
    /// Analog or tank reading
    Float(f32),
    /// Hour counter
    Counter(u32),
}

impl fmt::Display for ChannelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelValue::Float(v) if v.is_nan() => f.write_str("nan"),
            ChannelValue::Float(v) => write!(f, "{v:.3}"),
            ChannelValue::Counter(v) => write!(f, "{v}"),
        }
    }
}

/// One `CHANNEL | VALUE` line
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub channel: String,
    pub value: ChannelValue,
}

/// Values of every channel at a point in time
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    pub readings: Vec<Reading>,
}

impl Snapshot {
    pub fn new(generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at,
            readings: Vec::new(),
        }
    }

    /// Decode the registers of `block` and append its channels
    pub fn push_block(
        &mut self,
        block: &RegisterBlock,
        registers: &[u16],
        endianness: Endianness,
    ) -> Result<()> {
        let values = decode_block(registers, block, endianness)?;
        self.readings.extend(
            block
                .channels
                .iter()
                .zip(values)
                .map(|(channel, value)| Reading {
                    channel: channel.clone(),
                    value,
                }),
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Value of a channel, if present
    pub fn get(&self, channel: &str) -> Option<ChannelValue> {
        self.readings
            .iter()
            .find(|r| r.channel == channel)
            .map(|r| r.value)
    }

    /// Header line written at the top of the file
    pub fn header(&self) -> String {
        format!(
            "# AMCS snapshot generated {}",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }

    /// Render the snapshot as text, one line per channel
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(24 * (self.readings.len() + 1));
        out.push_str(&self.header());
        out.push('\n');
        for reading in &self.readings {
            out.push_str(&format!("{} | {}\n", reading.channel, reading.value));
        }
        out
    }

    /// Write the snapshot to `path`
    ///
    /// Parent directories are created as needed. The content is written to a
    /// temporary file in the destination directory which then replaces
    /// `path`, so readers never observe a partially written file.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(self.render().as_bytes())?;
        tmp.as_file().sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(fs::Permissions::from_mode(0o644))?;
        }

        tmp.persist(path).map_err(|e| e.error)?;
        debug!("Wrote {} channel values to {}", self.len(), path.display());
        Ok(())
    }
}
