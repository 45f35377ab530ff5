// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the moxa-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Periodic backup configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for periodic copies of the snapshot file.
///
/// When enabled, the current snapshot file is copied into `directory` every
/// `every_min` minutes. `keep` limits how many copies are retained
/// (0 keeps all of them).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub enabled: bool,
    pub every_min: u64,
    pub directory: PathBuf,
    pub keep: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            every_min: 5,
            directory: PathBuf::from("/var/log/moxa_backups"),
            keep: 0,
        }
    }
}

impl BackupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.every_min.saturating_mul(60))
    }
}
