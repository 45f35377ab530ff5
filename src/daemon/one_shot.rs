// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the moxa-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Single read of the gateway, used when no long-running service is configured

use anyhow::Result;
use chrono::Utc;
use log::info;

use crate::backup::{prune_backups, write_backup};
use crate::config::Config;
use crate::modbus::read_snapshot;
use crate::registers::RegisterMap;
use crate::snapshot::Snapshot;

/// Read the gateway once and write the snapshot file
///
/// When backups are enabled the fresh snapshot is also copied to the backup
/// directory and old copies are pruned.
pub async fn read_once(config: &Config, map: &RegisterMap) -> Result<Snapshot> {
    let snapshot = read_snapshot(&config.gateway, map, config.decoding).await?;
    snapshot.write_to(&config.output.path)?;
    info!(
        "Wrote {} channel values to {}",
        snapshot.len(),
        config.output.path.display()
    );

    if config.backup.enabled {
        write_backup(&config.output.path, &config.backup.directory, Utc::now())?;
        prune_backups(&config.backup.directory, config.backup.keep)?;
    }
    Ok(snapshot)
}
