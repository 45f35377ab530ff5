// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the moxa-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Periodic backups of the snapshot file
//!
//! Backups are plain copies of the current snapshot file named after the UTC
//! time of the copy, e.g. `moxa_snapshot_20250601_083000.txt`. Because the
//! timestamp is zero padded, lexicographic order is chronological order.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::error::{GatewayError, Result};

const BACKUP_PREFIX: &str = "moxa_snapshot_";
const BACKUP_SUFFIX: &str = ".txt";

/// File name of a backup taken at `timestamp`
pub fn backup_file_name(timestamp: DateTime<Utc>) -> String {
    format!(
        "{}{}{}",
        BACKUP_PREFIX,
        timestamp.format("%Y%m%d_%H%M%S"),
        BACKUP_SUFFIX
    )
}

fn is_backup_file(name: &str) -> bool {
    name.starts_with(BACKUP_PREFIX) && name.ends_with(BACKUP_SUFFIX)
}

/// Copy `source` into `directory` as a timestamped backup
///
/// The directory is created if needed. Returns the path of the new file.
///
/// ### Errors
///
/// [`GatewayError::MissingSnapshot`] if `source` does not exist yet, or an IO
/// error if the copy fails.
pub fn write_backup(source: &Path, directory: &Path, timestamp: DateTime<Utc>) -> Result<PathBuf> {
    if !source.exists() {
        return Err(GatewayError::MissingSnapshot(source.to_path_buf()));
    }
    fs::create_dir_all(directory)?;

    let destination = directory.join(backup_file_name(timestamp));
    fs::copy(source, &destination)?;
    info!("Backed up {} to {}", source.display(), destination.display());
    Ok(destination)
}

/// List backup files in `directory`, oldest first
pub fn list_backups(directory: &Path) -> Result<Vec<PathBuf>> {
    let mut backups: Vec<PathBuf> = fs::read_dir(directory)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| entry.file_name().to_str().is_some_and(is_backup_file))
        .map(|entry| entry.path())
        .collect();
    backups.sort();
    Ok(backups)
}

/// Delete the oldest backups so that at most `keep` remain
///
/// `keep == 0` disables pruning. Files not named like backups are never
/// touched. Returns the number of deleted files.
pub fn prune_backups(directory: &Path, keep: usize) -> Result<usize> {
    if keep == 0 {
        return Ok(0);
    }
    let backups = list_backups(directory)?;
    let excess = backups.len().saturating_sub(keep);
    for path in &backups[..excess] {
        debug!("Removing old backup {}", path.display());
        fs::remove_file(path)?;
    }
    if excess > 0 {
        info!("Removed {} old backups from {}", excess, directory.display());
    }
    Ok(excess)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 8, minute, 0).unwrap()
    }

    #[test]
    fn test_backup_file_name() {
        assert_eq!(backup_file_name(at(30)), "moxa_snapshot_20250601_083000.txt");
    }

    #[test]
    fn test_write_backup_requires_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_backup(&dir.path().join("missing.txt"), dir.path(), at(0)).unwrap_err();
        assert!(matches!(err, GatewayError::MissingSnapshot(_)));
    }

    #[test]
    fn test_write_backup_copies_content() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("snapshot.txt");
        fs::write(&source, "AI.0000 | 1.000\n").unwrap();

        let backup_dir = dir.path().join("backups");
        let path = write_backup(&source, &backup_dir, at(5)).unwrap();

        assert_eq!(path, backup_dir.join("moxa_snapshot_20250601_080500.txt"));
        assert_eq!(fs::read_to_string(path).unwrap(), "AI.0000 | 1.000\n");
    }

    #[test]
    fn test_prune_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("snapshot.txt");
        fs::write(&source, "x").unwrap();
        let backup_dir = dir.path().join("backups");

        let start = at(0);
        for i in 0..5 {
            write_backup(&source, &backup_dir, start + Duration::minutes(5 * i)).unwrap();
        }
        fs::write(backup_dir.join("notes.txt"), "keep me").unwrap();

        assert_eq!(prune_backups(&backup_dir, 0).unwrap(), 0);
        assert_eq!(prune_backups(&backup_dir, 2).unwrap(), 3);

        let remaining = list_backups(&backup_dir).unwrap();
        assert_eq!(
            remaining,
            vec![
                backup_dir.join("moxa_snapshot_20250601_081500.txt"),
                backup_dir.join("moxa_snapshot_20250601_082000.txt"),
            ]
        );
        assert!(backup_dir.join("notes.txt").exists());
    }
}
