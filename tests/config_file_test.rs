// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the moxa-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration file loading tests

use std::fs;
use std::path::PathBuf;

use moxa_gateway::config::{Config, ConfigOverrides};
use moxa_gateway::registers::WordOrder;

#[test]
fn test_example_configuration_is_valid() {
    let config = Config::from_file(PathBuf::from("config.example.yaml")).unwrap();

    assert_eq!(config.gateway.host, "192.168.10.11");
    assert_eq!(config.gateway.chunk_size, 120);
    assert!(config.polling.enabled);
    assert!(!config.listener.enabled);
    assert!(config.backup.enabled);
    assert_eq!(config.backup.every_min, 5);
    assert_eq!(config.backup.keep, 288);
    assert!(config.is_daemon());
}

#[test]
fn test_invalid_file_produces_sample() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("moxa.yaml");
    fs::write(&path, "gateway:\n  port: \"not a port\"\n").unwrap();

    assert!(Config::from_file(&path).is_err());
    assert!(dir.path().join("moxa.sample.yaml").exists());

    // The generated sample is itself a valid configuration
    let sample = Config::from_file(dir.path().join("moxa.sample.yaml")).unwrap();
    assert_eq!(sample, Config::default());
}

#[test]
fn test_mutually_exclusive_modes_in_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("moxa.yaml");
    fs::write(
        &path,
        "polling:\n  enabled: true\nlistener:\n  enabled: true\n",
    )
    .unwrap();

    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_command_line_overrides_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("moxa.yaml");
    fs::write(&path, "gateway:\n  host: 10.1.1.1\n  port: 1502\n").unwrap();

    let mut config = Config::from_file(&path).unwrap();
    config.apply_args(&ConfigOverrides {
        host: Some("10.2.2.2".to_string()),
        word_order: Some(WordOrder::Little),
        daemon: true,
        ..Default::default()
    });
    config.validate().unwrap();

    assert_eq!(config.gateway.host, "10.2.2.2");
    assert_eq!(config.gateway.port, 1502);
    assert_eq!(config.decoding.word_order, WordOrder::Little);
    assert!(config.polling.enabled);
}
