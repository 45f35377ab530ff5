// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the moxa-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! End-to-end tests over real Modbus TCP connections
//!
//! A daemon in listen mode plays the part of the register store; values are
//! pushed into it with a tokio-modbus client the same way the gateway does,
//! then read back with the poll-mode reader.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use moxa_gateway::config::{Config, GatewayConfig};
use moxa_gateway::backup::list_backups;
use moxa_gateway::daemon::{read_once, Daemon};
use moxa_gateway::modbus::read_snapshot;
use moxa_gateway::registers::{Endianness, RegisterMap};
use moxa_gateway::ChannelValue;
use tokio::time::sleep;
use tokio_modbus::client::{tcp::connect, Reader, Writer};
use tokio_modbus::ExceptionCode;

fn listener_config(output: &Path) -> Config {
    let mut config = Config::default();
    config.listener.enabled = true;
    config.listener.address = "127.0.0.1".to_string();
    config.listener.port = 0;
    config.listener.flush_interval_ms = 50;
    config.output.path = output.to_path_buf();
    config
}

/// Wait until `path` exists and contains `needle`
async fn wait_for_content(path: &Path, needle: &str) -> String {
    for _ in 0..60 {
        if let Ok(content) = std::fs::read_to_string(path) {
            if content.contains(needle) {
                return content;
            }
        }
        sleep(Duration::from_millis(50)).await;
    }
    panic!("{} never contained {:?}", path.display(), needle);
}

#[tokio::test]
async fn test_listener_writes_snapshot_file() -> Result<()> {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();

    let dir = tempfile::tempdir()?;
    let output = dir.path().join("listener.txt");
    let mut daemon = Daemon::new();
    daemon.launch(&listener_config(&output)).await?;
    let address = daemon.listen_address().expect("listener is bound");

    let endianness = Endianness::default();
    let mut ctx = connect(address).await?;

    // AI.0000 via FC16 at the Siemens address of offset 0
    ctx.write_multiple_registers(40001, &endianness.encode_f32(12.5))
        .await?
        .expect("write accepted");
    // HC.0174 lives at offset 3002
    let [hi, lo] = endianness.encode_u32(4242);
    ctx.write_single_register(43003, hi).await?.expect("write accepted");
    ctx.write_single_register(43004, lo).await?.expect("write accepted");
    // TK.0051 written with a zero-based address
    ctx.write_multiple_registers(4102, &endianness.encode_f32(-3.25))
        .await?
        .expect("write accepted");

    let content = wait_for_content(&output, "TK.0051 | -3.250").await;
    assert!(content.starts_with("# AMCS snapshot generated "));
    assert!(content.contains("AI.0000 | 12.500\n"));
    assert!(content.contains("AI.0001 | 0.000\n"));
    assert!(content.contains("HC.0174 | 4242\n"));
    assert_eq!(content.lines().count(), 1 + RegisterMap::amcs().channel_count());

    // Read back and unsupported function codes
    let words = ctx.read_holding_registers(40001, 2).await?;
    assert_eq!(words, Ok(endianness.encode_f32(12.5).to_vec()));
    let response = ctx.read_input_registers(0, 2).await?;
    assert_eq!(response, Err(ExceptionCode::IllegalFunction));

    drop(ctx);
    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}

#[tokio::test]
async fn test_reader_pulls_full_register_map() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut daemon = Daemon::new();
    daemon
        .launch(&listener_config(&dir.path().join("unused.txt")))
        .await?;
    let address = daemon.listen_address().expect("listener is bound");
    let registers = daemon.register_file().expect("listener has a register file");

    let map = RegisterMap::amcs();
    let endianness = Endianness::default();
    let (_, ao_offset) = map.locate("AO.0043").unwrap();
    let (_, hc_offset) = map.locate("HC.1909").unwrap();
    registers.write(ao_offset as usize, &endianness.encode_f32(99.5));
    registers.write(hc_offset as usize, &endianness.encode_u32(70_000));

    let gateway = GatewayConfig {
        host: address.ip().to_string(),
        port: address.port(),
        chunk_size: 100,
        timeout_secs: 2.0,
        ..Default::default()
    };
    let snapshot = read_snapshot(&gateway, &map, endianness).await?;

    assert_eq!(snapshot.len(), map.channel_count());
    assert_eq!(snapshot.get("AO.0043"), Some(ChannelValue::Float(99.5)));
    assert_eq!(snapshot.get("HC.1909"), Some(ChannelValue::Counter(70_000)));
    assert_eq!(snapshot.get("TK.0000"), Some(ChannelValue::Float(0.0)));
    assert_eq!(snapshot.readings[0].channel, "AI.0000");
    assert_eq!(snapshot.readings.last().unwrap().channel, "TK.0051");

    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}

#[tokio::test]
async fn test_poller_daemon_writes_output() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut source = Daemon::new();
    source
        .launch(&listener_config(&dir.path().join("source.txt")))
        .await?;
    let address = source.listen_address().expect("listener is bound");
    let registers = source.register_file().expect("listener has a register file");
    registers.write(0, &Endianness::default().encode_f32(7.0));

    let output = dir.path().join("out").join("poller.txt");
    let mut config = Config::default();
    config.gateway.host = address.ip().to_string();
    config.gateway.port = address.port();
    config.polling.enabled = true;
    config.polling.interval_secs = 1;
    config.output.path = output.clone();

    let mut poller = Daemon::new();
    poller.launch(&config).await?;
    let content = wait_for_content(&output, "AI.0000 | 7.000").await;
    assert!(content.contains("HC.0171 | 0\n"));

    poller.shutdown();
    poller.join().await?;
    source.shutdown();
    source.join().await?;
    Ok(())
}

#[tokio::test]
async fn test_read_once_writes_snapshot_and_backup() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut source = Daemon::new();
    source
        .launch(&listener_config(&dir.path().join("source.txt")))
        .await?;
    let address = source.listen_address().expect("listener is bound");
    let registers = source.register_file().expect("listener has a register file");
    let map = RegisterMap::amcs();
    let (_, offset) = map.locate("TK.0010").unwrap();
    registers.write(offset as usize, &Endianness::default().encode_f32(321.0));

    let backups = dir.path().join("backups");
    // A stale copy that pruning must remove
    std::fs::create_dir_all(&backups)?;
    std::fs::write(backups.join("moxa_snapshot_20000101_000000.txt"), "old")?;

    let mut config = Config::default();
    config.gateway.host = address.ip().to_string();
    config.gateway.port = address.port();
    config.output.path = dir.path().join("snapshot.txt");
    config.backup.enabled = true;
    config.backup.directory = backups.clone();
    config.backup.keep = 1;

    let snapshot = read_once(&config, &map).await?;
    assert_eq!(snapshot.get("TK.0010"), Some(ChannelValue::Float(321.0)));

    let content = std::fs::read_to_string(&config.output.path)?;
    assert!(content.contains("TK.0010 | 321.000\n"));

    let files = list_backups(&backups)?;
    assert_eq!(files.len(), 1);
    assert_eq!(std::fs::read_to_string(&files[0])?, content);

    source.shutdown();
    source.join().await?;
    Ok(())
}

#[tokio::test]
async fn test_unreachable_gateway_reports_connect_error() {
    // Bind then drop a listener to get a port nobody listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let gateway = GatewayConfig {
        host: "127.0.0.1".to_string(),
        port,
        timeout_secs: 1.0,
        ..Default::default()
    };

    let err = read_snapshot(&gateway, &RegisterMap::amcs(), Endianness::default())
        .await
        .unwrap_err();
    assert!(matches!(err, moxa_gateway::GatewayError::Connect { .. }));
}
