// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the moxa-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon Module
//!
//! Long-running mode of the gateway logger. The process is expected to be
//! supervised by the operating system (launchd on macOS), which restarts it
//! on failure; the daemon only has to start its services and stop cleanly on
//! SIGINT or SIGTERM.

pub mod launch_daemon;
pub mod one_shot;

pub use launch_daemon::Daemon;
pub use one_shot::read_once;
