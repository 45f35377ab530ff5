// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the moxa-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register layout and value codec for the AMCS -> Moxa link

pub mod codec;
pub mod layout;

pub use codec::{decode_block, ByteOrder, Endianness, WordOrder};
pub use layout::{
    RegisterBlock, RegisterMap, ValueKind, HOUR_COUNTER_IDS, MAX_CHANNELS_PER_BLOCK,
    REGISTERS_PER_CHANNEL,
};
