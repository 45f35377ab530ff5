// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the moxa-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! 32-bit value codec over pairs of 16-bit registers
//!
//! A 32-bit value with big-endian bytes `A B C D` is transported as two
//! registers. Gateways disagree on how the bytes are laid out:
//!
//! | word order | byte order | registers     | notation |
//! |------------|------------|---------------|----------|
//! | big        | big        | `AB`, `CD`    | ABCD     |
//! | little     | big        | `CD`, `AB`    | CDAB     |
//! | big        | little     | `BA`, `DC`    | BADC     |
//! | little     | little     | `DC`, `BA`    | DCBA     |

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::layout::{RegisterBlock, ValueKind};
use crate::error::{GatewayError, Result};
use crate::snapshot::ChannelValue;

/// Order of the two registers of a 32-bit value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WordOrder {
    /// Most significant word first
    #[default]
    Big,
    /// Least significant word first
    Little,
}

/// Order of the two bytes inside a register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// High byte first (Modbus standard)
    #[default]
    Big,
    /// Bytes swapped inside each register
    Little,
}

/// Register layout of 32-bit values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Endianness {
    #[serde(default)]
    pub word_order: WordOrder,
    #[serde(default)]
    pub byte_order: ByteOrder,
}

impl Endianness {
    pub fn new(word_order: WordOrder, byte_order: ByteOrder) -> Self {
        Self {
            word_order,
            byte_order,
        }
    }

    fn word_bytes(&self, word: u16) -> [u8; 2] {
        match self.byte_order {
            ByteOrder::Big => word.to_be_bytes(),
            ByteOrder::Little => word.to_le_bytes(),
        }
    }

    /// Big-endian byte image (`A B C D`) of the value carried by `(r0, r1)`
    pub fn to_bytes(&self, r0: u16, r1: u16) -> [u8; 4] {
        let (hi, lo) = match self.word_order {
            WordOrder::Big => (r0, r1),
            WordOrder::Little => (r1, r0),
        };
        let [a, b] = self.word_bytes(hi);
        let [c, d] = self.word_bytes(lo);
        [a, b, c, d]
    }

    /// Register pair carrying the big-endian byte image `bytes`
    pub fn to_registers(&self, bytes: [u8; 4]) -> [u16; 2] {
        let pack = |x: u8, y: u8| match self.byte_order {
            ByteOrder::Big => u16::from_be_bytes([x, y]),
            ByteOrder::Little => u16::from_le_bytes([x, y]),
        };
        let hi = pack(bytes[0], bytes[1]);
        let lo = pack(bytes[2], bytes[3]);
        match self.word_order {
            WordOrder::Big => [hi, lo],
            WordOrder::Little => [lo, hi],
        }
    }

    pub fn decode_f32(&self, r0: u16, r1: u16) -> f32 {
        f32::from_be_bytes(self.to_bytes(r0, r1))
    }

    pub fn decode_u32(&self, r0: u16, r1: u16) -> u32 {
        u32::from_be_bytes(self.to_bytes(r0, r1))
    }

    pub fn encode_f32(&self, value: f32) -> [u16; 2] {
        self.to_registers(value.to_be_bytes())
    }

    pub fn encode_u32(&self, value: u32) -> [u16; 2] {
        self.to_registers(value.to_be_bytes())
    }

    /// Encode a channel value according to its type
    pub fn encode(&self, value: ChannelValue) -> [u16; 2] {
        match value {
            ChannelValue::Float(v) => self.encode_f32(v),
            ChannelValue::Counter(v) => self.encode_u32(v),
        }
    }
}

/// Decode the raw registers of a block into channel values
///
/// ### Errors
///
/// Returns [`GatewayError::RegisterCountMismatch`] when `registers` does not
/// hold exactly two registers per channel of `block`.
pub fn decode_block(
    registers: &[u16],
    block: &RegisterBlock,
    endianness: Endianness,
) -> Result<Vec<ChannelValue>> {
    let expected = block.register_count() as usize;
    if registers.len() != expected {
        return Err(GatewayError::RegisterCountMismatch {
            label: block.label.clone(),
            expected,
            actual: registers.len(),
        });
    }

    Ok(registers
        .chunks_exact(2)
        .map(|pair| match block.kind {
            ValueKind::Float32 => ChannelValue::Float(endianness.decode_f32(pair[0], pair[1])),
            ValueKind::UInt32 => ChannelValue::Counter(endianness.decode_u32(pair[0], pair[1])),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const ALL_ORDERS: [(WordOrder, ByteOrder); 4] = [
        (WordOrder::Big, ByteOrder::Big),
        (WordOrder::Little, ByteOrder::Big),
        (WordOrder::Big, ByteOrder::Little),
        (WordOrder::Little, ByteOrder::Little),
    ];

    #[test]
    fn test_decode_known_layouts() {
        // 12.5f32 == 0x41480000
        let abcd = Endianness::new(WordOrder::Big, ByteOrder::Big);
        let cdab = Endianness::new(WordOrder::Little, ByteOrder::Big);
        let badc = Endianness::new(WordOrder::Big, ByteOrder::Little);
        let dcba = Endianness::new(WordOrder::Little, ByteOrder::Little);

        assert_relative_eq!(abcd.decode_f32(0x4148, 0x0000), 12.5);
        assert_relative_eq!(cdab.decode_f32(0x0000, 0x4148), 12.5);
        assert_relative_eq!(badc.decode_f32(0x4841, 0x0000), 12.5);
        assert_relative_eq!(dcba.decode_f32(0x0000, 0x4841), 12.5);
    }

    #[test]
    fn test_decode_u32() {
        let abcd = Endianness::default();
        assert_eq!(abcd.decode_u32(0x0001, 0x0002), 0x0001_0002);
        let cdab = Endianness::new(WordOrder::Little, ByteOrder::Big);
        assert_eq!(cdab.decode_u32(0x0002, 0x0001), 0x0001_0002);
    }

    #[test]
    fn test_encode_inverts_decode() {
        for (word_order, byte_order) in ALL_ORDERS {
            let e = Endianness::new(word_order, byte_order);
            let [r0, r1] = e.encode_f32(-273.15);
            assert_relative_eq!(e.decode_f32(r0, r1), -273.15);
            let [r0, r1] = e.encode_u32(123_456_789);
            assert_eq!(e.decode_u32(r0, r1), 123_456_789);
        }
    }

    #[test]
    fn test_decode_block_checks_length() {
        let block = RegisterBlock::numbered("Tank volumes", "TK", 2, 4000, ValueKind::Float32);
        let err = decode_block(&[0, 0, 0], &block, Endianness::default()).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::RegisterCountMismatch {
                expected: 4,
                actual: 3,
                ..
            }
        ));

        let values = decode_block(&[0x4148, 0, 0xC000, 0], &block, Endianness::default()).unwrap();
        assert_eq!(values, vec![ChannelValue::Float(12.5), ChannelValue::Float(-2.0)]);
    }

    #[test]
    fn test_decode_counter_block() {
        let block = RegisterBlock::listed("Hour counters", &["HC.0171"], 3000, ValueKind::UInt32);
        let values = decode_block(&[0, 4242], &block, Endianness::default()).unwrap();
        assert_eq!(values, vec![ChannelValue::Counter(4242)]);
    }
}
