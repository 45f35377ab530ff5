// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the moxa-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! AMCS register layout
//!
//! The layout follows the AMCS field interface document
//! (23000666-I601-FID-R1.02, section 1.3 and Appendix A). Every channel is a
//! 32-bit value spread over two consecutive holding registers.
//!
//! | Block          | Channels              | Type    | Offsets      |
//! |----------------|-----------------------|---------|--------------|
//! | Analog inputs  | AI.0000 .. AI.0659    | float32 | 0 .. 1319    |
//! | Analog outputs | AO.0000 .. AO.0043    | float32 | 2000 .. 2087 |
//! | Hour counters  | Appendix A list (51)  | uint32  | 3000 .. 3101 |
//! | Tank volumes   | TK.0000 .. TK.0051    | float32 | 4000 .. 4103 |

/// Registers used by one channel
pub const REGISTERS_PER_CHANNEL: u16 = 2;

/// Largest channel count whose registers fit in a 16-bit register count
pub const MAX_CHANNELS_PER_BLOCK: usize = (u16::MAX / REGISTERS_PER_CHANNEL) as usize;

/// Hour-counter identifiers from Appendix A, in register order
pub const HOUR_COUNTER_IDS: [&str; 51] = [
    "HC.0171", "HC.0174", "HC.0190", "HC.0425", "HC.0428", "HC.0429", "HC.0584", "HC.0587",
    "HC.0588", "HC.0614", "HC.0615", "HC.0616", "HC.0622", "HC.0653", "HC.0654", "HC.0912",
    "HC.0913", "HC.0949", "HC.0952", "HC.1320", "HC.1323", "HC.1326", "HC.1329", "HC.1336",
    "HC.1343", "HC.1346", "HC.1349", "HC.1352", "HC.1353", "HC.1354", "HC.1360", "HC.1363",
    "HC.1367", "HC.1370", "HC.1373", "HC.1380", "HC.1387", "HC.1390", "HC.1393", "HC.1396",
    "HC.1399", "HC.1400", "HC.1401", "HC.1696", "HC.1704", "HC.1712", "HC.1721", "HC.1725",
    "HC.1836", "HC.1908", "HC.1909",
];

/// Data type stored in a register block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// IEEE-754 single precision float
    Float32,
    /// Unsigned 32-bit integer (hour counters)
    UInt32,
}

/// A contiguous register block holding channel values
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterBlock {
    /// Human readable name used in logs
    pub label: String,
    /// Type of every channel in the block
    pub kind: ValueKind,
    /// Zero-based offset of the first register
    pub start: u16,
    /// Channel identifiers in register order
    pub channels: Vec<String>,
}

impl RegisterBlock {
    /// Build a block of `count` channels named `<prefix>.0000`, `<prefix>.0001`, ...
    ///
    /// # Panics
    ///
    /// Panics if `count` exceeds [`MAX_CHANNELS_PER_BLOCK`].
    pub fn numbered(label: &str, prefix: &str, count: usize, start: u16, kind: ValueKind) -> Self {
        assert!(
            count <= MAX_CHANNELS_PER_BLOCK,
            "block {label} has {count} channels, at most {MAX_CHANNELS_PER_BLOCK} are addressable"
        );
        Self {
            label: label.to_string(),
            kind,
            start,
            channels: (0..count).map(|i| format!("{prefix}.{i:04}")).collect(),
        }
    }

    /// Build a block from an explicit list of channel identifiers
    ///
    /// # Panics
    ///
    /// Panics if `ids` holds more than [`MAX_CHANNELS_PER_BLOCK`] entries.
    pub fn listed(label: &str, ids: &[&str], start: u16, kind: ValueKind) -> Self {
        assert!(
            ids.len() <= MAX_CHANNELS_PER_BLOCK,
            "block {label} has {} channels, at most {MAX_CHANNELS_PER_BLOCK} are addressable",
            ids.len()
        );
        Self {
            label: label.to_string(),
            kind,
            start,
            channels: ids.iter().map(|id| id.to_string()).collect(),
        }
    }

    /// Number of 16-bit registers covered by the block
    ///
    /// Saturates at `u16::MAX` for blocks built by hand with more than
    /// [`MAX_CHANNELS_PER_BLOCK`] channels; decoding such a block fails with
    /// a register count mismatch.
    pub fn register_count(&self) -> u16 {
        self.channels
            .len()
            .checked_mul(REGISTERS_PER_CHANNEL as usize)
            .and_then(|count| u16::try_from(count).ok())
            .unwrap_or(u16::MAX)
    }

    /// First register offset past the block
    pub fn end(&self) -> usize {
        self.start as usize + self.register_count() as usize
    }

    /// Zero-based register offset of a channel, if the block contains it
    pub fn offset_of(&self, channel: &str) -> Option<u16> {
        self.channels
            .iter()
            .position(|c| c == channel)
            .and_then(|i| u16::try_from(i * REGISTERS_PER_CHANNEL as usize).ok())
            .and_then(|offset| self.start.checked_add(offset))
    }
}

/// Ordered collection of register blocks
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterMap {
    blocks: Vec<RegisterBlock>,
}

impl RegisterMap {
    pub fn new(blocks: Vec<RegisterBlock>) -> Self {
        Self { blocks }
    }

    /// The AMCS FID layout
    pub fn amcs() -> Self {
        Self::new(vec![
            RegisterBlock::numbered("Analog inputs", "AI", 660, 0, ValueKind::Float32),
            RegisterBlock::numbered("Analog outputs", "AO", 44, 2000, ValueKind::Float32),
            RegisterBlock::listed("Hour counters", &HOUR_COUNTER_IDS, 3000, ValueKind::UInt32),
            RegisterBlock::numbered("Tank volumes", "TK", 52, 4000, ValueKind::Float32),
        ])
    }

    pub fn blocks(&self) -> &[RegisterBlock] {
        &self.blocks
    }

    /// Total number of channels in the map
    pub fn channel_count(&self) -> usize {
        self.blocks.iter().map(|b| b.channels.len()).sum()
    }

    /// Number of registers needed to hold every block, starting at offset 0
    pub fn register_span(&self) -> usize {
        self.blocks.iter().map(RegisterBlock::end).max().unwrap_or(0)
    }

    /// Find the block and register offset of a channel
    pub fn locate(&self, channel: &str) -> Option<(&RegisterBlock, u16)> {
        self.blocks
            .iter()
            .find_map(|b| b.offset_of(channel).map(|offset| (b, offset)))
    }
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self::amcs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_oversized_block_register_count_saturates() {
        let block = RegisterBlock {
            label: "Oversized".to_string(),
            kind: ValueKind::Float32,
            start: 0,
            channels: vec![String::new(); MAX_CHANNELS_PER_BLOCK + 1],
        };
        assert_eq!(block.register_count(), u16::MAX);

        let largest = RegisterBlock::numbered("Largest", "X", MAX_CHANNELS_PER_BLOCK, 0, ValueKind::Float32);
        assert_eq!(largest.register_count(), 65534);
    }

    #[test]
    #[should_panic(expected = "addressable")]
    fn test_numbered_rejects_too_many_channels() {
        RegisterBlock::numbered("Too big", "X", MAX_CHANNELS_PER_BLOCK + 1, 0, ValueKind::Float32);
    }

    #[test]
    fn test_amcs_layout_sizes() {
        let map = RegisterMap::amcs();
        assert_eq!(map.blocks().len(), 4);
        assert_eq!(map.channel_count(), 660 + 44 + 51 + 52);
        assert_eq!(map.register_span(), 4104);

        let ai = &map.blocks()[0];
        assert_eq!(ai.register_count(), 1320);
        assert_eq!(ai.channels.first().map(String::as_str), Some("AI.0000"));
        assert_eq!(ai.channels.last().map(String::as_str), Some("AI.0659"));
    }

    #[test]
    fn test_hour_counter_offsets() {
        let map = RegisterMap::amcs();
        let (block, offset) = map.locate("HC.0171").unwrap();
        assert_eq!(block.kind, ValueKind::UInt32);
        assert_eq!(offset, 3000);
        assert_eq!(map.locate("HC.1909").unwrap().1, 3100);
        assert_eq!(map.locate("TK.0051").unwrap().1, 4102);
        assert!(map.locate("HC.9999").is_none());
    }

    #[test]
    fn test_blocks_do_not_overlap_and_ids_are_unique() {
        let map = RegisterMap::amcs();
        for pair in map.blocks().windows(2) {
            assert!(pair[0].end() <= pair[1].start as usize);
        }

        let ids: HashSet<&str> = map
            .blocks()
            .iter()
            .flat_map(|b| b.channels.iter().map(String::as_str))
            .collect();
        assert_eq!(ids.len(), map.channel_count());
    }
}
