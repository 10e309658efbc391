//! 32-bit message filter
//!
//! Bits 0-15 let channel voice messages through per channel, bits 16-31
//! let system messages through by the low nibble of their status byte
//! (0xF0 is bit 16, 0xFF is bit 31).

use serde::{Deserialize, Serialize};

use crate::midi::{is_channel_voice, is_status};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MidiFilter {
    mask: u32,
}

impl MidiFilter {
    /// Everything passes
    pub const ALL: MidiFilter = MidiFilter { mask: u32::MAX };
    /// Nothing passes
    pub const NONE: MidiFilter = MidiFilter { mask: 0 };

    const SYSTEM_BITS: u32 = 0xFFFF_0000;

    pub const fn new(mask: u32) -> Self {
        Self { mask }
    }

    /// Only the given channels (0-15) pass; system messages still pass
    pub fn channels(channels: &[u8]) -> Self {
        let mask = channels
            .iter()
            .filter(|&&ch| ch < 16)
            .fold(Self::SYSTEM_BITS, |mask, &ch| mask | (1 << ch));
        Self { mask }
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    pub fn set_mask(&mut self, mask: u32) {
        self.mask = mask;
    }

    /// Allow or block one channel (0-15)
    pub fn set_channel(&mut self, channel: u8, allowed: bool) {
        if channel < 16 {
            self.set_bit(channel as u32, allowed);
        }
    }

    /// Allow or block one system status byte (0xF0-0xFF)
    pub fn set_system(&mut self, status: u8, allowed: bool) {
        if status >= 0xF0 {
            self.set_bit(16 + (status & 0x0F) as u32, allowed);
        }
    }

    fn set_bit(&mut self, bit: u32, allowed: bool) {
        if allowed {
            self.mask |= 1 << bit;
        } else {
            self.mask &= !(1 << bit);
        }
    }

    /// Does a message starting with `status` pass? Data bytes never do.
    pub fn accepts(&self, status: u8) -> bool {
        if !is_status(status) {
            return false;
        }
        let bit = if is_channel_voice(status) {
            (status & 0x0F) as u32
        } else {
            16 + (status & 0x0F) as u32
        };
        self.mask & (1 << bit) != 0
    }
}

impl Default for MidiFilter {
    fn default() -> Self {
        Self::ALL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_accepts_everything() {
        let filter = MidiFilter::default();
        for status in 0x80..=0xFFu8 {
            assert!(filter.accepts(status));
        }
        assert!(!filter.accepts(0x3C));
    }

    #[test]
    fn test_channel_bits() {
        let filter = MidiFilter::channels(&[0]);
        assert!(filter.accepts(0x90));
        assert!(filter.accepts(0xB0));
        assert!(!filter.accepts(0x91));
        assert!(filter.accepts(0xF8));
    }

    #[test]
    fn test_system_bits() {
        let mut filter = MidiFilter::ALL;
        filter.set_system(0xF8, false);
        assert!(!filter.accepts(0xF8));
        assert!(filter.accepts(0xFA));
        assert_eq!(filter.mask(), !(1 << 24));
    }

    #[test]
    fn test_set_channel() {
        let mut filter = MidiFilter::NONE;
        filter.set_channel(15, true);
        assert!(filter.accepts(0xEF));
        assert!(!filter.accepts(0xE0));
        filter.set_channel(15, false);
        assert_eq!(filter, MidiFilter::NONE);
    }
}
