//! Per-channel processing applied by a route
//!
//! Each of the 16 source channels can be remapped to another channel,
//! transposed, and have its note-on velocity scaled and offset.

use serde::{Deserialize, Serialize};

/// Neutral velocity scale (percent)
pub const NEUTRAL_SCALE: u16 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelProcessing {
    /// Target channel (0-15), `None` keeps the source channel
    pub remap: Option<u8>,
    /// Semitones added to note numbers
    pub transpose: i8,
    /// Velocity multiplier in percent
    pub velocity_scale: u16,
    /// Added to the scaled velocity
    pub velocity_offset: i8,
}

impl Default for ChannelProcessing {
    fn default() -> Self {
        Self {
            remap: None,
            transpose: 0,
            velocity_scale: NEUTRAL_SCALE,
            velocity_offset: 0,
        }
    }
}

impl ChannelProcessing {
    pub fn is_neutral(&self) -> bool {
        *self == Self::default()
    }

    /// Output channel for a message on `channel`
    pub fn channel(&self, channel: u8) -> u8 {
        self.remap.map(|c| c & 0x0F).unwrap_or(channel)
    }

    /// Transposed note, clamped to 0-127
    pub fn note(&self, note: u8) -> u8 {
        (note as i16 + self.transpose as i16).clamp(0, 127) as u8
    }

    /// Scaled and offset velocity, clamped to 0-127
    pub fn velocity(&self, velocity: u8) -> u8 {
        let scaled = velocity as i32 * self.velocity_scale as i32 / NEUTRAL_SCALE as i32;
        (scaled + self.velocity_offset as i32).clamp(0, 127) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_is_identity() {
        let p = ChannelProcessing::default();
        assert!(p.is_neutral());
        assert_eq!(p.channel(5), 5);
        for v in 0..=127u8 {
            assert_eq!(p.velocity(v), v);
            assert_eq!(p.note(v), v);
        }
    }

    #[test]
    fn test_clamping() {
        let p = ChannelProcessing {
            transpose: 24,
            velocity_scale: 200,
            velocity_offset: 10,
            ..Default::default()
        };
        assert_eq!(p.note(120), 127);
        assert_eq!(p.velocity(100), 127);

        let p = ChannelProcessing {
            transpose: -24,
            velocity_scale: 50,
            velocity_offset: -40,
            ..Default::default()
        };
        assert_eq!(p.note(10), 0);
        assert_eq!(p.velocity(60), 0);
        assert_eq!(p.velocity(100), 10);
    }

    #[test]
    fn test_remap() {
        let p = ChannelProcessing {
            remap: Some(9),
            ..Default::default()
        };
        assert!(!p.is_neutral());
        assert_eq!(p.channel(0), 9);
    }

    proptest! {
        #[test]
        fn prop_transpose_round_trip(note in 0u8..128, n in -127i8..=127) {
            let up = ChannelProcessing { transpose: n, ..Default::default() };
            let down = ChannelProcessing { transpose: -n, ..Default::default() };
            let shifted = note as i16 + n as i16;
            prop_assume!((0..=127).contains(&shifted));
            prop_assert_eq!(down.note(up.note(note)), note);
        }
    }
}
