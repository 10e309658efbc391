//! GPIO gate output
//!
//! Drives one pin per (channel, note) mapping: high while the note is held,
//! low once it is released.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::midi::{NOTE_OFF, NOTE_ON};
use crate::tracker::{MessageTracker, Tracked};

pub const MAX_GATE_PINS: usize = 8;

/// First note of the default mapping
const DEFAULT_BASE_NOTE: u8 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
}

/// Pin control provided by the platform
pub trait GpioPins {
    fn set_pin_mode(&mut self, pin: u8, mode: PinMode);
    fn write_pin(&mut self, pin: u8, high: bool);
}

/// Pins that only log their changes
#[derive(Debug, Default)]
pub struct TracingPins;

impl GpioPins for TracingPins {
    fn set_pin_mode(&mut self, pin: u8, mode: PinMode) {
        debug!("GPIO {} -> {:?}", pin, mode);
    }

    fn write_pin(&mut self, pin: u8, high: bool) {
        debug!("GPIO {} {}", pin, if high { "HIGH" } else { "LOW" });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateMapping {
    pub pin: u8,
    /// Channel 0-15
    pub channel: u8,
    pub note: u8,
}

pub struct GpioGate {
    pins: Box<dyn GpioPins>,
    mappings: Vec<GateMapping>,
    levels: Vec<bool>,
}

impl GpioGate {
    /// Pins `pins[i]` follow note 60 + i on the first channel
    pub fn new(pins: &[u8], gpio: Box<dyn GpioPins>) -> Self {
        let mappings = pins
            .iter()
            .take(MAX_GATE_PINS)
            .zip(DEFAULT_BASE_NOTE..)
            .map(|(&pin, note)| GateMapping {
                pin,
                channel: 0,
                note,
            })
            .collect();
        Self::build(mappings, gpio)
    }

    /// Explicit mappings; anything beyond [`MAX_GATE_PINS`] is ignored
    pub fn with_mappings(mappings: &[GateMapping], gpio: Box<dyn GpioPins>) -> Self {
        Self::build(mappings.iter().take(MAX_GATE_PINS).copied().collect(), gpio)
    }

    fn build(mappings: Vec<GateMapping>, mut pins: Box<dyn GpioPins>) -> Self {
        for m in &mappings {
            pins.set_pin_mode(m.pin, PinMode::Output);
            pins.write_pin(m.pin, false);
        }
        let levels = vec![false; mappings.len()];
        Self {
            pins,
            mappings,
            levels,
        }
    }

    pub fn mappings(&self) -> &[GateMapping] {
        &self.mappings
    }

    /// Current level of `pin`, false for unmapped pins
    pub fn is_high(&self, pin: u8) -> bool {
        self.mappings
            .iter()
            .zip(&self.levels)
            .any(|(m, &level)| m.pin == pin && level)
    }

    pub(crate) fn write(&mut self, tracked: Tracked, tracker: &MessageTracker) {
        if !matches!(tracked, Tracked::Data { .. }) || !tracker.message_complete() {
            return;
        }
        let kind = tracker.message();
        if kind != NOTE_ON && kind != NOTE_OFF {
            return;
        }
        let channel = tracker.channel().saturating_sub(1);
        let note = tracker.data1();
        let high = kind == NOTE_ON && tracker.data2() > 0;

        for (m, level) in self.mappings.iter().zip(self.levels.iter_mut()) {
            if m.channel == channel && m.note == note && *level != high {
                trace!("Gate pin {} {}", m.pin, high);
                self.pins.write_pin(m.pin, high);
                *level = high;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct RecordingPins(Arc<Mutex<Vec<(u8, bool)>>>);

    impl GpioPins for RecordingPins {
        fn set_pin_mode(&mut self, _pin: u8, mode: PinMode) {
            assert_eq!(mode, PinMode::Output);
        }
        fn write_pin(&mut self, pin: u8, high: bool) {
            self.0.lock().push((pin, high));
        }
    }

    fn play(gate: &mut GpioGate, bytes: &[u8]) {
        let mut tracker = MessageTracker::new();
        for &b in bytes {
            let tracked = tracker.track(b);
            gate.write(tracked, &tracker);
        }
    }

    #[test]
    fn test_default_mapping() {
        let pins = RecordingPins::default();
        let mut gate = GpioGate::new(&[2, 3], Box::new(pins.clone()));
        assert_eq!(gate.mappings()[1].note, 61);
        pins.0.lock().clear();

        play(&mut gate, &[0x90, 61, 100]);
        assert!(gate.is_high(3));
        assert!(!gate.is_high(2));

        // Velocity 0 releases, running status
        play(&mut gate, &[0x90, 61, 100, 61, 0]);
        assert!(!gate.is_high(3));
        assert_eq!(*pins.0.lock(), vec![(3, true), (3, false)]);
    }

    #[test]
    fn test_other_channel_ignored() {
        let pins = RecordingPins::default();
        let mut gate = GpioGate::new(&[2], Box::new(pins));
        play(&mut gate, &[0x91, 60, 100]);
        assert!(!gate.is_high(2));
        play(&mut gate, &[0x90, 60, 100, 0x80, 60, 0]);
        assert!(!gate.is_high(2));
    }

    #[test]
    fn test_explicit_mappings_capped() {
        let mappings: Vec<GateMapping> = (0..12)
            .map(|i| GateMapping {
                pin: i,
                channel: 9,
                note: 36 + i,
            })
            .collect();
        let mut gate = GpioGate::with_mappings(&mappings, Box::new(TracingPins));
        assert_eq!(gate.mappings().len(), MAX_GATE_PINS);
        play(&mut gate, &[0x99, 38, 1]);
        assert!(gate.is_high(2));
    }
}
