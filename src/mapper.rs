//! Polyphony mapper
//!
//! An input/output pair that spreads notes over channels. Each source
//! channel gets a number of voices; once they are all sounding, new notes
//! spill over to the channel's overflow channel, then to that channel's
//! overflow, and so on. An unmapped channel in the chain takes every note
//! that reaches it and ends the chain. Note-offs follow their note to
//! wherever it was placed.

use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::HeapRb;
use serde::Serialize;
use tracing::{debug, trace};

use crate::midi::{
    self, data_length, DataLength, ALL_NOTES_OFF_CC, CONTROL_CHANGE, NOTE_OFF, NOTE_ON,
    NUM_CHANNELS,
};
use crate::tracker::{MessageTracker, Tracked};

pub const MAX_POLYPHONY: usize = 16;

/// Bytes the mapper can hold before its input side is read
pub const MAPPER_QUEUE_SIZE: usize = 256;

/// Longest overflow chain followed
const MAX_CHAIN: usize = 16;

#[derive(Debug, Clone, Copy, Default)]
struct Voices {
    polyphony: u8,
    overflow: Option<u8>,
    notes: [Option<u8>; MAX_POLYPHONY],
    /// Notes spilled onto this channel while it is unmapped, one bit per note
    spilled: u128,
}

impl Voices {
    fn active(&mut self) -> &mut [Option<u8>] {
        &mut self.notes[..self.polyphony as usize]
    }

    fn unmapped(&self) -> bool {
        self.polyphony == 0
    }

    fn spilled_notes(&self) -> impl Iterator<Item = u8> + '_ {
        (0..128u8).filter(move |&n| self.spilled & (1u128 << n) != 0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MapperStats {
    /// Messages that did not fit in the output queue
    pub dropped: u64,
    /// Note-ons with no free voice anywhere in their chain
    pub voice_overflows: u64,
}

pub struct PolyMapper {
    voices: [Voices; NUM_CHANNELS],
    out: HeapRb<u8>,
    stats: MapperStats,
}

impl PolyMapper {
    /// Mapper with every channel unmapped
    pub fn new() -> Self {
        Self {
            voices: [Voices::default(); NUM_CHANNELS],
            out: HeapRb::new(MAPPER_QUEUE_SIZE),
            stats: MapperStats::default(),
        }
    }

    pub fn polyphony(&self, channel: u8) -> u8 {
        self.voices[(channel & 0x0F) as usize].polyphony
    }

    /// Set the voices of `channel`; 0 unmaps it. Notes sounding on the
    /// channel are released.
    pub fn set_polyphony(&mut self, channel: u8, polyphony: u8) {
        let channel = channel & 0x0F;
        self.release_channel(channel);
        self.voices[channel as usize].polyphony = polyphony.min(MAX_POLYPHONY as u8);
        debug!(
            "Mapper channel {} polyphony {}",
            channel + 1,
            self.voices[channel as usize].polyphony
        );
    }

    pub fn overflow(&self, channel: u8) -> Option<u8> {
        self.voices[(channel & 0x0F) as usize].overflow
    }

    pub fn set_overflow(&mut self, channel: u8, overflow: Option<u8>) {
        self.voices[(channel & 0x0F) as usize].overflow = overflow.map(|c| c & 0x0F);
    }

    /// Forget every sounding note
    pub fn reset(&mut self) {
        for v in self.voices.iter_mut() {
            v.notes = [None; MAX_POLYPHONY];
            v.spilled = 0;
        }
    }

    /// Notes currently sounding on `channel`
    pub fn sounding(&self, channel: u8) -> Vec<u8> {
        let v = &self.voices[(channel & 0x0F) as usize];
        let mut notes: Vec<u8> = v.notes[..v.polyphony as usize]
            .iter()
            .flatten()
            .copied()
            .collect();
        notes.extend(v.spilled_notes());
        notes
    }

    pub fn stats(&self) -> MapperStats {
        self.stats
    }

    pub fn available(&self) -> usize {
        self.out.occupied_len()
    }

    pub fn read(&mut self) -> Option<u8> {
        self.out.try_pop()
    }

    /// Room for at least one more whole message
    pub fn available_for_write(&self) -> usize {
        self.out.vacant_len().saturating_sub(3)
    }

    pub(crate) fn write(&mut self, byte: u8, tracked: Tracked, tracker: &MessageTracker) {
        match tracked {
            Tracked::Discarded => {}
            Tracked::Realtime => self.emit(&[byte]),
            _ if tracker.sysex() => self.emit(&[byte]),
            _ if tracker.message_complete() => self.map(tracker),
            _ => {}
        }
    }

    /// Channel followed by its overflow chain, each channel at most once,
    /// up to the first unmapped channel
    fn chain(&self, channel: u8) -> Vec<u8> {
        let mut chain = Vec::with_capacity(MAX_CHAIN);
        let mut visited = 0u16;
        let mut next = Some(channel);
        while let Some(ch) = next {
            if visited & (1 << ch) != 0 || chain.len() == MAX_CHAIN {
                break;
            }
            visited |= 1 << ch;
            chain.push(ch);
            let voices = &self.voices[ch as usize];
            if ch != channel && voices.unmapped() {
                break;
            }
            next = voices.overflow;
        }
        chain
    }

    fn map(&mut self, tracker: &MessageTracker) {
        let status = tracker.status();
        let len = match data_length(status) {
            DataLength::Fixed(n) => 1 + n as usize,
            DataLength::Streaming => return,
        };
        let frame = [status, tracker.data1(), tracker.data2()];
        let frame = &frame[..len];

        let kind = tracker.message();
        let channel = status & 0x0F;
        if !midi::is_channel_voice(status) || self.voices[channel as usize].polyphony == 0 {
            self.emit(frame);
            return;
        }

        let (note, velocity) = (frame[1], frame.get(2).copied().unwrap_or(0));
        match kind {
            NOTE_ON if velocity > 0 => self.note_on(channel, note, velocity),
            NOTE_ON | NOTE_OFF => self.note_off(kind, channel, note, velocity),
            CONTROL_CHANGE if note == ALL_NOTES_OFF_CC => {
                for ch in self.chain(channel) {
                    self.release_channel(ch);
                }
                self.emit(frame);
            }
            _ => self.emit(frame),
        }
    }

    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        for ch in self.chain(channel) {
            let voices = &mut self.voices[ch as usize];
            if voices.unmapped() {
                voices.spilled |= 1u128 << note;
                self.emit(&[NOTE_ON | ch, note, velocity]);
                return;
            }
            if let Some(slot) = self.voices[ch as usize]
                .active()
                .iter_mut()
                .find(|s| s.is_none())
            {
                *slot = Some(note);
                self.emit(&[NOTE_ON | ch, note, velocity]);
                return;
            }
        }
        self.stats.voice_overflows += 1;
        trace!("No free voice for note {} on channel {}", note, channel + 1);
    }

    fn note_off(&mut self, kind: u8, channel: u8, note: u8, velocity: u8) {
        for ch in self.chain(channel) {
            let voices = &mut self.voices[ch as usize];
            if voices.unmapped() {
                if voices.spilled & (1u128 << note) != 0 {
                    voices.spilled &= !(1u128 << note);
                    self.emit(&[kind | ch, note, velocity]);
                    return;
                }
                continue;
            }
            if let Some(slot) = self.voices[ch as usize]
                .active()
                .iter_mut()
                .find(|s| **s == Some(note))
            {
                *slot = None;
                self.emit(&[kind | ch, note, velocity]);
                return;
            }
        }
        self.emit(&[kind | channel, note, velocity]);
    }

    fn release_channel(&mut self, channel: u8) {
        let voices = &mut self.voices[channel as usize];
        let mut notes: Vec<u8> = voices.active().iter_mut().filter_map(Option::take).collect();
        notes.extend(voices.spilled_notes());
        voices.spilled = 0;
        for note in notes {
            self.emit(&[NOTE_OFF | channel, note, 0]);
        }
    }

    fn emit(&mut self, message: &[u8]) {
        if self.out.vacant_len() < message.len() {
            self.stats.dropped += 1;
            trace!("Mapper queue full, dropped {}", midi::format_hex(message));
            return;
        }
        for &b in message {
            let _ = self.out.try_push(b);
        }
    }
}

impl Default for PolyMapper {
    fn default() -> Self {
        Self::new()
    }
}
