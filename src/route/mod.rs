//! Routes: filtered, processed bindings from one input to one output
//!
//! A route sees every byte its input produces. It runs its own tracker so
//! it knows which message each byte belongs to, drops what the filter
//! rejects, divides the clock, applies per-channel processing, and buffers
//! the result until the bound output is free to take it.
//!
//! Channel voice and system common messages are assembled and committed to
//! the buffer whole, always with an explicit status byte: the output may
//! hand its reservation to another writer between two messages, so running
//! status cannot be relied upon downstream. System exclusive streams
//! through byte by byte, realtime bytes bypass assembly.

mod filter;
mod processing;
mod table;

pub use filter::MidiFilter;
pub use processing::{ChannelProcessing, NEUTRAL_SCALE};
pub use table::{RouteTable, ROUTE_TABLE_SIZE};

use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::HeapRb;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

use crate::midi::{
    self, is_channel_voice, CLOCK, NOTE_OFF, NOTE_ON, NUM_CHANNELS, POLY_PRESSURE, SYSEX_START,
    SYSEX_STOP,
};
use crate::port::{OutputSink, PortId, WriterId};
use crate::tracker::{MessageTracker, Tracked};

/// Bytes a route can hold while its output is busy
pub const ROUTE_BUFFER_SIZE: usize = 64;

/// Most bytes a single input byte can add to a route's buffer: the data
/// byte completing a running-status message commits a whole three-byte frame
pub const MAX_EXPANSION: usize = 3;

/// Stable handle of a route in the [`RouteTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteId(pub(crate) usize);

impl RouteId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "route#{}", self.0)
    }
}

/// What a route does with a note-on of velocity 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VelocityZero {
    /// Keep it a note-on with velocity 0
    #[default]
    Preserve,
    /// Turn incoming velocity-0 note-ons into note-offs, then process
    NoteOffBeforeProcessing,
    /// Process, then turn note-ons whose resulting velocity is 0 into note-offs
    NoteOffAfterProcessing,
}

/// Diagnostics counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouteStats {
    /// Bytes dropped because the buffer was full
    pub dropped: u64,
    /// Messages rejected by the filter
    pub filtered: u64,
    /// Clock pulses swallowed by the sync divider
    pub clock_skipped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SysexFlow {
    Idle,
    Forwarding,
    /// Lost a data byte: drop the rest, still send the terminator
    Truncated,
    /// Lost the start byte: drop everything up to and including the terminator
    Lost,
}

pub struct Route {
    input: PortId,
    output: PortId,
    writer: WriterId,
    tracker: MessageTracker,
    buffer: HeapRb<u8>,
    filter: MidiFilter,
    sync_divider: u8,
    sync_counter: u8,
    processing: [ChannelProcessing; NUM_CHANNELS],
    velocity_zero: VelocityZero,
    pending: [u8; 3],
    pending_len: usize,
    accepting: bool,
    sysex: SysexFlow,
    stats: RouteStats,
}

impl Route {
    pub(crate) fn new(id: RouteId, input: PortId, output: PortId) -> Self {
        Self {
            input,
            output,
            writer: WriterId::from(id),
            tracker: MessageTracker::new(),
            buffer: HeapRb::new(ROUTE_BUFFER_SIZE),
            filter: MidiFilter::default(),
            sync_divider: 1,
            sync_counter: 0,
            processing: [ChannelProcessing::default(); NUM_CHANNELS],
            velocity_zero: VelocityZero::default(),
            pending: [0; 3],
            pending_len: 0,
            accepting: false,
            sysex: SysexFlow::Idle,
            stats: RouteStats::default(),
        }
    }

    pub fn input(&self) -> PortId {
        self.input
    }

    pub fn output(&self) -> PortId {
        self.output
    }

    pub fn writer(&self) -> WriterId {
        self.writer
    }

    /// Accept one byte from the input
    pub fn route(&mut self, byte: u8) {
        let in_sysex = self.tracker.is_streaming();

        match self.tracker.track(byte) {
            Tracked::Realtime => self.route_realtime(byte),
            Tracked::Status if in_sysex && byte == SYSEX_STOP => self.end_sysex(),
            Tracked::Status => self.begin_message(byte, in_sysex),
            Tracked::Data { running } => self.route_data(byte, running),
            Tracked::Discarded => {}
        }
    }

    fn route_realtime(&mut self, byte: u8) {
        if !self.filter.accepts(byte) {
            self.stats.filtered += 1;
            return;
        }
        if byte == CLOCK && !self.pass_clock() {
            return;
        }
        self.push(byte);
    }

    fn begin_message(&mut self, status: u8, in_sysex: bool) {
        let flow = std::mem::replace(&mut self.sysex, SysexFlow::Idle);
        self.pending_len = 0;
        self.accepting = self.filter.accepts(status);
        if !self.accepting {
            self.stats.filtered += 1;
            // The status that ends this SysEx is not forwarded, so close it explicitly
            if in_sysex && matches!(flow, SysexFlow::Forwarding | SysexFlow::Truncated) {
                self.push(SYSEX_STOP);
            }
            return;
        }

        if status == SYSEX_START {
            self.sysex = SysexFlow::Forwarding;
            if !self.push(status) {
                self.sysex = SysexFlow::Lost;
            }
            return;
        }

        self.pending[0] = status;
        self.pending_len = 1;
        if self.tracker.message_complete() {
            self.commit();
        }
    }

    fn end_sysex(&mut self) {
        let flow = std::mem::replace(&mut self.sysex, SysexFlow::Idle);
        if !self.accepting {
            return;
        }
        match flow {
            SysexFlow::Forwarding | SysexFlow::Truncated => {
                self.push(SYSEX_STOP);
            }
            SysexFlow::Lost => self.stats.dropped += 1,
            SysexFlow::Idle => {}
        }
    }

    fn route_data(&mut self, byte: u8, running: bool) {
        if !self.accepting {
            return;
        }

        if self.tracker.is_streaming() {
            match self.sysex {
                SysexFlow::Forwarding => {
                    if !self.push(byte) {
                        self.sysex = SysexFlow::Truncated;
                    }
                }
                _ => self.stats.dropped += 1,
            }
            return;
        }

        if running {
            self.pending[0] = self.tracker.status();
            self.pending_len = 1;
        }
        if let Some(slot) = self.pending.get_mut(self.pending_len) {
            *slot = byte;
            self.pending_len += 1;
        }
        if self.tracker.message_complete() {
            self.commit();
        }
    }

    fn pass_clock(&mut self) -> bool {
        let pass = self.sync_counter == 0;
        self.sync_counter = (self.sync_counter + 1) % self.sync_divider.max(1);
        if !pass {
            self.stats.clock_skipped += 1;
        }
        pass
    }

    /// Push a fully assembled message into the buffer
    fn commit(&mut self) {
        let len = self.pending_len;
        self.pending_len = 0;

        let mut frame = self.pending;
        if is_channel_voice(frame[0]) {
            self.process(&mut frame[..len]);
        }

        if self.buffer.vacant_len() < len {
            self.stats.dropped += len as u64;
            trace!("{} full, dropped {}", self.writer, midi::format_hex(&frame[..len]));
            return;
        }
        for &b in &frame[..len] {
            let _ = self.buffer.try_push(b);
        }
    }

    fn process(&self, frame: &mut [u8]) {
        let channel = frame[0] & 0x0F;
        let mut kind = frame[0] & 0xF0;
        let p = &self.processing[channel as usize];

        if kind == NOTE_ON && frame.len() == 3 {
            let incoming = frame[2];
            if incoming == 0 && self.velocity_zero == VelocityZero::NoteOffBeforeProcessing {
                kind = NOTE_OFF;
            } else if incoming != 0 {
                frame[2] = p.velocity(incoming);
            }
            if frame[2] == 0 && self.velocity_zero == VelocityZero::NoteOffAfterProcessing {
                kind = NOTE_OFF;
            }
        }

        if matches!(kind, NOTE_ON | NOTE_OFF | POLY_PRESSURE) && frame.len() > 1 {
            frame[1] = p.note(frame[1]);
        }

        frame[0] = kind | p.channel(channel);
    }

    /// Buffer one byte, keeping the last free byte for the terminator of
    /// an open SysEx
    fn push(&mut self, byte: u8) -> bool {
        let reserved = match self.sysex {
            SysexFlow::Forwarding | SysexFlow::Truncated => 1,
            SysexFlow::Idle | SysexFlow::Lost => 0,
        };
        if self.buffer.vacant_len() <= reserved || self.buffer.try_push(byte).is_err() {
            self.stats.dropped += 1;
            return false;
        }
        true
    }

    /// Move buffered bytes into the output while it accepts them
    pub fn write(&mut self, sink: &mut dyn OutputSink) -> usize {
        let mut written = 0;
        while !self.buffer.is_empty() && sink.available_for_write(self.writer) > 0 {
            let Some(byte) = self.buffer.try_pop() else {
                break;
            };
            if !sink.write(byte, self.writer) {
                break;
            }
            written += 1;
        }
        written
    }

    /// Free buffer space
    pub fn available_for_write(&self) -> usize {
        self.buffer.vacant_len()
    }

    /// Bytes waiting for the output
    pub fn buffered(&self) -> usize {
        self.buffer.occupied_len()
    }

    pub fn filter(&self) -> MidiFilter {
        self.filter
    }

    pub fn set_filter(&mut self, filter: MidiFilter) {
        self.filter = filter;
    }

    pub fn sync_divider(&self) -> u8 {
        self.sync_divider
    }

    /// Forward only every `divider`th clock pulse (0 is treated as 1)
    pub fn set_sync_divider(&mut self, divider: u8) {
        self.sync_divider = divider.max(1);
        self.sync_counter = 0;
    }

    pub fn velocity_zero(&self) -> VelocityZero {
        self.velocity_zero
    }

    pub fn set_velocity_zero(&mut self, policy: VelocityZero) {
        self.velocity_zero = policy;
    }

    /// Processing settings of a source channel (0-15)
    pub fn channel_processing(&self, channel: u8) -> ChannelProcessing {
        self.processing[(channel & 0x0F) as usize]
    }

    pub fn set_channel_processing(&mut self, channel: u8, processing: ChannelProcessing) {
        self.processing[(channel & 0x0F) as usize] = processing;
    }

    pub fn set_channel_mapping(&mut self, from: u8, to: Option<u8>) {
        self.processing[(from & 0x0F) as usize].remap = to.map(|c| c & 0x0F);
    }

    pub fn channel_mapping(&self, from: u8) -> Option<u8> {
        self.processing[(from & 0x0F) as usize].remap
    }

    pub fn set_transpose(&mut self, channel: u8, semitones: i8) {
        self.processing[(channel & 0x0F) as usize].transpose = semitones;
    }

    pub fn transpose(&self, channel: u8) -> i8 {
        self.processing[(channel & 0x0F) as usize].transpose
    }

    pub fn set_velocity_scale(&mut self, channel: u8, percent: u16) {
        self.processing[(channel & 0x0F) as usize].velocity_scale = percent;
    }

    pub fn velocity_scale(&self, channel: u8) -> u16 {
        self.processing[(channel & 0x0F) as usize].velocity_scale
    }

    pub fn set_velocity_offset(&mut self, channel: u8, offset: i8) {
        self.processing[(channel & 0x0F) as usize].velocity_offset = offset;
    }

    pub fn velocity_offset(&self, channel: u8) -> i8 {
        self.processing[(channel & 0x0F) as usize].velocity_offset
    }

    /// True when any channel has non-neutral processing
    pub fn processing_enabled(&self) -> bool {
        self.processing.iter().any(|p| !p.is_neutral())
    }

    /// Reset every channel to neutral processing
    pub fn reset_processing(&mut self) {
        self.processing = [ChannelProcessing::default(); NUM_CHANNELS];
    }

    pub fn stats(&self) -> RouteStats {
        self.stats
    }
}
