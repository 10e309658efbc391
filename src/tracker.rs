//! Byte-at-a-time MIDI message tracker
//!
//! Follows a raw MIDI byte stream and keeps track of the message in
//! progress: its status byte, how many data bytes are still missing and
//! whether running status may be reused. Every route and every output owns
//! one of these.

use crate::midi::{
    self, data_length, is_channel_voice, is_realtime, is_status, DataLength, ALL_NOTES_OFF_CC,
    CONTROL_CHANGE, SYSEX_START, SYSEX_STOP, SYSTEM_RESET,
};

/// Parser state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackerState {
    /// Nothing tracked yet (or after a reset)
    #[default]
    Idle,
    /// A status byte arrived, no data byte yet
    InCommand,
    /// At least one data byte arrived, message not complete
    InData,
    /// Message complete; a channel voice status may be reused by the next data byte
    Chained,
}

/// How a single byte was classified by [`MessageTracker::track`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tracked {
    /// System realtime byte, complete on its own
    Realtime,
    /// Status byte starting a new message
    Status,
    /// Data byte of the current message. `running` is set when this byte
    /// opened a new message through running status.
    Data { running: bool },
    /// Data byte with no message to belong to
    Discarded,
}

/// MIDI message tracker
#[derive(Debug, Clone, Default)]
pub struct MessageTracker {
    status: u8,
    remaining: u8,
    streaming: bool,
    state: TrackerState,
    data: [u8; 2],
    data_len: usize,
    last_data: u8,
    discarded: u64,
}

impl MessageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything, including running status
    pub fn reset(&mut self) {
        let discarded = self.discarded;
        *self = Self {
            discarded,
            ..Self::default()
        };
    }

    /// Feed one byte
    pub fn track(&mut self, byte: u8) -> Tracked {
        if is_realtime(byte) {
            if byte == SYSTEM_RESET {
                self.reset();
            }
            return Tracked::Realtime;
        }

        if is_status(byte) {
            self.begin(byte);
            return Tracked::Status;
        }

        match self.state {
            TrackerState::InCommand | TrackerState::InData => {
                self.accept_data(byte);
                Tracked::Data { running: false }
            }
            TrackerState::Chained if is_channel_voice(self.status) => {
                self.begin(self.status);
                self.accept_data(byte);
                Tracked::Data { running: true }
            }
            _ => {
                self.discarded += 1;
                Tracked::Discarded
            }
        }
    }

    fn begin(&mut self, status: u8) {
        self.status = status;
        self.data = [0; 2];
        self.data_len = 0;
        match data_length(status) {
            DataLength::Streaming => {
                self.streaming = true;
                self.remaining = 0;
                self.state = TrackerState::InCommand;
            }
            DataLength::Fixed(0) => {
                self.streaming = false;
                self.remaining = 0;
                self.state = TrackerState::Chained;
            }
            DataLength::Fixed(n) => {
                self.streaming = false;
                self.remaining = n;
                self.state = TrackerState::InCommand;
            }
        }
    }

    fn accept_data(&mut self, byte: u8) {
        self.last_data = byte;
        if self.streaming {
            self.state = TrackerState::InData;
            return;
        }
        if let Some(slot) = self.data.get_mut(self.data_len) {
            *slot = byte;
        }
        self.data_len += 1;
        self.remaining = self.remaining.saturating_sub(1);
        self.state = if self.remaining == 0 {
            TrackerState::Chained
        } else {
            TrackerState::InData
        };
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// Last status byte seen, 0 if none
    pub fn status(&self) -> u8 {
        self.status
    }

    /// Status without channel for channel voice messages, verbatim otherwise
    pub fn message(&self) -> u8 {
        midi::message_kind(self.status)
    }

    /// Channel 1-16 for channel voice messages, 0 otherwise
    pub fn channel(&self) -> u8 {
        if is_channel_voice(self.status) {
            (self.status & 0x0F) + 1
        } else {
            0
        }
    }

    /// Data bytes still needed to complete the current message
    ///
    /// Always 0 inside a system exclusive message; see [`Self::is_streaming`].
    pub fn remaining(&self) -> u8 {
        self.remaining
    }

    /// True while inside an unterminated system exclusive message
    pub fn is_streaming(&self) -> bool {
        self.streaming && self.in_message()
    }

    pub fn message_complete(&self) -> bool {
        self.state == TrackerState::Chained
    }

    /// True between a status byte and the end of its message
    pub fn in_message(&self) -> bool {
        matches!(self.state, TrackerState::InCommand | TrackerState::InData)
    }

    /// First data byte of the current message
    pub fn data1(&self) -> u8 {
        self.data[0]
    }

    /// Second data byte of the current message
    pub fn data2(&self) -> u8 {
        self.data[1]
    }

    /// Most recent data byte
    pub fn last_data(&self) -> u8 {
        self.last_data
    }

    pub fn all_notes_off(&self) -> bool {
        self.message_complete()
            && self.message() == CONTROL_CHANGE
            && self.data[0] == ALL_NOTES_OFF_CC
    }

    pub fn sysex(&self) -> bool {
        self.status == SYSEX_START || self.status == SYSEX_STOP
    }

    /// Stray data bytes dropped so far
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn feed(tracker: &mut MessageTracker, bytes: &[u8]) {
        for &b in bytes {
            tracker.track(b);
        }
    }

    #[test]
    fn test_note_on_completes_after_two_data_bytes() {
        let mut t = MessageTracker::new();
        assert_eq!(t.track(0x91), Tracked::Status);
        assert_eq!(t.state(), TrackerState::InCommand);
        assert!(!t.message_complete());
        t.track(0x3C);
        assert_eq!(t.state(), TrackerState::InData);
        assert_eq!(t.remaining(), 1);
        t.track(0x40);
        assert!(t.message_complete());
        assert_eq!(t.message(), 0x90);
        assert_eq!(t.channel(), 2);
        assert_eq!(t.data1(), 0x3C);
        assert_eq!(t.data2(), 0x40);
    }

    #[test]
    fn test_running_status() {
        let mut t = MessageTracker::new();
        feed(&mut t, &[0x90, 60, 100]);
        assert_eq!(t.track(62), Tracked::Data { running: true });
        assert!(!t.message_complete());
        assert_eq!(t.track(90), Tracked::Data { running: false });
        assert!(t.message_complete());
        assert_eq!(t.data1(), 62);
    }

    #[test]
    fn test_program_change_single_data_byte() {
        let mut t = MessageTracker::new();
        feed(&mut t, &[0xC3, 5]);
        assert!(t.message_complete());
        assert_eq!(t.channel(), 4);
        assert_eq!(t.track(6), Tracked::Data { running: true });
        assert!(t.message_complete());
    }

    #[test]
    fn test_stray_data_byte_discarded() {
        let mut t = MessageTracker::new();
        assert_eq!(t.track(0x3C), Tracked::Discarded);
        assert_eq!(t.state(), TrackerState::Idle);
        assert_eq!(t.status(), 0);
        assert_eq!(t.discarded(), 1);
    }

    #[test]
    fn test_system_common_cancels_running_status() {
        let mut t = MessageTracker::new();
        feed(&mut t, &[0x90, 60, 100, 0xF3, 2]);
        assert!(t.message_complete());
        assert_eq!(t.track(61), Tracked::Discarded);
    }

    #[test]
    fn test_single_byte_system_message_complete() {
        let mut t = MessageTracker::new();
        t.track(0xF6);
        assert!(t.message_complete());
        assert_eq!(t.message(), 0xF6);
        assert_eq!(t.channel(), 0);
    }

    #[test]
    fn test_sysex_streams_until_terminator() {
        let mut t = MessageTracker::new();
        t.track(0xF0);
        assert!(t.sysex());
        assert!(t.is_streaming());
        for b in 0..100u8 {
            t.track(b & 0x7F);
            assert!(t.in_message());
        }
        t.track(0xF7);
        assert!(t.sysex());
        assert!(t.message_complete());
        assert!(!t.in_message());
    }

    #[test]
    fn test_realtime_inside_sysex() {
        let mut t = MessageTracker::new();
        feed(&mut t, &[0xF0, 0x7E, 0xF8, 0x01]);
        assert!(t.is_streaming());
        assert_eq!(t.status(), 0xF0);
    }

    #[test]
    fn test_system_reset_returns_to_idle() {
        let mut t = MessageTracker::new();
        feed(&mut t, &[0x90, 60]);
        assert_eq!(t.track(0xFF), Tracked::Realtime);
        assert_eq!(t.state(), TrackerState::Idle);
        assert_eq!(t.track(100), Tracked::Discarded);
    }

    #[test]
    fn test_all_notes_off() {
        let mut t = MessageTracker::new();
        feed(&mut t, &[0xB0, 123]);
        assert!(!t.all_notes_off());
        t.track(0);
        assert!(t.all_notes_off());
        feed(&mut t, &[0xB0, 7, 123]);
        assert!(!t.all_notes_off());
    }

    fn message_strategy() -> impl Strategy<Value = Vec<u8>> {
        prop_oneof![
            (0x80u8..0xC0, 0u8..128, 0u8..128).prop_map(|(s, a, b)| vec![s, a, b]),
            (0xC0u8..0xE0, 0u8..128).prop_map(|(s, a)| vec![s, a]),
            (0xE0u8..0xF0, 0u8..128, 0u8..128).prop_map(|(s, a, b)| vec![s, a, b]),
            (0u8..128).prop_map(|a| vec![0xF3, a]),
            Just(vec![0xF6]),
        ]
    }

    proptest! {
        #[test]
        fn prop_complete_exactly_after_last_data_byte(msg in message_strategy()) {
            let mut t = MessageTracker::new();
            for (i, &b) in msg.iter().enumerate() {
                t.track(b);
                prop_assert_eq!(t.message_complete(), i == msg.len() - 1);
            }
            // Stays complete until something else arrives
            prop_assert!(t.message_complete());
            prop_assert!(t.message_complete());
        }

        #[test]
        fn prop_realtime_injection_is_transparent(
            msg in message_strategy(),
            rt in prop::sample::select(vec![0xF8u8, 0xF9, 0xFA, 0xFB, 0xFC, 0xFD, 0xFE]),
            offset in 0usize..4,
        ) {
            let offset = offset.min(msg.len());
            let mut reference = MessageTracker::new();
            feed(&mut reference, &msg[..offset]);

            let mut injected = reference.clone();
            prop_assert_eq!(injected.track(rt), Tracked::Realtime);
            prop_assert_eq!(injected.state(), reference.state());
            prop_assert_eq!(injected.status(), reference.status());
            prop_assert_eq!(injected.remaining(), reference.remaining());

            feed(&mut injected, &msg[offset..]);
            feed(&mut reference, &msg[offset..]);
            prop_assert_eq!(injected.state(), reference.state());
            prop_assert_eq!(injected.data1(), reference.data1());
            prop_assert_eq!(injected.data2(), reference.data2());
        }
    }
}
