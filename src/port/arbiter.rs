//! Output arbitration
//!
//! An output hands a reservation to the first writer that starts a
//! message and refuses everybody else until that message is complete.
//! A writer that stops mid-message for longer than
//! [`RESERVATION_TIMEOUT_MS`] loses its reservation. Whatever it still
//! had to say about the abandoned message is swallowed once it resumes,
//! and an abandoned SysEx is closed before the next writer's first byte.

use tracing::warn;

use super::WriterId;
use crate::midi::{is_realtime, is_status, SYSEX_STOP};
use crate::tracker::{MessageTracker, Tracked};

/// Longer than the 300 ms active sensing interval
pub const RESERVATION_TIMEOUT_MS: u64 = 400;

/// Answer of [`Arbiter::acquire`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Another writer holds a live reservation
    Refused,
    /// Tail of a message abandoned at a takeover: accept it, send nothing
    Discard,
    /// Send the byte, after an `F7` when an abandoned SysEx must be closed
    Write { close_sysex: bool },
}

#[derive(Debug, Clone, Default)]
pub struct Arbiter {
    writer: Option<WriterId>,
    reserved_at_ms: u64,
    tracker: MessageTracker,
    forced_releases: u64,
    /// Writer that lost its reservation mid-message
    evicted: Option<WriterId>,
}

impl Arbiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.reserved_at_ms) >= RESERVATION_TIMEOUT_MS
    }

    /// Current reservation holder, ignoring expired reservations
    pub fn holder(&self, now_ms: u64) -> Option<WriterId> {
        self.writer.filter(|_| !self.expired(now_ms))
    }

    /// May `writer` write now?
    pub fn may_write(&self, writer: WriterId, now_ms: u64) -> bool {
        match self.holder(now_ms) {
            None => true,
            Some(holder) => holder == writer,
        }
    }

    /// Decide what happens to `byte` from `writer`, taking or refreshing
    /// the reservation when it may be sent
    ///
    /// Follow a `Write` answer with [`track`](Self::track) for the bytes
    /// actually sent and [`end_write`](Self::end_write).
    pub fn acquire(&mut self, byte: u8, writer: WriterId, now_ms: u64) -> Access {
        if self.evicted == Some(writer) && !is_realtime(byte) {
            if !is_status(byte) {
                return Access::Discard;
            }
            self.evicted = None;
            if byte == SYSEX_STOP {
                return Access::Discard;
            }
        }

        let mut close_sysex = false;
        match self.writer {
            Some(holder) if holder == writer => {}
            Some(_) if !self.expired(now_ms) => return Access::Refused,
            Some(stale) => {
                warn!(
                    "{} held an output for {} ms mid-message, handing it to {}",
                    stale,
                    now_ms.saturating_sub(self.reserved_at_ms),
                    writer
                );
                self.forced_releases += 1;
                self.evicted = Some(stale);
                close_sysex = self.abandon();
                self.writer = Some(writer);
            }
            None => self.writer = Some(writer),
        }
        self.reserved_at_ms = now_ms;
        Access::Write { close_sysex }
    }

    /// Drop the message in progress; true if it was a SysEx that still
    /// needs its terminator
    fn abandon(&mut self) -> bool {
        let open_sysex = self.tracker.in_message() && self.tracker.sysex();
        if !open_sysex {
            self.tracker.reset();
        }
        open_sysex
    }

    /// Track a byte that is being sent
    pub fn track(&mut self, byte: u8) -> Tracked {
        self.tracker.track(byte)
    }

    /// Release the reservation if the last byte ended a message
    pub fn end_write(&mut self) {
        if !self.tracker.in_message() {
            self.writer = None;
        }
    }

    /// Forget `writer` for good, e.g. because its route was deleted
    ///
    /// Returns true when it left a SysEx open that must be closed.
    pub fn release(&mut self, writer: WriterId) -> bool {
        if self.evicted == Some(writer) {
            self.evicted = None;
        }
        if self.writer != Some(writer) {
            return false;
        }
        self.writer = None;
        self.abandon()
    }

    pub fn tracker(&self) -> &MessageTracker {
        &self.tracker
    }

    /// Last message written, as reported by [`MessageTracker::message`]
    pub fn last_sent_message(&self) -> u8 {
        self.tracker.message()
    }

    pub fn message_complete(&self) -> bool {
        self.tracker.message_complete()
    }

    /// Reservations taken away from stalled writers
    pub fn forced_releases(&self) -> u64 {
        self.forced_releases
    }
}
