//! Serial multiplexer
//!
//! Carries up to eight logical MIDI ports over one physical link running
//! at 16 times the MIDI baud rate. Every logical byte is split into two
//! encoded bytes:
//!
//! ```text
//! bit 7     HALF (1 = upper nibble, 0 = lower nibble)
//! bits 6-4  port address
//! bits 3-0  payload nibble
//! ```
//!
//! The upper half always goes first. Pairs of different ports may
//! interleave on the wire.

use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::HeapRb;
use serde::Serialize;
use std::fmt;
use tracing::trace;

use crate::midi::MIDI_BAUD_RATE;
use crate::transport::SerialLink;

/// Logical ports per link
pub const MUX_PORTS: usize = 8;

/// Decoded bytes held per logical port
pub const MUX_QUEUE_SIZE: usize = 16;

/// Encoded bytes waiting for the physical link
pub const MUX_OUTBOUND_SIZE: usize = 64;

pub const MUX_BAUD_RATE: u32 = MIDI_BAUD_RATE * 16;

const HALF: u8 = 0x80;

/// Handle of a mux in the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MuxId(pub(crate) usize);

impl MuxId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for MuxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mux#{}", self.0)
    }
}

/// Split `byte` for port `address` (0-7) into its two wire bytes
pub fn encode(address: u8, byte: u8) -> [u8; 2] {
    let address = (address & 0x07) << 4;
    [HALF | address | (byte >> 4), address | (byte & 0x0F)]
}

/// Reassembles logical bytes from the wire
#[derive(Debug, Clone, Default)]
pub struct MuxDecoder {
    pending: [Option<u8>; MUX_PORTS],
    malformed: u64,
}

impl MuxDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one wire byte, returning `(address, byte)` when a pair completes
    pub fn decode(&mut self, encoded: u8) -> Option<(u8, u8)> {
        let address = (encoded >> 4) & 0x07;
        let nibble = encoded & 0x0F;
        let pending = &mut self.pending[address as usize];

        if encoded & HALF != 0 {
            if pending.replace(nibble).is_some() {
                self.malformed += 1;
            }
            return None;
        }

        match pending.take() {
            Some(upper) => Some((address, (upper << 4) | nibble)),
            None => {
                self.malformed += 1;
                None
            }
        }
    }

    /// Frames discarded so far
    pub fn malformed(&self) -> u64 {
        self.malformed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MuxStats {
    pub malformed: u64,
    /// Decoded bytes lost to full inbound queues
    pub inbound_dropped: u64,
    /// Logical bytes lost to a full outbound queue
    pub outbound_dropped: u64,
}

pub struct SerialMux {
    name: String,
    link: Box<dyn SerialLink>,
    decoder: MuxDecoder,
    inbound: Vec<HeapRb<u8>>,
    outbound: HeapRb<u8>,
    inbound_dropped: u64,
    outbound_dropped: u64,
}

impl SerialMux {
    pub fn new(name: impl Into<String>, link: Box<dyn SerialLink>) -> Self {
        Self {
            name: name.into(),
            link,
            decoder: MuxDecoder::new(),
            inbound: (0..MUX_PORTS).map(|_| HeapRb::new(MUX_QUEUE_SIZE)).collect(),
            outbound: HeapRb::new(MUX_OUTBOUND_SIZE),
            inbound_dropped: 0,
            outbound_dropped: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Speed the physical link must run at
    pub fn baud_rate(&self) -> u32 {
        MUX_BAUD_RATE
    }

    /// Decode everything the link has received
    pub fn dispatch_inbound(&mut self) {
        for _ in 0..self.link.available() {
            let Some(encoded) = self.link.read() else {
                break;
            };
            let Some((address, byte)) = self.decoder.decode(encoded) else {
                continue;
            };
            if self.inbound[address as usize].try_push(byte).is_err() {
                self.inbound_dropped += 1;
                trace!("{} port {} inbound full", self.name, address);
            }
        }
    }

    /// Hand queued wire bytes to the link while it takes them
    pub fn flush_outbound(&mut self) {
        while self.link.available_for_write() > 0 {
            let Some(encoded) = self.outbound.try_pop() else {
                break;
            };
            self.link.write(encoded);
        }
    }

    pub fn dispatch(&mut self) {
        self.dispatch_inbound();
        self.flush_outbound();
    }

    pub fn available(&self, address: u8) -> usize {
        self.inbound
            .get(address as usize)
            .map_or(0, |q| q.occupied_len())
    }

    pub fn read(&mut self, address: u8) -> Option<u8> {
        self.inbound.get_mut(address as usize)?.try_pop()
    }

    /// Logical bytes port `address` can take: half the free wire space
    pub fn available_for_write(&self, address: u8) -> usize {
        if address as usize >= MUX_PORTS {
            return 0;
        }
        self.outbound.vacant_len() / 2
    }

    pub fn write(&mut self, address: u8, byte: u8) {
        if self.available_for_write(address) == 0 {
            self.outbound_dropped += 1;
            return;
        }
        for encoded in encode(address, byte) {
            let _ = self.outbound.try_push(encoded);
        }
    }

    pub fn stats(&self) -> MuxStats {
        MuxStats {
            malformed: self.decoder.malformed(),
            inbound_dropped: self.inbound_dropped,
            outbound_dropped: self.outbound_dropped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ByteSink, MemoryLink};
    use proptest::prelude::*;

    #[test]
    fn test_encode_layout() {
        assert_eq!(encode(0, 0x90), [0x89, 0x00]);
        assert_eq!(encode(3, 0x3C), [0xB3, 0x3C]);
        assert_eq!(encode(7, 0xFF), [0xFF, 0x7F]);
    }

    #[test]
    fn test_interleaved_ports() {
        let mut d = MuxDecoder::new();
        let a = encode(1, 0x90);
        let b = encode(2, 0xF8);
        assert_eq!(d.decode(a[0]), None);
        assert_eq!(d.decode(b[0]), None);
        assert_eq!(d.decode(a[1]), Some((1, 0x90)));
        assert_eq!(d.decode(b[1]), Some((2, 0xF8)));
        assert_eq!(d.malformed(), 0);
    }

    #[test]
    fn test_malformed_frames() {
        let mut d = MuxDecoder::new();
        // Lower half with nothing pending
        assert_eq!(d.decode(0x05), None);
        assert_eq!(d.malformed(), 1);
        // Second upper half replaces the first
        d.decode(0x81);
        d.decode(0x82);
        assert_eq!(d.malformed(), 2);
        assert_eq!(d.decode(0x03), Some((0, 0x23)));
    }

    #[test]
    fn test_capacity_is_half_of_free_space() {
        let link = MemoryLink::new();
        let mut mux = SerialMux::new("m", Box::new(link));
        assert_eq!(mux.available_for_write(0), MUX_OUTBOUND_SIZE / 2);
        mux.write(0, 0x90);
        assert_eq!(mux.available_for_write(5), MUX_OUTBOUND_SIZE / 2 - 1);
        assert_eq!(mux.available_for_write(8), 0);
        assert_eq!(mux.baud_rate(), 500_000);
    }

    #[test]
    fn test_outbound_waits_for_link() {
        let link = MemoryLink::new();
        link.set_tx_capacity(3);
        let mut mux = SerialMux::new("m", Box::new(link.clone()));
        mux.write(0, 0x90);
        mux.write(0, 0x3C);
        mux.flush_outbound();
        assert_eq!(link.take_sent(), vec![0x89, 0x00, 0x83]);
        mux.flush_outbound();
        assert_eq!(link.take_sent(), vec![0x0C]);
    }

    #[test]
    fn test_inbound_queue_drops_newest() {
        let link = MemoryLink::new();
        let mut mux = SerialMux::new("m", Box::new(link.clone()));
        for i in 0..(MUX_QUEUE_SIZE as u8 + 2) {
            link.inject(&encode(4, i));
        }
        mux.dispatch_inbound();
        assert_eq!(mux.available(4), MUX_QUEUE_SIZE);
        assert_eq!(mux.stats().inbound_dropped, 2);
        assert_eq!(mux.read(4), Some(0));
    }

    #[test]
    fn test_two_endpoints_over_one_cable() {
        let (a, b) = MemoryLink::pair();
        let mut left = SerialMux::new("left", Box::new(a));
        let mut right = SerialMux::new("right", Box::new(b));

        for byte in [0x90, 60, 100] {
            left.write(6, byte);
        }
        left.write(1, 0xF8);
        left.dispatch();
        right.dispatch();

        let port6: Vec<u8> = std::iter::from_fn(|| right.read(6)).collect();
        assert_eq!(port6, vec![0x90, 60, 100]);
        assert_eq!(right.read(1), Some(0xF8));
        assert_eq!(right.available(0), 0);
    }

    proptest! {
        #[test]
        fn prop_round_trip(address in 0u8..8, byte in any::<u8>()) {
            let mut d = MuxDecoder::new();
            let [hi, lo] = encode(address, byte);
            prop_assert_eq!(hi & HALF, HALF);
            prop_assert_eq!(lo & HALF, 0);
            prop_assert_eq!(d.decode(hi), None);
            prop_assert_eq!(d.decode(lo), Some((address, byte)));
        }
    }

    #[test]
    fn test_link_sink_untouched_until_flush() {
        let link = MemoryLink::new();
        let mut mux = SerialMux::new("m", Box::new(link.clone()));
        mux.write(2, 0x11);
        assert_eq!(link.available_for_write(), crate::transport::memory::DEFAULT_TX_CAPACITY);
    }
}
