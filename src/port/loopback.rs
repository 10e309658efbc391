//! Loopback port: whatever is written to it can be read back
//!
//! Used to merge several inputs into one stream and split it again.

use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::HeapRb;

pub const LOOPBACK_SIZE: usize = 128;

pub struct Loopback {
    fifo: HeapRb<u8>,
    dropped: u64,
}

impl Loopback {
    pub fn new() -> Self {
        Self::with_capacity(LOOPBACK_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fifo: HeapRb::new(capacity.max(1)),
            dropped: 0,
        }
    }

    pub fn available(&self) -> usize {
        self.fifo.occupied_len()
    }

    pub fn read(&mut self) -> Option<u8> {
        self.fifo.try_pop()
    }

    pub fn available_for_write(&self) -> usize {
        self.fifo.vacant_len()
    }

    pub fn write(&mut self, byte: u8) {
        if self.fifo.try_push(byte).is_err() {
            self.dropped += 1;
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for Loopback {
    fn default() -> Self {
        Self::new()
    }
}
