//! In-memory byte link
//!
//! Used to simulate hardware links: tests push bytes into the receive side
//! and inspect what the router transmitted. Two ends created with
//! [`MemoryLink::pair`] are cross-connected like a null-modem cable, which
//! is how two multiplexer endpoints are wired together.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use super::{ByteSink, ByteSource};

/// Default transmit capacity per poll (roughly a UART FIFO)
pub const DEFAULT_TX_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct Pipe {
    bytes: VecDeque<u8>,
}

/// One end of an in-memory link
#[derive(Debug, Clone)]
pub struct MemoryLink {
    rx: Arc<Mutex<Pipe>>,
    tx: Arc<Mutex<Pipe>>,
    tx_capacity: Arc<Mutex<usize>>,
}

impl MemoryLink {
    /// Link whose transmitted bytes are kept for inspection
    pub fn new() -> Self {
        Self {
            rx: Arc::new(Mutex::new(Pipe::default())),
            tx: Arc::new(Mutex::new(Pipe::default())),
            tx_capacity: Arc::new(Mutex::new(DEFAULT_TX_CAPACITY)),
        }
    }

    /// Two cross-connected ends: what one writes, the other reads
    pub fn pair() -> (Self, Self) {
        let a = Self::new();
        let b = Self {
            rx: a.tx.clone(),
            tx: a.rx.clone(),
            tx_capacity: Arc::new(Mutex::new(DEFAULT_TX_CAPACITY)),
        };
        (a, b)
    }

    /// Queue bytes as if they had been received from the wire
    pub fn inject(&self, bytes: &[u8]) {
        self.rx.lock().bytes.extend(bytes.iter().copied());
    }

    /// Take everything transmitted so far
    pub fn take_sent(&self) -> Vec<u8> {
        self.tx.lock().bytes.drain(..).collect()
    }

    /// Limit how many bytes can be pending on the transmit side
    pub fn set_tx_capacity(&self, capacity: usize) {
        *self.tx_capacity.lock() = capacity;
    }
}

impl Default for MemoryLink {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteSource for MemoryLink {
    fn available(&self) -> usize {
        self.rx.lock().bytes.len()
    }

    fn read(&mut self) -> Option<u8> {
        self.rx.lock().bytes.pop_front()
    }
}

impl ByteSink for MemoryLink {
    fn available_for_write(&self) -> usize {
        let pending = self.tx.lock().bytes.len();
        self.tx_capacity.lock().saturating_sub(pending)
    }

    fn write(&mut self, byte: u8) {
        self.tx.lock().bytes.push_back(byte);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_and_read() {
        let mut link = MemoryLink::new();
        let handle = link.clone();
        handle.inject(&[1, 2, 3]);
        assert_eq!(link.available(), 3);
        assert_eq!(link.read(), Some(1));
        assert_eq!(link.available(), 2);
    }

    #[test]
    fn test_tx_capacity_counts_pending_bytes() {
        let mut link = MemoryLink::new();
        link.set_tx_capacity(2);
        link.write(0x90);
        assert_eq!(link.available_for_write(), 1);
        link.write(0x3C);
        assert_eq!(link.available_for_write(), 0);
        assert_eq!(link.take_sent(), vec![0x90, 0x3C]);
        assert_eq!(link.available_for_write(), 2);
    }

    #[test]
    fn test_pair_is_cross_connected() {
        let (mut a, mut b) = MemoryLink::pair();
        a.write(0xAA);
        assert_eq!(b.read(), Some(0xAA));
        b.write(0x55);
        assert_eq!(a.read(), Some(0x55));
    }
}
