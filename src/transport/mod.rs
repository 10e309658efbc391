//! Byte transport capabilities consumed by the core
//!
//! Hardware serial ports, USB endpoints and host MIDI ports all look the
//! same to the router: a byte source with an `available` counter and a
//! byte sink with a free-space counter.

pub mod memory;
pub mod midir_link;

pub use memory::MemoryLink;
pub use midir_link::MidirLink;

/// Something bytes can be read from
pub trait ByteSource {
    /// Bytes ready to be read right now
    fn available(&self) -> usize;

    /// Next byte, `None` when nothing is available
    fn read(&mut self) -> Option<u8>;
}

/// Something bytes can be written to
pub trait ByteSink {
    /// Bytes that can be written right now without blocking
    fn available_for_write(&self) -> usize;

    /// Write one byte. Only valid when `available_for_write() > 0`.
    fn write(&mut self, byte: u8);
}

/// A bidirectional byte link (serial port, host MIDI port pair, ...)
pub trait SerialLink: ByteSource + ByteSink {}

impl<T: ByteSource + ByteSink> SerialLink for T {}
