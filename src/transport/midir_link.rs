//! Host MIDI ports as a serial link
//!
//! midir delivers whole messages on its own callback thread and only sends
//! whole messages. Incoming bytes cross over through a bounded channel;
//! outgoing bytes are reassembled with a [`MessageTracker`] and sent once
//! a message is complete.

use anyhow::{anyhow, Context, Result};
use crossbeam::channel::{bounded, Receiver};
use midir::{Ignore, MidiIO, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::{ByteSink, ByteSource};
use crate::midi::{describe, SYSEX_STOP};
use crate::tracker::{MessageTracker, Tracked};

/// Received bytes buffered between two polls
const RX_QUEUE_SIZE: usize = 4096;

/// Bytes accepted per poll; midir sends synchronously
const TX_CAPACITY: usize = 256;

/// Longest SysEx assembled; longer ones are dropped whole
const MAX_SYSEX_LEN: usize = 64 * 1024;

const CLIENT_NAME: &str = "midibox";

/// First port whose name contains `pattern` (case-insensitive)
pub fn find_port<T: MidiIO>(io: &T, pattern: &str) -> Option<T::Port> {
    let pattern = pattern.to_lowercase();
    io.ports().into_iter().find(|port| {
        io.port_name(port)
            .map(|name| name.to_lowercase().contains(&pattern))
            .unwrap_or(false)
    })
}

fn port_names<T: MidiIO>(io: &T) -> Vec<String> {
    io.ports()
        .iter()
        .filter_map(|port| io.port_name(port).ok())
        .collect()
}

/// Names of the host's MIDI input and output ports
pub fn list_ports() -> Result<(Vec<String>, Vec<String>)> {
    let inputs = MidiInput::new(CLIENT_NAME).context("Failed to create MIDI input client")?;
    let outputs = MidiOutput::new(CLIENT_NAME).context("Failed to create MIDI output client")?;
    Ok((port_names(&inputs), port_names(&outputs)))
}

pub struct MidirLink {
    name: String,
    rx: Receiver<u8>,
    rx_dropped: Arc<AtomicU64>,
    _input: Option<MidiInputConnection<()>>,
    output: Option<MidiOutputConnection>,
    assembler: FrameAssembler,
}

/// Turns the byte stream written to a link back into whole messages
#[derive(Debug, Default)]
struct FrameAssembler {
    tracker: MessageTracker,
    frame: Vec<u8>,
    realtime: [u8; 1],
    /// The last frame was handed out and must be cleared before reuse
    complete: bool,
    /// The SysEx being assembled outgrew [`MAX_SYSEX_LEN`]
    overlong: bool,
    oversized: u64,
}

impl FrameAssembler {
    /// Feed one byte; returns the message it completes, if any
    fn push(&mut self, byte: u8) -> Option<&[u8]> {
        if self.complete {
            self.frame.clear();
            self.complete = false;
        }

        let in_sysex = self.tracker.is_streaming();
        match self.tracker.track(byte) {
            Tracked::Realtime => {
                self.realtime = [byte];
                return Some(&self.realtime);
            }
            Tracked::Discarded => return None,
            Tracked::Status if in_sysex && byte == SYSEX_STOP => {}
            Tracked::Status => {
                self.frame.clear();
                self.overlong = false;
            }
            Tracked::Data { running: true } => {
                self.frame.clear();
                self.frame.push(self.tracker.status());
            }
            Tracked::Data { running: false } => {}
        }

        if self.tracker.is_streaming() && self.frame.len() >= MAX_SYSEX_LEN {
            self.overlong = true;
            return None;
        }
        self.frame.push(byte);

        if !self.tracker.message_complete() {
            return None;
        }
        self.complete = true;
        if std::mem::take(&mut self.overlong) {
            self.oversized += 1;
            warn!("SysEx longer than {} bytes dropped", MAX_SYSEX_LEN);
            return None;
        }
        // A terminator with no start is dropped
        if self.frame.first() == Some(&SYSEX_STOP) {
            return None;
        }
        Some(&self.frame)
    }
}

impl MidirLink {
    /// Connect to the first input and output ports matching the patterns;
    /// either side may be left out
    pub fn open(name: &str, input: Option<&str>, output: Option<&str>) -> Result<Self> {
        let (tx, rx) = bounded(RX_QUEUE_SIZE);
        let rx_dropped = Arc::new(AtomicU64::new(0));

        let input = match input {
            Some(pattern) => {
                let mut midi_in =
                    MidiInput::new(CLIENT_NAME).context("Failed to create MIDI input client")?;
                midi_in.ignore(Ignore::None);
                let port = find_port(&midi_in, pattern)
                    .ok_or_else(|| anyhow!("Input port '{}' not found", pattern))?;
                let dropped = rx_dropped.clone();
                let conn = midi_in
                    .connect(
                        &port,
                        &format!("{}-{}-in", CLIENT_NAME, name),
                        move |_timestamp, data, _| {
                            for &byte in data {
                                if tx.try_send(byte).is_err() {
                                    dropped.fetch_add(1, Ordering::Relaxed);
                                }
                            }
                        },
                        (),
                    )
                    .map_err(|e| anyhow!("Failed to connect input '{}': {}", pattern, e))?;
                debug!("{}: input '{}' opened", name, pattern);
                Some(conn)
            }
            None => None,
        };

        let output = match output {
            Some(pattern) => {
                let midi_out =
                    MidiOutput::new(CLIENT_NAME).context("Failed to create MIDI output client")?;
                let port = find_port(&midi_out, pattern)
                    .ok_or_else(|| anyhow!("Output port '{}' not found", pattern))?;
                let conn = midi_out
                    .connect(&port, &format!("{}-{}-out", CLIENT_NAME, name))
                    .map_err(|e| anyhow!("Failed to connect output '{}': {}", pattern, e))?;
                debug!("{}: output '{}' opened", name, pattern);
                Some(conn)
            }
            None => None,
        };

        Ok(Self {
            name: name.to_string(),
            rx,
            rx_dropped,
            _input: input,
            output,
            assembler: FrameAssembler::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes lost because the core did not poll fast enough
    pub fn rx_dropped(&self) -> u64 {
        self.rx_dropped.load(Ordering::Relaxed)
    }

    /// SysEx messages dropped for being longer than the link accepts
    pub fn oversized(&self) -> u64 {
        self.assembler.oversized
    }
}

fn send(name: &str, output: Option<&mut MidiOutputConnection>, message: &[u8]) {
    let Some(conn) = output else {
        return;
    };
    trace!("{} TX {}", name, describe(message));
    if let Err(e) = conn.send(message) {
        warn!("{}: send failed: {}", name, e);
    }
}

impl ByteSource for MidirLink {
    fn available(&self) -> usize {
        self.rx.len()
    }

    fn read(&mut self) -> Option<u8> {
        self.rx.try_recv().ok()
    }
}

impl ByteSink for MidirLink {
    fn available_for_write(&self) -> usize {
        if self.output.is_some() {
            TX_CAPACITY
        } else {
            0
        }
    }

    fn write(&mut self, byte: u8) {
        if let Some(message) = self.assembler.push(byte) {
            send(&self.name, self.output.as_mut(), message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(assembler: &mut FrameAssembler, bytes: &[u8]) -> Vec<Vec<u8>> {
        bytes
            .iter()
            .filter_map(|&b| assembler.push(b).map(<[u8]>::to_vec))
            .collect()
    }

    #[test]
    fn test_messages_are_sent_whole() {
        let mut a = FrameAssembler::default();
        let sent = feed(&mut a, &[0x90, 60, 0xF8, 100, 62, 90, 0xC1, 5]);
        assert_eq!(
            sent,
            vec![vec![0xF8], vec![0x90, 60, 100], vec![0x90, 62, 90], vec![0xC1, 5]]
        );
    }

    #[test]
    fn test_sysex_and_stray_terminator() {
        let mut a = FrameAssembler::default();
        assert_eq!(feed(&mut a, &[0xF7]), Vec::<Vec<u8>>::new());
        assert_eq!(feed(&mut a, &[0xF0, 0x7E, 0x01, 0xF7]), vec![vec![0xF0, 0x7E, 0x01, 0xF7]]);
    }

    #[test]
    fn test_oversized_sysex_is_dropped() {
        let mut a = FrameAssembler::default();
        let mut sysex = vec![0xF0];
        sysex.resize(MAX_SYSEX_LEN + 10, 0x01);
        sysex.push(0xF7);
        assert!(feed(&mut a, &sysex).is_empty());
        assert_eq!(a.oversized, 1);

        assert_eq!(feed(&mut a, &[0x80, 60, 0]), vec![vec![0x80, 60, 0]]);
        assert_eq!(feed(&mut a, &[0xF0, 0x01, 0xF7]), vec![vec![0xF0, 0x01, 0xF7]]);
        assert_eq!(a.oversized, 1);
    }
}
