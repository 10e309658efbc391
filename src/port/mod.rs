//! Ports: everything a route can read from or write to
//!
//! The set of port kinds is closed. External hardware is reached through
//! the [`SerialLink`], [`FileHandle`] and [`GpioPins`] traits, mux ports
//! through their [`SerialMux`] in the router's mux arena.

pub mod arbiter;
pub mod gpio;
pub mod loopback;
pub mod sysex;

pub use arbiter::{Access, Arbiter, RESERVATION_TIMEOUT_MS};
pub use gpio::{GateMapping, GpioGate, GpioPins, PinMode, TracingPins, MAX_GATE_PINS};
pub use loopback::{Loopback, LOOPBACK_SIZE};
pub use sysex::{FileHandle, FsFile, MemoryFile, SysExPlayer, SysExRecorder};

use serde::Serialize;
use std::fmt;

use crate::mapper::PolyMapper;
use crate::midi::SYSEX_STOP;
use crate::mux::{MuxId, SerialMux};
use crate::route::RouteId;
use crate::tracker::{MessageTracker, Tracked};
use crate::transport::SerialLink;

/// Routes one input can own
pub const ROUTES_PER_INPUT: usize = 8;

/// Capacity reported by outputs that never push back
pub const UNBOUNDED_CAPACITY: usize = u16::MAX as usize;

/// Stable handle of a port in the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PortId(pub(crate) usize);

impl PortId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port#{}", self.0)
    }
}

/// Identity presented to an output's arbiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct WriterId(pub usize);

impl WriterId {
    /// Writer used by code driving an output directly, outside any route
    pub const HOST: WriterId = WriterId(usize::MAX);
}

impl From<RouteId> for WriterId {
    fn from(id: RouteId) -> Self {
        WriterId(id.index())
    }
}

impl fmt::Display for WriterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::HOST {
            write!(f, "host")
        } else {
            write!(f, "writer#{}", self.0)
        }
    }
}

/// Destination of a route's buffered bytes
pub trait OutputSink {
    /// Bytes `writer` may write now, 0 while another writer holds the output
    fn available_for_write(&self, writer: WriterId) -> usize;
    /// Write one byte on behalf of `writer`; false if it was refused
    fn write(&mut self, byte: u8, writer: WriterId) -> bool;
}

pub enum PortKind {
    Serial(Box<dyn SerialLink>),
    Loopback(Loopback),
    Mux { mux: MuxId, address: u8 },
    Mapper(PolyMapper),
    SysExPlayer(SysExPlayer),
    SysExRecorder(SysExRecorder),
    Gate(GpioGate),
}

impl PortKind {
    pub fn label(&self) -> &'static str {
        match self {
            PortKind::Serial(_) => "serial",
            PortKind::Loopback(_) => "loopback",
            PortKind::Mux { .. } => "mux",
            PortKind::Mapper(_) => "mapper",
            PortKind::SysExPlayer(_) => "sysex_player",
            PortKind::SysExRecorder(_) => "sysex_recorder",
            PortKind::Gate(_) => "gate",
        }
    }

    pub fn is_input(&self) -> bool {
        !matches!(self, PortKind::SysExRecorder(_) | PortKind::Gate(_))
    }

    pub fn is_output(&self) -> bool {
        !matches!(self, PortKind::SysExPlayer(_))
    }
}

pub struct Port {
    name: String,
    kind: PortKind,
    arbiter: Arbiter,
    routes: [Option<RouteId>; ROUTES_PER_INPUT],
}

impl Port {
    pub(crate) fn new(name: impl Into<String>, kind: PortKind) -> Self {
        Self {
            name: name.into(),
            kind,
            arbiter: Arbiter::new(),
            routes: [None; ROUTES_PER_INPUT],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &PortKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut PortKind {
        &mut self.kind
    }

    pub fn is_input(&self) -> bool {
        self.kind.is_input()
    }

    pub fn is_output(&self) -> bool {
        self.kind.is_output()
    }

    pub fn arbiter(&self) -> &Arbiter {
        &self.arbiter
    }

    /// Routes owned by this input, in slot order
    pub fn routes(&self) -> impl Iterator<Item = RouteId> + '_ {
        self.routes.iter().flatten().copied()
    }

    pub(crate) fn route_slots(&self) -> [Option<RouteId>; ROUTES_PER_INPUT] {
        self.routes
    }

    /// Record `id` in the first free local slot
    pub(crate) fn attach_route(&mut self, id: RouteId) -> bool {
        match self.routes.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(id);
                true
            }
            None => false,
        }
    }

    pub(crate) fn has_free_route_slot(&self) -> bool {
        self.routes.iter().any(Option::is_none)
    }

    pub(crate) fn detach_route(&mut self, id: RouteId) {
        for slot in self.routes.iter_mut().filter(|slot| **slot == Some(id)) {
            *slot = None;
        }
    }

    /// Bytes the input side can deliver now
    pub(crate) fn available(&self, muxes: &[SerialMux]) -> usize {
        match &self.kind {
            PortKind::Serial(link) => link.available(),
            PortKind::Loopback(lb) => lb.available(),
            PortKind::Mux { mux, address } => muxes
                .get(mux.index())
                .map_or(0, |m| m.available(*address)),
            PortKind::Mapper(mapper) => mapper.available(),
            PortKind::SysExPlayer(player) => player.available(),
            PortKind::SysExRecorder(_) | PortKind::Gate(_) => 0,
        }
    }

    pub(crate) fn read(&mut self, muxes: &mut [SerialMux]) -> Option<u8> {
        match &mut self.kind {
            PortKind::Serial(link) => link.read(),
            PortKind::Loopback(lb) => lb.read(),
            PortKind::Mux { mux, address } => muxes.get_mut(mux.index())?.read(*address),
            PortKind::Mapper(mapper) => mapper.read(),
            PortKind::SysExPlayer(player) => player.read(),
            PortKind::SysExRecorder(_) | PortKind::Gate(_) => None,
        }
    }

    /// Capacity of the concrete destination, ignoring arbitration
    pub(crate) fn sink_capacity(&self, muxes: &[SerialMux]) -> usize {
        match &self.kind {
            PortKind::Serial(link) => link.available_for_write(),
            PortKind::Loopback(lb) => lb.available_for_write(),
            PortKind::Mux { mux, address } => muxes
                .get(mux.index())
                .map_or(0, |m| m.available_for_write(*address)),
            PortKind::Mapper(mapper) => mapper.available_for_write(),
            PortKind::SysExRecorder(_) | PortKind::Gate(_) => UNBOUNDED_CAPACITY,
            PortKind::SysExPlayer(_) => 0,
        }
    }

    /// Write through the arbiter; false if another writer holds the output
    pub(crate) fn write(
        &mut self,
        byte: u8,
        writer: WriterId,
        now_ms: u64,
        muxes: &mut [SerialMux],
    ) -> bool {
        match self.arbiter.acquire(byte, writer, now_ms) {
            Access::Refused => return false,
            Access::Discard => return true,
            Access::Write { close_sysex: true } => self.send(SYSEX_STOP, muxes),
            Access::Write { close_sysex: false } => {}
        }
        self.send(byte, muxes);
        self.arbiter.end_write();
        true
    }

    /// Drop whatever reservation `writer` holds, closing an open SysEx
    pub(crate) fn release_writer(&mut self, writer: WriterId, muxes: &mut [SerialMux]) {
        if self.arbiter.release(writer) {
            self.send(SYSEX_STOP, muxes);
        }
    }

    fn send(&mut self, byte: u8, muxes: &mut [SerialMux]) {
        let tracked = self.arbiter.track(byte);
        Self::deliver(&mut self.kind, byte, tracked, self.arbiter.tracker(), muxes);
    }

    fn deliver(
        kind: &mut PortKind,
        byte: u8,
        tracked: Tracked,
        tracker: &MessageTracker,
        muxes: &mut [SerialMux],
    ) {
        match kind {
            PortKind::Serial(link) => link.write(byte),
            PortKind::Loopback(lb) => lb.write(byte),
            PortKind::Mux { mux, address } => {
                if let Some(m) = muxes.get_mut(mux.index()) {
                    m.write(*address, byte);
                }
            }
            PortKind::Mapper(mapper) => mapper.write(byte, tracked, tracker),
            PortKind::SysExRecorder(recorder) => recorder.write(byte, tracked),
            PortKind::Gate(gate) => gate.write(tracked, tracker),
            PortKind::SysExPlayer(_) => {}
        }
    }
}

/// Borrowed view of one output, bound to the current tick
pub struct OutputHandle<'a> {
    port: &'a mut Port,
    muxes: &'a mut [SerialMux],
    now_ms: u64,
}

impl<'a> OutputHandle<'a> {
    pub(crate) fn new(port: &'a mut Port, muxes: &'a mut [SerialMux], now_ms: u64) -> Self {
        Self {
            port,
            muxes,
            now_ms,
        }
    }

    /// Write a whole buffer as `writer`, returning how many bytes went out
    pub fn write_all(&mut self, bytes: &[u8], writer: WriterId) -> usize {
        bytes
            .iter()
            .take_while(|&&b| self.available_for_write(writer) > 0 && self.write(b, writer))
            .count()
    }

    pub fn last_sent_message(&self) -> u8 {
        self.port.arbiter.last_sent_message()
    }

    pub fn message_complete(&self) -> bool {
        self.port.arbiter.message_complete()
    }
}

impl OutputSink for OutputHandle<'_> {
    fn available_for_write(&self, writer: WriterId) -> usize {
        if !self.port.is_output() || !self.port.arbiter.may_write(writer, self.now_ms) {
            return 0;
        }
        self.port.sink_capacity(self.muxes)
    }

    fn write(&mut self, byte: u8, writer: WriterId) -> bool {
        self.port.is_output() && self.port.write(byte, writer, self.now_ms, self.muxes)
    }
}

/// Snapshot of an output's arbitration state
#[derive(Debug, Clone, Serialize)]
pub struct OutputStatus {
    pub port: PortId,
    pub name: String,
    pub holder: Option<WriterId>,
    pub last_sent_message: u8,
    pub message_complete: bool,
    pub forced_releases: u64,
}

/// Row of the port listing
#[derive(Debug, Clone, Serialize)]
pub struct PortInfo {
    pub id: PortId,
    pub name: String,
    pub kind: &'static str,
    pub input: bool,
    pub output: bool,
    pub routes: Vec<RouteId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryLink;

    fn serial_port() -> (Port, MemoryLink) {
        let link = MemoryLink::new();
        (Port::new("a", PortKind::Serial(Box::new(link.clone()))), link)
    }

    #[test]
    fn test_route_slots() {
        let (mut port, _) = serial_port();
        for i in 0..ROUTES_PER_INPUT {
            assert!(port.attach_route(RouteId(i)));
        }
        assert!(!port.has_free_route_slot());
        assert!(!port.attach_route(RouteId(99)));
        port.detach_route(RouteId(3));
        assert!(port.has_free_route_slot());
        assert_eq!(port.routes().count(), ROUTES_PER_INPUT - 1);
        assert!(port.attach_route(RouteId(42)));
        assert_eq!(port.route_slots()[3], Some(RouteId(42)));
    }

    #[test]
    fn test_handle_refuses_second_writer_mid_message() {
        let (mut port, link) = serial_port();
        let a = WriterId(0);
        let b = WriterId(1);
        let mut muxes = Vec::new();
        let mut out = OutputHandle::new(&mut port, &mut muxes, 0);
        assert!(out.write(0x90, a));
        assert_eq!(out.available_for_write(b), 0);
        assert!(!out.write(0x80, b));
        assert_eq!(out.write_all(&[60, 100], a), 2);
        assert!(out.message_complete());
        assert_eq!(out.last_sent_message(), 0x90);
        assert!(out.available_for_write(b) > 0);
        assert_eq!(link.take_sent(), vec![0x90, 60, 100]);
    }

    #[test]
    fn test_release_writer_closes_open_sysex() {
        let (mut port, link) = serial_port();
        let a = WriterId(0);
        let mut muxes: Vec<SerialMux> = Vec::new();
        assert!(port.write(0xF0, a, 0, &mut muxes));
        assert!(port.write(0x01, a, 0, &mut muxes));
        port.release_writer(a, &mut muxes);
        assert_eq!(port.arbiter().holder(0), None);
        assert!(port.write(0x90, WriterId(1), 1, &mut muxes));
        assert_eq!(link.take_sent(), vec![0xF0, 0x01, 0xF7, 0x90]);
    }

    #[test]
    fn test_kinds() {
        let player = PortKind::SysExPlayer(SysExPlayer::new());
        assert!(player.is_input() && !player.is_output());
        let recorder = PortKind::SysExRecorder(SysExRecorder::new());
        assert!(!recorder.is_input() && recorder.is_output());
        assert_eq!(recorder.label(), "sysex_recorder");
    }

    #[test]
    fn test_writer_display() {
        assert_eq!(WriterId::from(RouteId(4)).to_string(), "writer#4");
        assert_eq!(WriterId::HOST.to_string(), "host");
        assert_eq!(PortId(2).to_string(), "port#2");
    }
}
