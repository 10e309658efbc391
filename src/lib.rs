//! midibox - MIDI routing engine
//!
//! Connects serial MIDI links, multiplexed links, loopbacks, a polyphonic
//! channel mapper, SysEx file players and recorders and GPIO gates through
//! filtered, processed routes. Every output is arbitrated so messages from
//! different routes never interleave.

pub mod config;
pub mod error;
pub mod mapper;
pub mod midi;
pub mod mux;
pub mod port;
pub mod route;
pub mod router;
pub mod tracker;
pub mod transport;

pub use config::AppConfig;
pub use error::{PortError, RouteError};
pub use port::{PortId, WriterId};
pub use route::{MidiFilter, RouteId, VelocityZero};
pub use router::{Router, RouterStats};
