//! Error types for port registration and route management.
//!
//! Nothing here is fatal to the poll cycle: these are returned to whoever
//! is reconfiguring the router (configuration loader, tests, a UI).

use thiserror::Error;

use crate::port::PortId;
use crate::route::RouteId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("unknown port {0}")]
    UnknownPort(PortId),

    #[error("unknown route {0}")]
    UnknownRoute(RouteId),

    #[error("port '{0}' cannot be used as an input")]
    NotAnInput(String),

    #[error("port '{0}' cannot be used as an output")]
    NotAnOutput(String),

    #[error("port '{0}' has no free route slot")]
    InputFull(String),

    #[error("route table is full ({0} routes)")]
    TableFull(usize),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortError {
    #[error("a port named '{0}' already exists")]
    DuplicateName(String),

    #[error("unknown mux #{0}")]
    UnknownMux(usize),

    #[error("mux address {0} is out of range (0-7)")]
    InvalidMuxAddress(u8),

    #[error("mux address {address} is already bound to port '{port}'")]
    MuxAddressInUse { address: u8, port: String },

    #[error("too many gate pins ({0}, max {max})", max = crate::port::gpio::MAX_GATE_PINS)]
    TooManyGatePins(usize),
}

pub type RouteResult<T> = std::result::Result<T, RouteError>;
