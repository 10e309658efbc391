//! Router - the context every poll runs against
//!
//! Owns the three arenas:
//! - ports (inputs and outputs, addressed by [`PortId`])
//! - multiplexers (addressed by [`MuxId`](crate::mux::MuxId))
//! - the global route table (addressed by [`RouteId`])
//!
//! Port registration lives in `ports.rs`, route management in `routes.rs`.

mod ports;
mod routes;


use serde::Serialize;
use std::collections::BTreeMap;
use tracing::trace;

use crate::mapper::MapperStats;
use crate::mux::{MuxStats, SerialMux};
use crate::port::{OutputHandle, Port, PortId, PortKind};
use crate::route::{Route, RouteId, RouteStats, RouteTable, MAX_EXPANSION};

/// Everything the router knows about, wired together
pub struct Router {
    pub(crate) ports: Vec<Port>,
    pub(crate) muxes: Vec<SerialMux>,
    pub(crate) routes: RouteTable,
}

/// One row of [`RouterStats::routes`]
#[derive(Debug, Clone, Serialize)]
pub struct RouteSummary {
    pub id: RouteId,
    pub from: String,
    pub to: String,
    pub buffered: usize,
    pub stats: RouteStats,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RouterStats {
    pub routes: Vec<RouteSummary>,
    pub muxes: BTreeMap<String, MuxStats>,
    pub mappers: BTreeMap<String, MapperStats>,
    /// Reservations taken from stalled writers, per output
    pub forced_releases: BTreeMap<String, u64>,
}

impl Router {
    pub fn new() -> Self {
        Self::with_route_capacity(crate::route::ROUTE_TABLE_SIZE)
    }

    pub fn with_route_capacity(capacity: usize) -> Self {
        Self {
            ports: Vec::new(),
            muxes: Vec::new(),
            routes: RouteTable::with_capacity(capacity),
        }
    }

    /// One full cycle: decode mux links, route every input, write every
    /// route, flush mux links
    pub fn poll(&mut self, now_ms: u64) {
        for mux in self.muxes.iter_mut() {
            mux.dispatch_inbound();
        }
        for index in 0..self.ports.len() {
            self.route_input(PortId(index));
        }
        self.route_all(now_ms);
        for mux in self.muxes.iter_mut() {
            mux.flush_outbound();
        }
    }

    /// Move bytes from one input into all of its routes
    ///
    /// Stops reading while any of its routes has less room than one input
    /// byte can expand to. An input without routes is drained and its bytes
    /// discarded, except for a SysEx player, whose file stays where it is.
    /// Returns the bytes routed.
    pub fn route_input(&mut self, input: PortId) -> usize {
        let Some(port) = self.ports.get_mut(input.0) else {
            return 0;
        };
        if !port.is_input() {
            return 0;
        }

        let slots = port.route_slots();
        if slots.iter().all(Option::is_none) {
            if !matches!(port.kind(), PortKind::SysExPlayer(_)) {
                let stale = port.available(&self.muxes);
                for _ in 0..stale {
                    if port.read(&mut self.muxes).is_none() {
                        break;
                    }
                }
                if stale > 0 {
                    trace!("{}: discarded {} unrouted bytes", port.name(), stale);
                }
            }
            return 0;
        }

        let budget = port.available(&self.muxes);
        let mut routed = 0;
        while routed < budget {
            let space = slots
                .iter()
                .flatten()
                .filter_map(|id| self.routes.get(*id))
                .map(Route::available_for_write)
                .min()
                .unwrap_or(0);
            if space < MAX_EXPANSION {
                break;
            }
            let Some(byte) = port.read(&mut self.muxes) else {
                break;
            };
            for id in slots.iter().flatten() {
                if let Some(route) = self.routes.get_mut(*id) {
                    route.route(byte);
                }
            }
            routed += 1;
        }
        routed
    }

    /// Let every route write what its output will take
    pub fn route_all(&mut self, now_ms: u64) -> usize {
        let mut written = 0;
        for (_, route) in self.routes.iter_mut() {
            let Some(port) = self.ports.get_mut(route.output().0) else {
                continue;
            };
            let mut output = OutputHandle::new(port, &mut self.muxes, now_ms);
            written += route.write(&mut output);
        }
        written
    }

    pub fn stats(&self) -> RouterStats {
        let name = |id: PortId| self.port_name(id).unwrap_or("?").to_string();

        let routes = self
            .routes
            .iter()
            .map(|(id, route)| RouteSummary {
                id,
                from: name(route.input()),
                to: name(route.output()),
                buffered: route.buffered(),
                stats: route.stats(),
            })
            .collect();

        let muxes = self
            .muxes
            .iter()
            .map(|mux| (mux.name().to_string(), mux.stats()))
            .collect();

        let mut mappers = BTreeMap::new();
        let mut forced_releases = BTreeMap::new();
        for port in &self.ports {
            if let PortKind::Mapper(mapper) = port.kind() {
                mappers.insert(port.name().to_string(), mapper.stats());
            }
            if port.is_output() {
                forced_releases.insert(port.name().to_string(), port.arbiter().forced_releases());
            }
        }

        RouterStats {
            routes,
            muxes,
            mappers,
            forced_releases,
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
