//! Route creation and deletion

use tracing::debug;

use crate::error::{RouteError, RouteResult};
use crate::port::{PortId, WriterId};
use crate::route::{Route, RouteId};

impl super::Router {
    /// Bind a new route from `input` to `output`
    pub fn create_route(&mut self, input: PortId, output: PortId) -> RouteResult<RouteId> {
        let source = self
            .ports
            .get(input.0)
            .ok_or(RouteError::UnknownPort(input))?;
        let sink = self
            .ports
            .get(output.0)
            .ok_or(RouteError::UnknownPort(output))?;
        if !source.is_input() {
            return Err(RouteError::NotAnInput(source.name().to_string()));
        }
        if !sink.is_output() {
            return Err(RouteError::NotAnOutput(sink.name().to_string()));
        }
        if !source.has_free_route_slot() {
            return Err(RouteError::InputFull(source.name().to_string()));
        }

        let id = self.routes.allocate(input, output)?;
        self.ports[input.0].attach_route(id);
        debug!(
            "Created {}: {} -> {}",
            id,
            self.ports[input.0].name(),
            self.ports[output.0].name()
        );
        Ok(id)
    }

    /// Free a route; its slot can be reused right away
    ///
    /// A reservation the route holds on its output is dropped with it, so
    /// the next route in this slot starts without one.
    pub fn delete_route(&mut self, id: RouteId) -> RouteResult<()> {
        let route = self.routes.release(id)?;
        if let Some(port) = self.ports.get_mut(route.input().0) {
            port.detach_route(id);
        }
        if let Some(port) = self.ports.get_mut(route.output().0) {
            port.release_writer(WriterId::from(id), &mut self.muxes);
        }
        debug!("Deleted {}", id);
        Ok(())
    }

    /// Delete every route
    pub fn clear_routes(&mut self) {
        let ids: Vec<RouteId> = self.routes.iter().map(|(id, _)| id).collect();
        for id in ids {
            let _ = self.delete_route(id);
        }
    }

    pub fn routes_of(&self, input: PortId) -> Vec<RouteId> {
        self.ports
            .get(input.0)
            .map(|p| p.routes().collect())
            .unwrap_or_default()
    }

    pub fn route(&self, id: RouteId) -> Option<&Route> {
        self.routes.get(id)
    }

    pub fn route_mut(&mut self, id: RouteId) -> Option<&mut Route> {
        self.routes.get_mut(id)
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn route_capacity(&self) -> usize {
        self.routes.capacity()
    }
}
