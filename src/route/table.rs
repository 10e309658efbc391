//! Global fixed-capacity route pool
//!
//! Slots are reused as soon as a route is deleted. Handles are plain
//! indices: callers must not keep a [`RouteId`] around after deleting it.

use super::{Route, RouteId};
use crate::error::{RouteError, RouteResult};
use crate::port::PortId;

/// Routes shared by all inputs
pub const ROUTE_TABLE_SIZE: usize = 48;

pub struct RouteTable {
    slots: Vec<Option<Route>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::with_capacity(ROUTE_TABLE_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of routes in use
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bind the first free slot to `input` -> `output`
    pub fn allocate(&mut self, input: PortId, output: PortId) -> RouteResult<RouteId> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(RouteError::TableFull(self.slots.len()))?;
        let id = RouteId(index);
        self.slots[index] = Some(Route::new(id, input, output));
        Ok(id)
    }

    /// Free a slot, returning the route that occupied it
    pub fn release(&mut self, id: RouteId) -> RouteResult<Route> {
        self.slots
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(RouteError::UnknownRoute(id))
    }

    pub fn get(&self, id: RouteId) -> Option<&Route> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: RouteId) -> Option<&mut Route> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RouteId, &Route)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|r| (RouteId(i), r)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (RouteId, &mut Route)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| s.as_mut().map(|r| (RouteId(i), r)))
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}
