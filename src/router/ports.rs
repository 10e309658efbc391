//! Port registration and lookup

use tracing::debug;

use crate::error::PortError;
use crate::mapper::PolyMapper;
use crate::mux::{MuxId, SerialMux, MUX_PORTS};
use crate::port::{
    GateMapping, GpioGate, GpioPins, Loopback, OutputHandle, OutputStatus, Port, PortId,
    PortInfo, PortKind, SysExPlayer, SysExRecorder, MAX_GATE_PINS,
};
use crate::transport::SerialLink;

impl super::Router {
    /// Register a port under a unique name
    pub fn add_port(&mut self, name: &str, kind: PortKind) -> Result<PortId, PortError> {
        if self.port_by_name(name).is_some() {
            return Err(PortError::DuplicateName(name.to_string()));
        }
        if let PortKind::Mux { mux, address } = &kind {
            self.check_mux_address(*mux, *address)?;
        }
        let id = PortId(self.ports.len());
        debug!("Registered {} port '{}' as {}", kind.label(), name, id);
        self.ports.push(Port::new(name, kind));
        Ok(id)
    }

    pub fn add_serial_port(
        &mut self,
        name: &str,
        link: Box<dyn SerialLink>,
    ) -> Result<PortId, PortError> {
        self.add_port(name, PortKind::Serial(link))
    }

    pub fn add_loopback(&mut self, name: &str) -> Result<PortId, PortError> {
        self.add_port(name, PortKind::Loopback(Loopback::new()))
    }

    /// Register a physical link carrying multiplexed ports
    pub fn add_mux(&mut self, name: &str, link: Box<dyn SerialLink>) -> MuxId {
        let id = MuxId(self.muxes.len());
        debug!("Registered mux '{}' as {}", name, id);
        self.muxes.push(SerialMux::new(name, link));
        id
    }

    /// Register logical port `address` (0-7) of a mux
    pub fn add_mux_port(
        &mut self,
        name: &str,
        mux: MuxId,
        address: u8,
    ) -> Result<PortId, PortError> {
        self.add_port(name, PortKind::Mux { mux, address })
    }

    fn check_mux_address(&self, mux: MuxId, address: u8) -> Result<(), PortError> {
        if mux.0 >= self.muxes.len() {
            return Err(PortError::UnknownMux(mux.0));
        }
        if address as usize >= MUX_PORTS {
            return Err(PortError::InvalidMuxAddress(address));
        }
        let taken = self.ports.iter().find(|p| {
            matches!(p.kind(), PortKind::Mux { mux: m, address: a } if *m == mux && *a == address)
        });
        match taken {
            Some(port) => Err(PortError::MuxAddressInUse {
                address,
                port: port.name().to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn add_mapper(&mut self, name: &str) -> Result<PortId, PortError> {
        self.add_port(name, PortKind::Mapper(PolyMapper::new()))
    }

    pub fn add_sysex_player(&mut self, name: &str) -> Result<PortId, PortError> {
        self.add_port(name, PortKind::SysExPlayer(SysExPlayer::new()))
    }

    pub fn add_sysex_recorder(&mut self, name: &str) -> Result<PortId, PortError> {
        self.add_port(name, PortKind::SysExRecorder(SysExRecorder::new()))
    }

    /// Gate with explicit mappings, or the default note 60+ mapping of
    /// `default_pins` when `mappings` is empty
    pub fn add_gpio_gate(
        &mut self,
        name: &str,
        mappings: &[GateMapping],
        default_pins: &[u8],
        gpio: Box<dyn GpioPins>,
    ) -> Result<PortId, PortError> {
        let count = mappings.len().max(default_pins.len());
        if count > MAX_GATE_PINS {
            return Err(PortError::TooManyGatePins(count));
        }
        if self.port_by_name(name).is_some() {
            return Err(PortError::DuplicateName(name.to_string()));
        }
        let gate = if mappings.is_empty() {
            GpioGate::new(default_pins, gpio)
        } else {
            GpioGate::with_mappings(mappings, gpio)
        };
        self.add_port(name, PortKind::Gate(gate))
    }

    pub fn port_by_name(&self, name: &str) -> Option<PortId> {
        self.ports
            .iter()
            .position(|p| p.name() == name)
            .map(PortId)
    }

    pub fn port_name(&self, id: PortId) -> Option<&str> {
        self.ports.get(id.0).map(Port::name)
    }

    pub fn port(&self, id: PortId) -> Option<&Port> {
        self.ports.get(id.0)
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    pub fn ports(&self) -> Vec<PortInfo> {
        self.ports
            .iter()
            .enumerate()
            .map(|(i, p)| PortInfo {
                id: PortId(i),
                name: p.name().to_string(),
                kind: p.kind().label(),
                input: p.is_input(),
                output: p.is_output(),
                routes: p.routes().collect(),
            })
            .collect()
    }

    pub fn mux(&self, id: MuxId) -> Option<&SerialMux> {
        self.muxes.get(id.0)
    }

    pub fn mux_by_name(&self, name: &str) -> Option<MuxId> {
        self.muxes.iter().position(|m| m.name() == name).map(MuxId)
    }

    pub fn mapper(&self, id: PortId) -> Option<&PolyMapper> {
        match self.ports.get(id.0)?.kind() {
            PortKind::Mapper(mapper) => Some(mapper),
            _ => None,
        }
    }

    pub fn mapper_mut(&mut self, id: PortId) -> Option<&mut PolyMapper> {
        match self.ports.get_mut(id.0)?.kind_mut() {
            PortKind::Mapper(mapper) => Some(mapper),
            _ => None,
        }
    }

    pub fn sysex_player_mut(&mut self, id: PortId) -> Option<&mut SysExPlayer> {
        match self.ports.get_mut(id.0)?.kind_mut() {
            PortKind::SysExPlayer(player) => Some(player),
            _ => None,
        }
    }

    pub fn sysex_recorder_mut(&mut self, id: PortId) -> Option<&mut SysExRecorder> {
        match self.ports.get_mut(id.0)?.kind_mut() {
            PortKind::SysExRecorder(recorder) => Some(recorder),
            _ => None,
        }
    }

    pub fn gate(&self, id: PortId) -> Option<&GpioGate> {
        match self.ports.get(id.0)?.kind() {
            PortKind::Gate(gate) => Some(gate),
            _ => None,
        }
    }

    /// Direct access to an output, arbitrated like a route would be
    pub fn output(&mut self, id: PortId, now_ms: u64) -> Option<OutputHandle<'_>> {
        let port = self.ports.get_mut(id.0).filter(|p| p.is_output())?;
        Some(OutputHandle::new(port, &mut self.muxes, now_ms))
    }

    pub fn output_status(&self, id: PortId, now_ms: u64) -> Option<OutputStatus> {
        let port = self.ports.get(id.0).filter(|p| p.is_output())?;
        let arbiter = port.arbiter();
        Some(OutputStatus {
            port: id,
            name: port.name().to_string(),
            holder: arbiter.holder(now_ms),
            last_sent_message: arbiter.last_sent_message(),
            message_complete: arbiter.message_complete(),
            forced_releases: arbiter.forced_releases(),
        })
    }
}
