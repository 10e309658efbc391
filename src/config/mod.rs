//! Configuration management for midibox
//!
//! Handles loading, validating and hot-reloading the YAML file describing
//! host links, multiplexers, ports and routes. Channels are written 1-16
//! in the file and converted to 0-15 when applied.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tokio::fs;
use tracing::{debug, info};

use crate::mapper::MAX_POLYPHONY;
use crate::mux::MUX_PORTS;
use crate::port::{
    FsFile, GateMapping, GpioPins, PortId, PortKind, MAX_GATE_PINS, ROUTES_PER_INPUT,
};
use crate::route::{ChannelProcessing, MidiFilter, VelocityZero, NEUTRAL_SCALE, ROUTE_TABLE_SIZE};
use crate::router::Router;
use crate::transport::SerialLink;

pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub links: Vec<LinkConfig>,
    #[serde(default)]
    pub muxes: Vec<MuxConfig>,
    pub ports: Vec<PortConfig>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// Poll loop settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
        }
    }
}

/// Host MIDI port pair, matched by name substring
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LinkConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Multiplexer running over a link
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MuxConfig {
    pub name: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PortConfig {
    pub name: String,
    #[serde(flatten)]
    pub kind: PortKindConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PortKindConfig {
    Serial {
        link: String,
    },
    Loopback,
    Mux {
        mux: String,
        address: u8,
    },
    Mapper {
        #[serde(default)]
        voices: Vec<VoiceConfig>,
    },
    SysexPlayer {
        #[serde(skip_serializing_if = "Option::is_none")]
        file: Option<String>,
    },
    SysexRecorder {
        #[serde(skip_serializing_if = "Option::is_none")]
        file: Option<String>,
    },
    Gate {
        /// Pins mapped to notes 60, 61, ... on channel 1
        #[serde(default)]
        pins: Vec<u8>,
        #[serde(default)]
        mappings: Vec<GatePinConfig>,
    },
}

/// Polyphony of one mapper channel
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VoiceConfig {
    pub channel: u8,
    pub polyphony: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overflow: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GatePinConfig {
    pub pin: u8,
    #[serde(default = "default_channel")]
    pub channel: u8,
    pub note: u8,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RouteConfig {
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterConfig>,
    #[serde(default = "default_sync_divider")]
    pub sync_divider: u8,
    #[serde(default)]
    pub velocity_zero: VelocityZero,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<ChannelConfig>,
}

/// Filter as a raw mask, a hex string, or a list of channels (1-16)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FilterConfig {
    Mask(u32),
    Hex(String),
    Channels(Vec<u8>),
}

impl FilterConfig {
    pub fn to_filter(&self) -> Result<MidiFilter> {
        match self {
            FilterConfig::Mask(mask) => Ok(MidiFilter::new(*mask)),
            FilterConfig::Hex(text) => {
                let digits = text
                    .trim()
                    .trim_start_matches("0x")
                    .trim_start_matches("0X");
                let mask = u32::from_str_radix(digits, 16)
                    .with_context(|| format!("Invalid filter mask '{}'", text))?;
                Ok(MidiFilter::new(mask))
            }
            FilterConfig::Channels(channels) => {
                for &ch in channels {
                    check_channel(ch).context("Invalid filter channel")?;
                }
                let zero_based: Vec<u8> = channels.iter().map(|ch| ch - 1).collect();
                Ok(MidiFilter::channels(&zero_based))
            }
        }
    }
}

/// Processing of one source channel
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChannelConfig {
    pub channel: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remap: Option<u8>,
    #[serde(default)]
    pub transpose: i8,
    #[serde(default = "default_velocity_scale")]
    pub velocity_scale: u16,
    #[serde(default)]
    pub velocity_offset: i8,
}

impl ChannelConfig {
    fn to_processing(&self) -> ChannelProcessing {
        ChannelProcessing {
            remap: self.remap.map(|ch| ch - 1),
            transpose: self.transpose,
            velocity_scale: self.velocity_scale,
            velocity_offset: self.velocity_offset,
        }
    }
}

fn check_channel(channel: u8) -> Result<()> {
    if channel == 0 || channel > 16 {
        anyhow::bail!("invalid MIDI channel {} (must be 1-16)", channel);
    }
    Ok(())
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file: {}", path))?;
        Ok(config)
    }

    /// Parse and validate YAML text
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.engine.tick_ms == 0 {
            anyhow::bail!("engine.tick_ms must be at least 1");
        }

        let mut link_names = HashSet::new();
        for link in &self.links {
            if link.name.is_empty() {
                anyhow::bail!("Link name cannot be empty");
            }
            if !link_names.insert(link.name.as_str()) {
                anyhow::bail!("Duplicate link name '{}'", link.name);
            }
            if link.input.is_none() && link.output.is_none() {
                anyhow::bail!("Link '{}' needs an input or an output", link.name);
            }
        }

        // A link can only be consumed once
        let mut link_users: HashMap<String, String> = HashMap::new();
        let mut claim = |link: &str, user: &str| -> Result<()> {
            if !link_names.contains(link) {
                anyhow::bail!("'{}' refers to unknown link '{}'", user, link);
            }
            if let Some(other) = link_users.insert(link.to_string(), user.to_string()) {
                anyhow::bail!("Link '{}' is used by both '{}' and '{}'", link, other, user);
            }
            Ok(())
        };

        let mut mux_names = HashSet::new();
        for mux in &self.muxes {
            if !mux_names.insert(mux.name.as_str()) {
                anyhow::bail!("Duplicate mux name '{}'", mux.name);
            }
            claim(&mux.link, &mux.name)?;
        }

        let mut port_names = HashSet::new();
        let mut mux_addresses = HashSet::new();
        for port in &self.ports {
            if port.name.is_empty() {
                anyhow::bail!("Port name cannot be empty");
            }
            if !port_names.insert(port.name.as_str()) {
                anyhow::bail!("Duplicate port name '{}'", port.name);
            }
            self.validate_port(port, &mux_names, &mut mux_addresses, &mut claim)
                .with_context(|| format!("Invalid port '{}'", port.name))?;
        }

        if self.routes.len() > ROUTE_TABLE_SIZE {
            anyhow::bail!(
                "{} routes configured, at most {} are supported",
                self.routes.len(),
                ROUTE_TABLE_SIZE
            );
        }
        let mut per_input: HashMap<&str, usize> = HashMap::new();
        for (index, route) in self.routes.iter().enumerate() {
            self.validate_route(route)
                .with_context(|| format!("Invalid route {} ({} -> {})", index, route.from, route.to))?;
            let count = per_input.entry(route.from.as_str()).or_default();
            *count += 1;
            if *count > ROUTES_PER_INPUT {
                anyhow::bail!(
                    "Port '{}' has more than {} routes",
                    route.from,
                    ROUTES_PER_INPUT
                );
            }
        }

        Ok(())
    }

    fn validate_port(
        &self,
        port: &PortConfig,
        mux_names: &HashSet<&str>,
        mux_addresses: &mut HashSet<(String, u8)>,
        claim: &mut impl FnMut(&str, &str) -> Result<()>,
    ) -> Result<()> {
        match &port.kind {
            PortKindConfig::Serial { link } => claim(link, &port.name)?,
            PortKindConfig::Mux { mux, address } => {
                if !mux_names.contains(mux.as_str()) {
                    anyhow::bail!("unknown mux '{}'", mux);
                }
                if *address as usize >= MUX_PORTS {
                    anyhow::bail!("mux address {} out of range (0-7)", address);
                }
                if !mux_addresses.insert((mux.clone(), *address)) {
                    anyhow::bail!("address {} of mux '{}' is already used", address, mux);
                }
            }
            PortKindConfig::Mapper { voices } => {
                for voice in voices {
                    check_channel(voice.channel)?;
                    if voice.polyphony as usize > MAX_POLYPHONY {
                        anyhow::bail!(
                            "polyphony {} on channel {} exceeds {}",
                            voice.polyphony,
                            voice.channel,
                            MAX_POLYPHONY
                        );
                    }
                    if let Some(overflow) = voice.overflow {
                        check_channel(overflow).context("invalid overflow channel")?;
                    }
                }
            }
            PortKindConfig::Gate { pins, mappings } => {
                if pins.len().max(mappings.len()) > MAX_GATE_PINS {
                    anyhow::bail!("at most {} gate pins are supported", MAX_GATE_PINS);
                }
                for m in mappings {
                    check_channel(m.channel)?;
                    if m.note > 127 {
                        anyhow::bail!("invalid note {} for pin {}", m.note, m.pin);
                    }
                }
            }
            PortKindConfig::Loopback
            | PortKindConfig::SysexPlayer { .. }
            | PortKindConfig::SysexRecorder { .. } => {}
        }
        Ok(())
    }

    fn validate_route(&self, route: &RouteConfig) -> Result<()> {
        let kind_of = |name: &str| {
            self.ports
                .iter()
                .find(|p| p.name == name)
                .map(|p| &p.kind)
        };
        match kind_of(&route.from) {
            None => anyhow::bail!("unknown port '{}'", route.from),
            Some(PortKindConfig::SysexRecorder { .. } | PortKindConfig::Gate { .. }) => {
                anyhow::bail!("port '{}' cannot be used as an input", route.from)
            }
            Some(_) => {}
        }
        match kind_of(&route.to) {
            None => anyhow::bail!("unknown port '{}'", route.to),
            Some(PortKindConfig::SysexPlayer { .. }) => {
                anyhow::bail!("port '{}' cannot be used as an output", route.to)
            }
            Some(_) => {}
        }
        if let Some(filter) = &route.filter {
            filter.to_filter()?;
        }
        if route.sync_divider == 0 {
            anyhow::bail!("sync_divider must be at least 1");
        }
        let mut seen = HashSet::new();
        for ch in &route.channels {
            check_channel(ch.channel)?;
            if !seen.insert(ch.channel) {
                anyhow::bail!("channel {} is configured twice", ch.channel);
            }
            if let Some(remap) = ch.remap {
                check_channel(remap).context("invalid remap target")?;
            }
        }
        Ok(())
    }

    /// Build a router from this configuration
    ///
    /// `open_link` connects a configured link, `gpio` supplies pin control
    /// for gate ports.
    pub fn build_router(
        &self,
        mut open_link: impl FnMut(&LinkConfig) -> Result<Box<dyn SerialLink>>,
        mut gpio: impl FnMut() -> Box<dyn GpioPins>,
    ) -> Result<Router> {
        let mut links = HashMap::new();
        for link in &self.links {
            let opened =
                open_link(link).with_context(|| format!("Failed to open link '{}'", link.name))?;
            links.insert(link.name.as_str(), opened);
        }
        let mut take_link = |name: &str| {
            links
                .remove(name)
                .with_context(|| format!("Link '{}' is not available", name))
        };

        let mut router = Router::new();
        for mux in &self.muxes {
            router.add_mux(&mux.name, take_link(&mux.link)?);
        }

        for port in &self.ports {
            let kind = match &port.kind {
                PortKindConfig::Serial { link } => PortKind::Serial(take_link(link)?),
                PortKindConfig::Loopback => PortKind::Loopback(Default::default()),
                PortKindConfig::Mux { mux, address } => {
                    let mux = router
                        .mux_by_name(mux)
                        .with_context(|| format!("Unknown mux '{}'", mux))?;
                    PortKind::Mux {
                        mux,
                        address: *address,
                    }
                }
                PortKindConfig::Mapper { .. } => PortKind::Mapper(Default::default()),
                PortKindConfig::SysexPlayer { .. } => PortKind::SysExPlayer(Default::default()),
                PortKindConfig::SysexRecorder { .. } => {
                    PortKind::SysExRecorder(Default::default())
                }
                PortKindConfig::Gate { pins, mappings } => {
                    let mappings: Vec<GateMapping> = mappings
                        .iter()
                        .map(|m| GateMapping {
                            pin: m.pin,
                            channel: m.channel - 1,
                            note: m.note,
                        })
                        .collect();
                    let id = router.add_gpio_gate(&port.name, &mappings, pins, gpio())?;
                    debug!("Gate '{}' registered as {}", port.name, id);
                    continue;
                }
            };
            let id = router.add_port(&port.name, kind)?;
            self.setup_port(&mut router, id, &port.kind)
                .with_context(|| format!("Failed to set up port '{}'", port.name))?;
        }

        self.apply_routes(&mut router)?;
        info!(
            "Router ready: {} ports, {} routes",
            router.port_count(),
            router.route_count()
        );
        Ok(router)
    }

    fn setup_port(
        &self,
        router: &mut Router,
        id: PortId,
        kind: &PortKindConfig,
    ) -> Result<()> {
        match kind {
            PortKindConfig::Mapper { voices } => {
                if let Some(mapper) = router.mapper_mut(id) {
                    for voice in voices {
                        mapper.set_polyphony(voice.channel - 1, voice.polyphony);
                        mapper.set_overflow(voice.channel - 1, voice.overflow.map(|ch| ch - 1));
                    }
                }
            }
            PortKindConfig::SysexPlayer { file: Some(path) } => {
                let file = FsFile::open(path)?;
                if let Some(player) = router.sysex_player_mut(id) {
                    player.attach(Box::new(file));
                }
            }
            PortKindConfig::SysexRecorder { file: Some(path) } => {
                let file = FsFile::create(path)?;
                if let Some(recorder) = router.sysex_recorder_mut(id) {
                    recorder.attach(Box::new(file));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Replace every route of `router` with the configured ones
    pub fn apply_routes(&self, router: &mut Router) -> Result<()> {
        router.clear_routes();
        for route in &self.routes {
            let from = router
                .port_by_name(&route.from)
                .with_context(|| format!("Unknown port '{}'", route.from))?;
            let to = router
                .port_by_name(&route.to)
                .with_context(|| format!("Unknown port '{}'", route.to))?;
            let id = router
                .create_route(from, to)
                .with_context(|| format!("Cannot route '{}' to '{}'", route.from, route.to))?;

            let Some(r) = router.route_mut(id) else {
                continue;
            };
            if let Some(filter) = &route.filter {
                r.set_filter(filter.to_filter()?);
            }
            r.set_sync_divider(route.sync_divider);
            r.set_velocity_zero(route.velocity_zero);
            for ch in &route.channels {
                r.set_channel_processing(ch.channel - 1, ch.to_processing());
            }
        }
        debug!("Applied {} routes", self.routes.len());
        Ok(())
    }
}

// Default value functions
fn default_tick_ms() -> u64 { 1 }
fn default_channel() -> u8 { 1 }
fn default_sync_divider() -> u8 { 1 }
fn default_velocity_scale() -> u16 { NEUTRAL_SCALE }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::TracingPins;
    use crate::transport::MemoryLink;

    const EXAMPLE: &str = r#"
links:
  - name: usb
    input: "USB MIDI"
    output: "USB MIDI"
  - name: hub-link
    input: "Hub"
    output: "Hub"
muxes:
  - name: hub
    link: hub-link
ports:
  - name: keys
    type: serial
    link: usb
  - name: hub-2
    type: mux
    mux: hub
    address: 2
  - name: poly
    type: mapper
    voices:
      - channel: 1
        polyphony: 2
        overflow: 3
  - name: merge
    type: loopback
  - name: gates
    type: gate
    pins: [4, 5]
routes:
  - from: keys
    to: poly
    filter: [1]
  - from: poly
    to: hub-2
    sync_divider: 2
    velocity_zero: note_off_after_processing
    channels:
      - channel: 3
        transpose: -12
        velocity_scale: 80
"#;

    fn links() -> HashMap<String, MemoryLink> {
        ["usb", "hub-link"]
            .iter()
            .map(|name| (name.to_string(), MemoryLink::new()))
            .collect()
    }

    fn build(config: &AppConfig, links: &HashMap<String, MemoryLink>) -> Router {
        config
            .build_router(
                |link| {
                    let l = links.get(&link.name).context("no such link")?;
                    Ok(Box::new(l.clone()) as Box<dyn SerialLink>)
                },
                || Box::new(TracingPins),
            )
            .unwrap()
    }

    #[test]
    fn test_parse_example() {
        let config = AppConfig::from_yaml(EXAMPLE).unwrap();
        assert_eq!(config.engine.tick_ms, 1);
        assert_eq!(config.ports.len(), 5);
        assert_eq!(
            config.ports[1].kind,
            PortKindConfig::Mux {
                mux: "hub".to_string(),
                address: 2
            }
        );
        let route = &config.routes[1];
        assert_eq!(route.velocity_zero, VelocityZero::NoteOffAfterProcessing);
        assert_eq!(route.channels[0].velocity_scale, 80);
        assert_eq!(config.routes[0].sync_divider, 1);
    }

    #[test]
    fn test_filter_forms() {
        let yaml = "[3, 0xFFFF0001, \"0x0000FFFF\", [1, 16]]";
        let filters: Vec<FilterConfig> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(filters[0].to_filter().unwrap().mask(), 3);
        assert_eq!(filters[1].to_filter().unwrap().mask(), 0xFFFF_0001);
        assert_eq!(filters[2].to_filter().unwrap().mask(), 0x0000_FFFF);
        assert_eq!(filters[3].to_filter().unwrap().mask(), 0xFFFF_8001);
        assert!(FilterConfig::Hex("zz".into()).to_filter().is_err());
        assert!(FilterConfig::Channels(vec![0]).to_filter().is_err());
    }

    #[test]
    fn test_validation_errors() {
        let bad = [
            EXAMPLE.replace("to: poly", "to: nowhere"),
            EXAMPLE.replace("address: 2", "address: 9"),
            EXAMPLE.replace("polyphony: 2", "polyphony: 17"),
            EXAMPLE.replace("name: merge", "name: keys"),
            EXAMPLE.replace("link: hub-link", "link: usb"),
            EXAMPLE.replace("channel: 3", "channel: 0"),
            EXAMPLE.replace("sync_divider: 2", "sync_divider: 0"),
            EXAMPLE.replace("from: poly", "from: gates"),
        ];
        for yaml in &bad {
            assert!(AppConfig::from_yaml(yaml).is_err(), "accepted:\n{}", yaml);
        }
    }

    #[test]
    fn test_too_many_routes_per_input() {
        let mut config = AppConfig::from_yaml(EXAMPLE).unwrap();
        let route = config.routes[0].clone();
        config.routes = vec![route; ROUTES_PER_INPUT + 1];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_build_router() {
        let config = AppConfig::from_yaml(EXAMPLE).unwrap();
        let links = links();
        let mut router = build(&config, &links);

        assert_eq!(router.port_count(), 5);
        assert_eq!(router.route_count(), 2);
        let poly = router.port_by_name("poly").unwrap();
        assert_eq!(router.mapper(poly).unwrap().polyphony(0), 2);
        assert_eq!(router.mapper(poly).unwrap().overflow(0), Some(2));

        let hub_in = router.port_by_name("hub-2").unwrap();
        assert!(router.routes_of(hub_in).is_empty());
        let to_hub = router.routes_of(poly)[0];
        let route = router.route(to_hub).unwrap();
        assert_eq!(route.sync_divider(), 2);
        assert_eq!(route.transpose(2), -12);

        // keys -> poly (channel 1 only) -> hub address 2
        links["usb"].inject(&[0x90, 60, 100, 0x91, 60, 100]);
        router.poll(0);
        router.poll(1);
        router.poll(2);
        let wire = links["hub-link"].take_sent();
        let expected: Vec<u8> = [0x90, 60, 100]
            .iter()
            .flat_map(|&b| crate::mux::encode(2, b))
            .collect();
        assert_eq!(wire, expected);
    }

    #[test]
    fn test_apply_routes_replaces_routes() {
        let config = AppConfig::from_yaml(EXAMPLE).unwrap();
        let links = links();
        let mut router = build(&config, &links);

        let mut reloaded = config.clone();
        reloaded.routes = vec![RouteConfig {
            from: "keys".into(),
            to: "merge".into(),
            filter: None,
            sync_divider: 1,
            velocity_zero: VelocityZero::Preserve,
            channels: Vec::new(),
        }];
        reloaded.apply_routes(&mut router).unwrap();
        assert_eq!(router.route_count(), 1);
        let keys = router.port_by_name("keys").unwrap();
        let merge = router.port_by_name("merge").unwrap();
        let id = router.routes_of(keys)[0];
        assert_eq!(router.route(id).unwrap().output(), merge);
    }

    #[test]
    fn test_sysex_files() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("dump.syx");
        let capture = dir.path().join("capture.syx");
        std::fs::write(&dump, [0xF0, 0x7D, 0x01, 0xF7]).unwrap();

        let yaml = format!(
            r#"
ports:
  - name: player
    type: sysex_player
    file: "{}"
  - name: recorder
    type: sysex_recorder
    file: "{}"
routes:
  - from: player
    to: recorder
"#,
            dump.display(),
            capture.display()
        );
        let config = AppConfig::from_yaml(&yaml).unwrap();
        let mut router = config
            .build_router(|_| anyhow::bail!("no links"), || Box::new(TracingPins))
            .unwrap();
        router.poll(0);
        let recorder = router.port_by_name("recorder").unwrap();
        router.sysex_recorder_mut(recorder).unwrap().detach();
        assert_eq!(std::fs::read(&capture).unwrap(), vec![0xF0, 0x7D, 0x01, 0xF7]);
    }

    #[tokio::test]
    async fn test_save_and_load() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("midibox.yaml");
        let path = path.to_string_lossy().to_string();

        let config = AppConfig::from_yaml(EXAMPLE)?;
        config.save(&path).await?;
        let loaded = AppConfig::load(&path).await?;
        assert_eq!(loaded, config);
        Ok(())
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        assert!(AppConfig::load("/nonexistent/midibox.yaml").await.is_err());
    }
}
