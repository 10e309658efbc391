//! midibox - MIDI router daemon
//!
//! Loads the YAML topology, opens the host MIDI links and polls the router
//! on a fixed tick. Route changes in the config file are applied live.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use midibox::config::{AppConfig, ConfigWatcher, LinkConfig};
use midibox::port::{GpioPins, TracingPins};
use midibox::router::Router;
use midibox::transport::{midir_link, MemoryLink, MidirLink, SerialLink};

/// MIDI router with per-output arbitration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "MIDIBOX_CONFIG", default_value = "midibox.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Poll interval in milliseconds, overrides engine.tick_ms
    #[arg(long)]
    tick_ms: Option<u64>,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,

    /// Validate the configuration and print the topology without opening devices
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(&args.log_level, args.json_logs)?;

    if args.list_ports {
        return list_ports_formatted();
    }

    if args.check {
        let config = AppConfig::load(&args.config).await?;
        return check(&config);
    }

    let (mut watcher, mut config) = ConfigWatcher::new(&args.config).await?;
    let mut router = config.build_router(open_midir_link, gpio_pins)?;
    let tick_ms = args.tick_ms.unwrap_or(config.engine.tick_ms).max(1);
    info!("Routing with a {} ms tick", tick_ms);

    let start = Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_millis(tick_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => router.poll(start.elapsed().as_millis() as u64),
            Some(new_config) = watcher.next_config() => {
                reload(&mut router, &config, &new_config);
                config = new_config;
            }
            _ = &mut shutdown => break,
        }
    }

    let stats = serde_json::to_string_pretty(&router.stats())?;
    info!("Final statistics:\n{}", stats);
    Ok(())
}

/// Apply the routes of a reloaded config, falling back to the previous set
fn reload(router: &mut Router, current: &AppConfig, new_config: &AppConfig) {
    if new_config.links != current.links
        || new_config.muxes != current.muxes
        || new_config.ports != current.ports
    {
        warn!("Port changes take effect after a restart; applying routes only");
    }
    if let Err(e) = new_config.apply_routes(router) {
        warn!("Failed to apply new routes, restoring previous ones: {:#}", e);
        if let Err(e) = current.apply_routes(router) {
            warn!("Failed to restore routes: {:#}", e);
        }
    } else {
        info!("{} routes active", router.route_count());
    }
}

fn open_midir_link(link: &LinkConfig) -> Result<Box<dyn SerialLink>> {
    let opened = MidirLink::open(&link.name, link.input.as_deref(), link.output.as_deref())?;
    Ok(Box::new(opened))
}

fn gpio_pins() -> Box<dyn GpioPins> {
    Box::new(TracingPins)
}

fn check(config: &AppConfig) -> Result<()> {
    let router = config
        .build_router(|_| Ok(Box::new(MemoryLink::new()) as Box<dyn SerialLink>), gpio_pins)
        .context("Configuration cannot be built")?;

    println!("\n{}", "=== Ports ===".bold().cyan());
    for port in router.ports() {
        let direction = match (port.input, port.output) {
            (true, true) => "in/out",
            (true, false) => "in",
            _ => "out",
        };
        println!(
            "  {} {} {}",
            port.name.bright_white(),
            format!("[{}]", port.kind).yellow(),
            direction.dimmed()
        );
    }

    println!("\n{}", "=== Routes ===".bold().cyan());
    for summary in router.stats().routes {
        println!("  {} {} -> {}", summary.id, summary.from.green(), summary.to.green());
    }
    println!(
        "\n{} {} ports, {} routes",
        "OK".bold().bright_green(),
        router.port_count(),
        router.route_count()
    );
    Ok(())
}

fn list_ports_formatted() -> Result<()> {
    let (inputs, outputs) = midir_link::list_ports()?;
    for (title, ports) in [("Input Ports:", inputs), ("Output Ports:", outputs)] {
        println!("\n{}", title.bold());
        if ports.is_empty() {
            println!("  {}", "none".dimmed());
        }
        for port in ports {
            println!("  {}", port);
        }
    }
    Ok(())
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()?;
    }
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    info!("Shutdown signal received");
}
