// MIT License - Copyright (c) 2026 Peter Wright
// DS-AIR gateway bridge

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Duration, sleep};
use tracing::{debug, error, info, warn};

use dsair_bridge::{
    AirCon, AirConStatus, AirFlow, DeviceKey, DeviceKind, DsAirGateway, GatewayConfig,
    GatewayEvent, Mode, Room, Switch,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "dsair")]
#[command(about = "Monitor and control a DS-AIR HVAC gateway")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "dsair.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stay connected and log every gateway event
    Monitor,
    /// Print the discovered rooms and climate units
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Send one control command to a unit and wait for the ack
    Set {
        /// Room id
        room: u16,
        /// Unit id within the room
        unit: u8,
        /// Unit kind: aircon, new_aircon or bathroom
        #[arg(long, default_value = "aircon")]
        kind: String,
        /// on / off
        #[arg(long)]
        power: Option<String>,
        /// Operating mode (cool, heat, dry, auto, ventilation, ...)
        #[arg(long)]
        mode: Option<String>,
        /// Target temperature in degrees Celsius
        #[arg(long)]
        temp: Option<f32>,
        /// Fan speed (super_weak, weak, middle, strong, super_strong, auto)
        #[arg(long)]
        fan: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    gateway: GatewayToml,
}

#[derive(Debug, Deserialize)]
struct GatewayToml {
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_connect_timeout")]
    connect_timeout_ms: u64,
    #[serde(default = "default_command_timeout")]
    command_timeout_ms: u64,
    #[serde(default = "default_heartbeat_interval")]
    heartbeat_interval_ms: u64,
    #[serde(default = "default_ready_timeout")]
    ready_timeout_ms: u64,
    #[serde(default = "default_reconnect_delay")]
    reconnect_delay_ms: u64,
    #[serde(default = "default_max_connect_retries")]
    max_connect_retries: u32,
}

fn default_port() -> u16 {
    dsair_bridge::constants::DEFAULT_PORT
}
fn default_connect_timeout() -> u64 {
    10000
}
fn default_command_timeout() -> u64 {
    5000
}
fn default_heartbeat_interval() -> u64 {
    60000
}
fn default_ready_timeout() -> u64 {
    30000
}
fn default_reconnect_delay() -> u64 {
    5000
}
fn default_max_connect_retries() -> u32 {
    3
}

fn build_gateway_config(toml: &GatewayToml) -> GatewayConfig {
    GatewayConfig::builder()
        .host(&toml.host)
        .port(toml.port)
        .connect_timeout_ms(toml.connect_timeout_ms)
        .command_timeout_ms(toml.command_timeout_ms)
        .heartbeat_interval_ms(toml.heartbeat_interval_ms)
        .ready_timeout_ms(toml.ready_timeout_ms)
        .reconnect_delay_ms(toml.reconnect_delay_ms)
        .max_connect_retries(toml.max_connect_retries)
        .build()
}

fn load_config(path: &str) -> Result<GatewayConfig> {
    let text = std::fs::read_to_string(path).context("Failed to read config file")?;
    let config: Config = toml::from_str(&text).context("Failed to parse config file")?;
    Ok(build_gateway_config(&config.gateway))
}

// ---------------------------------------------------------------------------
// Argument parsing
// ---------------------------------------------------------------------------

fn parse_kind(s: &str) -> Result<DeviceKind> {
    match s.to_lowercase().as_str() {
        "aircon" => Ok(DeviceKind::AirCon),
        "new_aircon" | "newaircon" => Ok(DeviceKind::NewAirCon),
        "bathroom" => Ok(DeviceKind::Bathroom),
        other => anyhow::bail!("Unknown unit kind: {other}"),
    }
}

fn parse_switch(s: &str) -> Result<Switch> {
    match s.to_lowercase().as_str() {
        "on" | "1" | "true" => Ok(Switch::On),
        "off" | "0" | "false" => Ok(Switch::Off),
        other => anyhow::bail!("Invalid power value: {other}"),
    }
}

fn parse_temp(celsius: f32) -> Result<u16> {
    if !(0.0..=50.0).contains(&celsius) {
        anyhow::bail!("Temperature out of range: {celsius}");
    }
    Ok((celsius * 10.0).round() as u16)
}

fn build_status(
    power: Option<&str>,
    mode: Option<&str>,
    temp: Option<f32>,
    fan: Option<&str>,
) -> Result<AirConStatus> {
    let status = AirConStatus {
        switch: power.map(parse_switch).transpose()?,
        mode: mode
            .map(|m| Mode::from_name(&m.to_lowercase()).with_context(|| format!("Unknown mode: {m}")))
            .transpose()?,
        setted_temp: temp.map(parse_temp).transpose()?,
        air_flow: fan
            .map(|f| AirFlow::from_name(&f.to_lowercase()).with_context(|| format!("Unknown fan speed: {f}")))
            .transpose()?,
        ..Default::default()
    };
    if status.is_empty() {
        anyhow::bail!("Nothing to set: pass at least one of --power, --mode, --temp, --fan");
    }
    Ok(status)
}

fn celsius(tenths: Option<u16>) -> String {
    match tenths {
        Some(t) => format!("{:.1}", t as f32 / 10.0),
        None => "-".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct Listing {
    rooms: Vec<Room>,
    aircons: Vec<AirCon>,
}

async fn run_list(config: GatewayConfig, json: bool) -> Result<()> {
    let mut gateway = DsAirGateway::connect(config)
        .await
        .context("Failed to connect to gateway")?;
    gateway.wait_ready().await.context("Gateway did not become ready")?;

    let listing = Listing {
        rooms: gateway.rooms().await,
        aircons: gateway.aircons().await,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
    } else {
        println!("Protocol: {:?}", gateway.protocol_version().await);
        println!("Rooms:");
        for room in &listing.rooms {
            println!("  {:>5}  {}", room.id, room.display_name());
        }
        println!("Units:");
        for ac in &listing.aircons {
            println!(
                "  {:<24} {:<20} power={:?} mode={} set={} current={}",
                ac.key().to_string(),
                ac.display_name(),
                ac.status.switch,
                ac.status.mode.map(|m| m.as_str()).unwrap_or("-"),
                celsius(ac.status.setted_temp),
                celsius(ac.status.current_temp),
            );
        }
    }

    gateway.disconnect().await?;
    Ok(())
}

async fn run_set(config: GatewayConfig, key: DeviceKey, status: AirConStatus) -> Result<()> {
    let mut gateway = DsAirGateway::connect(config)
        .await
        .context("Failed to connect to gateway")?;
    gateway.wait_ready().await.context("Gateway did not become ready")?;

    info!("Setting {key}: {status:?}");
    let result = gateway.control_confirmed(key, status).await;
    gateway.disconnect().await?;
    result.with_context(|| format!("Control command for {key} failed"))?;
    info!("Command acknowledged");
    Ok(())
}

fn log_event(event: &GatewayEvent) {
    match event {
        GatewayEvent::Connected => info!("Gateway connected"),
        GatewayEvent::Disconnected => warn!("Gateway disconnected"),
        GatewayEvent::ProtocolVersionChanged(v) => info!("Protocol version: {v:?}"),
        GatewayEvent::RoomsDiscovered { rooms, aircons } => {
            info!("Discovered {rooms} rooms, {aircons} climate units")
        }
        GatewayEvent::Ready => info!("All units reported, session ready"),
        GatewayEvent::AirConUpdated { key, aircon } => {
            info!("Unit {key} updated: {}", aircon.display_name())
        }
        GatewayEvent::StatusChanged { key, status, changed } => {
            info!(
                "Unit {key}: power={:?} mode={} set={} current={} ({changed:?})",
                status.switch,
                status.mode.map(|m| m.as_str()).unwrap_or("-"),
                celsius(status.setted_temp),
                celsius(status.current_temp),
            )
        }
        GatewayEvent::ErrorCode(record) => warn!("Fault: {record:?}"),
        GatewayEvent::Weather(weather) => debug!("Weather: {weather:?}"),
        GatewayEvent::RecommendedIndoorTemp { temp, outdoor_temp } => info!(
            "Recommended indoor {} C, outdoor {} C",
            celsius(Some(*temp)),
            celsius(Some(*outdoor_temp))
        ),
        GatewayEvent::TimeSync { time } => debug!("Time sync: {time}"),
        GatewayEvent::CommandResponse { command_id, code } => {
            debug!("Command {command_id} answered with code {code}")
        }
        GatewayEvent::CommandFailed { command, error } => {
            error!("Command {command} failed: {error}")
        }
    }
}

/// Reconnect indefinitely with exponential backoff.
async fn reconnect_forever(gateway: &mut DsAirGateway, reconnect_delay_ms: u64) {
    let mut attempt: u32 = 0;
    loop {
        if attempt > 0 {
            let delay_ms = reconnect_delay_ms * (1u64 << (attempt - 1).min(4));
            error!(
                "Reconnection attempt {attempt} failed. Retrying in {:.1}s...",
                delay_ms as f64 / 1000.0
            );
            sleep(Duration::from_millis(delay_ms)).await;
        }
        attempt += 1;

        info!("Attempting gateway reconnection (attempt {attempt})...");
        match gateway.reconnect().await {
            Ok(()) => {
                info!("Gateway reconnected");
                return;
            }
            Err(e) => warn!("Reconnection error: {e}"),
        }
    }
}

async fn run_monitor(config_path: &str, mut config: GatewayConfig) -> Result<()> {
    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        info!("Connecting to DS-AIR gateway at {}", config.address());
        let mut gateway = DsAirGateway::connect(config.clone()).await?;
        let mut events = gateway.subscribe();

        info!("Monitoring. Send SIGHUP to reload config, SIGINT/SIGTERM to stop.");
        let restart = loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(GatewayEvent::Disconnected) => {
                        // our own reconnect also emits this; only act while down
                        if gateway.is_connected().await {
                            continue;
                        }
                        warn!("Gateway disconnected, will attempt reconnection");
                        reconnect_forever(&mut gateway, config.reconnect_delay_ms).await;
                    }
                    Ok(event) => log_event(&event),
                    Err(RecvError::Lagged(n)) => warn!("Event receiver lagged, missed {n} events"),
                    Err(RecvError::Closed) => {
                        info!("Event channel closed");
                        break false;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Received SIGINT, shutting down...");
                    break false;
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down...");
                    break false;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, reloading config and reconnecting...");
                    break true;
                }
            }
        };

        if let Err(e) = gateway.disconnect().await {
            warn!("Error disconnecting gateway: {e}");
        }

        if !restart {
            break;
        }

        info!("Reloading config from {config_path}");
        match load_config(config_path) {
            Ok(new_config) => {
                config = new_config;
                info!("Config reloaded successfully");
            }
            Err(e) => warn!("Failed to reload config, keeping previous: {e}"),
        }
    }

    info!("Shutdown complete");
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=dsair_bridge=trace).
    // Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Command::Monitor => run_monitor(&cli.config, config).await,
        Command::List { json } => run_list(config, json).await,
        Command::Set {
            room,
            unit,
            kind,
            power,
            mode,
            temp,
            fan,
        } => {
            let key = DeviceKey::new(parse_kind(&kind)?, room, unit);
            let status = build_status(power.as_deref(), mode.as_deref(), temp, fan.as_deref())?;
            run_set(config, key, status).await
        }
    }
}
