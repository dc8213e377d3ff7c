// MIT License - Copyright (c) 2026 Peter Wright
// DS-AIR gateway bridge
//
//! # dsair-bridge
//!
//! Client-side protocol engine for DS-AIR centralized HVAC gateways.
//!
//! The gateway speaks a length-prefixed binary protocol over TCP. This
//! library splits the byte stream into frames, decodes them into typed
//! records, keeps an in-memory model of rooms and climate units with their
//! live status, and encodes control commands.
//!
//! ## Quick Start
//!
//! ```no_run
//! use dsair_bridge::{AirConStatus, DsAirGateway, GatewayConfig, Mode};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = GatewayConfig::builder()
//!         .host("192.168.1.110")
//!         .port(8008)
//!         .build();
//!
//!     let mut gateway = DsAirGateway::connect(config).await?;
//!     gateway.wait_ready().await?;
//!
//!     for ac in gateway.aircons().await {
//!         gateway
//!             .register_status_hook(ac.key(), |update| println!("{:?}", update))
//!             .await;
//!     }
//!
//!     let heat = AirConStatus { mode: Some(Mode::Heat), setted_temp: Some(220), ..Default::default() };
//!     if let Some(ac) = gateway.aircons().await.first() {
//!         gateway.control(ac.key(), heat).await?;
//!     }
//!
//!     tokio::signal::ctrl_c().await?;
//!     gateway.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod constants;
pub mod devices;
pub mod error;
pub mod event;
pub mod gateway;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use config::{GatewayConfig, GatewayConfigBuilder};
pub use constants::{
    AirFlow, Breathe, CommandKind, DeviceKind, FanDirection, FanDirectionCapability, FanVolume,
    Humidity, Mode, OutdoorRunCond, ProtocolVersion, StatusFields, Switch,
};
pub use devices::{AirCon, AirConStatus, Device, DeviceKey, Room};
pub use error::{DsAirError, GatewayErrorCode, Result};
pub use event::{EventReceiver, GatewayEvent};
pub use gateway::DsAirGateway;
pub use protocol::{GatewayResult, Param, ResultBody};
pub use registry::{AirConUpdate, Registry};
pub use session::{HookUpdate, Session};
