// MIT License - Copyright (c) 2026 Peter Wright
// DS-AIR gateway bridge

use crate::constants::{ProtocolVersion, StatusFields};
use crate::devices::{AirCon, AirConStatus, DeviceKey};
use crate::protocol::result::{ErrorCodeRecord, Weather};

/// All events that can be emitted by the gateway session.
///
/// Users subscribe via `gateway.subscribe()` to receive a
/// `tokio::sync::broadcast::Receiver<GatewayEvent>`.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// TCP connection to the gateway established
    Connected,
    /// TCP connection lost
    Disconnected,
    /// The gateway acknowledged with the new protocol generation
    ProtocolVersionChanged(ProtocolVersion),
    /// Room-info response applied to the registry
    RoomsDiscovered { rooms: usize, aircons: usize },
    /// Every unit has reported its status at least once
    Ready,
    /// Capabilities of a unit changed after readiness
    AirConUpdated { key: DeviceKey, aircon: AirCon },
    /// Status of a unit merged; `status` is the merged snapshot
    StatusChanged {
        key: DeviceKey,
        status: AirConStatus,
        changed: StatusFields,
    },
    /// Fault code reported by the gateway
    ErrorCode(ErrorCodeRecord),
    Weather(Weather),
    /// Tenths of a degree Celsius
    RecommendedIndoorTemp { temp: u16, outdoor_temp: u16 },
    TimeSync { time: u32 },
    CommandResponse { command_id: u32, code: u8 },
    /// An outgoing command could not be written
    CommandFailed { command: &'static str, error: String },
}

/// Type alias for the broadcast sender.
pub type EventSender = tokio::sync::broadcast::Sender<GatewayEvent>;

/// Type alias for the broadcast receiver.
pub type EventReceiver = tokio::sync::broadcast::Receiver<GatewayEvent>;

/// Create a new event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(capacity)
}
