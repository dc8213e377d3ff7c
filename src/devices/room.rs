// MIT License - Copyright (c) 2026 Peter Wright
// DS-AIR gateway bridge

use serde::Serialize;

use crate::constants::DeviceKind;

/// A non-climate device discovered in a room (geothermic floor heating,
/// ventilation, HD environment unit, or a kind this crate does not model).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Device {
    /// Wire device id; `kind` is `None` when the id is not modelled.
    pub device_id: u32,
    pub kind: Option<DeviceKind>,
    pub room_id: u16,
    pub unit_id: u8,
    pub name: String,
    pub alias: String,
}

pub type Geothermic = Device;
pub type Ventilation = Device;
pub type Hd = Device;

/// A room as reported by the gateway.
///
/// Device fields are indices into the registry's device arenas: `air_con`
/// indexes the climate arena, `geothermic` / `ventilation` the device arena.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Room {
    pub id: u16,
    pub name: String,
    pub alias: String,
    pub icon: String,
    pub air_con: Option<usize>,
    pub geothermic: Option<usize>,
    pub ventilation: Option<usize>,
    pub hd_room: bool,
}

impl Room {
    pub fn new(id: u16) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn display_name(&self) -> &str {
        if self.alias.is_empty() { &self.name } else { &self.alias }
    }
}
