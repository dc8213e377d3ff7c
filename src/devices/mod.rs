// MIT License - Copyright (c) 2026 Peter Wright
// DS-AIR gateway bridge

pub mod aircon;
pub mod room;

pub use aircon::{AirCon, AirConStatus, DeviceKey};
pub use room::{Device, Geothermic, Hd, Room, Ventilation};
