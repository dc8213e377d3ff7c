// MIT License - Copyright (c) 2026 Peter Wright
// DS-AIR gateway bridge

use std::fmt;

use serde::Serialize;

use crate::constants::{
    AirFlow, Breathe, DeviceKind, FanDirection, FanDirectionCapability, FanVolume, Humidity,
    Mode, OutdoorRunCond, StatusFields, Switch,
};

/// Identity of a climate device: `(device kind, room id, unit id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DeviceKey {
    pub kind: DeviceKind,
    pub room: u16,
    pub unit: u8,
}

impl DeviceKey {
    pub fn new(kind: DeviceKind, room: u16, unit: u8) -> Self {
        Self { kind, room, unit }
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.room, self.unit)
    }
}

/// Live status of an indoor unit. Every field is independently unknown
/// (`None`) until the gateway reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AirConStatus {
    pub switch: Option<Switch>,
    pub mode: Option<Mode>,
    pub air_flow: Option<AirFlow>,
    pub breathe: Option<Breathe>,
    pub fan_direction1: Option<FanDirection>,
    pub fan_direction2: Option<FanDirection>,
    pub humidity: Option<Humidity>,
    /// Tenths of a degree Celsius.
    pub current_temp: Option<u16>,
    /// Tenths of a degree Celsius.
    pub setted_temp: Option<u16>,
}

impl AirConStatus {
    /// Merge `update` into `self` field by field. Absent fields in `update`
    /// never clear present fields in `self`. Returns the fields whose value
    /// actually changed.
    pub fn merge(&mut self, update: &AirConStatus) -> StatusFields {
        let mut changed = StatusFields::empty();
        merge_field(&mut self.switch, update.switch, StatusFields::SWITCH, &mut changed);
        merge_field(&mut self.mode, update.mode, StatusFields::MODE, &mut changed);
        merge_field(&mut self.air_flow, update.air_flow, StatusFields::AIR_FLOW, &mut changed);
        merge_field(&mut self.current_temp, update.current_temp, StatusFields::CURRENT_TEMP, &mut changed);
        merge_field(&mut self.setted_temp, update.setted_temp, StatusFields::SETTED_TEMP, &mut changed);
        merge_field(&mut self.fan_direction1, update.fan_direction1, StatusFields::FAN_DIRECTION, &mut changed);
        merge_field(&mut self.fan_direction2, update.fan_direction2, StatusFields::FAN_DIRECTION, &mut changed);
        merge_field(&mut self.humidity, update.humidity, StatusFields::HUMIDITY, &mut changed);
        merge_field(&mut self.breathe, update.breathe, StatusFields::BREATHE, &mut changed);
        changed
    }

    /// Flag byte describing which fields are present.
    pub fn present_fields(&self) -> StatusFields {
        let mut fields = StatusFields::empty();
        fields.set(StatusFields::SWITCH, self.switch.is_some());
        fields.set(StatusFields::MODE, self.mode.is_some());
        fields.set(StatusFields::AIR_FLOW, self.air_flow.is_some());
        fields.set(StatusFields::CURRENT_TEMP, self.current_temp.is_some());
        fields.set(StatusFields::SETTED_TEMP, self.setted_temp.is_some());
        fields.set(
            StatusFields::FAN_DIRECTION,
            self.fan_direction1.is_some() || self.fan_direction2.is_some(),
        );
        fields.set(StatusFields::HUMIDITY, self.humidity.is_some());
        fields.set(StatusFields::BREATHE, self.breathe.is_some());
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.present_fields().is_empty()
    }

    /// Copy of `self` keeping only the fields in `fields`.
    pub fn masked(&self, fields: StatusFields) -> AirConStatus {
        let keep = |flag: StatusFields| fields.contains(flag);
        AirConStatus {
            switch: self.switch.filter(|_| keep(StatusFields::SWITCH)),
            mode: self.mode.filter(|_| keep(StatusFields::MODE)),
            air_flow: self.air_flow.filter(|_| keep(StatusFields::AIR_FLOW)),
            breathe: self.breathe.filter(|_| keep(StatusFields::BREATHE)),
            fan_direction1: self.fan_direction1.filter(|_| keep(StatusFields::FAN_DIRECTION)),
            fan_direction2: self.fan_direction2.filter(|_| keep(StatusFields::FAN_DIRECTION)),
            humidity: self.humidity.filter(|_| keep(StatusFields::HUMIDITY)),
            current_temp: self.current_temp.filter(|_| keep(StatusFields::CURRENT_TEMP)),
            setted_temp: self.setted_temp.filter(|_| keep(StatusFields::SETTED_TEMP)),
        }
    }

    pub fn is_on(&self) -> bool {
        self.switch == Some(Switch::On)
    }

    /// Current temperature in degrees Celsius.
    pub fn current_celsius(&self) -> Option<f32> {
        self.current_temp.map(|t| f32::from(t) / 10.0)
    }

    /// Target temperature in degrees Celsius.
    pub fn target_celsius(&self) -> Option<f32> {
        self.setted_temp.map(|t| f32::from(t) / 10.0)
    }
}

fn merge_field<T: Copy + PartialEq>(
    slot: &mut Option<T>,
    update: Option<T>,
    flag: StatusFields,
    changed: &mut StatusFields,
) {
    if let Some(v) = update {
        if *slot != Some(v) {
            changed.insert(flag);
        }
        *slot = Some(v);
    }
}

/// An indoor climate unit: a plain aircon, a new-aircon (with humidity
/// control) or a bathroom unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AirCon {
    pub room_id: u16,
    pub unit_id: u8,
    pub name: String,
    pub alias: String,
    pub new_air_con: bool,
    pub bath_room: bool,
    pub cool_mode: bool,
    pub heat_mode: bool,
    pub pre_heat_mode: bool,
    pub dry_mode: bool,
    pub auto_dry_mode: bool,
    pub more_dry_mode: bool,
    pub ventilation_mode: bool,
    pub auto_mode: bool,
    pub relax_mode: bool,
    pub sleep_mode: bool,
    pub fan_volume: FanVolume,
    pub fan_volume_auto: bool,
    pub fan_direction1: FanDirectionCapability,
    pub fan_direction2: FanDirectionCapability,
    pub fan_direction_auto: bool,
    pub outdoor_run_cond: OutdoorRunCond,
    pub status: AirConStatus,
}

impl AirCon {
    /// Create a unit of `kind` with no capabilities and unknown status.
    pub fn new(kind: DeviceKind, room_id: u16, unit_id: u8) -> Self {
        Self {
            room_id,
            unit_id,
            new_air_con: kind == DeviceKind::NewAirCon,
            bath_room: kind == DeviceKind::Bathroom,
            ..Default::default()
        }
    }

    /// Device kind derived from the `new_air_con` / `bath_room` discriminant.
    pub fn kind(&self) -> DeviceKind {
        if self.new_air_con {
            DeviceKind::NewAirCon
        } else if self.bath_room {
            DeviceKind::Bathroom
        } else {
            DeviceKind::AirCon
        }
    }

    pub fn key(&self) -> DeviceKey {
        DeviceKey::new(self.kind(), self.room_id, self.unit_id)
    }

    /// Stable identifier suitable for an external entity registry.
    pub fn unique_id(&self) -> String {
        format!("daikin_{}_{}_{}", self.kind(), self.room_id, self.unit_id)
    }

    /// Replace static capability/identity fields with those of `other`
    /// while keeping the live status. Empty names in `other` keep ours.
    pub fn apply_capabilities(&mut self, other: &AirCon) {
        let status = std::mem::take(&mut self.status);
        let name = std::mem::take(&mut self.name);
        let alias = std::mem::take(&mut self.alias);
        *self = other.clone();
        self.status = status;
        if self.name.is_empty() {
            self.name = name;
        }
        if self.alias.is_empty() {
            self.alias = alias;
        }
    }

    /// Whether the louvers can be positioned on both axes.
    pub fn has_fan_direction(&self) -> bool {
        self.fan_direction1 != FanDirectionCapability::Fix
            && self.fan_direction2 != FanDirectionCapability::Fix
    }

    /// Display name: the alias when set, else the name.
    pub fn display_name(&self) -> &str {
        if self.alias.is_empty() { &self.name } else { &self.alias }
    }
}
