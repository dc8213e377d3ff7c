// MIT License - Copyright (c) 2026 Peter Wright
// DS-AIR gateway bridge

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Local};

use crate::constants::{
    ALL_ROOMS, CommandKind, DeviceKind, FanDirection, ProtocolVersion, StatusFields,
};
use crate::devices::{AirCon, AirConStatus, DeviceKey};
use crate::error::{DsAirError, Result};
use crate::protocol::frame::Frame;

/// Room type byte sent with explicit room ids on subbody version 1.
const ROOM_TYPE: u8 = 1;

/// Outgoing command payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// Session opener carrying local time as `YYYYMMDDhhmmss`.
    Handshake { time: String },
    /// Room-info request; [`ALL_ROOMS`] asks for every room.
    GetRoomInfo { room_ids: Vec<u16> },
    RecommendedIndoorTemp,
    /// Capability sweep for every unit of one device class.
    CapabilityQuery { kind: DeviceKind, units: Vec<DeviceKey> },
    /// Status query for a single unit. The unit's capabilities decide which
    /// fields are requested.
    QueryStatus { aircon: AirCon },
    /// Control request; only the present fields of `status` are sent.
    Control { key: DeviceKey, status: AirConStatus },
}

impl Param {
    pub fn handshake_at(now: DateTime<Local>) -> Self {
        Param::Handshake {
            time: now.format("%Y%m%d%H%M%S").to_string(),
        }
    }

    pub fn handshake() -> Self {
        Self::handshake_at(Local::now())
    }

    pub fn all_rooms() -> Self {
        Param::GetRoomInfo {
            room_ids: vec![ALL_ROOMS],
        }
    }

    /// Capability sweeps for `aircons`, split so each batch count fits its
    /// one-byte field. Empty input yields no batch.
    pub fn capability_queries(kind: DeviceKind, aircons: &[AirCon]) -> Vec<Self> {
        aircons
            .chunks(usize::from(u8::MAX))
            .map(|chunk| Param::CapabilityQuery {
                kind,
                units: chunk.iter().map(AirCon::key).collect(),
            })
            .collect()
    }

    pub fn target(&self) -> DeviceKind {
        match self {
            Param::Handshake { .. } | Param::GetRoomInfo { .. } => DeviceKind::System,
            Param::RecommendedIndoorTemp => DeviceKind::AirCon,
            Param::CapabilityQuery { kind, .. } => *kind,
            Param::QueryStatus { aircon } => aircon.kind(),
            Param::Control { key, .. } => key.kind,
        }
    }

    pub fn command(&self) -> CommandKind {
        match self {
            Param::Handshake { .. } => CommandKind::SysHandShake,
            Param::GetRoomInfo { .. } => CommandKind::SysGetRoomInfo,
            Param::RecommendedIndoorTemp => CommandKind::RecommendedIndoorTemp,
            Param::CapabilityQuery { .. } => CommandKind::CapabilityQuery,
            Param::QueryStatus { .. } => CommandKind::QueryStatus,
            Param::Control { .. } => CommandKind::Control,
        }
    }

    pub fn need_ack(&self) -> bool {
        true
    }

    pub fn subbody_version(&self) -> u8 {
        match self {
            Param::GetRoomInfo { .. } => 1,
            _ => 0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Param::Handshake { .. } => "handshake",
            Param::GetRoomInfo { .. } => "get_room_info",
            Param::RecommendedIndoorTemp => "recommended_indoor_temp",
            Param::CapabilityQuery { .. } => "capability_query",
            Param::QueryStatus { .. } => "query_status",
            Param::Control { .. } => "control",
        }
    }

    /// Fields requested by a status query for `aircon`.
    pub fn query_fields(aircon: &AirCon, version: ProtocolVersion) -> StatusFields {
        let mut flag = StatusFields::SWITCH
            | StatusFields::MODE
            | StatusFields::SETTED_TEMP
            | StatusFields::CURRENT_TEMP;
        if aircon.fan_volume.is_adjustable() {
            flag |= StatusFields::AIR_FLOW;
        }
        if version.is_new() {
            if aircon.has_fan_direction() {
                flag |= StatusFields::FAN_DIRECTION;
            }
            if aircon.new_air_con {
                flag |= StatusFields::HUMIDITY;
            } else {
                flag |= StatusFields::BREATHE;
            }
        }
        flag
    }

    /// Serialize the command-specific payload. Counts and room ids that do
    /// not fit their one-byte fields are rejected.
    pub fn encode_subbody(&self, version: ProtocolVersion) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        match self {
            Param::Handshake { time } => {
                buf.put_slice(time.as_bytes());
            }
            Param::GetRoomInfo { room_ids } => {
                buf.put_u8(count_byte("room_count", room_ids.len())?);
                for &id in room_ids {
                    buf.put_u16_le(id);
                    if self.subbody_version() == 1 && id != ALL_ROOMS {
                        buf.put_u8(ROOM_TYPE);
                    }
                }
            }
            Param::RecommendedIndoorTemp => {}
            Param::CapabilityQuery { units, .. } => {
                buf.put_u8(count_byte("unit_count", units.len())?);
                for key in units {
                    buf.put_u8(room_byte(key.room)?);
                    buf.put_u8(1);
                    buf.put_u8(key.unit);
                }
            }
            Param::QueryStatus { aircon } => {
                buf.put_u8(room_byte(aircon.room_id)?);
                buf.put_u8(aircon.unit_id);
                buf.put_u8(Self::query_fields(aircon, version).bits());
            }
            Param::Control { key, status } => {
                encode_control(&mut buf, key, status, version)?;
            }
        }
        Ok(buf.freeze())
    }

    /// Build the wire frame for this param with sequence number `sequence`.
    pub fn to_frame(&self, sequence: u32, version: ProtocolVersion) -> Result<Frame> {
        let target = self.target();
        Ok(Frame {
            subbody_version: self.subbody_version(),
            sequence,
            type_code: target.type_code(),
            device_id: target.device_id(),
            need_ack: self.need_ack(),
            command: self.command().code(),
            subbody: self.encode_subbody(version)?,
        })
    }
}

fn count_byte(field: &'static str, len: usize) -> Result<u8> {
    u8::try_from(len).map_err(|_| DsAirError::InvalidField {
        field,
        value: u32::try_from(len).unwrap_or(u32::MAX),
    })
}

/// Device addressing carries the room id in a single byte.
fn room_byte(room: u16) -> Result<u8> {
    u8::try_from(room).map_err(|_| DsAirError::InvalidField {
        field: "room_id",
        value: u32::from(room),
    })
}

fn encode_control(
    buf: &mut BytesMut,
    key: &DeviceKey,
    status: &AirConStatus,
    version: ProtocolVersion,
) -> Result<()> {
    let flag = status.present_fields() & StatusFields::wire_mask(key.kind, version);
    buf.put_u8(room_byte(key.room)?);
    buf.put_u8(key.unit);
    buf.put_u8(flag.bits());

    if let Some(v) = status.switch.filter(|_| flag.contains(StatusFields::SWITCH)) {
        buf.put_u8(v as u8);
    }
    if let Some(v) = status.mode.filter(|_| flag.contains(StatusFields::MODE)) {
        buf.put_u8(v as u8);
    }
    if let Some(v) = status.air_flow.filter(|_| flag.contains(StatusFields::AIR_FLOW)) {
        buf.put_u8(v as u8);
    }
    if let Some(v) = status.current_temp.filter(|_| flag.contains(StatusFields::CURRENT_TEMP)) {
        buf.put_u16_le(v);
    }
    if let Some(v) = status.setted_temp.filter(|_| flag.contains(StatusFields::SETTED_TEMP)) {
        buf.put_u16_le(v);
    }
    if flag.contains(StatusFields::FAN_DIRECTION) {
        let d1 = status.fan_direction1.unwrap_or(FanDirection::Invalid) as u8;
        let d2 = status.fan_direction2.unwrap_or(FanDirection::Invalid) as u8;
        buf.put_u8((d2 << 4) | (d1 & 0x0F));
    }
    if let Some(v) = status.humidity.filter(|_| flag.contains(StatusFields::HUMIDITY)) {
        buf.put_u8(v as u8);
    }
    if let Some(v) = status.breathe.filter(|_| flag.contains(StatusFields::BREATHE)) {
        buf.put_u8(v as u8);
    }
    Ok(())
}
