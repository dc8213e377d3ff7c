// MIT License - Copyright (c) 2026 Peter Wright
// DS-AIR gateway bridge

use bytes::Bytes;
use tracing::trace;

use crate::constants::{
    AirFlow, Breathe, CommandKind, DeviceKind, FanDirection, FanDirectionCapability, FanVolume,
    Humidity, Mode, OutdoorRunCond, ProtocolVersion, StatusFields, Switch,
};
use crate::devices::{AirCon, AirConStatus};
use crate::error::{DsAirError, GatewayErrorCode, Result};
use crate::protocol::frame::Frame;
use crate::protocol::reader::SubbodyReader;

/// A decoded gateway record with its frame metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayResult {
    pub sequence: u32,
    pub subbody_version: u8,
    /// `None` when the frame addressed a device id this crate does not model.
    pub target: Option<DeviceKind>,
    pub body: ResultBody,
}

/// Every record kind the gateway sends.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultBody {
    /// System ack. Carries the protocol generation when the payload is present.
    Ack { version: Option<ProtocolVersion> },
    CommandResponse { command_id: u32, code: u8 },
    TimeSync { time: u32 },
    ErrorCode(ErrorCodeRecord),
    Weather(Weather),
    Login { status: u8 },
    ChangePassword { status: u8 },
    RoomInfo(RoomInfo),
    ScheduleSetting(Bytes),
    ScheduleId(Bytes),
    ScheduleFinish(Bytes),
    Handshake { time: String },
    CommandTransfer(Bytes),
    /// Unsolicited partial status push.
    StatusChanged(StatusRecord),
    /// Reply to a status query.
    QueryStatus(StatusRecord),
    /// Tenths of a degree Celsius.
    RecommendedIndoorTemp { temp: u16, outdoor_temp: u16 },
    CapabilityQuery(Vec<AirCon>),
    ScenarioSetting(Bytes),
    /// Device or command this crate does not model.
    Unhandled { device_id: u32, command: u16 },
}

impl ResultBody {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ack { .. } => "ack",
            Self::CommandResponse { .. } => "command_response",
            Self::TimeSync { .. } => "time_sync",
            Self::ErrorCode(_) => "error_code",
            Self::Weather(_) => "weather",
            Self::Login { .. } => "login",
            Self::ChangePassword { .. } => "change_password",
            Self::RoomInfo(_) => "room_info",
            Self::ScheduleSetting(_) => "schedule_setting",
            Self::ScheduleId(_) => "schedule_id",
            Self::ScheduleFinish(_) => "schedule_finish",
            Self::Handshake { .. } => "handshake",
            Self::CommandTransfer(_) => "command_transfer",
            Self::StatusChanged(_) => "status_changed",
            Self::QueryStatus(_) => "query_status",
            Self::RecommendedIndoorTemp { .. } => "recommended_indoor_temp",
            Self::CapabilityQuery(_) => "capability_query",
            Self::ScenarioSetting(_) => "scenario_setting",
            Self::Unhandled { .. } => "unhandled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCodeRecord {
    pub device_id: u32,
    pub kind: Option<DeviceKind>,
    pub room: u8,
    pub unit: u8,
    pub code: GatewayErrorCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Weather {
    pub condition: u8,
    pub humidity: u8,
    pub temp: u16,
    pub wind_direction: u8,
    pub wind_speed: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub count: u16,
    pub rooms: Vec<RoomRecord>,
}

/// One room of a room-info record, before it is placed in the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomRecord {
    pub id: u16,
    pub name: String,
    pub alias: String,
    pub icon: String,
    pub units: Vec<UnitRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitRecord {
    pub device_id: u32,
    pub kind: Option<DeviceKind>,
    pub unit_id: u8,
    pub name: String,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRecord {
    pub kind: DeviceKind,
    pub room: u16,
    pub unit: u8,
    pub status: AirConStatus,
}

/// Decode the subbody of `frame` into a typed record.
///
/// `version` selects whether version-gated fields are read. Errors are
/// record-local: the frame boundary is already known, so the stream can
/// continue with the next frame.
pub fn decode_result(frame: &Frame, version: ProtocolVersion) -> Result<GatewayResult> {
    let target = frame.target();
    let command = target.and_then(|t| CommandKind::from_code(t, frame.command));
    let sub = &frame.subbody[..];

    let body = match (target, command) {
        (Some(DeviceKind::System), Some(cmd)) => decode_system(cmd, frame, sub)?,
        (Some(kind), Some(cmd)) if kind.is_air_con() => decode_device(kind, cmd, sub, version)?,
        _ => {
            trace!(
                "Ignoring frame device_id={} command={}",
                frame.device_id, frame.command
            );
            ResultBody::Unhandled {
                device_id: frame.device_id,
                command: frame.command,
            }
        }
    };

    Ok(GatewayResult {
        sequence: frame.sequence,
        subbody_version: frame.subbody_version,
        target,
        body,
    })
}

fn decode_system(cmd: CommandKind, frame: &Frame, sub: &[u8]) -> Result<ResultBody> {
    Ok(match cmd {
        CommandKind::SysAck => ResultBody::Ack {
            version: sub.first().map(|&b| ProtocolVersion::from_ack_byte(b)),
        },
        CommandKind::SysCmdRsp => {
            let mut r = SubbodyReader::new("command_response", sub);
            ResultBody::CommandResponse {
                command_id: r.read_u32()?,
                code: r.read_u8()?,
            }
        }
        CommandKind::SysTimeSync => {
            let mut r = SubbodyReader::new("time_sync", sub);
            ResultBody::TimeSync { time: r.read_u32()? }
        }
        CommandKind::SysErrCode => {
            let mut r = SubbodyReader::new("error_code", sub);
            let device_id = r.read_i32()? as u32;
            let room = r.read_u8()?;
            let unit = r.read_u8()?;
            ResultBody::ErrorCode(ErrorCodeRecord {
                device_id,
                kind: DeviceKind::from_device_id(device_id),
                room,
                unit,
                code: GatewayErrorCode(r.read_rest_lossy()),
            })
        }
        CommandKind::SysGetWeather => {
            let mut r = SubbodyReader::new("weather", sub);
            ResultBody::Weather(Weather {
                condition: r.read_u8()?,
                humidity: r.read_u8()?,
                temp: r.read_u16()?,
                wind_direction: r.read_u8()?,
                wind_speed: r.read_u8()?,
            })
        }
        CommandKind::SysLogin => {
            let mut r = SubbodyReader::new("login", sub);
            r.read_u8()?;
            ResultBody::Login { status: r.read_u8()? }
        }
        CommandKind::SysChangePw => {
            let mut r = SubbodyReader::new("change_password", sub);
            ResultBody::ChangePassword { status: r.read_u8()? }
        }
        CommandKind::SysGetRoomInfo => ResultBody::RoomInfo(decode_room_info(frame.subbody_version, sub)?),
        CommandKind::SysQueryScheduleSetting => ResultBody::ScheduleSetting(frame.subbody.clone()),
        CommandKind::SysQueryScheduleId => ResultBody::ScheduleId(frame.subbody.clone()),
        CommandKind::SysQueryScheduleFinish => ResultBody::ScheduleFinish(frame.subbody.clone()),
        CommandKind::SysHandShake => {
            let mut r = SubbodyReader::new("handshake", sub);
            ResultBody::Handshake { time: r.read_text(14, "time")? }
        }
        CommandKind::SysCmdTransfer => ResultBody::CommandTransfer(frame.subbody.clone()),
        CommandKind::Control
        | CommandKind::StatusChanged
        | CommandKind::QueryStatus
        | CommandKind::QueryScenarioSetting
        | CommandKind::RecommendedIndoorTemp
        | CommandKind::CapabilityQuery => ResultBody::Unhandled {
            device_id: frame.device_id,
            command: frame.command,
        },
    })
}

fn decode_device(
    kind: DeviceKind,
    cmd: CommandKind,
    sub: &[u8],
    version: ProtocolVersion,
) -> Result<ResultBody> {
    Ok(match cmd {
        CommandKind::StatusChanged => {
            ResultBody::StatusChanged(decode_status(kind, "status_changed", sub, version)?)
        }
        CommandKind::QueryStatus => {
            ResultBody::QueryStatus(decode_status(kind, "query_status", sub, version)?)
        }
        CommandKind::RecommendedIndoorTemp => {
            let mut r = SubbodyReader::new("recommended_indoor_temp", sub);
            ResultBody::RecommendedIndoorTemp {
                temp: r.read_u16()?,
                outdoor_temp: r.read_u16()?,
            }
        }
        CommandKind::CapabilityQuery => {
            ResultBody::CapabilityQuery(decode_capabilities(kind, sub, version)?)
        }
        CommandKind::QueryScenarioSetting => {
            ResultBody::ScenarioSetting(Bytes::copy_from_slice(sub))
        }
        _ => ResultBody::Unhandled {
            device_id: kind.device_id(),
            command: cmd.code(),
        },
    })
}

fn decode_room_info(subbody_version: u8, sub: &[u8]) -> Result<RoomInfo> {
    let mut r = SubbodyReader::new("room_info", sub);
    let count = r.read_u16()?;
    let room_count = r.read_u8()?;

    let mut rooms = Vec::with_capacity(room_count as usize);
    for _ in 0..room_count {
        let mut room = RoomRecord {
            id: r.read_u16()?,
            ..Default::default()
        };
        // 1: room names only, 2: unit names only, anything else: both
        let ver_flag = if subbody_version == 1 { r.read_u8()? } else { 1 };
        if ver_flag != 2 {
            room.name = r.read_utf("room name")?;
            room.alias = r.read_utf("room alias")?;
            room.icon = r.read_utf("room icon")?;
        }

        let device_count = r.read_u16()?;
        for _ in 0..device_count {
            let device_id = r.read_u32()?;
            let kind = DeviceKind::from_device_id(device_id);
            let unit_count = r.read_u16()?;
            for unit_id in 0..unit_count {
                let unit_id = u8::try_from(unit_id).map_err(|_| DsAirError::InvalidField {
                    field: "unit_count",
                    value: u32::from(unit_count),
                })?;
                let mut unit = UnitRecord {
                    device_id,
                    kind,
                    unit_id,
                    ..Default::default()
                };
                if ver_flag != 1 {
                    unit.name = r.read_utf("unit name")?;
                    unit.alias = r.read_utf("unit alias")?;
                }
                room.units.push(unit);
            }
        }
        rooms.push(room);
    }

    Ok(RoomInfo { count, rooms })
}

fn invalid(field: &'static str, value: u8) -> DsAirError {
    DsAirError::InvalidField {
        field,
        value: value as u32,
    }
}

fn decode_status(
    kind: DeviceKind,
    record: &'static str,
    sub: &[u8],
    version: ProtocolVersion,
) -> Result<StatusRecord> {
    let mut r = SubbodyReader::new(record, sub);
    let room = r.read_u8()? as u16;
    let unit = r.read_u8()?;
    let flag = StatusFields::from_bits_retain(r.read_u8()?) & StatusFields::wire_mask(kind, version);

    let mut status = AirConStatus::default();
    if flag.contains(StatusFields::SWITCH) {
        let v = r.read_u8()?;
        status.switch = Some(Switch::from_u8(v).ok_or_else(|| invalid("switch", v))?);
    }
    if flag.contains(StatusFields::MODE) {
        let v = r.read_u8()?;
        status.mode = Some(Mode::from_u8(v).ok_or_else(|| invalid("mode", v))?);
    }
    if flag.contains(StatusFields::AIR_FLOW) {
        let v = r.read_u8()?;
        status.air_flow = Some(AirFlow::from_u8(v).ok_or_else(|| invalid("air_flow", v))?);
    }
    if flag.contains(StatusFields::CURRENT_TEMP) {
        status.current_temp = Some(r.read_u16()?);
    }
    if flag.contains(StatusFields::SETTED_TEMP) {
        status.setted_temp = Some(r.read_u16()?);
    }
    if flag.contains(StatusFields::FAN_DIRECTION) {
        let v = r.read_u8()?;
        let low = v & 0x0F;
        let high = v >> 4;
        status.fan_direction1 =
            Some(FanDirection::from_u8(low).ok_or_else(|| invalid("fan_direction1", low))?);
        status.fan_direction2 =
            Some(FanDirection::from_u8(high).ok_or_else(|| invalid("fan_direction2", high))?);
    }
    if flag.contains(StatusFields::HUMIDITY) {
        let v = r.read_u8()?;
        status.humidity = Some(Humidity::from_u8(v).ok_or_else(|| invalid("humidity", v))?);
    }
    if flag.contains(StatusFields::BREATHE) {
        let v = r.read_u8()?;
        status.breathe = Some(Breathe::from_u8(v).ok_or_else(|| invalid("breathe", v))?);
    }

    Ok(StatusRecord {
        kind,
        room,
        unit,
        status,
    })
}

fn bit(flag: u8, n: u8) -> bool {
    (flag >> n) & 1 == 1
}

fn decode_capabilities(
    kind: DeviceKind,
    sub: &[u8],
    version: ProtocolVersion,
) -> Result<Vec<AirCon>> {
    let mut r = SubbodyReader::new("capability_query", sub);
    let room_count = r.read_u8()?;
    let mut aircons = Vec::new();

    for _ in 0..room_count {
        let room_id = r.read_u8()? as u16;
        let unit_count = r.read_u8()?;
        for _ in 0..unit_count {
            let unit_id = r.read_u8()?;
            let mut ac = AirCon::new(kind, room_id, unit_id);

            let flag = r.read_u8()?;
            ac.fan_volume = FanVolume::from_bits(flag >> 5);
            ac.dry_mode = bit(flag, 4);
            ac.auto_mode = bit(flag, 3);
            ac.heat_mode = bit(flag, 2);
            ac.cool_mode = bit(flag, 1);
            ac.ventilation_mode = bit(flag, 0);

            if version.is_new() {
                let flag = r.read_u8()?;
                ac.fan_direction1 = step_capability(bit(flag, 0));
                ac.fan_direction2 = step_capability(bit(flag, 1));
                ac.fan_direction_auto = bit(flag, 2);
                ac.fan_volume_auto = bit(flag, 3);

                let flag = r.read_u8()?;
                ac.outdoor_run_cond = OutdoorRunCond::from_bits(flag >> 6);
                ac.more_dry_mode = bit(flag, 4);
                ac.pre_heat_mode = bit(flag, 3);
                ac.auto_dry_mode = bit(flag, 2);
                ac.relax_mode = bit(flag, 1);
                ac.sleep_mode = bit(flag, 0);
            } else {
                r.read_u8()?;
            }
            aircons.push(ac);
        }
    }

    Ok(aircons)
}

fn step_capability(step5: bool) -> FanDirectionCapability {
    if step5 {
        FanDirectionCapability::Step5
    } else {
        FanDirectionCapability::Fix
    }
}
