// MIT License - Copyright (c) 2026 Peter Wright
// DS-AIR gateway bridge

use std::fmt;

use bitflags::bitflags;
use serde::Serialize;

/// Protocol framing bytes.
pub const FRAME_MAGIC: u8 = 0x02; // First byte of every frame
pub const FRAME_TAIL: u8 = 0x03; // Last byte of every frame
pub const FRAME_RESERVED: u8 = 0x0D; // Offset 3 in outgoing frames

/// Bytes between the length field and the subbody.
pub const FRAME_HEADER_LEN: usize = 16;
/// Magic + length + tail.
pub const FRAME_OVERHEAD: usize = 4;

/// Device-kind code shared by every target in the discriminant pair.
pub const DEVICE_TYPE_CODE: u8 = 8;

/// Room id meaning "every room" in a room-info request.
pub const ALL_ROOMS: u16 = 0xFFFF;

/// Default TCP port of the gateway control channel.
pub const DEFAULT_PORT: u16 = 8008;

/// Target of a frame: the `(kind-code, device-id)` discriminant pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DeviceKind {
    System,
    AirCon,
    Hd,
    Geothermic,
    Ventilation,
    NewAirCon,
    Bathroom,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 7] = [
        Self::System,
        Self::AirCon,
        Self::Hd,
        Self::Geothermic,
        Self::Ventilation,
        Self::NewAirCon,
        Self::Bathroom,
    ];

    /// The device id half of the discriminant pair.
    pub fn device_id(self) -> u32 {
        match self {
            Self::System => 0,
            Self::AirCon => 18,
            Self::Hd => 19,
            Self::Geothermic => 21,
            Self::Ventilation => 22,
            Self::NewAirCon => 23,
            Self::Bathroom => 24,
        }
    }

    /// The kind-code half of the discriminant pair.
    pub fn type_code(self) -> u8 {
        DEVICE_TYPE_CODE
    }

    /// Look up a device kind by its wire id. Unmodelled ids return `None`.
    pub fn from_device_id(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.device_id() == id)
    }

    /// Kinds that carry an [`AirCon`](crate::devices::AirCon) record.
    pub fn is_air_con(self) -> bool {
        matches!(self, Self::AirCon | Self::NewAirCon | Self::Bathroom)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::AirCon => "aircon",
            Self::Hd => "hd",
            Self::Geothermic => "geothermic",
            Self::Ventilation => "ventilation",
            Self::NewAirCon => "new_aircon",
            Self::Bathroom => "bathroom",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command-kind codes. System and device targets use separate code spaces,
/// so the same number can mean different things depending on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    SysAck,
    SysCmdRsp,
    SysTimeSync,
    SysErrCode,
    SysGetWeather,
    SysLogin,
    SysChangePw,
    SysGetRoomInfo,
    SysQueryScheduleSetting,
    SysQueryScheduleId,
    SysHandShake,
    SysCmdTransfer,
    SysQueryScheduleFinish,
    Control,
    StatusChanged,
    QueryStatus,
    QueryScenarioSetting,
    RecommendedIndoorTemp,
    CapabilityQuery,
}

impl CommandKind {
    pub fn code(self) -> u16 {
        match self {
            Self::SysAck => 1,
            Self::SysCmdRsp => 2,
            Self::SysTimeSync => 3,
            Self::SysErrCode => 4,
            Self::SysGetWeather => 5,
            Self::SysLogin => 6,
            Self::SysChangePw => 7,
            Self::SysGetRoomInfo => 8,
            Self::SysQueryScheduleSetting => 9,
            Self::SysQueryScheduleId => 10,
            Self::SysHandShake => 11,
            Self::SysCmdTransfer => 12,
            Self::SysQueryScheduleFinish => 13,
            Self::Control => 3,
            Self::StatusChanged => 10,
            Self::QueryStatus => 11,
            Self::QueryScenarioSetting => 16,
            Self::RecommendedIndoorTemp => 22,
            Self::CapabilityQuery => 23,
        }
    }

    /// Resolve a system-targeted command code.
    pub fn system_from_code(code: u16) -> Option<Self> {
        Some(match code {
            1 => Self::SysAck,
            2 => Self::SysCmdRsp,
            3 => Self::SysTimeSync,
            4 => Self::SysErrCode,
            5 => Self::SysGetWeather,
            6 => Self::SysLogin,
            7 => Self::SysChangePw,
            8 => Self::SysGetRoomInfo,
            9 => Self::SysQueryScheduleSetting,
            10 => Self::SysQueryScheduleId,
            11 => Self::SysHandShake,
            12 => Self::SysCmdTransfer,
            13 => Self::SysQueryScheduleFinish,
            _ => return None,
        })
    }

    /// Resolve a device-targeted command code.
    pub fn device_from_code(code: u16) -> Option<Self> {
        Some(match code {
            3 => Self::Control,
            10 => Self::StatusChanged,
            11 => Self::QueryStatus,
            16 => Self::QueryScenarioSetting,
            22 => Self::RecommendedIndoorTemp,
            23 => Self::CapabilityQuery,
            _ => return None,
        })
    }

    /// Resolve a command code in the code space of `target`.
    pub fn from_code(target: DeviceKind, code: u16) -> Option<Self> {
        if target == DeviceKind::System {
            Self::system_from_code(code)
        } else {
            Self::device_from_code(code)
        }
    }

    pub fn is_system(self) -> bool {
        !matches!(
            self,
            Self::Control
                | Self::StatusChanged
                | Self::QueryStatus
                | Self::QueryScenarioSetting
                | Self::RecommendedIndoorTemp
                | Self::CapabilityQuery
        )
    }
}

/// Negotiated protocol generation. Starts `Old` and moves to `New` once a
/// system ack carrying version byte `2` is seen; never moves back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ProtocolVersion {
    #[default]
    Old,
    New,
}

impl ProtocolVersion {
    pub fn from_ack_byte(b: u8) -> Self {
        if b == 2 { Self::New } else { Self::Old }
    }

    pub fn is_new(self) -> bool {
        self == Self::New
    }
}

bitflags! {
    /// Presence flags leading every status / control body, LSB first.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusFields: u8 {
        const SWITCH        = 0b0000_0001;
        const MODE          = 0b0000_0010;
        const AIR_FLOW      = 0b0000_0100;
        const CURRENT_TEMP  = 0b0000_1000;
        const SETTED_TEMP   = 0b0001_0000;
        /// New protocol only.
        const FAN_DIRECTION = 0b0010_0000;
        /// New protocol, new-aircon targets only.
        const HUMIDITY      = 0b0100_0000;
        /// New protocol, non-new-aircon targets only.
        const BREATHE       = 0b1000_0000;
    }
}

impl StatusFields {
    /// Fields that are only exchanged once the new protocol is negotiated.
    pub const VERSION_GATED: Self = Self::FAN_DIRECTION
        .union(Self::HUMIDITY)
        .union(Self::BREATHE);

    /// Fields actually carried on the wire for `kind` under `version`.
    pub fn wire_mask(kind: DeviceKind, version: ProtocolVersion) -> Self {
        if !version.is_new() {
            return Self::all().difference(Self::VERSION_GATED);
        }
        if kind == DeviceKind::NewAirCon {
            Self::all().difference(Self::BREATHE)
        } else {
            Self::all().difference(Self::HUMIDITY)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Switch {
    Off = 0,
    On = 1,
}

impl Switch {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Off),
            1 => Some(Self::On),
            _ => None,
        }
    }
}

/// Operating mode of an indoor unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Mode {
    Cool = 0,
    Dry = 1,
    Ventilation = 2,
    Auto = 3,
    Heat = 4,
    AutoDry = 5,
    Relax = 6,
    Sleep = 7,
    PreHeat = 8,
    MoreDry = 9,
}

impl Mode {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::Cool,
            1 => Self::Dry,
            2 => Self::Ventilation,
            3 => Self::Auto,
            4 => Self::Heat,
            5 => Self::AutoDry,
            6 => Self::Relax,
            7 => Self::Sleep,
            8 => Self::PreHeat,
            9 => Self::MoreDry,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cool => "cool",
            Self::Dry => "dry",
            Self::Ventilation => "ventilation",
            Self::Auto => "auto",
            Self::Heat => "heat",
            Self::AutoDry => "auto_dry",
            Self::Relax => "relax",
            Self::Sleep => "sleep",
            Self::PreHeat => "pre_heat",
            Self::MoreDry => "more_dry",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        (0..=9).filter_map(Self::from_u8).find(|m| m.as_str() == s)
    }
}

/// Fan speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AirFlow {
    SuperWeak = 0,
    Weak = 1,
    Middle = 2,
    Strong = 3,
    SuperStrong = 4,
    Auto = 5,
}

impl AirFlow {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::SuperWeak,
            1 => Self::Weak,
            2 => Self::Middle,
            3 => Self::Strong,
            4 => Self::SuperStrong,
            5 => Self::Auto,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuperWeak => "super_weak",
            Self::Weak => "weak",
            Self::Middle => "middle",
            Self::Strong => "strong",
            Self::SuperStrong => "super_strong",
            Self::Auto => "auto",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        (0..=5).filter_map(Self::from_u8).find(|m| m.as_str() == s)
    }
}

/// Fresh-air intake level (non-new-aircon units).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Breathe {
    Close = 0,
    Weak = 1,
    Strong = 2,
}

impl Breathe {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Close),
            1 => Some(Self::Weak),
            2 => Some(Self::Strong),
            _ => None,
        }
    }
}

/// Louver position on one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FanDirection {
    Invalid = 0,
    P0 = 1,
    P1 = 2,
    P2 = 3,
    P3 = 4,
    P4 = 5,
    Auto = 6,
    Swing = 7,
}

impl FanDirection {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::Invalid,
            1 => Self::P0,
            2 => Self::P1,
            3 => Self::P2,
            4 => Self::P3,
            5 => Self::P4,
            6 => Self::Auto,
            7 => Self::Swing,
            _ => return None,
        })
    }
}

/// Target humidity class (new-aircon units).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Humidity {
    Close = 0,
    Step1 = 1,
    Step2 = 2,
    Step3 = 3,
}

impl Humidity {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Close),
            1 => Some(Self::Step1),
            2 => Some(Self::Step2),
            3 => Some(Self::Step3),
            _ => None,
        }
    }
}

/// Louver capability of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum FanDirectionCapability {
    #[default]
    Fix,
    Step5,
}

/// Fan-volume capability, a 3-bit field of the capability record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum FanVolume {
    #[default]
    No,
    Fix,
    Step2,
    Step3,
    Step4,
    Step5,
    Step7,
    Stepless,
}

impl FanVolume {
    pub fn from_bits(v: u8) -> Self {
        match v & 0x7 {
            0 => Self::No,
            1 => Self::Fix,
            2 => Self::Step2,
            3 => Self::Step3,
            4 => Self::Step4,
            5 => Self::Step5,
            6 => Self::Step7,
            _ => Self::Stepless,
        }
    }

    pub fn is_adjustable(self) -> bool {
        self != Self::No
    }
}

/// Outdoor unit run condition, a 2-bit field of the capability record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum OutdoorRunCond {
    #[default]
    Vent,
    Cool,
    Heat,
    CoolHeat,
}

impl OutdoorRunCond {
    pub fn from_bits(v: u8) -> Self {
        match v & 0x3 {
            0 => Self::Vent,
            1 => Self::Cool,
            2 => Self::Heat,
            _ => Self::CoolHeat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_kind_ids() {
        for kind in DeviceKind::ALL {
            assert_eq!(DeviceKind::from_device_id(kind.device_id()), Some(kind));
            assert_eq!(kind.type_code(), 8);
        }
        assert_eq!(DeviceKind::from_device_id(25), None);
        assert!(DeviceKind::Bathroom.is_air_con());
        assert!(!DeviceKind::Geothermic.is_air_con());
    }

    #[test]
    fn test_command_code_spaces() {
        assert_eq!(CommandKind::from_code(DeviceKind::System, 3), Some(CommandKind::SysTimeSync));
        assert_eq!(CommandKind::from_code(DeviceKind::AirCon, 3), Some(CommandKind::Control));
        assert_eq!(CommandKind::from_code(DeviceKind::AirCon, 10), Some(CommandKind::StatusChanged));
        assert_eq!(CommandKind::from_code(DeviceKind::System, 10), Some(CommandKind::SysQueryScheduleId));
        assert_eq!(CommandKind::from_code(DeviceKind::System, 99), None);

        for code in 1..=13 {
            let cmd = CommandKind::system_from_code(code).unwrap();
            assert!(cmd.is_system());
            assert_eq!(cmd.code(), code);
        }
    }

    #[test]
    fn test_protocol_version_from_ack() {
        assert_eq!(ProtocolVersion::from_ack_byte(2), ProtocolVersion::New);
        assert_eq!(ProtocolVersion::from_ack_byte(1), ProtocolVersion::Old);
        assert_eq!(ProtocolVersion::default(), ProtocolVersion::Old);
    }

    #[test]
    fn test_wire_mask() {
        let old = StatusFields::wire_mask(DeviceKind::AirCon, ProtocolVersion::Old);
        assert!(!old.intersects(StatusFields::VERSION_GATED));
        assert!(old.contains(StatusFields::SETTED_TEMP));

        let new_aircon = StatusFields::wire_mask(DeviceKind::NewAirCon, ProtocolVersion::New);
        assert!(new_aircon.contains(StatusFields::HUMIDITY));
        assert!(!new_aircon.contains(StatusFields::BREATHE));

        let bath = StatusFields::wire_mask(DeviceKind::Bathroom, ProtocolVersion::New);
        assert!(bath.contains(StatusFields::BREATHE | StatusFields::FAN_DIRECTION));
        assert!(!bath.contains(StatusFields::HUMIDITY));
    }

    #[test]
    fn test_enum_lookups() {
        assert_eq!(Mode::from_u8(9), Some(Mode::MoreDry));
        assert_eq!(Mode::from_u8(10), None);
        assert_eq!(Mode::from_name("pre_heat"), Some(Mode::PreHeat));
        assert_eq!(AirFlow::from_name("auto"), Some(AirFlow::Auto));
        assert_eq!(FanDirection::from_u8(7), Some(FanDirection::Swing));
        assert_eq!(FanDirection::from_u8(8), None);
        assert_eq!(FanVolume::from_bits(0b1000_0001), FanVolume::Fix);
        assert_eq!(OutdoorRunCond::from_bits(3), OutdoorRunCond::CoolHeat);
    }
}
