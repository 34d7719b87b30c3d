//! # transit-types
//!
//! Shared types for the on-board transit telemetry protocol.
//!
//! These types are used by:
//! - `screen-server`: decoding frames received from on-board devices and
//!   pushing the resulting events to display clients as JSON
//! - `device-sim`: encoding frames the way an on-board device does
//!
//! ## Wire conventions
//!
//! - All multi-byte integers and floats are big-endian.
//! - Strings carry a 2-byte byte-length prefix followed by UTF-8 bytes.
//! - Every frame starts with the marker `0xFFA00010` and carries a
//!   CRC-16/CCITT-FALSE checksum computed with the checksum field zeroed.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

pub mod crc;
pub mod encode;

pub use crc::{crc16_ccitt_false, frame_checksum};
pub use encode::{EncodeError, FrameBuilder, PayloadWriter};

// ── Framing constants ─────────────────────────────────────────────────────────

/// First four bytes of every frame.
pub const FRAME_MARKER: u32 = 0xFFA0_0010;
/// Marker + addresses + packet id + versions + size + checksum.
pub const HEADER_LEN: usize = 20;
/// Byte offset of the 2-byte checksum field.
pub const CHECKSUM_OFFSET: usize = 18;

/// Port devices listen on for acknowledgments (and send telemetry from).
pub const DEFAULT_CONTROL_PORT: u16 = 29789;

/// First byte of every acknowledgment datagram.
pub const ACK_MARKER: u8 = 0xFF;

/// Result code carried in the second byte of an acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum AckCode {
    Success = 0x00,
    Failure = 0x02,
}

impl AckCode {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x00 => Some(Self::Success),
            0x02 => Some(Self::Failure),
            _ => None,
        }
    }

    /// The two-byte datagram sent back to the device.
    pub fn datagram(self) -> [u8; 2] {
        [ACK_MARKER, self as u8]
    }
}

// ── Payload type codes ────────────────────────────────────────────────────────

/// One-byte code that opens every payload and selects its decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PayloadType {
    /// Position, speed and next-station report
    Telemetry = 0x10,
    /// Outside temperature plus per-wagon climate and passenger counts
    AuxiliaryTelemetry = 0x11,
    /// Full stop list of the current route
    RouteUpdate = 0x20,
    /// Device ids and orientation of every wagon in the consist
    DeviceConfiguration = 0x31,
}

impl PayloadType {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x10 => Some(Self::Telemetry),
            0x11 => Some(Self::AuxiliaryTelemetry),
            0x20 => Some(Self::RouteUpdate),
            0x31 => Some(Self::DeviceConfiguration),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Only route updates are confirmed back to the sending device.
    pub fn is_acknowledged(self) -> bool {
        matches!(self, Self::RouteUpdate)
    }
}

// ── Frame header ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameHeader {
    pub receiver: Ipv4Addr,
    pub sender: Ipv4Addr,
    /// 0 = no confirmation required
    pub packet_id: u16,
    pub major_version: u8,
    pub minor_version: u8,
    pub payload_size: u16,
    pub checksum: u16,
}

impl FrameHeader {
    pub fn requires_confirmation(&self) -> bool {
        self.packet_id != 0
    }
}

// ── Telemetry (0x10) ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Telemetry {
    /// Device wall-clock time as sent (free-form string)
    pub time: String,
    pub latitude: f32,
    pub longitude: f32,
    pub speed: i8,
    pub mode: u8,
    pub next_station_id: i32,
    /// Meters to the next station
    pub next_station_distance: i32,
    pub next_station_side: u8,
    pub next_station_path_num: i8,
    pub door_state: u8,
    /// Resolved against the cached stop list; not on the wire
    #[serde(default)]
    pub current_station_index: Option<usize>,
    /// Resolved against the cached stop list; not on the wire
    #[serde(default)]
    pub next_station_index: Option<usize>,
}

// ── Auxiliary telemetry (0x11) ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxRecord {
    pub id: i8,
    pub train: i8,
    pub temp: i8,
    pub passengers: i8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuxiliaryTelemetry {
    pub outside_temp: i8,
    pub records: Vec<AuxRecord>,
}

// ── Route update (0x20) ───────────────────────────────────────────────────────

/// One stop as shown on the displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stop {
    pub station_id: i32,
    pub name: String,
    /// `HH:MM:SS`, UTC
    pub arrive_time: String,
    /// `HH:MM:SS`, UTC
    pub depart_time: String,
    /// Evenly spaced 0..=100 along the route line
    pub position: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteUpdate {
    pub train_number: String,
    pub head_sign: String,
    pub route_number: i8,
    pub stops: Vec<Stop>,
}

/// A stop as it travels on the wire (epoch seconds, no position).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStopRecord {
    pub station_id: i32,
    pub name: String,
    pub arrive: u32,
    pub depart: u32,
}

/// A route update as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteUpdateRecord {
    pub train_number: String,
    pub head_sign: String,
    pub route_number: i8,
    pub stops: Vec<RouteStopRecord>,
}

// ── Device configuration (0x31) ───────────────────────────────────────────────

/// One device entry as it travels on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Packed `TTTTNNNWW` decimal: type, train, wagon
    pub raw_id: u32,
    /// 1 = wagon mounted reversed (left/right switches swap)
    pub direction: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEntry {
    pub raw_id: u32,
    pub device_type: u32,
    pub train_number: u32,
    pub wagon_number: u32,
    pub direction: u8,
    pub left_switch_ip: String,
    pub right_switch_ip: String,
}

/// A display client known to the server at decode time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedClient {
    pub ip: String,
    pub port: u16,
    /// Opaque channel identity
    pub channel: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfiguration {
    pub entries: Vec<DeviceEntry>,
    /// switch ip → client port → client
    pub devices: BTreeMap<String, BTreeMap<u16, ConnectedClient>>,
    /// Connected clients behind no known switch
    pub unclassified: Vec<ConnectedClient>,
}

// ── Event ─────────────────────────────────────────────────────────────────────

/// A decoded payload. Serialized with a `dataType` tag naming the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dataType")]
pub enum Event {
    Telemetry(Telemetry),
    AuxiliaryTelemetry(AuxiliaryTelemetry),
    RouteUpdate(RouteUpdate),
    DeviceConfiguration(DeviceConfiguration),
}

impl Event {
    pub fn payload_type(&self) -> PayloadType {
        match self {
            Self::Telemetry(_) => PayloadType::Telemetry,
            Self::AuxiliaryTelemetry(_) => PayloadType::AuxiliaryTelemetry,
            Self::RouteUpdate(_) => PayloadType::RouteUpdate,
            Self::DeviceConfiguration(_) => PayloadType::DeviceConfiguration,
        }
    }
}
