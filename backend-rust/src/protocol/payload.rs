//! Payload registry plus the telemetry and auxiliary decoders.
//!
//! The first payload byte selects the decoder. Route and device
//! configuration decoders live in their own modules.

use transit_types::{AuxRecord, AuxiliaryTelemetry, Event, PayloadType, Telemetry};

use crate::error::DecodeError;
use crate::registry::ClientRegistry;
use crate::route_store::{RouteStore, StationIndices};

use super::device_config::decode_device_configuration;
use super::reader::FieldReader;
use super::route::decode_route_update;

/// Shared state a decoder may read or update.
#[derive(Clone, Copy)]
pub struct DecodeContext<'a> {
    pub route: &'a RouteStore,
    pub clients: &'a ClientRegistry,
}

type DecodeFn = fn(&mut FieldReader<'_>, &DecodeContext<'_>) -> Result<Event, DecodeError>;

static DECODERS: &[(PayloadType, DecodeFn)] = &[
    (PayloadType::Telemetry, decode_telemetry as DecodeFn),
    (PayloadType::AuxiliaryTelemetry, decode_auxiliary as DecodeFn),
    (PayloadType::RouteUpdate, decode_route_update as DecodeFn),
    (PayloadType::DeviceConfiguration, decode_device_configuration as DecodeFn),
];

/// Decodes a payload body (the bytes after the type code).
pub fn decode_payload(
    type_code: u8,
    body: &[u8],
    ctx: &DecodeContext<'_>,
) -> Result<Event, DecodeError> {
    let decode = PayloadType::from_code(type_code)
        .and_then(|t| DECODERS.iter().find(|(code, _)| *code == t))
        .map(|(_, f)| *f)
        .ok_or(DecodeError::UnknownPacketType(type_code))?;
    decode(&mut FieldReader::new(body), ctx)
}

// ── Telemetry (0x10) ──────────────────────────────────────────────────────────

fn decode_telemetry(r: &mut FieldReader<'_>, ctx: &DecodeContext<'_>) -> Result<Event, DecodeError> {
    let mut telemetry = Telemetry {
        time: r.read_string()?,
        latitude: r.read_f32()?,
        longitude: r.read_f32()?,
        speed: r.read_i8()?,
        mode: r.read_byte()?,
        next_station_id: r.read_i32()?,
        next_station_distance: r.read_i32()?,
        next_station_side: r.read_byte()?,
        next_station_path_num: r.read_i8()?,
        door_state: r.read_byte()?,
        current_station_index: None,
        next_station_index: None,
    };

    let indices = StationIndices::resolve(&ctx.route.stops(), telemetry.next_station_id);
    ctx.route.set_indices_if_changed(indices);
    telemetry.current_station_index = indices.current;
    telemetry.next_station_index = indices.next;

    Ok(Event::Telemetry(telemetry))
}

// ── Auxiliary telemetry (0x11) ────────────────────────────────────────────────

fn decode_auxiliary(r: &mut FieldReader<'_>, _ctx: &DecodeContext<'_>) -> Result<Event, DecodeError> {
    let outside_temp = r.read_i8()?;
    let count = r.read_byte()?;
    let records = (0..count)
        .map(|_| {
            Ok(AuxRecord {
                id: r.read_i8()?,
                train: r.read_i8()?,
                temp: r.read_i8()?,
                passengers: r.read_i8()?,
            })
        })
        .collect::<Result<Vec<_>, DecodeError>>()?;

    Ok(Event::AuxiliaryTelemetry(AuxiliaryTelemetry { outside_temp, records }))
}
