//! Route update (0x20) decoding.

use chrono::DateTime;
use tracing::{debug, info};
use transit_types::{Event, RouteUpdate, Stop};

use crate::error::DecodeError;

use super::payload::DecodeContext;
use super::reader::FieldReader;

pub(super) fn decode_route_update(
    r: &mut FieldReader<'_>,
    ctx: &DecodeContext<'_>,
) -> Result<Event, DecodeError> {
    let train_number = r.read_string()?;
    let head_sign = r.read_string()?;
    let route_number = r.read_i8()?;
    let count = r.read_byte()? as usize;

    let positions = stop_positions(count);
    let mut stops = Vec::with_capacity(count);
    for position in positions {
        let station_id = r.read_i32()?;
        let name = r.read_string()?;
        let arrive = r.read_u32()?;
        let depart = r.read_u32()?;
        stops.push(Stop {
            station_id,
            name,
            arrive_time: clock_time(arrive),
            depart_time: clock_time(depart),
            position,
        });
    }

    if ctx.route.set_stops_if_changed(&stops) {
        info!(train = %train_number, stops = stops.len(), "route changed");
    } else {
        debug!(train = %train_number, "route unchanged");
    }

    Ok(Event::RouteUpdate(RouteUpdate {
        train_number,
        head_sign,
        route_number,
        stops,
    }))
}

/// Evenly spaced positions along a 0..=100 line, rounded to 3 decimals.
pub fn stop_positions(n: usize) -> Vec<f64> {
    if n <= 1 {
        return vec![0.0; n];
    }
    let last = (n - 1) as f64;
    (0..n)
        .map(|i| (100.0 * i as f64 / last * 1000.0).round() / 1000.0)
        .collect()
}

/// Unix epoch seconds as `HH:MM:SS` UTC.
pub fn clock_time(epoch_secs: u32) -> String {
    DateTime::from_timestamp(i64::from(epoch_secs), 0)
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_default()
}
