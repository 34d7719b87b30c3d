//! journey.rs: a train moving along the route
//!
//! Each tick advances the train toward the next stop and produces the
//! telemetry and climate readings an on-board device would report.

use chrono::Utc;
use rand::Rng;
use transit_types::{AuxRecord, AuxiliaryTelemetry, Telemetry};

use crate::route::RouteFile;

/// Distance between consecutive stops, meters.
const LEG_LENGTH_M: i32 = 1_800;
/// Mode byte reported while in service.
const MODE_IN_SERVICE: u8 = 1;

pub struct Journey {
    route: RouteFile,
    /// Index of the stop the train is heading to
    next_stop: usize,
    distance_m: i32,
    dwell_ticks: u32,
}

impl Journey {
    pub fn new(route: RouteFile) -> Self {
        Self {
            next_stop: 1.min(route.stops.len() - 1),
            route,
            distance_m: LEG_LENGTH_M,
            dwell_ticks: 0,
        }
    }

    /// Advances one tick of `secs` seconds and returns the telemetry reading.
    pub fn tick(&mut self, secs: f32, rng: &mut impl Rng) -> Telemetry {
        let stopped = self.dwell_ticks > 0;
        let speed: i8 = if stopped { 0 } else { rng.gen_range(35..=60) };

        if stopped {
            self.dwell_ticks -= 1;
            if self.dwell_ticks == 0 {
                self.next_stop = (self.next_stop + 1) % self.route.stops.len();
                self.distance_m = LEG_LENGTH_M;
            }
        } else {
            let travelled = (f32::from(speed) / 3.6 * secs) as i32;
            self.distance_m = (self.distance_m - travelled).max(0);
            if self.distance_m == 0 {
                self.dwell_ticks = 3;
            }
        }

        let progress = 1.0 - self.distance_m as f32 / LEG_LENGTH_M as f32;
        Telemetry {
            time: Utc::now().format("%H:%M:%S").to_string(),
            latitude: 55.83 + 0.01 * (self.next_stop as f32 + progress),
            longitude: 37.58 + 0.004 * (self.next_stop as f32 + progress),
            speed,
            mode: MODE_IN_SERVICE,
            next_station_id: self.route.stops[self.next_stop].station_id,
            next_station_distance: self.distance_m,
            next_station_side: (self.next_stop % 2) as u8,
            next_station_path_num: 1,
            door_state: u8::from(stopped),
            current_station_index: None,
            next_station_index: None,
        }
    }

    pub fn climate(&self, rng: &mut impl Rng) -> AuxiliaryTelemetry {
        let train = wire_i8(self.route.consist.train);
        AuxiliaryTelemetry {
            outside_temp: rng.gen_range(-15..=25),
            records: self
                .route
                .consist
                .wagons
                .iter()
                .map(|w| AuxRecord {
                    id: wire_i8(w.wagon),
                    train,
                    temp: rng.gen_range(18..=24),
                    passengers: rng.gen_range(0..=120),
                })
                .collect(),
        }
    }
}

/// Auxiliary records carry ids as signed bytes; larger numbers saturate.
fn wire_i8(n: u32) -> i8 {
    i8::try_from(n).unwrap_or(i8::MAX)
}
