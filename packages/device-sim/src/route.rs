//! route.rs: route file loading
//!
//! A route file describes the stop list and the consist the simulated device
//! reports. Without `--route` the bundled `route.toml` is used.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use transit_types::{DeviceRecord, RouteStopRecord, RouteUpdateRecord};

#[derive(Debug, Clone, Deserialize)]
pub struct RouteFile {
    pub train_number: String,
    pub head_sign: String,
    pub route_number: i8,
    pub consist: Consist,
    pub stops: Vec<StopEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Consist {
    pub train: u32,
    pub wagons: Vec<WagonEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WagonEntry {
    pub wagon: u32,
    pub device_type: u32,
    #[serde(default)]
    pub direction: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopEntry {
    pub station_id: i32,
    pub name: String,
    pub arrive: u32,
    pub depart: u32,
}

impl RouteFile {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let text = match path {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("reading route file {}", path.display()))?,
            None => include_str!("../route.toml").to_string(),
        };
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let route: Self = toml::from_str(text).context("invalid route file")?;
        anyhow::ensure!(!route.stops.is_empty(), "route has no stops");
        anyhow::ensure!(route.consist.train < 1000, "train number must fit 3 digits");
        for w in &route.consist.wagons {
            anyhow::ensure!(w.wagon < 100, "wagon {} must fit 2 digits", w.wagon);
            anyhow::ensure!(
                w.device_type < 10_000,
                "device type {} must fit 4 digits",
                w.device_type
            );
        }
        Ok(route)
    }

    pub fn update_record(&self) -> RouteUpdateRecord {
        RouteUpdateRecord {
            train_number: self.train_number.clone(),
            head_sign: self.head_sign.clone(),
            route_number: self.route_number,
            stops: self
                .stops
                .iter()
                .map(|s| RouteStopRecord {
                    station_id: s.station_id,
                    name: s.name.clone(),
                    arrive: s.arrive,
                    depart: s.depart,
                })
                .collect(),
        }
    }

    /// Packs each wagon as the `TTTTNNNWW` raw id the server splits.
    pub fn device_records(&self) -> Vec<DeviceRecord> {
        self.consist
            .wagons
            .iter()
            .map(|w| DeviceRecord {
                raw_id: w.device_type * 100_000 + self.consist.train * 100 + w.wagon,
                direction: w.direction,
            })
            .collect()
    }
}
