//! # route_store
//!
//! Current stop list and current/next station indices, derived from route
//! updates and telemetry. Each datum lives in one cache slot with a fixed
//! expiry that is refreshed whenever the slot is written; an expired or
//! never-written slot reads as its default.
//!
//! Writes are compare-and-set: a value equal to what readers currently see is
//! not written again.

use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use transit_types::Stop;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

// ── Station indices ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StationIndices {
    pub current: Option<usize>,
    pub next: Option<usize>,
}

impl Default for StationIndices {
    /// Before any telemetry: first station behind, second ahead.
    fn default() -> Self {
        Self {
            current: Some(0),
            next: Some(1),
        }
    }
}

impl StationIndices {
    pub const UNKNOWN: Self = Self {
        current: None,
        next: None,
    };

    /// First stop with `next_station_id` becomes next; the one before it is
    /// current. Not found (or no stops) leaves both unset.
    pub fn resolve(stops: &[Stop], next_station_id: i32) -> Self {
        match stops.iter().position(|s| s.station_id == next_station_id) {
            Some(i) => Self {
                current: i.checked_sub(1),
                next: Some(i),
            },
            None => Self::UNKNOWN,
        }
    }
}

// ── Snapshot sent to screens on connect ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSnapshot {
    pub stops: Vec<Stop>,
    pub current_station_index: Option<usize>,
    pub next_station_index: Option<usize>,
}

// ── Store ─────────────────────────────────────────────────────────────────────

struct Cached<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Cached<T> {
    fn live(&self, now: Instant) -> Option<&T> {
        (now < self.expires_at).then_some(&self.value)
    }
}

#[derive(Default)]
struct Slots {
    stops: Option<Cached<Vec<Stop>>>,
    indices: Option<Cached<StationIndices>>,
    revision: u64,
}

pub struct RouteStore {
    ttl: Duration,
    slots: RwLock<Slots>,
}

impl Default for RouteStore {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl RouteStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: RwLock::new(Slots::default()),
        }
    }

    pub fn stops(&self) -> Vec<Stop> {
        let slots = self.slots.read();
        live_or_default(&slots.stops, Instant::now())
    }

    pub fn indices(&self) -> StationIndices {
        let slots = self.slots.read();
        live_or_default(&slots.indices, Instant::now())
    }

    /// Stops and indices read together, never torn across a write.
    pub fn snapshot(&self) -> RouteSnapshot {
        let now = Instant::now();
        let slots = self.slots.read();
        let indices: StationIndices = live_or_default(&slots.indices, now);
        RouteSnapshot {
            stops: live_or_default(&slots.stops, now),
            current_station_index: indices.current,
            next_station_index: indices.next,
        }
    }

    /// Returns true if the stored stop list was replaced.
    pub fn set_stops_if_changed(&self, stops: &[Stop]) -> bool {
        let now = Instant::now();
        let mut slots = self.slots.write();
        let unchanged = match slots.stops.as_ref().and_then(|c| c.live(now)) {
            Some(current) => current.as_slice() == stops,
            None => stops.is_empty(),
        };
        if unchanged {
            return false;
        }
        slots.stops = Some(Cached {
            value: stops.to_vec(),
            expires_at: now + self.ttl,
        });
        slots.revision += 1;
        true
    }

    /// Returns true if the stored indices were replaced.
    pub fn set_indices_if_changed(&self, indices: StationIndices) -> bool {
        let now = Instant::now();
        let mut slots = self.slots.write();
        let current: StationIndices = live_or_default(&slots.indices, now);
        if current == indices {
            return false;
        }
        slots.indices = Some(Cached {
            value: indices,
            expires_at: now + self.ttl,
        });
        slots.revision += 1;
        true
    }

    /// Number of accepted writes so far.
    pub fn revision(&self) -> u64 {
        self.slots.read().revision
    }
}

fn live_or_default<T: Clone + Default>(slot: &Option<Cached<T>>, now: Instant) -> T {
    slot.as_ref()
        .and_then(|c| c.live(now))
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stop(id: i32) -> Stop {
        Stop {
            station_id: id,
            name: format!("Station {id}"),
            arrive_time: "08:00:00".into(),
            depart_time: "08:01:00".into(),
            position: 0.0,
        }
    }

    #[test]
    fn defaults_before_first_write() {
        let store = RouteStore::default();
        assert!(store.stops().is_empty());
        assert_eq!(store.indices(), StationIndices { current: Some(0), next: Some(1) });
        let snap = store.snapshot();
        assert_eq!(snap.current_station_index, Some(0));
        assert_eq!(snap.next_station_index, Some(1));
    }

    #[test]
    fn same_stops_twice_mutates_once() {
        let store = RouteStore::default();
        let stops = vec![stop(1), stop(2)];
        assert!(store.set_stops_if_changed(&stops));
        assert!(!store.set_stops_if_changed(&stops));
        assert_eq!(store.revision(), 1);
        assert_eq!(store.stops(), stops);

        assert!(store.set_stops_if_changed(&[stop(1), stop(3)]));
        assert_eq!(store.revision(), 2);
    }

    #[test]
    fn indices_compare_and_set() {
        let store = RouteStore::default();
        assert!(!store.set_indices_if_changed(StationIndices::default()));
        assert!(store.set_indices_if_changed(StationIndices::UNKNOWN));
        assert!(!store.set_indices_if_changed(StationIndices::UNKNOWN));
        assert_eq!(store.indices(), StationIndices::UNKNOWN);
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn racing_writers_of_the_same_stops_have_one_winner() {
        let store = RouteStore::default();
        let stops = vec![stop(1), stop(2), stop(3)];

        let winners: usize = std::thread::scope(|scope| {
            let writers: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| store.set_stops_if_changed(&stops)))
                .collect();
            writers
                .into_iter()
                .map(|w| w.join().unwrap())
                .filter(|&won| won)
                .count()
        });

        assert_eq!(winners, 1);
        assert_eq!(store.revision(), 1);
        assert_eq!(store.stops(), stops);
    }

    #[test]
    fn snapshot_never_sees_a_partial_stop_list() {
        let store = RouteStore::default();
        let short = vec![stop(1), stop(2)];
        let long = vec![stop(3), stop(4), stop(5)];

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..200 {
                    let stops = if i % 2 == 0 { &short } else { &long };
                    store.set_stops_if_changed(stops);
                    let next = StationIndices::resolve(stops, stops[1].station_id);
                    store.set_indices_if_changed(next);
                }
            });
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..200 {
                        let snap = store.snapshot();
                        assert!(
                            snap.stops.is_empty() || snap.stops == short || snap.stops == long,
                            "{:?}",
                            snap.stops
                        );
                        assert!(matches!(snap.next_station_index, Some(1) | None));
                    }
                });
            }
        });

        // Indices resolve to the default pair every time, so only stop writes count.
        assert_eq!(store.revision(), 200);
    }

    #[test]
    fn resolve_station_indices() {
        let stops = vec![stop(1), stop(2), stop(3)];
        assert_eq!(
            StationIndices::resolve(&stops, 2),
            StationIndices { current: Some(0), next: Some(1) }
        );
        assert_eq!(
            StationIndices::resolve(&stops, 1),
            StationIndices { current: None, next: Some(0) }
        );
        assert_eq!(StationIndices::resolve(&stops, 9), StationIndices::UNKNOWN);
        assert_eq!(StationIndices::resolve(&[], 1), StationIndices::UNKNOWN);
    }

    #[test]
    fn first_match_wins() {
        let stops = vec![stop(5), stop(7), stop(5)];
        assert_eq!(StationIndices::resolve(&stops, 5).next, Some(0));
    }

    #[test]
    fn expired_slots_read_as_default() {
        let store = RouteStore::new(Duration::from_millis(20));
        store.set_stops_if_changed(&[stop(1)]);
        store.set_indices_if_changed(StationIndices::UNKNOWN);
        std::thread::sleep(Duration::from_millis(40));
        assert!(store.stops().is_empty());
        assert_eq!(store.indices(), StationIndices::default());

        // Writing the same value again repopulates an expired slot.
        assert!(store.set_stops_if_changed(&[stop(1)]));
        assert_eq!(store.stops().len(), 1);
    }
}
