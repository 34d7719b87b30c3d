//! Drives the ingestion service over real loopback UDP sockets.

use std::net::Ipv4Addr;
use std::time::Duration;

use serde_json::Value;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::timeout;

use screen_server::channel::ChannelHandle;
use screen_server::hub::Group;
use screen_server::{start_ingest, AppState, IngestHandle, ServerConfig, SharedState};
use transit_types::encode::{encode_route_update, encode_telemetry};
use transit_types::{FrameBuilder, RouteStopRecord, RouteUpdateRecord, Telemetry};

const WAIT: Duration = Duration::from_secs(2);

struct Harness {
    state: SharedState,
    ingest: IngestHandle,
    /// Plays the on-board device: sends frames, receives acknowledgments.
    device: UdpSocket,
}

impl Harness {
    async fn start() -> Self {
        let device = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let config = ServerConfig {
            bind_addr: Ipv4Addr::LOCALHOST.into(),
            udp_port: 0,
            ack_port: device.local_addr().unwrap().port(),
            ..ServerConfig::default()
        };
        let state = AppState::shared(config);
        let ingest = start_ingest(state.clone()).await.unwrap();
        Self { state, ingest, device }
    }

    fn member(&self, group: Group) -> mpsc::Receiver<String> {
        let (handle, rx) = ChannelHandle::open();
        self.state.hub.join(group, &handle);
        rx
    }

    async fn send(&self, datagram: &[u8]) {
        self.device
            .send_to(datagram, self.ingest.local_addr())
            .await
            .unwrap();
    }

    async fn ack(&self) -> Option<[u8; 2]> {
        let mut buf = [0u8; 16];
        match timeout(Duration::from_millis(300), self.device.recv_from(&mut buf)).await {
            Ok(Ok((2, _))) => Some([buf[0], buf[1]]),
            Ok(Ok((n, _))) => panic!("unexpected {n}-byte acknowledgment"),
            Ok(Err(e)) => panic!("recv failed: {e}"),
            Err(_) => None,
        }
    }
}

fn frame(payload: &[u8]) -> Vec<u8> {
    FrameBuilder::new(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::LOCALHOST)
        .packet_id(1)
        .unwrap()
        .build(payload)
        .unwrap()
        .to_vec()
}

fn route_frame() -> Vec<u8> {
    let record = RouteUpdateRecord {
        train_number: "7040".into(),
        head_sign: "Пл. Ильича".into(),
        route_number: 14,
        stops: (1..=3)
            .map(|id| RouteStopRecord {
                station_id: id,
                name: format!("Станция {id}"),
                arrive: 1_700_000_000 + id as u32 * 120,
                depart: 1_700_000_030 + id as u32 * 120,
            })
            .collect(),
    };
    frame(&encode_route_update(&record).unwrap())
}

fn telemetry_frame(next_station_id: i32) -> Vec<u8> {
    let telemetry = Telemetry {
        time: "08:15:00".into(),
        latitude: 55.75,
        longitude: 37.61,
        speed: 38,
        mode: 1,
        next_station_id,
        next_station_distance: 400,
        next_station_side: 1,
        next_station_path_num: 2,
        door_state: 0,
        current_station_index: None,
        next_station_index: None,
    };
    frame(&encode_telemetry(&telemetry).unwrap())
}

async fn next_json(rx: &mut mpsc::Receiver<String>) -> Value {
    let text = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    serde_json::from_str(&text).unwrap()
}

#[tokio::test]
async fn route_update_is_stored_published_and_acknowledged() {
    let h = Harness::start().await;
    let mut routes = h.member(Group::RouteUpdates);
    let mut telemetry = h.member(Group::TelemetryUpdates);

    h.send(&route_frame()).await;

    assert_eq!(h.ack().await, Some([0xFF, 0x00]));
    let msg = next_json(&mut routes).await;
    assert_eq!(msg["type"], "update");
    assert_eq!(msg["message"]["dataType"], "RouteUpdate");
    assert_eq!(msg["message"]["headSign"], "Пл. Ильича");
    assert_eq!(msg["message"]["stops"][2]["position"], 100.0);
    assert!(telemetry.try_recv().is_err());

    let stops = h.state.route.stops();
    assert_eq!(stops.len(), 3);
    assert_eq!(stops[1].position, 50.0);

    h.ingest.shutdown().await.unwrap();
}

#[tokio::test]
async fn hex_text_telemetry_resolves_station_indices() {
    let h = Harness::start().await;
    let mut telemetry = h.member(Group::TelemetryUpdates);

    h.send(&route_frame()).await;
    assert_eq!(h.ack().await, Some([0xFF, 0x00]));

    let text = hex::encode(telemetry_frame(3));
    h.send(text.as_bytes()).await;

    let msg = next_json(&mut telemetry).await;
    assert_eq!(msg["message"]["dataType"], "Telemetry");
    assert_eq!(msg["message"]["time"], "08:15:00");
    assert_eq!(msg["message"]["currentStationIndex"], 1);
    assert_eq!(msg["message"]["nextStationIndex"], 2);

    let snapshot = h.state.route.snapshot();
    assert_eq!(snapshot.current_station_index, Some(1));
    assert_eq!(snapshot.next_station_index, Some(2));

    // telemetry is never acknowledged
    assert_eq!(h.ack().await, None);
    h.ingest.shutdown().await.unwrap();
}

#[tokio::test]
async fn corrupt_route_payload_is_nacked() {
    let h = Harness::start().await;
    let mut routes = h.member(Group::RouteUpdates);

    let mut payload = encode_route_update(&RouteUpdateRecord {
        train_number: "7040".into(),
        head_sign: "Депо".into(),
        route_number: 1,
        stops: vec![RouteStopRecord { station_id: 1, name: "A".into(), arrive: 0, depart: 0 }],
    })
    .unwrap()
    .to_vec();
    payload.truncate(payload.len() - 3);
    h.send(&frame(&payload)).await;

    assert_eq!(h.ack().await, Some([0xFF, 0x02]));
    assert!(routes.try_recv().is_err());
    assert!(h.state.route.stops().is_empty());
    h.ingest.shutdown().await.unwrap();
}

#[tokio::test]
async fn bad_packets_are_dropped_and_the_loop_survives() {
    let h = Harness::start().await;
    let mut routes = h.member(Group::RouteUpdates);

    let mut corrupted = route_frame();
    let last = corrupted.len() - 1;
    corrupted[last] ^= 0xFF;
    h.send(&corrupted).await;
    h.send(b"not a frame").await;
    h.send(&[]).await;
    // checksum failures are never acknowledged
    assert_eq!(h.ack().await, None);

    h.send(&route_frame()).await;
    assert_eq!(h.ack().await, Some([0xFF, 0x00]));
    assert_eq!(next_json(&mut routes).await["message"]["dataType"], "RouteUpdate");
    h.ingest.shutdown().await.unwrap();
}

#[tokio::test]
async fn header_only_frame_reaches_nobody() {
    let h = Harness::start().await;
    let mut telemetry = h.member(Group::TelemetryUpdates);
    let mut routes = h.member(Group::RouteUpdates);

    h.send(&frame(&[])).await;
    assert_eq!(h.ack().await, None);
    assert!(telemetry.try_recv().is_err());
    assert!(routes.try_recv().is_err());
    h.ingest.shutdown().await.unwrap();
}
