//! # device-sim
//!
//! On-board device simulator for the screen server.
//!
//! ## What it does
//!   1. Sends the route as a RouteUpdate frame and waits for the `0xFF 0x00`
//!      acknowledgment, retrying a few times
//!   2. Sends the consist's DeviceConfiguration once
//!   3. Streams Telemetry every tick and AuxiliaryTelemetry every few ticks
//!
//! Frames go out from the control port so acknowledgments come back to the
//! same socket. `--hex` sends every frame as hex text instead of raw bytes.

mod journey;
mod route;

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::UdpSocket;
use tokio::time::{interval, timeout};
use tracing::{debug, info, warn};
use transit_types::encode::{
    encode_auxiliary, encode_device_configuration, encode_route_update, encode_telemetry,
};
use transit_types::{AckCode, FrameBuilder, ACK_MARKER, DEFAULT_CONTROL_PORT};

use journey::Journey;
use route::RouteFile;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "device-sim", about = "Transit on-board device simulator")]
struct Args {
    /// Route file (TOML); the bundled route is used when omitted
    #[arg(short, long)]
    route: Option<PathBuf>,
    /// Screen server UDP address
    #[arg(long, default_value = "127.0.0.1:29789")]
    server: SocketAddr,
    /// Local port frames are sent from and acknowledgments arrive on.
    /// Real devices use 29789; on the server's own host start the server
    /// with SCREEN_ACK_PORT set to this port.
    #[arg(long, default_value_t = DEFAULT_CONTROL_PORT + 1)]
    control_port: u16,
    /// Sender address written into every frame header
    #[arg(long, default_value = "127.0.0.1")]
    sender_ip: Ipv4Addr,
    /// Seconds between telemetry frames
    #[arg(long, default_value = "1.0")]
    interval: f32,
    /// Send frames as hex text
    #[arg(long)]
    hex: bool,
    /// Stop after this many telemetry frames
    #[arg(long)]
    count: Option<u64>,
}

/// Attempts at delivering the route before streaming anyway.
const ROUTE_ATTEMPTS: u32 = 3;
const ACK_TIMEOUT: Duration = Duration::from_secs(2);
/// Auxiliary telemetry goes out once per this many ticks.
const AUX_EVERY: u64 = 5;

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "device_sim=info".into()),
        )
        .init();

    let args = Args::parse();
    anyhow::ensure!(args.interval > 0.0, "--interval must be positive");

    let route = RouteFile::load(args.route.as_deref())?;
    info!(
        "Device simulator starting: train {} ({}), {} stops, {} wagons",
        route.train_number,
        route.head_sign,
        route.stops.len(),
        route.consist.wagons.len()
    );

    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, args.control_port))
        .await
        .with_context(|| format!("binding control port {}", args.control_port))?;
    let device = Device {
        socket,
        server: args.server,
        builder: FrameBuilder::new(server_ipv4(args.server), args.sender_ip),
        hex: args.hex,
        next_packet_id: 1,
    };

    run(device, route, &args).await
}

async fn run(mut device: Device, route: RouteFile, args: &Args) -> anyhow::Result<()> {
    device.deliver_route(&route).await?;

    let config = encode_device_configuration(&route.device_records())?;
    device.send(&config, false).await?;

    let mut rng = rand::thread_rng();
    let mut journey = Journey::new(route);
    let mut ticker = interval(Duration::from_secs_f32(args.interval));
    let mut sent = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }

        let telemetry = journey.tick(args.interval, &mut rng);
        debug!(
            next = telemetry.next_station_id,
            distance = telemetry.next_station_distance,
            speed = telemetry.speed,
            "telemetry"
        );
        device.send(&encode_telemetry(&telemetry)?, false).await?;

        if sent % AUX_EVERY == 0 {
            let climate = journey.climate(&mut rng);
            device.send(&encode_auxiliary(&climate)?, false).await?;
        }

        sent += 1;
        if args.count.is_some_and(|n| sent >= n) {
            break;
        }
    }

    info!("sent {sent} telemetry frames, stopping");
    Ok(())
}

fn server_ipv4(addr: SocketAddr) -> Ipv4Addr {
    match addr {
        SocketAddr::V4(v4) => *v4.ip(),
        SocketAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
    }
}

// ── Device ────────────────────────────────────────────────────────────────────

struct Device {
    socket: UdpSocket,
    server: SocketAddr,
    builder: FrameBuilder,
    hex: bool,
    next_packet_id: u32,
}

impl Device {
    /// Frames `payload` and sends it. Confirmed frames carry a fresh
    /// packet id; the rest carry 0.
    async fn send(&mut self, payload: &[u8], confirmed: bool) -> anyhow::Result<()> {
        let packet_id = if confirmed {
            let id = self.next_packet_id;
            self.next_packet_id = if id >= u32::from(u16::MAX) { 1 } else { id + 1 };
            id
        } else {
            0
        };
        let frame = self.builder.packet_id(packet_id)?.build(payload)?;
        let datagram = if self.hex {
            hex::encode_upper(&frame).into_bytes()
        } else {
            frame.to_vec()
        };
        if let Err(e) = self.socket.send_to(&datagram, self.server).await {
            // never stop streaming over a send error
            warn!("UDP send to {} failed: {e}", self.server);
        }
        Ok(())
    }

    async fn deliver_route(&mut self, route: &RouteFile) -> anyhow::Result<()> {
        let payload = encode_route_update(&route.update_record())?;
        for attempt in 1..=ROUTE_ATTEMPTS {
            self.send(&payload, true).await?;
            match self.await_ack().await {
                Some(AckCode::Success) => {
                    info!("route acknowledged");
                    return Ok(());
                }
                Some(AckCode::Failure) => warn!("route rejected by server (attempt {attempt})"),
                None => warn!("no acknowledgment for route (attempt {attempt})"),
            }
        }
        warn!("streaming without a confirmed route");
        Ok(())
    }

    async fn await_ack(&self) -> Option<AckCode> {
        let mut buf = [0u8; 16];
        loop {
            let (len, from) = timeout(ACK_TIMEOUT, self.socket.recv_from(&mut buf))
                .await
                .ok()?
                .ok()?;
            match &buf[..len] {
                &[ACK_MARKER, code] => return AckCode::from_u8(code),
                _ => debug!(%from, len, "ignoring non-ack datagram"),
            }
        }
    }
}
