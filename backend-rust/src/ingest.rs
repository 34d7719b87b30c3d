//! # ingest
//!
//! UDP ingestion: receives frames from on-board devices, decodes them and
//! fans the resulting events out to the display groups.
//!
//! ## Architecture
//! Runs as its own Tokio task, one datagram at a time in arrival order:
//!   1. Normalize: hex-text datagrams become bytes
//!   2. Decode the frame (route updates and station indices land in the store)
//!   3. Acknowledge route updates to `sender:ack_port`
//!   4. Publish the event to `telemetry-updates` or `route-updates`
//!
//! A bad packet or a receive error is logged and skipped; the loop only ends
//! on [`IngestHandle::shutdown`].

use std::borrow::Cow;
use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use transit_types::{Event, PayloadType};

use crate::channel::PushMessage;
use crate::hub::{BroadcastHub, Group};
use crate::protocol::{decode_frame, Ack, DecodedFrame};
use crate::state::SharedState;

/// Largest possible UDP payload.
const RECV_BUFFER_LEN: usize = 65_535;

/// Handle for the running ingestion task.
pub struct IngestHandle {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl IngestHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops the receive loop and waits for it to finish.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        self.task.await.map_err(|e| anyhow::anyhow!(e))
    }
}

/// Binds the UDP socket from the state's config and spawns the receive loop.
pub async fn start_ingest(state: SharedState) -> std::io::Result<IngestHandle> {
    let bind = SocketAddr::new(state.config.bind_addr, state.config.udp_port);
    let socket = UdpSocket::bind(bind).await?;
    let local_addr = socket.local_addr()?;
    info!(address = %local_addr, ack_port = state.config.ack_port, "ingest listening");

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        let mut buf = vec![0u8; RECV_BUFFER_LEN];
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                received = socket.recv_from(&mut buf) => match received {
                    Ok((len, src)) => process_datagram(&socket, &state, &buf[..len], src).await,
                    // Never stop on a receive error
                    Err(e) => warn!("ingest: UDP recv error: {e}"),
                },
            }
        }
        info!(address = %local_addr, "ingest stopped");
    });

    Ok(IngestHandle {
        local_addr,
        shutdown: shutdown_tx,
        task,
    })
}

async fn process_datagram(socket: &UdpSocket, state: &SharedState, data: &[u8], src: SocketAddr) {
    let frame = handle_datagram(state, data);

    if let Some(Ack { to, code }) = frame.ack {
        let target = SocketAddr::new(to.into(), state.config.ack_port);
        match socket.send_to(&code.datagram(), target).await {
            Ok(_) => debug!(%target, ?code, "acknowledged route update"),
            Err(e) => warn!(%target, "failed to send acknowledgment: {e}"),
        }
    }

    if let Some(e) = &frame.error {
        if e.is_noise() {
            debug!(%src, "dropped datagram: {e}");
        } else {
            warn!(%src, "dropped datagram: {e}");
        }
    }
}

/// Decodes one datagram and publishes its event. Returns the decode result
/// so the caller can acknowledge it.
pub fn handle_datagram(state: &SharedState, data: &[u8]) -> DecodedFrame {
    let data = normalize_datagram(data);
    let mut frame = decode_frame(&data, &state.decode_context());
    if let Some(event) = frame.payload.take() {
        publish(&state.hub, &event);
        frame.payload = Some(event);
    } else if frame.is_success() {
        debug!("frame without payload");
    }
    frame
}

/// A datagram made only of ASCII hex digits (whitespace allowed) is taken as
/// hex text; anything else is raw bytes.
pub fn normalize_datagram(data: &[u8]) -> Cow<'_, [u8]> {
    let is_hex_text = data.iter().any(u8::is_ascii_hexdigit)
        && data
            .iter()
            .all(|b| b.is_ascii_hexdigit() || b.is_ascii_whitespace());
    if !is_hex_text {
        return Cow::Borrowed(data);
    }
    let digits: Vec<u8> = data.iter().copied().filter(u8::is_ascii_hexdigit).collect();
    match hex::decode(digits) {
        Ok(bytes) => Cow::Owned(bytes),
        // odd digit count: let the frame decoder reject it as-is
        Err(_) => Cow::Borrowed(data),
    }
}

/// Route updates go to the route screens; everything else to telemetry.
pub fn group_for(event: &Event) -> Group {
    match event.payload_type() {
        PayloadType::RouteUpdate => Group::RouteUpdates,
        PayloadType::Telemetry
        | PayloadType::AuxiliaryTelemetry
        | PayloadType::DeviceConfiguration => Group::TelemetryUpdates,
    }
}

fn publish(hub: &BroadcastHub, event: &Event) -> usize {
    let group = group_for(event);
    let delivered = hub.send_to_group(group, &PushMessage::update(event.clone()));
    debug!(%group, delivered, data_type = ?event.payload_type(), "event published");
    delivered
}
