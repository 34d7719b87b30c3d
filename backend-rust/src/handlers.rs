use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::channel::{probe_switch, ChannelHandle, PushMessage};
use crate::hub::Group;
use crate::state::SharedState;

// ── Router ────────────────────────────────────────────────────────────────────

/// Serve with `into_make_service_with_connect_info::<SocketAddr>()`; the
/// telemetry screen registers clients by peer address.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/ws/route", get(ws_route))
        .route("/ws/telemetry", get(ws_telemetry))
        .route("/ws/redirect", get(ws_redirect))
        .route("/api/route", get(route_snapshot))
        .route("/api/redirect", post(redirect))
        .route("/api/clients", get(list_clients))
        .route("/api/clients/:addr/devices", get(client_devices))
        .route("/health", get(|| async { "screen-server ok" }))
        .with_state(state)
}

// ── Display screens ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Route,
    Telemetry,
    Redirect,
}

impl Screen {
    fn groups(self) -> &'static [Group] {
        match self {
            Screen::Route => &[Group::RouteUpdates],
            Screen::Telemetry => &[Group::TelemetryUpdates, Group::RouteUpdates],
            Screen::Redirect => &[Group::Redirect],
        }
    }

    /// Route and telemetry screens start from the current route.
    fn wants_snapshot(self) -> bool {
        matches!(self, Screen::Route | Screen::Telemetry)
    }

    /// Telemetry screens sit behind wagon switches and answer probes.
    fn registers(self) -> bool {
        self == Screen::Telemetry
    }
}

async fn ws_route(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<SharedState>,
) -> Response {
    ws.on_upgrade(move |socket| serve_screen(socket, state, Screen::Route, peer))
}

async fn ws_telemetry(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<SharedState>,
) -> Response {
    ws.on_upgrade(move |socket| serve_screen(socket, state, Screen::Telemetry, peer))
}

async fn ws_redirect(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<SharedState>,
) -> Response {
    ws.on_upgrade(move |socket| serve_screen(socket, state, Screen::Redirect, peer))
}

async fn serve_screen(mut socket: WebSocket, state: SharedState, screen: Screen, peer: SocketAddr) {
    let (handle, mut outbox) = ChannelHandle::open();
    info!(%peer, ?screen, channel = %handle.id(), "screen connected");

    for &group in screen.groups() {
        state.hub.join(group, &handle);
    }
    if screen.registers() {
        state.clients.register(peer, handle.clone());
    }
    if screen.wants_snapshot() {
        if let Err(e) = handle.send(&PushMessage::Snapshot(state.route.snapshot())) {
            warn!(%peer, "failed to queue route snapshot: {e}");
        }
    }

    loop {
        tokio::select! {
            Some(text) = outbox.recv() => {
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            message = socket.recv() => match message {
                Some(Ok(Message::Text(text))) => {
                    if handle.resolve_reply(text).is_err() {
                        debug!(%peer, "unsolicited message ignored");
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    warn!(%peer, "websocket error: {e}");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    state.hub.leave_all(handle.id());
    if screen.registers() {
        state.clients.unregister_channel(&peer, handle.id());
    }
    handle.close();
    info!(%peer, ?screen, channel = %handle.id(), "screen disconnected");
}

// ── HTTP ──────────────────────────────────────────────────────────────────────

async fn route_snapshot(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.route.snapshot())
}

#[derive(Debug, Deserialize)]
struct RedirectRequest {
    url: String,
}

async fn redirect(
    State(state): State<SharedState>,
    Json(req): Json<RedirectRequest>,
) -> impl IntoResponse {
    let delivered = state
        .hub
        .send_to_group(Group::Redirect, &PushMessage::redirect(req.url.as_str()));
    info!(url = %req.url, delivered, "redirect sent");
    Json(json!({ "delivered": delivered }))
}

async fn list_clients(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.clients.connected_clients())
}

#[derive(Debug, Deserialize)]
struct ProbeQuery {
    #[serde(rename = "switchIp")]
    switch_ip: String,
}

/// Asks the display at `addr` what it sees behind `switchIp`.
async fn client_devices(
    State(state): State<SharedState>,
    Path(addr): Path<String>,
    Query(query): Query<ProbeQuery>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|_| (StatusCode::BAD_REQUEST, format!("invalid client address {addr}")))?;
    let handle = state
        .clients
        .get(&addr)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("no client at {addr}")))?;
    let devices = probe_switch(&handle, &query.switch_ip, state.config.reply_timeout).await;
    Ok(Json(devices))
}
