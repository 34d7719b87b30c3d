//! # channel
//!
//! Push channel to one display client. The transport task (see `handlers`)
//! drains the outbox into the socket and hands every inbound text message to
//! [`ChannelHandle::resolve_reply`].
//!
//! Channels are push-only except for one deliberate special case: the switch
//! probe. A caller arms the channel's single pending-request slot, sends the
//! probe, and waits for the client's next inbound message. This is not a
//! general RPC mechanism: one request at a time, matched by arrival order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use transit_types::Event;
use uuid::Uuid;

use crate::error::HubError;
use crate::route_store::RouteSnapshot;

/// Messages queued per client before new ones are dropped.
pub const OUTBOX_CAPACITY: usize = 64;

pub type ChannelId = Uuid;

// ── Outbound messages ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PushMessage {
    /// `{ stops, currentStationIndex, nextStationIndex }`
    Snapshot(RouteSnapshot),
    /// `{ type: "update" | "redirect", ... }`
    Notice(Notice),
    /// `{ action: "get_connected_devices", switchIp }`
    Probe(SwitchProbe),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Notice {
    Update { message: Event },
    Redirect { url: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchProbe {
    pub action: &'static str,
    pub switch_ip: String,
}

impl PushMessage {
    pub fn update(event: Event) -> Self {
        Self::Notice(Notice::Update { message: event })
    }

    pub fn redirect(url: impl Into<String>) -> Self {
        Self::Notice(Notice::Redirect { url: url.into() })
    }

    pub fn switch_probe(switch_ip: impl Into<String>) -> Self {
        Self::Probe(SwitchProbe {
            action: "get_connected_devices",
            switch_ip: switch_ip.into(),
        })
    }

    pub fn to_text(&self) -> Result<String, HubError> {
        serde_json::to_string(self).map_err(|e| HubError::Encode(e.to_string()))
    }
}

// ── Handle ────────────────────────────────────────────────────────────────────

struct PendingRequest {
    seq: u64,
    reply: oneshot::Sender<String>,
}

struct ChannelInner {
    id: ChannelId,
    outbox: mpsc::Sender<String>,
    pending: Mutex<Option<PendingRequest>>,
    next_seq: AtomicU64,
}

/// Cheap to clone; all clones refer to the same client.
#[derive(Clone)]
pub struct ChannelHandle {
    inner: Arc<ChannelInner>,
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle").field("id", &self.inner.id).finish()
    }
}

impl ChannelHandle {
    /// A new channel plus the outbox its transport task must drain.
    pub fn open() -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
        let handle = Self {
            inner: Arc::new(ChannelInner {
                id: Uuid::new_v4(),
                outbox: tx,
                pending: Mutex::new(None),
                next_seq: AtomicU64::new(0),
            }),
        };
        (handle, rx)
    }

    pub fn id(&self) -> ChannelId {
        self.inner.id
    }

    pub fn is_closed(&self) -> bool {
        self.inner.outbox.is_closed()
    }

    pub fn send(&self, message: &PushMessage) -> Result<(), HubError> {
        self.send_text(message.to_text()?)
    }

    pub(crate) fn send_text(&self, text: String) -> Result<(), HubError> {
        self.inner.outbox.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => HubError::ChannelFull,
            mpsc::error::TrySendError::Closed(_) => HubError::ChannelClosed,
        })
    }

    /// Hands an inbound message to a waiting request. Returns the message back
    /// if no request is pending.
    pub fn resolve_reply(&self, text: String) -> Result<(), String> {
        match self.inner.pending.lock().take() {
            Some(pending) => pending.reply.send(text),
            None => Err(text),
        }
    }

    /// Sends `message` and waits for this client's next inbound message.
    /// A newer request on the same channel supersedes this one.
    pub async fn request(
        &self,
        message: &PushMessage,
        timeout: Duration,
    ) -> Result<String, HubError> {
        let text = message.to_text()?;
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        if self
            .inner
            .pending
            .lock()
            .replace(PendingRequest { seq, reply: tx })
            .is_some()
        {
            debug!(channel = %self.inner.id, "pending request superseded");
        }

        if let Err(e) = self.send_text(text) {
            self.clear_pending(seq);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(HubError::ChannelClosed),
            Err(_) => {
                self.clear_pending(seq);
                Err(HubError::TimeoutWaitingForReply)
            }
        }
    }

    /// Drops any pending request; its waiter resolves as closed.
    pub fn close(&self) {
        self.inner.pending.lock().take();
    }

    fn clear_pending(&self, seq: u64) {
        let mut pending = self.inner.pending.lock();
        if pending.as_ref().is_some_and(|p| p.seq == seq) {
            pending.take();
        }
    }
}

// ── Switch probe ──────────────────────────────────────────────────────────────

/// Asks a display which devices sit behind `switch_ip`. The reply is
/// `{ "text": "<json>" }`; a timeout, closed channel or malformed reply
/// yields an empty object.
pub async fn probe_switch(handle: &ChannelHandle, switch_ip: &str, timeout: Duration) -> Value {
    let reply = match handle
        .request(&PushMessage::switch_probe(switch_ip), timeout)
        .await
    {
        Ok(reply) => reply,
        Err(e) => {
            warn!(channel = %handle.id(), switch_ip, "switch probe failed: {e}");
            return json!({});
        }
    };

    let devices = serde_json::from_str::<Value>(&reply)
        .ok()
        .and_then(|v| v.get("text").and_then(Value::as_str).map(str::to_owned))
        .and_then(|text| serde_json::from_str::<Value>(&text).ok());

    match devices {
        Some(devices) => devices,
        None => {
            warn!(channel = %handle.id(), switch_ip, "malformed switch probe reply");
            json!({})
        }
    }
}
