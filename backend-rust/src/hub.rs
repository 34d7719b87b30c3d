//! # hub
//!
//! Named groups of push channels. `send_to_group` delivers to the members
//! present when it is called: membership is copied under the lock and the
//! sends happen outside it, so a concurrent join/leave never causes partial
//! delivery.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, error, warn};

use crate::channel::{ChannelHandle, ChannelId, PushMessage};
use crate::error::HubError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    TelemetryUpdates,
    RouteUpdates,
    Redirect,
}

impl Group {
    pub const ALL: [Group; 3] = [Group::TelemetryUpdates, Group::RouteUpdates, Group::Redirect];

    pub fn name(self) -> &'static str {
        match self {
            Group::TelemetryUpdates => "telemetry-updates",
            Group::RouteUpdates => "route-updates",
            Group::Redirect => "redirect",
        }
    }
}

impl std::fmt::Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Default)]
pub struct BroadcastHub {
    groups: RwLock<HashMap<Group, HashMap<ChannelId, ChannelHandle>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the channel was already a member.
    pub fn join(&self, group: Group, handle: &ChannelHandle) -> bool {
        let mut groups = self.groups.write();
        groups
            .entry(group)
            .or_default()
            .insert(handle.id(), handle.clone())
            .is_none()
    }

    /// Returns false if the channel was not a member.
    pub fn leave(&self, group: Group, id: ChannelId) -> bool {
        let mut groups = self.groups.write();
        groups
            .get_mut(&group)
            .is_some_and(|members| members.remove(&id).is_some())
    }

    pub fn leave_all(&self, id: ChannelId) {
        let mut groups = self.groups.write();
        for members in groups.values_mut() {
            members.remove(&id);
        }
    }

    pub fn members(&self, group: Group) -> Vec<ChannelHandle> {
        let groups = self.groups.read();
        groups
            .get(&group)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn member_count(&self, group: Group) -> usize {
        self.groups.read().get(&group).map_or(0, HashMap::len)
    }

    /// Serializes once and delivers to every current member. Returns how many
    /// members accepted the message.
    pub fn send_to_group(&self, group: Group, message: &PushMessage) -> usize {
        let text = match message.to_text() {
            Ok(text) => text,
            Err(e) => {
                error!(%group, "{e}");
                return 0;
            }
        };

        let members = self.members(group);
        let mut delivered = 0;
        for member in &members {
            match member.send_text(text.clone()) {
                Ok(()) => delivered += 1,
                Err(HubError::ChannelClosed) => {
                    debug!(%group, channel = %member.id(), "member closed before delivery");
                }
                Err(e) => warn!(%group, channel = %member.id(), "dropped message: {e}"),
            }
        }
        debug!(%group, delivered, members = members.len(), "group send");
        delivered
    }
}
