use std::sync::Arc;

use crate::config::ServerConfig;
use crate::hub::BroadcastHub;
use crate::protocol::DecodeContext;
use crate::registry::ClientRegistry;
use crate::route_store::RouteStore;

/// Everything the ingestion task and the socket handlers share.
pub struct AppState {
    pub config: ServerConfig,
    pub route: RouteStore,
    pub clients: ClientRegistry,
    pub hub: BroadcastHub,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            route: RouteStore::new(config.cache_ttl),
            clients: ClientRegistry::new(),
            hub: BroadcastHub::new(),
            config,
        }
    }

    pub fn shared(config: ServerConfig) -> SharedState {
        Arc::new(Self::new(config))
    }

    pub fn decode_context(&self) -> DecodeContext<'_> {
        DecodeContext {
            route: &self.route,
            clients: &self.clients,
        }
    }
}
