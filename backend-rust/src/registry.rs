use std::collections::HashMap;
use std::net::SocketAddr;

use parking_lot::Mutex;
use tracing::info;
use transit_types::ConnectedClient;

use crate::channel::{ChannelHandle, ChannelId};

/// Connected display clients keyed by their network address.
/// Every operation holds the one lock for a single map operation.
#[derive(Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<SocketAddr, ChannelHandle>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Silently replaces an existing registration for `addr`.
    pub fn register(&self, addr: SocketAddr, handle: ChannelHandle) {
        let id = handle.id();
        self.clients.lock().insert(addr, handle);
        info!(%addr, channel = %id, "client registered");
    }

    pub fn unregister(&self, addr: &SocketAddr) -> Option<ChannelHandle> {
        let removed = self.clients.lock().remove(addr);
        if removed.is_some() {
            info!(%addr, "client unregistered");
        }
        removed
    }

    /// Unregisters `addr` only while it still maps to channel `id`, so a
    /// stale disconnect cannot evict a newer registration.
    pub fn unregister_channel(&self, addr: &SocketAddr, id: ChannelId) -> bool {
        let mut clients = self.clients.lock();
        if clients.get(addr).is_some_and(|h| h.id() == id) {
            clients.remove(addr);
            info!(%addr, channel = %id, "client unregistered");
            true
        } else {
            false
        }
    }

    /// Upsert.
    pub fn update(&self, addr: SocketAddr, handle: ChannelHandle) {
        self.clients.lock().insert(addr, handle);
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<ChannelHandle> {
        self.clients.lock().get(addr).cloned()
    }

    /// Point-in-time copy; later changes do not show up in it.
    pub fn get_all(&self) -> HashMap<SocketAddr, ChannelHandle> {
        self.clients.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot as wire-friendly records, ordered by address.
    pub fn connected_clients(&self) -> Vec<ConnectedClient> {
        let mut clients: Vec<_> = self
            .get_all()
            .into_iter()
            .map(|(addr, handle)| ConnectedClient {
                ip: addr.ip().to_string(),
                port: addr.port(),
                channel: handle.id().to_string(),
            })
            .collect();
        clients.sort_by(|a, b| (&a.ip, a.port).cmp(&(&b.ip, b.port)));
        clients
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn register_get_unregister() {
        let registry = ClientRegistry::new();
        let (h, _rx) = ChannelHandle::open();
        registry.register(addr("10.0.40.5:50001"), h.clone());

        assert_eq!(registry.get(&addr("10.0.40.5:50001")).map(|c| c.id()), Some(h.id()));
        assert!(registry.get(&addr("10.0.40.5:50002")).is_none());

        assert!(registry.unregister(&addr("10.0.40.5:50001")).is_some());
        assert!(registry.unregister(&addr("10.0.40.5:50001")).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn re_registration_overwrites() {
        let registry = ClientRegistry::new();
        let (first, _rx1) = ChannelHandle::open();
        let (second, _rx2) = ChannelHandle::open();
        let a = addr("10.0.40.25:50001");
        registry.register(a, first.clone());
        registry.update(a, second.clone());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&a).map(|c| c.id()), Some(second.id()));

        // stale disconnect of the first channel leaves the second in place
        assert!(!registry.unregister_channel(&a, first.id()));
        assert!(registry.unregister_channel(&a, second.id()));
    }

    #[test]
    fn snapshot_is_not_live() {
        let registry = ClientRegistry::new();
        let (h, _rx) = ChannelHandle::open();
        registry.register(addr("10.0.1.1:1"), h);
        let snapshot = registry.get_all();
        registry.unregister(&addr("10.0.1.1:1"));
        assert_eq!(snapshot.len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_registration() {
        let registry = std::sync::Arc::new(ClientRegistry::new());
        let threads: Vec<_> = (0..8u16)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..50u16 {
                        let (h, _rx) = ChannelHandle::open();
                        let a = SocketAddr::from(([10, 0, 0, t as u8], 1000 + i));
                        registry.register(a, h);
                        let _ = registry.get_all();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(registry.len(), 8 * 50);
    }

    #[test]
    fn connected_clients_sorted() {
        let registry = ClientRegistry::new();
        let (a, _ra) = ChannelHandle::open();
        let (b, _rb) = ChannelHandle::open();
        registry.register(addr("10.0.40.25:2"), a);
        registry.register(addr("10.0.40.5:1"), b);
        let clients = registry.connected_clients();
        assert_eq!(clients[0].ip, "10.0.40.25");
        assert_eq!(clients[1].ip, "10.0.40.5");
        assert_eq!(clients[1].port, 1);
    }
}
