use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::local::LocalSocket;

pub type LocalId = u32;
pub type SharedSocket = Arc<Mutex<LocalSocket>>;

/// Process-wide mapping `local_id -> local_socket`.
///
/// One lock guards the map and the free-id allocator; traversal methods
/// snapshot the relevant entries under that lock and release it before
/// returning, so callers never hold the registry lock while also touching an
/// individual socket's own lock.
#[derive(Default)]
pub struct SocketRegistry {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    sockets: HashMap<LocalId, SharedSocket>,
    next_id: u32,
}

impl SocketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns a fresh, nonzero local_id to `sock` and installs it.
    ///
    /// Ids are allocated monotonically and wrap around, skipping 0 (reserved
    /// for "unpaired") and any id currently in use.
    pub fn install(&self, sock: LocalSocket) -> (LocalId, SharedSocket) {
        let mut inner = self.inner.lock().unwrap();
        let id = loop {
            inner.next_id = inner.next_id.wrapping_add(1);
            if inner.next_id == 0 {
                continue;
            }
            if !inner.sockets.contains_key(&inner.next_id) {
                break inner.next_id;
            }
        };
        let shared = Arc::new(Mutex::new(sock));
        inner.sockets.insert(id, Arc::clone(&shared));
        (id, shared)
    }

    pub fn lookup(&self, id: LocalId) -> Option<SharedSocket> {
        self.inner.lock().unwrap().sockets.get(&id).cloned()
    }

    pub fn remove(&self, id: LocalId) -> Option<SharedSocket> {
        self.inner.lock().unwrap().sockets.remove(&id)
    }

    /// Snapshot of every socket currently bound to `transport_id`.
    pub fn enumerate_for_transport(&self, transport_id: u64) -> Vec<(LocalId, SharedSocket)> {
        let all: Vec<(LocalId, SharedSocket)> = {
            let inner = self.inner.lock().unwrap();
            inner.sockets.iter().map(|(id, sock)| (*id, Arc::clone(sock))).collect()
        };
        all.into_iter().filter(|(_, sock)| sock.lock().unwrap().transport_id() == Some(transport_id)).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::local::{EnqueueOutcome, LocalEndpoint};

    struct NullEndpoint;
    impl LocalEndpoint for NullEndpoint {
        fn enqueue(&mut self, _payload: &[u8]) -> EnqueueOutcome {
            EnqueueOutcome::Accepted
        }
        fn ready(&mut self) {}
        fn close(&mut self) {}
    }

    fn new_socket(transport_id: Option<u64>) -> LocalSocket {
        LocalSocket::new(Box::new(NullEndpoint), transport_id, 4096)
    }

    #[test]
    fn ids_are_nonzero_and_unique() {
        let reg = SocketRegistry::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10 {
            let (id, _) = reg.install(new_socket(None));
            assert_ne!(id, 0);
            assert!(seen.insert(id));
        }
    }

    #[test]
    fn remove_frees_the_id_for_reuse_eventually() {
        let reg = SocketRegistry::new();
        let (id, _) = reg.install(new_socket(None));
        reg.remove(id);
        assert!(reg.lookup(id).is_none());
    }

    #[test]
    fn enumerate_for_transport_only_returns_matching_sockets() {
        let reg = SocketRegistry::new();
        let (id_a, _) = reg.install(new_socket(Some(1)));
        let (_id_b, _) = reg.install(new_socket(Some(2)));
        let for_one = reg.enumerate_for_transport(1);
        assert_eq!(for_one.len(), 1);
        assert_eq!(for_one[0].0, id_a);
    }
}
