//! End-to-end scenarios driven through a real [`Transport`], a fake
//! [`Connection`] standing in for the wire, and multiple concurrently-open
//! local sockets -- the kind of cross-module interaction a unit test scoped
//! to one file can't reach.

use std::io;
use std::sync::{Arc, Mutex};

use adbd_core::auth::NoAuth;
use adbd_core::dispatcher::ServiceDispatcher;
use adbd_core::error::ServiceError;
use adbd_core::matcher::TransportKind;
use adbd_core::socket::{EnqueueOutcome, LocalEndpoint, SocketHandle, SocketRegistry};
use adbd_core::transport::{LocalIdentity, Transport};
use adbd_core::{Connection, OnError, OnRead};
use adbd_wire::{Command, Packet, ProtocolVersion};

/// A `Connection` double that records every packet handed to `send`, and
/// hands the reader callback it's given at `start` back out to the test so
/// inbound packets can be injected the same way a real socket's reader
/// thread would deliver them.
struct RecordingConnection {
    sent: Arc<Mutex<Vec<Packet>>>,
    on_read: Arc<Mutex<Option<OnRead>>>,
}

impl RecordingConnection {
    fn new() -> (Self, Arc<Mutex<Vec<Packet>>>, Arc<Mutex<Option<OnRead>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let on_read = Arc::new(Mutex::new(None));
        (Self { sent: Arc::clone(&sent), on_read: Arc::clone(&on_read) }, sent, on_read)
    }
}

impl Connection for RecordingConnection {
    fn start(&mut self, on_read: OnRead, _on_error: OnError) -> io::Result<()> {
        *self.on_read.lock().unwrap() = Some(on_read);
        Ok(())
    }
    fn send(&self, packet: Packet) -> io::Result<()> {
        self.sent.lock().unwrap().push(packet);
        Ok(())
    }
    fn stop(&mut self) {}
}

/// A `LocalEndpoint` that closes itself via its bound `SocketHandle` as soon
/// as it has received `quota` bytes -- the same synchronous
/// enqueue-then-close shape a real quota-limited service uses once it has
/// read everything it was asked for.
struct QuotaEndpoint {
    remaining: u64,
    handle: Option<Box<dyn SocketHandle>>,
}

impl QuotaEndpoint {
    fn new(quota: u64) -> Self {
        Self { remaining: quota, handle: None }
    }
}

impl LocalEndpoint for QuotaEndpoint {
    fn bind(&mut self, handle: Box<dyn SocketHandle>) {
        if self.remaining == 0 {
            handle.close();
        }
        self.handle = Some(handle);
    }

    fn enqueue(&mut self, payload: &[u8]) -> EnqueueOutcome {
        self.remaining = self.remaining.saturating_sub(payload.len() as u64);
        if self.remaining == 0 {
            if let Some(handle) = &self.handle {
                handle.close();
            }
        }
        EnqueueOutcome::Accepted
    }

    fn ready(&mut self) {}
    fn close(&mut self) {}
}

struct QuotaDispatcher {
    quota: u64,
}

impl ServiceDispatcher for QuotaDispatcher {
    fn open(&self, _raw: &[u8]) -> Result<Box<dyn LocalEndpoint>, ServiceError> {
        Ok(Box::new(QuotaEndpoint::new(self.quota)))
    }
}

struct Harness {
    transport: Arc<Transport>,
    sent: Arc<Mutex<Vec<Packet>>>,
    on_read: Arc<Mutex<Option<OnRead>>>,
}

impl Harness {
    /// Delivers `pkt` the way the installed connection's reader callback
    /// would: through `Transport::set_connection`'s `on_read` wiring, which
    /// is exactly what `Transport::handle_packet` is reached from in
    /// production.
    fn feed(&self, pkt: Packet) {
        let on_read = self.on_read.lock().unwrap();
        (on_read.as_ref().expect("connection was started"))(pkt);
    }

    fn drain_sent(&self) -> Vec<Packet> {
        std::mem::take(&mut self.sent.lock().unwrap())
    }
}

fn transport_with(dispatcher: impl ServiceDispatcher + 'static) -> Harness {
    let t = Transport::new(
        1,
        TransportKind::LocalTcp,
        "127.0.0.1:5555".to_string(),
        String::new(),
        4096,
        ProtocolVersion::V1,
        Arc::new(SocketRegistry::new()),
        Arc::new(dispatcher),
        Box::new(NoAuth),
        LocalIdentity::device("p", "m", "d"),
    );
    let (conn, sent, on_read) = RecordingConnection::new();
    t.set_connection(Box::new(conn)).unwrap();
    Harness { transport: t, sent, on_read }
}

#[test]
fn wrte_that_exhausts_quota_does_not_get_a_trailing_okay() {
    let h = transport_with(QuotaDispatcher { quota: 4 });

    h.feed(Packet::new(Command::Open.as_u32(), 100, 0, b"anything\0".to_vec()));
    let after_open = h.drain_sent();
    assert_eq!(after_open.len(), 1, "expected exactly one OKAY reply to OPEN");
    let local_id = after_open[0].arg0;
    assert_eq!(after_open[0].command().unwrap(), Command::Okay);

    h.feed(Packet::new(Command::Wrte.as_u32(), 100, local_id, b"four".to_vec()));

    let after_wrte = h.drain_sent();
    // The endpoint's quota is exhausted by exactly this write, so it closes
    // itself synchronously; the transport must see the socket already gone
    // from the registry and suppress the OKAY it would otherwise send, while
    // still emitting the CLSE the close triggered.
    assert_eq!(after_wrte.len(), 1, "expected only the CLSE, no trailing OKAY");
    assert_eq!(after_wrte[0].command().unwrap(), Command::Clse);
    assert_eq!(after_wrte[0].arg0, local_id);
}

#[test]
fn zero_quota_open_closes_before_the_okay_would_be_sent() {
    let h = transport_with(QuotaDispatcher { quota: 0 });

    h.feed(Packet::new(Command::Open.as_u32(), 200, 0, b"anything\0".to_vec()));

    let replies = h.drain_sent();
    assert_eq!(replies.len(), 1, "expected only the CLSE, no OKAY for an already-closed socket");
    assert_eq!(replies[0].command().unwrap(), Command::Clse);
}

#[test]
fn multiple_independent_sockets_on_one_transport_do_not_interfere() {
    let h = transport_with(QuotaDispatcher { quota: 4096 });

    h.feed(Packet::new(Command::Open.as_u32(), 1, 0, b"a\0".to_vec()));
    h.feed(Packet::new(Command::Open.as_u32(), 2, 0, b"b\0".to_vec()));

    let replies = h.drain_sent();
    assert_eq!(replies.len(), 2);
    let ids: Vec<u32> = replies.iter().map(|p| p.arg0).collect();
    assert_ne!(ids[0], ids[1], "each OPEN must get its own local_id");

    h.feed(Packet::new(Command::Wrte.as_u32(), 1, ids[0], b"x".to_vec()));
    let after = h.drain_sent();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].arg0, ids[0], "a WRTE on socket 0 must not touch socket 1's OKAY");
    assert_eq!(h.transport.state(), adbd_core::ConnectionState::Connecting);
}
