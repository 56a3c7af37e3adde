use super::remote::Peer;
use crate::error::StateError;

#[derive(Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Data was fully consumed; the transport may emit the credit OKAY.
    Accepted,
    /// The endpoint is backpressuring; the transport must not deliver more
    /// until `ready()` is called.
    Backpressure,
}

/// What an endpoint uses to push data back toward the peer and to ask for
/// its own socket to be torn down. Handed to the endpoint exactly once, via
/// `bind`, right after the local socket is installed and paired (so the
/// handle already knows the local/remote ids an outbound `WRTE`/`CLSE`
/// needs).
pub trait SocketHandle: Send {
    /// Sends `payload` to the peer. Callers must only invoke this while
    /// credit is available (immediately after `bind`, or after the most
    /// recent `ready()`) — it consumes that credit.
    fn send(&self, payload: &[u8]);

    /// Tells the transport this endpoint is done; emits `CLSE` to the peer
    /// and removes the socket from the registry.
    fn close(&self);
}

/// The three polymorphic operations a local socket's endpoint must support.
/// Implementations are tagged variants (file-descriptor-backed, in-process
/// service, paired-local) rather than one shared trait object hierarchy with
/// upcasting, confining all mutable state to the event-loop thread.
pub trait LocalEndpoint: Send {
    fn enqueue(&mut self, payload: &[u8]) -> EnqueueOutcome;

    fn ready(&mut self);

    fn close(&mut self);

    /// Called once, right after this endpoint's socket is installed and
    /// paired. Endpoints that only ever react to inbound data (most
    /// fd-backed sockets driven purely by `enqueue`) can ignore it; an
    /// endpoint that generates its own outbound data (e.g. a `source:<n>`
    /// test service) uses it to start producing.
    fn bind(&mut self, _handle: Box<dyn SocketHandle>) {}
}

/// Per-logical-stream state machine. Pairs a local endpoint (file descriptor
/// or in-process service) with a peer on the other end of a transport, or
/// with another local socket for purely in-process pipes.
pub struct LocalSocket {
    endpoint: Box<dyn LocalEndpoint>,
    transport_id: Option<u64>,
    peer: Option<Peer>,
    max_payload: u32,
    closing: bool,
    /// Credit flag: outbound enqueue is only permitted while this is true.
    /// Toggled false immediately after an enqueue, back to true on OKAY.
    ready_to_send: bool,
}

impl LocalSocket {
    pub fn new(endpoint: Box<dyn LocalEndpoint>, transport_id: Option<u64>, max_payload: u32) -> Self {
        Self {
            endpoint,
            transport_id,
            peer: None,
            max_payload,
            closing: false,
            ready_to_send: true,
        }
    }

    pub fn transport_id(&self) -> Option<u64> {
        self.transport_id
    }

    pub fn max_payload(&self) -> u32 {
        self.max_payload
    }

    pub fn peer(&self) -> Option<Peer> {
        self.peer
    }

    pub fn pair_with(&mut self, peer: Peer) {
        self.peer = Some(peer);
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    pub fn ready_to_send(&self) -> bool {
        self.ready_to_send
    }

    /// Inbound data from the peer. No-ops (returning `Ok`) if already
    /// closing, per the StateError contract: operations on a closed socket
    /// are silently swallowed rather than erroring the transport.
    pub fn enqueue(&mut self, payload: &[u8]) -> Result<EnqueueOutcome, StateError> {
        if self.closing {
            return Err(StateError);
        }
        Ok(self.endpoint.enqueue(payload))
    }

    /// Peer returned credit (an OKAY). Re-arms `ready_to_send` and lets the
    /// endpoint produce more outbound data.
    pub fn on_ready(&mut self) {
        if self.closing {
            return;
        }
        self.ready_to_send = true;
        self.endpoint.ready();
    }

    /// Marks that we've just enqueued outbound data: consumes the credit
    /// until the peer's next OKAY.
    pub fn consume_credit(&mut self) {
        self.ready_to_send = false;
    }

    /// Local or peer-initiated close. Idempotent.
    pub fn close(&mut self) {
        if self.closing {
            return;
        }
        self.closing = true;
        self.endpoint.close();
    }

    /// Forwards to the endpoint's `bind`; see `LocalEndpoint::bind`.
    pub fn bind(&mut self, handle: Box<dyn SocketHandle>) {
        self.endpoint.bind(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingEndpoint {
        enqueued: Vec<u8>,
        ready_calls: u32,
        closed: bool,
    }

    impl LocalEndpoint for CountingEndpoint {
        fn enqueue(&mut self, payload: &[u8]) -> EnqueueOutcome {
            self.enqueued.extend_from_slice(payload);
            EnqueueOutcome::Accepted
        }
        fn ready(&mut self) {
            self.ready_calls += 1;
        }
        fn close(&mut self) {
            self.closed = true;
        }
    }

    fn socket() -> LocalSocket {
        LocalSocket::new(
            Box::new(CountingEndpoint { enqueued: Vec::new(), ready_calls: 0, closed: false }),
            Some(1),
            4096,
        )
    }

    #[test]
    fn credit_toggles_false_on_consume_true_on_ready() {
        let mut s = socket();
        assert!(s.ready_to_send());
        s.consume_credit();
        assert!(!s.ready_to_send());
        s.on_ready();
        assert!(s.ready_to_send());
    }

    #[test]
    fn close_is_idempotent() {
        let mut s = socket();
        s.close();
        s.close();
        assert!(s.is_closing());
    }

    #[test]
    fn operations_on_closed_socket_are_noops() {
        let mut s = socket();
        s.close();
        assert_eq!(s.enqueue(b"x"), Err(StateError));
    }

    #[test]
    fn pairing_is_recorded() {
        let mut s = socket();
        s.pair_with(Peer::Local(7));
        assert_eq!(s.peer(), Some(Peer::Local(7)));
    }
}
