use adbd_core::socket::{EnqueueOutcome, LocalEndpoint, SocketHandle};

/// `sink:<n>` — discards up to `n` bytes of inbound data, then closes.
///
/// Exists to exercise credit flow control end to end: the peer writes,
/// gets an `OKAY` back per `WRTE` the transport accepts, and keeps writing
/// until the sink has seen its full quota, at which point it closes on its
/// own rather than waiting for the peer to hang up.
pub struct SinkService {
    remaining: u64,
    handle: Option<Box<dyn SocketHandle>>,
}

impl SinkService {
    pub fn new(n: u64) -> Self {
        Self { remaining: n, handle: None }
    }
}

impl LocalEndpoint for SinkService {
    fn enqueue(&mut self, payload: &[u8]) -> EnqueueOutcome {
        self.remaining = self.remaining.saturating_sub(payload.len() as u64);
        if self.remaining == 0 {
            if let Some(handle) = self.handle.take() {
                handle.close();
            }
        }
        EnqueueOutcome::Accepted
    }

    fn ready(&mut self) {}

    fn close(&mut self) {}

    fn bind(&mut self, handle: Box<dyn SocketHandle>) {
        if self.remaining == 0 {
            handle.close();
            return;
        }
        self.handle = Some(handle);
    }
}
