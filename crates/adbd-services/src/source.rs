use adbd_core::socket::{EnqueueOutcome, LocalEndpoint, SocketHandle};

/// Chunk size used for each outbound `WRTE`, independent of the transport's
/// negotiated `max_payload` (this service has no way to learn that value);
/// chosen comfortably under any payload limit this daemon would negotiate.
const CHUNK: u64 = 4096;

/// `source:<n>` — emits `n` bytes of deterministic filler, then closes.
///
/// Ignores inbound data entirely. Sends at most one chunk per credit grant:
/// one on `bind` (the initial credit every freshly opened socket has), then
/// one more each time `ready()` reports the peer returned an `OKAY`. This
/// keeps exactly one `WRTE` outstanding at a time, the same stop-and-wait
/// discipline the wire protocol expects of every stream.
pub struct SourceService {
    remaining: u64,
    produced: u64,
    done: bool,
    handle: Option<Box<dyn SocketHandle>>,
}

impl SourceService {
    pub fn new(n: u64) -> Self {
        Self { remaining: n, produced: 0, done: false, handle: None }
    }

    fn produce(&mut self) {
        if self.done {
            return;
        }
        let Some(handle) = &self.handle else { return };
        let chunk_len = self.remaining.min(CHUNK) as usize;
        if chunk_len > 0 {
            let base = self.produced;
            let payload: Vec<u8> = (0..chunk_len).map(|i| ((base + i as u64) % 256) as u8).collect();
            handle.send(&payload);
            self.produced += chunk_len as u64;
            self.remaining -= chunk_len as u64;
        }
        if self.remaining == 0 {
            self.done = true;
            handle.close();
        }
    }
}

impl LocalEndpoint for SourceService {
    fn enqueue(&mut self, _payload: &[u8]) -> EnqueueOutcome {
        EnqueueOutcome::Accepted
    }

    fn ready(&mut self) {
        self.produce();
    }

    fn close(&mut self) {}

    fn bind(&mut self, handle: Box<dyn SocketHandle>) {
        self.handle = Some(handle);
        self.produce();
    }
}
