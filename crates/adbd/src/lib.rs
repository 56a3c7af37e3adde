//! Wiring for the daemon binary: CLI configuration, transport factory, and
//! orderly shutdown. `main.rs` is a thin shell around [`Daemon`].

use std::io;
use std::net::SocketAddr;
use std::os::fd::{FromRawFd, IntoRawFd};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use adbd_core::auth::{AuthProvider, FileKeyStore, NoAuth, SignatureVerifier, TOKEN_LEN};
use adbd_core::dispatcher::ServiceDispatcher;
use adbd_core::matcher::TransportKind;
use adbd_core::socket::SocketRegistry;
use adbd_core::transport::{LocalIdentity, Transport};
use adbd_eventloop::EventLoop;
use adbd_net::PacketConnection;
use adbd_services::AdbServiceDispatcher;
use adbd_wire::ProtocolVersion;
use mio::Interest;
use tracing::{info, warn};

/// Payload cap negotiated with every peer. Not configurable yet: nothing in
/// this build varies it per-transport.
const MAX_PAYLOAD: u32 = 1 << 18;

/// Runtime configuration for one daemon instance, typically built from CLI
/// flags in `main.rs`.
pub struct DaemonConfig {
    pub listen_addr: SocketAddr,
    pub require_auth: bool,
    pub keys_path: PathBuf,
    pub product: String,
    pub model: String,
    pub device: String,
    /// Refuse `sink:`/`source:` (the only services this build can start)
    /// with a policy error instead of running them.
    pub locked: bool,
}

impl DaemonConfig {
    /// Default location for the trusted-host-key store under the given
    /// application's local data directory.
    pub fn default_keys_path(app_name: &str) -> PathBuf {
        adbd_utils::directories::keys_dir(app_name).join("adbkeys")
    }
}

/// A [`SignatureVerifier`] that never verifies a signature. The RSA/crypto
/// primitive real signature verification needs is out of scope for this
/// build (see DESIGN.md); `--require-auth` still exercises the rest of the
/// `FileKeyStore` machinery (token issuance, key persistence) against a
/// verifier that always rejects, so a host can present a key but can never
/// complete the handshake.
struct UnimplementedVerifier;

impl SignatureVerifier for UnimplementedVerifier {
    fn verify(&self, _token: &[u8; TOKEN_LEN], _signature: &[u8], _known_key: &[u8]) -> bool {
        false
    }
}

/// Owns the socket registry and every `Transport` accepted over this
/// daemon's listener, and drives the accept loop.
pub struct Daemon {
    registry: Arc<SocketRegistry>,
    dispatcher: Arc<dyn ServiceDispatcher>,
    config: DaemonConfig,
    next_transport_id: AtomicU64,
    transports: Mutex<Vec<Arc<Transport>>>,
}

impl Daemon {
    pub fn new(config: DaemonConfig) -> Arc<Self> {
        Arc::new(Self {
            registry: Arc::new(SocketRegistry::new()),
            dispatcher: Arc::new(if config.locked { AdbServiceDispatcher::locked() } else { AdbServiceDispatcher::new() }),
            config,
            next_transport_id: AtomicU64::new(1),
            transports: Mutex::new(Vec::new()),
        })
    }

    fn make_auth(&self) -> Box<dyn AuthProvider> {
        if !self.config.require_auth {
            return Box::new(NoAuth);
        }
        match FileKeyStore::open(&self.config.keys_path, Arc::new(UnimplementedVerifier)) {
            Ok(store) => Box::new(store),
            Err(e) => {
                warn!(path = %self.config.keys_path.display(), error = %e, "couldn't open trusted key store, falling back to unauthenticated mode");
                Box::new(NoAuth)
            }
        }
    }

    fn accept_connection(self: &Arc<Self>, mio_stream: mio::net::TcpStream, peer_addr: SocketAddr) -> io::Result<()> {
        // `PacketConnection` wants ownership of a `std::net::TcpStream`; mio's
        // listener only hands back its own wrapper type, so round-trip the
        // raw descriptor rather than duplicating the socket.
        let std_stream = unsafe { std::net::TcpStream::from_raw_fd(mio_stream.into_raw_fd()) };
        let conn = PacketConnection::new(std_stream, ProtocolVersion::V1, MAX_PAYLOAD)?;

        let id = self.next_transport_id.fetch_add(1, Ordering::Relaxed);
        let identity = LocalIdentity::device(self.config.product.clone(), self.config.model.clone(), self.config.device.clone());
        let transport = Transport::new(
            id,
            TransportKind::LocalTcp,
            peer_addr.to_string(),
            String::new(),
            MAX_PAYLOAD,
            ProtocolVersion::V1,
            Arc::clone(&self.registry),
            Arc::clone(&self.dispatcher),
            self.make_auth(),
            identity,
        );
        transport.set_connection(Box::new(conn))?;

        let pruned = Arc::clone(self);
        transport.add_disconnect(Box::new(move || pruned.transports.lock().unwrap().retain(|t| t.id() != id)));

        self.transports.lock().unwrap().push(transport);
        info!(%peer_addr, transport = id, "accepted connection");
        Ok(())
    }

    /// Accepts inbound connections until the returned [`adbd_eventloop::Handle`]
    /// is stopped (by `Ctrl-C`, `SIGTERM`, or any other holder of a clone),
    /// then kicks every transport this daemon created and returns.
    pub fn run(self: &Arc<Self>) -> io::Result<()> {
        let (mut event_loop, handle) = EventLoop::new()?;

        let ctrlc_handle = handle.clone();
        ctrlc::set_handler(move || ctrlc_handle.stop())
            .map_err(|e| io::Error::other(format!("couldn't install Ctrl-C handler: {e}")))?;

        let term_handle = handle.clone();
        unsafe {
            signal_hook::low_level::register(signal_hook::consts::SIGTERM, move || term_handle.stop())
        }
        .map_err(|e| io::Error::other(format!("couldn't install SIGTERM handler: {e}")))?;

        let listener = Arc::new(Mutex::new(mio::net::TcpListener::bind(self.config.listen_addr)?));
        info!(addr = %self.config.listen_addr, require_auth = self.config.require_auth, "listening");

        let accept_listener = Arc::clone(&listener);
        let daemon = Arc::clone(self);
        {
            let mut guard = listener.lock().unwrap();
            event_loop.register(
                &mut *guard,
                Interest::READABLE,
                Box::new(move |_mask| loop {
                    let accepted = accept_listener.lock().unwrap().accept();
                    match accepted {
                        Ok((stream, peer_addr)) => {
                            if let Err(e) = daemon.accept_connection(stream, peer_addr) {
                                warn!(%peer_addr, error = %e, "failed to wire accepted connection");
                            }
                        }
                        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            break;
                        }
                    }
                }),
            )?;
        }

        event_loop.run();

        info!("shutting down");
        // Collect out from under the lock first: `kick` runs disconnect hooks
        // synchronously, and the per-transport hook registered in
        // `accept_connection` re-locks `self.transports` to prune itself.
        let live: Vec<_> = self.transports.lock().unwrap().drain(..).collect();
        for transport in live {
            transport.kick();
        }
        Ok(())
    }
}
