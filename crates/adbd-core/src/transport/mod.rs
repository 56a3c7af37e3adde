//! A single physical link to a peer, from handshake through to the
//! multiplexed socket traffic it carries.

mod handshake;
mod hooks;

use std::io;
use std::sync::{Arc, Mutex};

use adbd_wire::{Command, Packet, ProtocolVersion, AUTH, CLSE, CNXN, OKAY, OPEN, STLS, SYNC, WRTE};
use tracing::{debug, warn};

use crate::auth::{AuthProvider, TOKEN_LEN};
use crate::connection::{Connection, OnError, OnRead};
use crate::dispatcher::ServiceDispatcher;
use crate::features::FeatureSet;
use crate::matcher::{matches_target as target_matches, TargetIdentity, TransportKind};
use crate::socket::{EnqueueOutcome, LocalId, LocalSocket, Peer, RemoteSocket, SocketHandle, SocketRegistry};
use crate::state::ConnectionState;

pub use hooks::HookHandle;
use hooks::DisconnectHooks;

/// The static identity this endpoint presents in its own CNXN banner.
pub struct LocalIdentity {
    pub role: ConnectionState,
    pub product: String,
    pub model: String,
    pub device: String,
    pub features: FeatureSet,
}

impl LocalIdentity {
    pub fn device(product: impl Into<String>, model: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            role: ConnectionState::Device,
            product: product.into(),
            model: model.into(),
            device: device.into(),
            features: FeatureSet::new(),
        }
    }

    pub fn with_features(mut self, csv: &str) -> Self {
        self.features.set(csv);
        self
    }
}

struct Inner {
    state: ConnectionState,
    features: FeatureSet,
    product: String,
    model: String,
    device: String,
    pending_token: Option<[u8; TOKEN_LEN]>,
    pending_banner: Option<adbd_wire::banner::Banner>,
}

/// One physical link, carrying the handshake and every multiplexed local
/// socket bound to it. Methods that start background reads (`set_connection`)
/// require an `Arc<Transport>` since the reader callbacks hold a clone of it;
/// everything else is usable through a bare reference.
pub struct Transport {
    id: u64,
    kind: TransportKind,
    serial: String,
    devpath: String,
    max_payload: u32,
    protocol_version: ProtocolVersion,
    local_role: ConnectionState,
    registry: Arc<SocketRegistry>,
    dispatcher: Arc<dyn ServiceDispatcher>,
    auth: Mutex<Box<dyn AuthProvider>>,
    connection: Mutex<Option<Box<dyn Connection>>>,
    hooks: DisconnectHooks,
    inner: Mutex<Inner>,
}

impl Transport {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u64,
        kind: TransportKind,
        serial: String,
        devpath: String,
        max_payload: u32,
        protocol_version: ProtocolVersion,
        registry: Arc<SocketRegistry>,
        dispatcher: Arc<dyn ServiceDispatcher>,
        auth: Box<dyn AuthProvider>,
        identity: LocalIdentity,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            kind,
            serial,
            devpath,
            max_payload,
            protocol_version,
            local_role: identity.role,
            registry,
            dispatcher,
            auth: Mutex::new(auth),
            connection: Mutex::new(None),
            hooks: DisconnectHooks::default(),
            inner: Mutex::new(Inner {
                state: ConnectionState::Connecting,
                features: identity.features,
                product: identity.product,
                model: identity.model,
                device: identity.device,
                pending_token: None,
                pending_banner: None,
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().unwrap().state
    }

    pub fn product(&self) -> String {
        self.inner.lock().unwrap().product.clone()
    }

    pub fn model(&self) -> String {
        self.inner.lock().unwrap().model.clone()
    }

    pub fn device(&self) -> String {
        self.inner.lock().unwrap().device.clone()
    }

    pub fn set_features(&self, csv: &str) {
        self.inner.lock().unwrap().features.set(csv);
    }

    pub fn has_feature(&self, name: &str) -> bool {
        self.inner.lock().unwrap().features.has(name)
    }

    pub fn features(&self) -> FeatureSet {
        self.inner.lock().unwrap().features.clone()
    }

    pub fn matches_target(&self, query: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        let identity = TargetIdentity {
            kind: self.kind,
            serial: &self.serial,
            devpath: &self.devpath,
            product: &inner.product,
            model: &inner.model,
            device: &inner.device,
        };
        target_matches(&identity, query)
    }

    pub fn add_disconnect(&self, hook: Box<dyn FnOnce() + Send>) -> HookHandle {
        self.hooks.add(hook)
    }

    pub fn remove_disconnect(&self, handle: HookHandle) {
        self.hooks.remove(handle);
    }

    /// Fires every registered disconnect hook in registration order, then
    /// clears the list. `kick` calls this; it's also exposed directly so a
    /// graceful shutdown can run the same hooks without first forcing the
    /// transport offline.
    pub fn run_disconnects(&self) {
        self.hooks.run();
    }

    /// Installs and starts a connection, moving the transport to
    /// `Connecting`. Requires `Arc<Self>` because the read/error callbacks
    /// given to the connection each hold a clone of it.
    pub fn set_connection(self: &Arc<Self>, mut conn: Box<dyn Connection>) -> io::Result<()> {
        self.inner.lock().unwrap().state = ConnectionState::Connecting;

        let reader = Arc::clone(self);
        let on_read: OnRead = Box::new(move |packet| Transport::handle_packet(&reader, packet));

        let erroring = Arc::clone(self);
        let on_error: OnError = Box::new(move |err| {
            warn!(transport = erroring.id, %err, "connection reported an unrecoverable error");
            erroring.kick();
        });

        conn.start(on_read, on_error)?;
        *self.connection.lock().unwrap() = Some(conn);
        Ok(())
    }

    /// Enqueues `packet` on the underlying connection. A send failure kicks
    /// the transport rather than propagating, since there is nothing a
    /// caller could do beyond that.
    pub fn send_packet(&self, packet: Packet) -> io::Result<()> {
        if self.inner.lock().unwrap().state.is_offline() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "transport is offline"));
        }
        let result = {
            let guard = self.connection.lock().unwrap();
            match guard.as_ref() {
                Some(conn) => conn.send(packet),
                None => return Err(io::Error::new(io::ErrorKind::NotConnected, "no connection installed")),
            }
        };
        if let Err(ref e) = result {
            warn!(transport = self.id, %e, "send failed, kicking transport");
            self.kick();
        }
        result
    }

    /// Forces the transport offline: stops the connection, runs disconnect
    /// hooks exactly once, and closes every local socket still bound to it.
    /// Idempotent.
    pub fn kick(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.state.is_offline() {
                return;
            }
            inner.state = ConnectionState::Offline;
        }
        debug!(transport = self.id, "kicked");
        if let Some(mut conn) = self.connection.lock().unwrap().take() {
            conn.stop();
        }
        self.hooks.run();
        for (local_id, shared) in self.registry.enumerate_for_transport(self.id) {
            shared.lock().unwrap().close();
            self.registry.remove(local_id);
        }
    }

    fn handle_packet(self: &Arc<Self>, packet: Packet) {
        match packet.command {
            CNXN => self.handle_cnxn(&packet.payload),
            AUTH => self.handle_auth(packet.arg0, &packet.payload),
            OPEN => self.handle_open(packet.arg0, &packet.payload),
            WRTE => self.handle_wrte(packet.arg0, packet.arg1, &packet.payload),
            OKAY => self.handle_okay(packet.arg0, packet.arg1),
            CLSE => self.handle_clse(packet.arg1),
            STLS | SYNC => {} // negotiated but not modeled by this core
            other => debug!(transport = self.id, command = other, "unrecognized command, ignoring"),
        }
    }

    fn handle_open(self: &Arc<Self>, remote_id: u32, payload: &[u8]) {
        match self.dispatcher.open(payload) {
            Ok(endpoint) => {
                let socket = LocalSocket::new(endpoint, Some(self.id), self.max_payload);
                let (local_id, shared) = self.registry.install(socket);
                {
                    let mut sock = shared.lock().unwrap();
                    sock.pair_with(Peer::Remote(RemoteSocket::new(remote_id)));
                    sock.bind(Box::new(TransportSocketHandle {
                        transport: Arc::clone(self),
                        local_id,
                        remote_id,
                    }));
                }
                // `bind` may have driven the endpoint to close itself (e.g. a
                // zero-byte sink/source quota) before we get here, in which
                // case `TransportSocketHandle::close` already removed
                // `local_id` from the registry and sent its own CLSE.
                self.reply_okay_if_registered(local_id, remote_id);
            }
            Err(e) => {
                debug!(transport = self.id, error = %e, "OPEN refused");
                let _ = self.send_packet(Packet::new(Command::Clse.as_u32(), 0, remote_id, Vec::new()));
            }
        }
    }

    fn handle_wrte(&self, remote_id: u32, local_id: u32, payload: &[u8]) {
        let Some(shared) = self.registry.lookup(local_id) else {
            let _ = self.send_packet(Packet::new(Command::Clse.as_u32(), 0, remote_id, Vec::new()));
            return;
        };
        let outcome = shared.lock().unwrap().enqueue(payload);
        match outcome {
            // `enqueue` may have driven the endpoint to exhaust its quota and
            // call `SocketHandle::close` synchronously, which already sent a
            // CLSE for `local_id` and removed it from the registry.
            Ok(EnqueueOutcome::Accepted) => self.reply_okay_if_registered(local_id, remote_id),
            Ok(EnqueueOutcome::Backpressure) => {}
            Err(_) => {}
        }
    }

    /// Sends `OKAY` for `local_id` only if it's still in the registry.
    /// `bind`/`enqueue` run with the socket's own mutex held, so an endpoint
    /// that synchronously closes itself through `SocketHandle::close` has
    /// already sent its own `CLSE` and deregistered `local_id` by the time
    /// control returns to the caller; this avoids replying to a local_id the
    /// peer was just told is gone.
    fn reply_okay_if_registered(&self, local_id: u32, remote_id: u32) {
        if self.registry.lookup(local_id).is_some() {
            let _ = self.send_packet(Packet::new(Command::Okay.as_u32(), local_id, remote_id, Vec::new()));
        }
    }

    fn handle_okay(&self, remote_id: u32, local_id: u32) {
        let Some(shared) = self.registry.lookup(local_id) else { return };
        let mut sock = shared.lock().unwrap();
        if sock.peer().is_none() {
            sock.pair_with(Peer::Remote(RemoteSocket::new(remote_id)));
        }
        sock.on_ready();
    }

    fn handle_clse(&self, local_id: u32) {
        // local_id == 0 is the half-open reply to a CLSE we sent ourselves;
        // there's no socket left to close.
        if local_id == 0 {
            return;
        }
        if let Some(shared) = self.registry.lookup(local_id) {
            shared.lock().unwrap().close();
        }
        self.registry.remove(local_id);
    }
}

/// A socket's one route back to its transport: emit outbound `WRTE`, or ask
/// to be closed. Bound into the endpoint once, right after `OPEN` resolves.
struct TransportSocketHandle {
    transport: Arc<Transport>,
    local_id: LocalId,
    remote_id: u32,
}

impl SocketHandle for TransportSocketHandle {
    // Deliberately does not touch the socket's own `ready_to_send` flag:
    // `bind`/`ready` (where this is called from) already run with that
    // socket's mutex held, and re-locking it here would deadlock. Endpoints
    // that drive themselves (e.g. a source service) pace their own sends
    // between `ready()` calls instead of relying on that flag.
    fn send(&self, payload: &[u8]) {
        let _ = self.transport.send_packet(Packet::new(
            Command::Wrte.as_u32(),
            self.local_id,
            self.remote_id,
            payload.to_vec(),
        ));
    }

    fn close(&self) {
        let _ = self
            .transport
            .send_packet(Packet::new(Command::Clse.as_u32(), self.local_id, self.remote_id, Vec::new()));
        self.transport.registry.remove(self.local_id);
    }
}

/// Wires two local sockets directly together with no transport between
/// them, for internal services fed by an in-process byte pipe.
pub fn pair_locally(registry: &SocketRegistry, a: crate::socket::LocalId, b: crate::socket::LocalId) {
    if let (Some(sock_a), Some(sock_b)) = (registry.lookup(a), registry.lookup(b)) {
        sock_a.lock().unwrap().pair_with(Peer::Local(b));
        sock_b.lock().unwrap().pair_with(Peer::Local(a));
    }
}
