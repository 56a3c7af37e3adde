//! `impl Transport` block for the `CNXN`/`AUTH` handshake state machine.
//!
//! Split into its own file because the table it implements (connecting ->
//! unauthorized -> authorizing -> device/host, or offline at any point) is
//! easier to read as one unit than interleaved with packet routing.

use adbd_wire::banner::{self, Banner};
use adbd_wire::{AuthType, Command, Packet};
use tracing::debug;

use crate::auth::random_token;
use crate::state::ConnectionState;

use super::Transport;

impl Transport {
    pub(crate) fn handle_cnxn(&self, payload: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != ConnectionState::Connecting {
            return;
        }
        let text = String::from_utf8_lossy(payload);
        let Some(banner) = banner::parse(&text) else {
            debug!(transport = self.id, "malformed CNXN banner, offlining transport");
            drop(inner);
            self.kick();
            return;
        };

        if self.auth.lock().unwrap().auth_required() {
            let token = random_token();
            inner.pending_token = Some(token);
            inner.pending_banner = Some(banner);
            inner.state = ConnectionState::Unauthorized;
            drop(inner);
            debug!(transport = self.id, "challenging peer for AUTH token");
            let _ = self.send_packet(Packet::new(
                Command::Auth.as_u32(),
                AuthType::Token as u32,
                0,
                token.to_vec(),
            ));
        } else {
            self.apply_banner(&mut inner, banner);
            drop(inner);
            self.send_local_cnxn();
        }
    }

    pub(crate) fn handle_auth(&self, arg0: u32, payload: &[u8]) {
        let Some(auth_type) = AuthType::from_u32(arg0) else {
            return;
        };
        let mut inner = self.inner.lock().unwrap();
        if inner.state != ConnectionState::Unauthorized {
            return;
        }

        match auth_type {
            AuthType::Signature => {
                let Some(token) = inner.pending_token else { return };
                inner.state = ConnectionState::Authorizing;
                drop(inner);
                let verified = self.auth.lock().unwrap().verify_signature(&token, payload);
                let mut inner = self.inner.lock().unwrap();
                // `kick()` may have run while the lock was released for the
                // (potentially slow) auth call above; don't resurrect an
                // already-offline transport by applying a stale result.
                if inner.state == ConnectionState::Offline {
                    return;
                }
                match verified {
                    Ok(()) => {
                        let banner = inner.pending_banner.take();
                        self.apply_banner(&mut inner, banner.unwrap_or_default());
                        drop(inner);
                        self.send_local_cnxn();
                    }
                    Err(e) => {
                        debug!(transport = self.id, error = %e, "signature rejected, re-challenging");
                        let fresh = random_token();
                        inner.pending_token = Some(fresh);
                        inner.state = ConnectionState::Unauthorized;
                        drop(inner);
                        let _ = self.send_packet(Packet::new(
                            Command::Auth.as_u32(),
                            AuthType::Token as u32,
                            0,
                            fresh.to_vec(),
                        ));
                    }
                }
            }
            AuthType::RsaPublicKey => {
                inner.state = ConnectionState::Authorizing;
                drop(inner);
                let accepted = self.auth.lock().unwrap().accept_public_key(payload);
                let mut inner = self.inner.lock().unwrap();
                if inner.state == ConnectionState::Offline {
                    return;
                }
                match accepted {
                    Ok(()) => {
                        let banner = inner.pending_banner.take();
                        self.apply_banner(&mut inner, banner.unwrap_or_default());
                        drop(inner);
                        self.send_local_cnxn();
                    }
                    Err(e) => {
                        debug!(transport = self.id, error = %e, "public key rejected by policy");
                        drop(inner);
                        self.kick();
                    }
                }
            }
            AuthType::Token => {}
        }
    }

    fn apply_banner(&self, inner: &mut super::Inner, banner: Banner) {
        inner.product = banner.product;
        inner.model = banner.model;
        inner.device = banner.device;
        inner.features.set(&banner.features.into_iter().collect::<Vec<_>>().join(","));
        inner.state = self.local_role;
    }

    fn send_local_cnxn(&self) {
        let (product, model, device, features) = {
            let inner = self.inner.lock().unwrap();
            (inner.product.clone(), inner.model.clone(), inner.device.clone(), inner.features.clone())
        };
        let side = match self.local_role {
            ConnectionState::Host => banner::Side::Host,
            _ => banner::Side::Device,
        };
        let text = banner::format(side, &product, &model, &device, features.as_set());
        let _ = self.send_packet(Packet::new(Command::Cnxn.as_u32(), 0, 0, text.into_bytes()));
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use crate::auth::{AuthProvider, NoAuth, TOKEN_LEN};
    use crate::dispatcher::NullDispatcher;
    use crate::error::AuthError;
    use crate::matcher::TransportKind;
    use crate::socket::SocketRegistry;
    use crate::{Connection, OnError, OnRead};

    use super::super::{LocalIdentity, Transport};

    #[derive(Default)]
    struct RecordingConnection {
        sent: Arc<Mutex<Vec<Packet>>>,
    }

    impl Connection for RecordingConnection {
        fn start(&mut self, _on_read: OnRead, _on_error: OnError) -> io::Result<()> {
            Ok(())
        }
        fn send(&self, packet: Packet) -> io::Result<()> {
            self.sent.lock().unwrap().push(packet);
            Ok(())
        }
        fn stop(&mut self) {}
    }

    struct RejectAll;
    impl AuthProvider for RejectAll {
        fn auth_required(&self) -> bool {
            true
        }
        fn verify_signature(&mut self, _token: &[u8; TOKEN_LEN], _sig: &[u8]) -> Result<(), AuthError> {
            Err(AuthError::BadSignature)
        }
        fn accept_public_key(&mut self, _key: &[u8]) -> Result<(), AuthError> {
            Err(AuthError::KeyRejected)
        }
    }

    fn transport(auth: Box<dyn AuthProvider>) -> Arc<Transport> {
        Transport::new(
            1,
            TransportKind::LocalTcp,
            "127.0.0.1:5555".to_string(),
            String::new(),
            4096,
            adbd_wire::ProtocolVersion::V1,
            Arc::new(SocketRegistry::new()),
            Arc::new(NullDispatcher),
            auth,
            LocalIdentity::device("test_product", "test_model", "test_device"),
        )
    }

    #[test]
    fn no_auth_goes_straight_to_device_on_cnxn() {
        let t = transport(Box::new(NoAuth));
        t.handle_cnxn(b"host::features=shell_v2");
        assert_eq!(t.state(), crate::state::ConnectionState::Device);
        assert!(t.has_feature("shell_v2"));
    }

    #[test]
    fn no_auth_cnxn_sends_our_own_cnxn_banner_back() {
        let t = transport(Box::new(NoAuth));
        let sent = Arc::new(Mutex::new(Vec::new()));
        t.set_connection(Box::new(RecordingConnection { sent: Arc::clone(&sent) })).unwrap();

        t.handle_cnxn(b"host::features=shell_v2");

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1, "handshake completion must reply with our own CNXN");
        assert_eq!(sent[0].command().unwrap(), Command::Cnxn);
    }

    #[test]
    fn banner_with_no_features_clears_a_previously_configured_feature_set() {
        let t = Transport::new(
            1,
            TransportKind::LocalTcp,
            "127.0.0.1:5555".to_string(),
            String::new(),
            4096,
            adbd_wire::ProtocolVersion::V1,
            Arc::new(SocketRegistry::new()),
            Arc::new(NullDispatcher),
            Box::new(NoAuth),
            LocalIdentity::device("test_product", "test_model", "test_device").with_features("shell_v2"),
        );
        t.handle_cnxn(b"host::");
        assert!(!t.has_feature("shell_v2"), "peer declared no features; negotiated set must not keep our defaults");
    }

    #[test]
    fn auth_required_challenges_then_stays_unauthorized_on_bad_signature() {
        let t = transport(Box::new(RejectAll));
        t.handle_cnxn(b"host::");
        assert_eq!(t.state(), crate::state::ConnectionState::Unauthorized);
        t.handle_auth(2, b"bogus-signature");
        assert_eq!(t.state(), crate::state::ConnectionState::Unauthorized);
    }

    #[test]
    fn cnxn_while_already_past_connecting_is_ignored() {
        let t = transport(Box::new(NoAuth));
        t.handle_cnxn(b"host::ro.product.name=first");
        t.handle_cnxn(b"host::ro.product.name=second");
        assert_eq!(t.product(), "first");
    }
}
