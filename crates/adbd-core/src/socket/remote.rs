use super::registry::LocalId;

/// Shadow of a peer local socket. `remote_id` is the local_id the *peer*
/// uses to address this stream; we need it to fill `arg1` on outbound
/// packets so the peer knows which of its sockets to route to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemoteSocket {
    pub remote_id: LocalId,
}

impl RemoteSocket {
    pub fn new(remote_id: LocalId) -> Self {
        Self { remote_id }
    }
}

/// What a local socket is paired with: a genuine peer on the other end of a
/// transport, or another local socket wired directly to it in-process (the
/// "local pair helper" of 4.4, used for internal services fed by a byte
/// pipe with no transport involved).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Peer {
    Remote(RemoteSocket),
    Local(LocalId),
}
