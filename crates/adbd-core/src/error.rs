use thiserror::Error;

/// Authentication failures during the `AUTH` handshake step. The transport
/// stays in `Unauthorized` and may retry; these are never fatal on their own.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("signature did not verify against any trusted key")]
    BadSignature,
    #[error("presented RSA public key was rejected by policy")]
    KeyRejected,
}

/// Failures resolving or starting a named service. Surfaces only as a CLSE
/// to the peer; never affects transport-level state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("no service registered for {0:?}")]
    Unknown(String),
    #[error("service failed to start: {0}")]
    FailedToStart(String),
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// A service request refused by local policy (e.g. a command forbidden in a
/// locked deployment mode). Refuses the service start; CLSE to peer, same as
/// any other `ServiceError`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("refused by policy: {0}")]
pub struct PolicyError(pub String);

/// An operation attempted on an already-closed local socket. Not surfaced as
/// an error to callers; operations matching this simply no-op.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation on an already-closed socket")]
pub struct StateError;
