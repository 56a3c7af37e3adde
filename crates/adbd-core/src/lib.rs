//! Transport-agnostic core of the multiplexed debug-bridge daemon: the
//! handshake state machine, the local/remote socket pair abstraction, the
//! socket registry, and the seams (`Connection`, `AuthProvider`,
//! `ServiceDispatcher`) that `adbd-net`, `adbd-services`, and the daemon
//! binary implement against.

pub mod auth;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod features;
pub mod matcher;
pub mod socket;
pub mod state;
pub mod transport;

pub use auth::{AuthProvider, SignatureVerifier};
pub use connection::{Connection, OnError, OnRead};
pub use dispatcher::ServiceDispatcher;
pub use features::FeatureSet;
pub use matcher::{TargetIdentity, TransportKind};
pub use state::ConnectionState;
pub use transport::{HookHandle, LocalIdentity, Transport};
