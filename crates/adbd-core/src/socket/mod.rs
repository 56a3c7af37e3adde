pub mod local;
pub mod registry;
pub mod remote;

pub use local::{EnqueueOutcome, LocalEndpoint, LocalSocket, SocketHandle};
pub use registry::{LocalId, SharedSocket, SocketRegistry};
pub use remote::{Peer, RemoteSocket};
