//! Wire codec for the adbd multiplexed transport protocol: fixed 24-byte
//! header framing, command tags, and the banner/service grammars carried in
//! packet payloads.

mod command;
mod error;
mod packet;

pub mod banner;
pub mod service_request;

pub use command::{AuthType, Command, AUTH, CLSE, CNXN, OKAY, OPEN, STLS, SYNC, WRTE};
pub use error::ProtocolError;
pub use packet::{Packet, ProtocolVersion, HEADER_SIZE};
