use thiserror::Error;

/// Framing-level failures. Always fatal for the transport that produced them
/// (the caller is expected to kick the transport, not retry the parse).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("bad magic: command {command:#x} paired with magic {magic:#x}")]
    BadMagic { command: u32, magic: u32 },

    #[error("payload length {len} exceeds max_payload {max_payload}")]
    PayloadTooLarge { len: u32, max_payload: u32 },

    #[error("checksum mismatch: header said {expected:#x}, computed {actual:#x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
}
