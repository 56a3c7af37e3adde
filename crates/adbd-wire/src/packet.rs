use bytes::{Buf, BufMut, BytesMut};

use crate::command::Command;
use crate::error::ProtocolError;

/// Size of the fixed packet header on the wire.
pub const HEADER_SIZE: usize = 24;

/// Which checksum/validation behavior the peer negotiated.
///
/// `V1` is the legacy protocol: `data_checksum` is the sum of payload bytes
/// mod 2^32 and is verified on decode. `V2` drops the checksum (the field is
/// still present on the wire, always zero on send, and is accepted-and-ignored
/// on decode even if a peer sends a nonzero value — see DESIGN.md).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolVersion {
    V1,
    V2,
}

/// One fully-framed unit on the wire: a 24-byte header plus its payload.
///
/// `arg0` is always the sender's local_id, `arg1` the receiver's local_id,
/// per the multiplexing convention (local_id == 0 denotes "not yet paired").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub command: u32,
    pub arg0: u32,
    pub arg1: u32,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(command: u32, arg0: u32, arg1: u32, payload: Vec<u8>) -> Self {
        Self { command, arg0, arg1, payload }
    }

    pub fn control(command: Command, arg0: u32, arg1: u32) -> Self {
        Self::new(command.as_u32(), arg0, arg1, Vec::new())
    }

    pub fn command(&self) -> Option<Command> {
        Command::from_u32(self.command)
    }

    fn checksum(payload: &[u8]) -> u32 {
        payload.iter().fold(0u32, |acc, &b| acc.wrapping_add(u32::from(b)))
    }

    /// Serializes this packet (header + payload) into `out`, appending.
    ///
    /// Fails if the payload exceeds `max_payload`; every other field is
    /// computed from `self` and is always well-formed.
    pub fn encode(
        &self,
        version: ProtocolVersion,
        max_payload: u32,
        out: &mut BytesMut,
    ) -> Result<(), ProtocolError> {
        let len = self.payload.len();
        if len as u64 > u64::from(max_payload) {
            return Err(ProtocolError::PayloadTooLarge { len: len as u32, max_payload });
        }

        let checksum = match version {
            ProtocolVersion::V1 => Self::checksum(&self.payload),
            ProtocolVersion::V2 => 0,
        };

        out.reserve(HEADER_SIZE + len);
        out.put_u32_le(self.command);
        out.put_u32_le(self.arg0);
        out.put_u32_le(self.arg1);
        out.put_u32_le(len as u32);
        out.put_u32_le(checksum);
        out.put_u32_le(self.command ^ 0xffff_ffff);
        out.put_slice(&self.payload);
        Ok(())
    }

    /// Parses one packet out of `buf`, advancing it past the consumed bytes.
    ///
    /// Returns `Ok(None)` if `buf` doesn't yet hold a complete packet (caller
    /// should wait for more bytes and retry); the buffer is left untouched in
    /// that case. A malformed header or oversize/mis-checksummed payload is a
    /// `ProtocolError` and the connection must be torn down.
    pub fn decode(
        version: ProtocolVersion,
        max_payload: u32,
        buf: &mut BytesMut,
    ) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let mut header = &buf[..HEADER_SIZE];
        let command = header.get_u32_le();
        let arg0 = header.get_u32_le();
        let arg1 = header.get_u32_le();
        let data_length = header.get_u32_le();
        let data_checksum = header.get_u32_le();
        let magic = header.get_u32_le();

        if magic != (command ^ 0xffff_ffff) {
            return Err(ProtocolError::BadMagic { command, magic });
        }
        if data_length > max_payload {
            return Err(ProtocolError::PayloadTooLarge { len: data_length, max_payload });
        }

        let total = HEADER_SIZE + data_length as usize;
        if buf.len() < total {
            return Ok(None);
        }

        buf.advance(HEADER_SIZE);
        let payload = buf.split_to(data_length as usize).to_vec();

        if version == ProtocolVersion::V1 {
            let actual = Self::checksum(&payload);
            if actual != data_checksum {
                return Err(ProtocolError::ChecksumMismatch { expected: data_checksum, actual });
            }
        }

        Ok(Some(Packet::new(command, arg0, arg1, payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CNXN;

    fn roundtrip(version: ProtocolVersion) {
        let pkt = Packet::new(CNXN, 1, 2, b"host::features=foo".to_vec());
        let mut buf = BytesMut::new();
        pkt.encode(version, 1 << 20, &mut buf).unwrap();
        let decoded = Packet::decode(version, 1 << 20, &mut buf).unwrap().unwrap();
        assert_eq!(decoded, pkt);
        assert!(buf.is_empty());
    }

    #[test]
    fn roundtrips_v1_and_v2() {
        roundtrip(ProtocolVersion::V1);
        roundtrip(ProtocolVersion::V2);
    }

    #[test]
    fn incomplete_header_waits_for_more_bytes() {
        let mut buf = BytesMut::from(&b"\x01\x02\x03"[..]);
        assert_eq!(Packet::decode(ProtocolVersion::V2, 1 << 20, &mut buf).unwrap(), None);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn incomplete_payload_waits_for_more_bytes() {
        let pkt = Packet::new(CNXN, 1, 2, vec![0u8; 10]);
        let mut buf = BytesMut::new();
        pkt.encode(ProtocolVersion::V2, 1 << 20, &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 5);
        assert_eq!(Packet::decode(ProtocolVersion::V2, 1 << 20, &mut buf).unwrap(), None);
        assert_eq!(buf.len(), HEADER_SIZE + 5);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(CNXN);
        buf.put_u32_le(0);
        buf.put_u32_le(0);
        buf.put_u32_le(0);
        buf.put_u32_le(0);
        buf.put_u32_le(0); // should be CNXN ^ 0xffff_ffff
        let err = Packet::decode(ProtocolVersion::V2, 1 << 20, &mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::BadMagic { .. }));
    }

    #[test]
    fn oversize_payload_is_rejected() {
        let pkt = Packet::new(CNXN, 0, 0, vec![0u8; 100]);
        let mut buf = BytesMut::new();
        pkt.encode(ProtocolVersion::V2, 1000, &mut buf).unwrap();
        let err = Packet::decode(ProtocolVersion::V2, 50, &mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::PayloadTooLarge { .. }));
    }

    #[test]
    fn v1_checksum_mismatch_is_rejected() {
        let pkt = Packet::new(CNXN, 0, 0, b"abc".to_vec());
        let mut buf = BytesMut::new();
        pkt.encode(ProtocolVersion::V1, 1 << 20, &mut buf).unwrap();
        // Corrupt the checksum field (bytes 16..20).
        buf[16] ^= 0xff;
        let err = Packet::decode(ProtocolVersion::V1, 1 << 20, &mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::ChecksumMismatch { .. }));
    }

    #[test]
    fn v2_ignores_nonzero_checksum_field() {
        let pkt = Packet::new(CNXN, 0, 0, b"abc".to_vec());
        let mut buf = BytesMut::new();
        pkt.encode(ProtocolVersion::V2, 1 << 20, &mut buf).unwrap();
        buf[16] = 0xff; // nonzero checksum, must still decode on v2
        let decoded = Packet::decode(ProtocolVersion::V2, 1 << 20, &mut buf).unwrap().unwrap();
        assert_eq!(decoded.payload, pkt.payload);
    }

    #[test]
    fn encode_rejects_oversize_payload() {
        let pkt = Packet::new(CNXN, 0, 0, vec![0u8; 100]);
        let mut buf = BytesMut::new();
        let err = pkt.encode(ProtocolVersion::V2, 50, &mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::PayloadTooLarge { .. }));
    }
}
