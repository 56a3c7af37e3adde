//! End-to-end scenarios that span the packet codec, banner grammar, and
//! service-request grammar together, the way a real `CNXN`/`OPEN` exchange
//! would actually arrive over a socket: as an arbitrarily-chunked byte
//! stream, not a single complete read.

use std::collections::HashSet;

use adbd_wire::banner::{self, Side};
use adbd_wire::service_request::{self, ServiceRequest};
use adbd_wire::{Command, Packet, ProtocolVersion, AUTH, CNXN, OPEN};

/// Feeds `chunk_size`-byte slices of `bytes` into `buf` one at a time,
/// attempting a decode after each append, and collects every packet that
/// comes out. Exercises the same "wait for more bytes" path a live
/// connection's partial reads take, rather than decoding from one
/// already-complete buffer.
fn decode_in_chunks(bytes: &[u8], chunk_size: usize, version: ProtocolVersion, max_payload: u32) -> Vec<Packet> {
    let mut buf = bytes::BytesMut::new();
    let mut out = Vec::new();
    for chunk in bytes.chunks(chunk_size) {
        buf.extend_from_slice(chunk);
        while let Some(pkt) = Packet::decode(version, max_payload, &mut buf).unwrap() {
            out.push(pkt);
        }
    }
    assert!(buf.is_empty(), "leftover bytes after feeding the whole stream");
    out
}

#[test]
fn cnxn_banner_roundtrips_through_fragmented_packet_stream() {
    let features: HashSet<String> = ["shell_v2", "cmd"].iter().map(|s| s.to_string()).collect();
    let banner_str = banner::format(Side::Device, "adbd", "pixel", "generic", &features);

    let pkt = Packet::new(CNXN, 0x0100_0000, 0, banner_str.clone().into_bytes());
    let mut wire = bytes::BytesMut::new();
    pkt.encode(ProtocolVersion::V1, 1 << 16, &mut wire).unwrap();

    // Split the header itself across chunk boundaries (3 bytes at a time)
    // to prove decode tolerates a header arriving over several reads.
    let decoded = decode_in_chunks(&wire, 3, ProtocolVersion::V1, 1 << 16);
    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded[0].command().unwrap(), Command::Cnxn);

    let payload_str = std::str::from_utf8(&decoded[0].payload).unwrap();
    let parsed = banner::parse(payload_str).unwrap();
    assert_eq!(parsed.side, Some(Side::Device));
    assert_eq!(parsed.product, "adbd");
    assert_eq!(parsed.model, "pixel");
    assert_eq!(parsed.device, "generic");
    assert_eq!(parsed.features, features);
}

#[test]
fn two_packets_back_to_back_in_one_read_both_decode() {
    let cnxn = Packet::new(CNXN, 1, 0, b"host::".to_vec());
    let open = Packet::new(OPEN, 7, 0, b"sink:4096\0".to_vec());

    let mut wire = bytes::BytesMut::new();
    cnxn.encode(ProtocolVersion::V2, 1 << 16, &mut wire).unwrap();
    open.encode(ProtocolVersion::V2, 1 << 16, &mut wire).unwrap();

    // Deliver the whole combined buffer in one chunk: decode must drain
    // both packets rather than stopping after the first.
    let decoded = decode_in_chunks(&wire, wire.len(), ProtocolVersion::V2, 1 << 16);
    assert_eq!(decoded.len(), 2);
    assert_eq!(decoded[0].command().unwrap(), Command::Cnxn);
    assert_eq!(decoded[1].command().unwrap(), Command::Open);

    let request = service_request::parse(&decoded[1].payload).unwrap();
    assert_eq!(request, ServiceRequest::Sink(4096));
}

#[test]
fn malformed_banner_in_an_otherwise_well_formed_packet_parses_to_none() {
    let pkt = Packet::new(CNXN, 0, 0, b"not-a-banner-at-all".to_vec());
    let mut wire = bytes::BytesMut::new();
    pkt.encode(ProtocolVersion::V1, 1 << 16, &mut wire).unwrap();

    let decoded = decode_in_chunks(&wire, 5, ProtocolVersion::V1, 1 << 16);
    assert_eq!(decoded.len(), 1);
    let payload_str = std::str::from_utf8(&decoded[0].payload).unwrap();
    assert_eq!(banner::parse(payload_str), None);
}

#[test]
fn auth_packet_with_oversize_payload_is_rejected_mid_stream() {
    let small = Packet::new(AUTH, 0, 0, vec![0u8; 10]);
    let big = Packet::new(AUTH, 0, 0, vec![0u8; 200]);

    let mut wire = bytes::BytesMut::new();
    small.encode(ProtocolVersion::V2, 1000, &mut wire).unwrap();
    big.encode(ProtocolVersion::V2, 1000, &mut wire).unwrap();

    // max_payload of 50 admits `small` but not `big`: the first decode call
    // succeeds, the second must surface PayloadTooLarge rather than silently
    // skipping the oversize packet.
    let first = Packet::decode(ProtocolVersion::V2, 50, &mut wire).unwrap();
    assert!(first.is_some());
    let second = Packet::decode(ProtocolVersion::V2, 50, &mut wire);
    assert!(second.is_err());
}
