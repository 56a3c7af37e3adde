use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use adbd_core::connection::{Connection, OnError, OnRead};
use adbd_wire::{Packet, ProtocolVersion};
use bytes::BytesMut;
use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::warn;

const OUTBOUND_CAPACITY: usize = 64;
const READ_CHUNK: usize = 8 * 1024;

/// Byte-pipe-oriented `Connection`: two dedicated blocking threads (reader,
/// writer) over a `std::net::TcpStream`, with a bounded channel feeding the
/// writer. This stands in for the raw USB-bulk-style physical link the
/// protocol also runs over; TCP is the only transport this crate actually
/// drives.
pub struct StreamConnection {
    shutdown_handle: TcpStream,
    reader_stream: Option<TcpStream>,
    writer_stream: Option<TcpStream>,
    peer_addr: SocketAddr,
    version: ProtocolVersion,
    max_payload: u32,
    outbound_tx: Option<Sender<Packet>>,
    outbound_rx: Option<Receiver<Packet>>,
    shutdown: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl StreamConnection {
    pub fn new(stream: TcpStream, version: ProtocolVersion, max_payload: u32) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr()?;
        let shutdown_handle = stream.try_clone()?;
        let writer_stream = stream.try_clone()?;
        let (outbound_tx, outbound_rx) = bounded(OUTBOUND_CAPACITY);
        Ok(Self {
            shutdown_handle,
            reader_stream: Some(stream),
            writer_stream: Some(writer_stream),
            peer_addr,
            version,
            max_payload,
            outbound_tx: Some(outbound_tx),
            outbound_rx: Some(outbound_rx),
            shutdown: Arc::new(AtomicBool::new(false)),
            reader: None,
            writer: None,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

impl Connection for StreamConnection {
    fn start(&mut self, on_read: OnRead, on_error: OnError) -> io::Result<()> {
        let reader_stream =
            self.reader_stream.take().ok_or_else(|| io::Error::other("stream connection already started"))?;
        let writer_stream =
            self.writer_stream.take().ok_or_else(|| io::Error::other("stream connection already started"))?;
        let outbound_rx =
            self.outbound_rx.take().ok_or_else(|| io::Error::other("stream connection already started"))?;

        let on_error = Arc::new(Mutex::new(Some(on_error)));
        let version = self.version;
        let max_payload = self.max_payload;
        let peer_addr = self.peer_addr;

        let reader_error = Arc::clone(&on_error);
        let reader = std::thread::Builder::new()
            .name(format!("adbd-streamconn-rd-{peer_addr}"))
            .spawn(move || reader_loop(reader_stream, version, max_payload, on_read, &reader_error))?;

        let writer = std::thread::Builder::new()
            .name(format!("adbd-streamconn-wr-{peer_addr}"))
            .spawn(move || writer_loop(writer_stream, version, max_payload, &outbound_rx, &on_error))?;

        self.reader = Some(reader);
        self.writer = Some(writer);
        Ok(())
    }

    fn send(&self, packet: Packet) -> io::Result<()> {
        let Some(tx) = &self.outbound_tx else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "connection not started"));
        };
        tx.send(packet).map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "writer thread is gone"))
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Dropping the sender unblocks the writer's blocking recv(); shutting
        // down the socket unblocks the reader's blocking read().
        self.outbound_tx = None;
        let _ = self.shutdown_handle.shutdown(Shutdown::Both);
        if let Some(h) = self.reader.take() {
            crate::join_unless_self(h);
        }
        if let Some(h) = self.writer.take() {
            crate::join_unless_self(h);
        }
    }
}

fn reader_loop(
    mut stream: TcpStream,
    version: ProtocolVersion,
    max_payload: u32,
    on_read: OnRead,
    on_error: &Arc<Mutex<Option<OnError>>>,
) {
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    let mut scratch = [0u8; READ_CHUNK];
    loop {
        match stream.read(&mut scratch) {
            Ok(0) => {
                fire(on_error, io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed"));
                return;
            }
            Ok(n) => {
                buf.extend_from_slice(&scratch[..n]);
                loop {
                    match Packet::decode(version, max_payload, &mut buf) {
                        Ok(Some(packet)) => on_read(packet),
                        Ok(None) => break,
                        Err(e) => {
                            fire(on_error, io::Error::new(io::ErrorKind::InvalidData, e.to_string()));
                            return;
                        }
                    }
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                fire(on_error, e);
                return;
            }
        }
    }
}

fn writer_loop(
    mut stream: TcpStream,
    version: ProtocolVersion,
    max_payload: u32,
    rx: &Receiver<Packet>,
    on_error: &Arc<Mutex<Option<OnError>>>,
) {
    let mut buf = BytesMut::new();
    while let Ok(packet) = rx.recv() {
        buf.clear();
        if let Err(e) = packet.encode(version, max_payload, &mut buf) {
            warn!(%e, "dropping outbound packet, doesn't fit max_payload");
            continue;
        }
        if let Err(e) = stream.write_all(&buf) {
            fire(on_error, e);
            return;
        }
    }
}

fn fire(on_error: &Arc<Mutex<Option<OnError>>>, err: io::Error) {
    if let Some(cb) = on_error.lock().unwrap().take() {
        cb(err);
    }
}
