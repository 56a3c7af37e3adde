use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use adbd_core::connection::{Connection, OnError, OnRead};
use adbd_wire::{Packet, ProtocolVersion};
use bytes::{Buf, BytesMut};
use crossbeam_channel::{bounded, Receiver, Sender};
use mio::{Events, Interest, Poll, Token, Waker};
use tracing::warn;

const STREAM_TOKEN: Token = Token(0);
const WAKE_TOKEN: Token = Token(1);
const OUTBOUND_CAPACITY: usize = 64;
const READ_CHUNK: usize = 8 * 1024;

/// Packet-oriented `Connection` for the daemon's primary network listener.
///
/// A single background thread drives a non-blocking `mio` poll loop for
/// both directions. `send` hands a packet to that thread over a bounded
/// channel and wakes the loop via an `mio::Waker`; it blocks only if the
/// channel is full, which is the "may block briefly on backpressure" the
/// `Connection` contract allows.
pub struct PacketConnection {
    stream: Option<mio::net::TcpStream>,
    peer_addr: SocketAddr,
    version: ProtocolVersion,
    max_payload: u32,
    outbound_tx: Sender<Packet>,
    outbound_rx: Option<Receiver<Packet>>,
    waker: Option<Arc<Waker>>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl PacketConnection {
    pub fn new(stream: std::net::TcpStream, version: ProtocolVersion, max_payload: u32) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;
        let peer_addr = stream.peer_addr()?;
        let (outbound_tx, outbound_rx) = bounded(OUTBOUND_CAPACITY);
        Ok(Self {
            stream: Some(mio::net::TcpStream::from_std(stream)),
            peer_addr,
            version,
            max_payload,
            outbound_tx,
            outbound_rx: Some(outbound_rx),
            waker: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            worker: None,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

impl Connection for PacketConnection {
    fn start(&mut self, on_read: OnRead, on_error: OnError) -> io::Result<()> {
        let mut stream = self
            .stream
            .take()
            .ok_or_else(|| io::Error::other("packet connection already started"))?;
        let outbound_rx = self
            .outbound_rx
            .take()
            .ok_or_else(|| io::Error::other("packet connection already started"))?;

        let poll = Poll::new()?;
        poll.registry().register(&mut stream, STREAM_TOKEN, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);
        self.waker = Some(Arc::clone(&waker));

        let shutdown = Arc::clone(&self.shutdown);
        let version = self.version;
        let max_payload = self.max_payload;
        let peer_addr = self.peer_addr;

        let handle = std::thread::Builder::new()
            .name(format!("adbd-pktconn-{peer_addr}"))
            .spawn(move || run_loop(poll, stream, outbound_rx, version, max_payload, shutdown, on_read, on_error))?;
        self.worker = Some(handle);
        Ok(())
    }

    fn send(&self, packet: Packet) -> io::Result<()> {
        let Some(waker) = &self.waker else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "connection not started"));
        };
        self.outbound_tx
            .send(packet)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "connection worker thread is gone"))?;
        waker.wake()
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(waker) = &self.waker {
            let _ = waker.wake();
        }
        if let Some(handle) = self.worker.take() {
            crate::join_unless_self(handle);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_loop(
    mut poll: Poll,
    mut stream: mio::net::TcpStream,
    outbound_rx: Receiver<Packet>,
    version: ProtocolVersion,
    max_payload: u32,
    shutdown: Arc<AtomicBool>,
    on_read: OnRead,
    on_error: OnError,
) {
    let mut events = Events::with_capacity(32);
    let mut read_buf = BytesMut::with_capacity(READ_CHUNK);
    let mut scratch = [0u8; READ_CHUNK];
    let mut write_backlog = BytesMut::new();
    let mut writable_armed = false;
    let mut on_error = Some(on_error);

    'outer: loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        if let Err(e) = poll.poll(&mut events, None) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            fire_error(&mut on_error, e);
            break;
        }
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        for event in events.iter() {
            if event.token() != STREAM_TOKEN {
                continue; // the waker token: just a prompt to re-check below
            }
            if event.is_readable() {
                loop {
                    match stream.read(&mut scratch) {
                        Ok(0) => {
                            fire_error(&mut on_error, io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed"));
                            break 'outer;
                        }
                        Ok(n) => {
                            read_buf.extend_from_slice(&scratch[..n]);
                            loop {
                                match Packet::decode(version, max_payload, &mut read_buf) {
                                    Ok(Some(packet)) => on_read(packet),
                                    Ok(None) => break,
                                    Err(e) => {
                                        fire_error(
                                            &mut on_error,
                                            io::Error::new(io::ErrorKind::InvalidData, e.to_string()),
                                        );
                                        break 'outer;
                                    }
                                }
                            }
                        }
                        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(e) => {
                            fire_error(&mut on_error, e);
                            break 'outer;
                        }
                    }
                }
            }
            if event.is_writable() && !flush_writes(&mut stream, &mut write_backlog, &mut on_error) {
                break 'outer;
            }
        }

        while let Ok(packet) = outbound_rx.try_recv() {
            if let Err(e) = packet.encode(version, max_payload, &mut write_backlog) {
                warn!(%e, "dropping outbound packet, doesn't fit max_payload");
            }
        }
        if !write_backlog.is_empty() && !flush_writes(&mut stream, &mut write_backlog, &mut on_error) {
            break;
        }
        let need_writable = !write_backlog.is_empty();
        if need_writable != writable_armed {
            let interest = if need_writable { Interest::READABLE | Interest::WRITABLE } else { Interest::READABLE };
            if poll.registry().reregister(&mut stream, STREAM_TOKEN, interest).is_err() {
                break;
            }
            writable_armed = need_writable;
        }
    }

    let _ = poll.registry().deregister(&mut stream);
}

fn flush_writes(stream: &mut mio::net::TcpStream, backlog: &mut BytesMut, on_error: &mut Option<OnError>) -> bool {
    while !backlog.is_empty() {
        match stream.write(backlog) {
            Ok(0) => {
                fire_error(on_error, io::Error::new(io::ErrorKind::WriteZero, "write returned 0"));
                return false;
            }
            Ok(n) => backlog.advance(n),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => {
                fire_error(on_error, e);
                return false;
            }
        }
    }
    true
}

fn fire_error(on_error: &mut Option<OnError>, err: io::Error) {
    if let Some(cb) = on_error.take() {
        cb(err);
    }
}
