use std::io;

use adbd_wire::Packet;

/// Delivered to a `Connection`'s reader callback for every well-formed
/// packet read off the wire. Called on whatever thread the `Connection`
/// drives its reads from, never on the event-loop thread directly -- the
/// caller is responsible for posting into the loop if it needs to touch
/// socket state.
pub type OnRead = Box<dyn Fn(Packet) + Send + Sync>;

/// Called exactly once, the first time the connection hits an unrecoverable
/// I/O or framing failure. Never called again afterwards, including after
/// `stop()`.
pub type OnError = Box<dyn FnOnce(io::Error) + Send>;

/// A single physical link to a peer: USB bulk endpoints, a TCP socket, or
/// (untested by this core) vsock. The transport consumes only this trait;
/// concrete implementations live in `adbd-net`.
///
/// Contract:
/// - `start` begins reading in the background; every well-formed packet is
///   delivered to `on_read` in wire order; an unrecoverable failure invokes
///   `on_error` exactly once and the connection becomes terminal.
/// - `send` may block briefly on backpressure. Once `on_error` has fired,
///   every subsequent `send` fails.
/// - `stop` is idempotent: it aborts in-flight reads and writes, and once it
///   returns no further callback will fire.
pub trait Connection: Send {
    fn start(&mut self, on_read: OnRead, on_error: OnError) -> io::Result<()>;

    fn send(&self, packet: Packet) -> io::Result<()>;

    fn stop(&mut self);
}
