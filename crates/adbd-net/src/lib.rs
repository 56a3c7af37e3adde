//! Concrete `adbd_core::Connection` implementations over TCP: the
//! mio-driven [`PacketConnection`] used for the daemon's primary network
//! listener, and the thread-per-direction [`StreamConnection`] used for the
//! raw byte-pipe path (the role USB bulk endpoints would occupy on a real
//! device, out of scope here per SPEC_FULL.md's Non-goals).

mod packet_conn;
mod stream_conn;

pub use packet_conn::PacketConnection;
pub use stream_conn::StreamConnection;

use std::thread::JoinHandle;

/// Joins a worker thread unless called from that very thread (the case when
/// `stop` is invoked from inside an `on_error` callback fired by the worker
/// itself) — joining your own thread would deadlock, so that case just
/// drops the handle and lets the thread finish tearing itself down.
fn join_unless_self(handle: JoinHandle<()>) {
    if handle.thread().id() != std::thread::current().id() {
        let _ = handle.join();
    }
}
