//! Single-threaded descriptor-readiness loop.
//!
//! A daemon built on this crate runs exactly one of these per process: it
//! owns every local socket and the registry, and is the only thread allowed
//! to mutate them. Background I/O threads (a `Connection`'s reader/writer)
//! cross over by [`Handle::post`]ing a closure rather than reaching into
//! shared state directly, mirroring the teacher's own split between a
//! single `mio`-poll-driven thread and the background threads around it.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use adbd_utils::safe_panic;
use crossbeam_channel::{unbounded, Receiver, Sender};
use mio::event::Source;
use mio::{Events, Interest, Poll, Token, Waker};
use tracing::warn;

pub type Task = Box<dyn FnOnce() + Send>;
pub type ReadinessHandler = Box<dyn FnMut(EventMask) + Send>;

const WAKE_TOKEN: Token = Token(usize::MAX);
const EVENT_CAPACITY: usize = 256;

/// Which condition(s) fired for a registered descriptor. Plain bools rather
/// than a bitflags type: four fixed members, no combinators needed beyond
/// construction and field reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EventMask {
    pub readable: bool,
    pub writable: bool,
    pub error: bool,
    pub timeout: bool,
}

impl EventMask {
    pub const TIMEOUT: Self = Self { readable: false, writable: false, error: false, timeout: true };

    fn from_mio(event: &mio::event::Event) -> Self {
        Self {
            readable: event.is_readable(),
            writable: event.is_writable(),
            error: event.is_error() || event.is_read_closed() || event.is_write_closed(),
            timeout: false,
        }
    }
}

enum Job {
    Now(Task),
    At(Instant, Task),
}

struct Timer {
    deadline: Instant,
    seq: u64,
    task: Task,
}

// Reversed so the earliest deadline sorts as the `BinaryHeap` max, i.e. pops first.
impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        other.deadline.cmp(&self.deadline).then_with(|| other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}
impl Eq for Timer {}

/// Cheaply cloneable handle used to reach a running `EventLoop` from any
/// other thread: post work onto it, or ask it to stop.
#[derive(Clone)]
pub struct Handle {
    jobs: Sender<Job>,
    waker: Arc<Waker>,
    running: Arc<AtomicBool>,
}

impl Handle {
    /// Schedules `task` to run on the loop thread on its next iteration.
    pub fn post(&self, task: Task) {
        if self.jobs.send(Job::Now(task)).is_ok() {
            let _ = self.waker.wake();
        }
    }

    /// Schedules `task` to run on the loop thread once `deadline` has
    /// passed. No stronger guarantee than "not before"; the loop only
    /// checks timers between I/O polls.
    pub fn post_delayed(&self, task: Task, deadline: Instant) {
        if self.jobs.send(Job::At(deadline, task)).is_ok() {
            let _ = self.waker.wake();
        }
    }

    /// Asks the loop to stop after finishing its current iteration.
    pub fn stop(&self) {
        self.running.store(false, AtomicOrdering::SeqCst);
        let _ = self.waker.wake();
    }
}

/// The loop itself. Not `Send`/`Sync` by construction (owns a `mio::Poll`
/// and every registered handler); reach it from elsewhere via [`Handle`].
pub struct EventLoop {
    poll: Poll,
    events: Events,
    jobs: Receiver<Job>,
    waker: Arc<Waker>,
    timers: BinaryHeap<Timer>,
    timer_seq: u64,
    handlers: HashMap<Token, ReadinessHandler>,
    next_token: usize,
    running: Arc<AtomicBool>,
}

impl EventLoop {
    pub fn new() -> io::Result<(Self, Handle)> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);
        let (tx, rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let handle = Handle { jobs: tx, waker: Arc::clone(&waker), running: Arc::clone(&running) };
        let loop_ = Self {
            poll,
            events: Events::with_capacity(EVENT_CAPACITY),
            jobs: rx,
            waker,
            timers: BinaryHeap::new(),
            timer_seq: 0,
            handlers: HashMap::new(),
            next_token: 0,
            running,
        };
        Ok((loop_, handle))
    }

    /// Registers a descriptor for readiness notification, returning the
    /// token it's addressed by (use it with [`EventLoop::deregister`]).
    pub fn register(&mut self, source: &mut dyn Source, interest: Interest, handler: ReadinessHandler) -> io::Result<Token> {
        let token = Token(self.next_token);
        self.next_token += 1;
        self.poll.registry().register(source, token, interest)?;
        self.handlers.insert(token, handler);
        Ok(token)
    }

    pub fn reregister(&mut self, source: &mut dyn Source, token: Token, interest: Interest) -> io::Result<()> {
        self.poll.registry().reregister(source, token, interest)
    }

    pub fn deregister(&mut self, source: &mut dyn Source, token: Token) -> io::Result<()> {
        self.poll.registry().deregister(source)?;
        self.handlers.remove(&token);
        Ok(())
    }

    fn drain_jobs(&mut self) {
        while let Ok(job) = self.jobs.try_recv() {
            match job {
                Job::Now(task) => task(),
                Job::At(deadline, task) => {
                    self.timer_seq += 1;
                    self.timers.push(Timer { deadline, seq: self.timer_seq, task });
                }
            }
        }
    }

    fn fire_due_timers(&mut self, now: Instant) {
        while let Some(top) = self.timers.peek() {
            if top.deadline > now {
                break;
            }
            let timer = self.timers.pop().expect("just peeked");
            (timer.task)();
        }
    }

    /// Runs until `Handle::stop` is called. Blocks the calling thread.
    pub fn run(&mut self) {
        while self.running.load(AtomicOrdering::SeqCst) {
            self.drain_jobs();
            let now = Instant::now();
            self.fire_due_timers(now);
            if !self.running.load(AtomicOrdering::SeqCst) {
                break;
            }

            let timeout = self.timers.peek().map(|t| t.deadline.saturating_duration_since(now));
            if let Err(e) = self.poll.poll(&mut self.events, timeout) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                safe_panic!("event loop poll failed: {e}");
                break;
            }

            for event in self.events.iter() {
                if event.token() == WAKE_TOKEN {
                    continue;
                }
                if let Some(handler) = self.handlers.get_mut(&event.token()) {
                    handler(EventMask::from_mio(event));
                } else {
                    warn!(token = ?event.token(), "readiness event for an unregistered token");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{TcpListener, TcpStream};
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn post_runs_on_the_loop_thread() {
        let (mut loop_, handle) = EventLoop::new().unwrap();
        let ran = Arc::new(Mutex::new(false));
        let ran_clone = Arc::clone(&ran);
        let stop_handle = handle.clone();
        handle.post(Box::new(move || {
            *ran_clone.lock().unwrap() = true;
            stop_handle.stop();
        }));
        loop_.run();
        assert!(*ran.lock().unwrap());
    }

    #[test]
    fn post_delayed_does_not_fire_before_its_deadline() {
        let (mut loop_, handle) = EventLoop::new().unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        let deadline = Instant::now() + Duration::from_millis(30);

        let order_a = Arc::clone(&order);
        handle.post_delayed(Box::new(move || order_a.lock().unwrap().push("late")), deadline);

        let order_b = Arc::clone(&order);
        let stop_handle = handle.clone();
        handle.post_delayed(
            Box::new(move || {
                order_b.lock().unwrap().push("stop");
                stop_handle.stop();
            }),
            deadline + Duration::from_millis(30),
        );

        loop_.run();
        assert_eq!(*order.lock().unwrap(), vec!["late", "stop"]);
    }

    #[test]
    fn dispatches_readiness_to_the_registered_handler() {
        let (mut loop_, handle) = EventLoop::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();
        let mut mio_server = mio::net::TcpStream::from_std(server);

        let saw_readable = Arc::new(Mutex::new(false));
        let saw_readable_clone = Arc::clone(&saw_readable);
        let stop_handle = handle.clone();
        loop_
            .register(
                &mut mio_server,
                Interest::READABLE,
                Box::new(move |mask| {
                    if mask.readable {
                        *saw_readable_clone.lock().unwrap() = true;
                        stop_handle.stop();
                    }
                }),
            )
            .unwrap();

        let mut client = client;
        std::io::Write::write_all(&mut client, b"hi").unwrap();

        loop_.run();
        assert!(*saw_readable.lock().unwrap());
    }
}
