//! The readiness-driven poll loop.
//!
//! One thread, one `mio::Poll`, three kinds of tokens: the listener, the
//! shutdown waker, and one per client slot. Readiness is edge-triggered on
//! the platforms that matter, so every handler drains its socket to
//! `WouldBlock` before returning to the loop; a handler that leaves bytes
//! unread would wait forever for an event that never fires again.
//!
//! Expired connections are purged on the accept path. A burst of inbound
//! connections is exactly the moment slots are needed, and it bounds purge
//! work to moments where the listener is already hot.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use tracing::{debug, info, warn};

use crate::clients::{ClientTable, Session};
use crate::config::Config;
use crate::error::ServerError;
use crate::receive::{recv_data, RecvState};
use crate::submit::ResultSink;

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
const CLIENT_BASE: usize = 2;

const EVENT_CAPACITY: usize = 64;
const POLL_TIMEOUT: Duration = Duration::from_millis(500);

/// Remote-controlled stop switch for a running [`Server`].
///
/// Clone-free by design: the handle is `Send`, so the embedding process can
/// park the server on a thread and stop it from a signal handler or test.
#[derive(Debug)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    /// Asks the poll loop to exit after the current iteration.
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::Release);
        if let Err(err) = self.waker.wake() {
            warn!(error = %err, "failed to wake poll loop, shutdown waits for timeout");
        }
    }
}

/// Live view of how many clients the server currently holds.
///
/// Readable from any thread while the poll loop owns the server; the loop
/// publishes the count after every table mutation. Tests use it to assert
/// that a disconnect actually frees its slot.
#[derive(Debug, Clone)]
pub struct ClientGauge {
    count: Arc<AtomicUsize>,
}

impl ClientGauge {
    /// Current number of connected clients.
    #[must_use]
    pub fn get(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

/// The passive check receiver.
///
/// Owns the listener, the client table, and the sink. [`Server::run`] blocks
/// the calling thread until a [`ShutdownHandle`] fires.
pub struct Server<K> {
    poll: Poll,
    listener: TcpListener,
    clients: ClientTable<TcpStream>,
    sink: K,
    max_lifetime: Duration,
    local_addr: SocketAddr,
    stop: Arc<AtomicBool>,
    waker: Arc<Waker>,
    active: Arc<AtomicUsize>,
}

impl<K: ResultSink> Server<K> {
    /// Binds the listen socket and prepares the poll loop.
    ///
    /// The socket binds to the wildcard address on the configured port,
    /// trying each resolved candidate in order. Port `0` asks the kernel
    /// for an ephemeral port; [`Server::local_addr`] reports the outcome.
    ///
    /// # Errors
    ///
    /// [`ServerError::NoListenAddr`] when the port resolves to nothing,
    /// [`ServerError::Bind`] when every candidate refuses, or a poller
    /// setup failure.
    pub fn bind(config: &Config, sink: K) -> Result<Self, ServerError> {
        let listen = format!("0.0.0.0:{}", config.port);
        let candidates: Vec<SocketAddr> = listen
            .to_socket_addrs()
            .map_err(|_| ServerError::NoListenAddr(config.port))?
            .collect();
        if candidates.is_empty() {
            return Err(ServerError::NoListenAddr(config.port));
        }

        // mio's bind sets address-reuse and non-blocking mode itself.
        let mut last_err: Option<io::Error> = None;
        let mut bound = None;
        for addr in candidates {
            match TcpListener::bind(addr) {
                Ok(listener) => {
                    bound = Some(listener);
                    break;
                },
                Err(err) => last_err = Some(err),
            }
        }
        let mut listener = match (bound, last_err) {
            (Some(l), _) => l,
            (None, Some(source)) => return Err(ServerError::Bind { addr: listen, source }),
            (None, None) => return Err(ServerError::NoListenAddr(config.port)),
        };
        let local_addr = listener.local_addr()?;

        let poll = Poll::new().map_err(ServerError::Poller)?;
        let waker =
            Arc::new(Waker::new(poll.registry(), WAKER).map_err(ServerError::Poller)?);
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .map_err(ServerError::Poller)?;

        info!(addr = %local_addr, max_clients = config.max_clients, "listening");

        Ok(Self {
            poll,
            listener,
            clients: ClientTable::new(config.max_clients, CLIENT_BASE),
            sink,
            max_lifetime: config.max_lifetime,
            local_addr,
            stop: Arc::new(AtomicBool::new(false)),
            waker,
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Address the listener actually bound.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of currently connected clients.
    #[must_use]
    pub fn active_clients(&self) -> usize {
        self.clients.len()
    }

    /// A handle that stops [`Server::run`] from another thread.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle { flag: Arc::clone(&self.stop), waker: Arc::clone(&self.waker) }
    }

    /// A counter of connected clients, readable from other threads.
    #[must_use]
    pub fn client_gauge(&self) -> ClientGauge {
        ClientGauge { count: Arc::clone(&self.active) }
    }

    /// Runs the poll loop until a shutdown handle fires.
    ///
    /// The poll timeout is a backstop for a missed wakeup, not a work
    /// ticker; an idle server sits in `poll` and burns nothing.
    ///
    /// # Errors
    ///
    /// Only poller failures escape. Per-connection errors are handled in
    /// the loop by closing the connection in question.
    pub fn run(&mut self) -> Result<(), ServerError> {
        let mut events = Events::with_capacity(EVENT_CAPACITY);

        while !self.stop.load(Ordering::Acquire) {
            if let Err(err) = self.poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(ServerError::Poller(err));
            }

            for event in events.iter() {
                match event.token() {
                    WAKER => {},
                    LISTENER => self.accept_burst(),
                    token => self.client_event(token, event.is_error(), event.is_readable()),
                }
            }
        }

        info!(active = self.clients.len(), "shutting down");
        self.close_all();
        Ok(())
    }

    /// Accepts connections until the listener reports `WouldBlock`.
    fn accept_burst(&mut self) {
        // Free up slots before asking for more.
        for (_, mut session) in self.clients.purge_expired(Instant::now()) {
            info!(peer = %session.peer(), "evicting expired client");
            self.deregister(session.stream_mut());
        }
        self.publish_count();

        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => self.admit(stream, addr),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if transient_accept_error(err.kind()) => {
                    // One aborted handshake must not strand the rest of the
                    // backlog: under edge-triggered registration no new
                    // readiness fires until another SYN arrives, so the
                    // drain keeps going.
                    warn!(error = %err, "transient accept failure, continuing drain");
                },
                Err(err) => {
                    warn!(error = %err, "accept failed, listener unusable this burst");
                    break;
                },
            }
        }
    }

    fn admit(&mut self, stream: TcpStream, addr: SocketAddr) {
        if self.clients.is_full() {
            warn!(peer = %addr, at = self.clients.capacity(), "client table full, refusing connection");
            drop(stream);
            return;
        }

        let deadline = Instant::now() + self.max_lifetime;
        let session = Session::new(stream, addr.to_string(), deadline);
        let token = match self.clients.insert(session) {
            Ok(token) => token,
            Err(session) => {
                // is_full above makes this unreachable, but refusing is the
                // right move either way.
                warn!(peer = %session.peer(), "client table full, refusing connection");
                return;
            },
        };

        if let Some(session) = self.clients.find_mut(token) {
            if let Err(err) = self.poll.registry().register(
                session.stream_mut(),
                token,
                Interest::READABLE,
            ) {
                warn!(peer = %session.peer(), error = %err, "failed to register connection");
                self.clients.close(token);
                return;
            }
            debug!(peer = %session.peer(), slot = token.0, "accepted connection");
        }
        self.publish_count();
    }

    fn client_event(&mut self, token: Token, errored: bool, readable: bool) {
        if errored {
            self.close_client(token);
            return;
        }
        if !readable {
            warn!(slot = token.0, "notification without readable flag, closing defensively");
            self.close_client(token);
            return;
        }

        let now = unix_now();
        let state = match self.clients.find_mut(token) {
            Some(session) => recv_data(session, &mut self.sink, now),
            // A stale event for a slot purged earlier in this batch.
            None => return,
        };

        if state == RecvState::Closed {
            self.close_client(token);
        }
    }

    fn close_client(&mut self, token: Token) {
        if let Some(mut session) = self.clients.close(token) {
            debug!(peer = %session.peer(), bytes = session.bytes_total, "closing connection");
            self.deregister(session.stream_mut());
        }
        self.publish_count();
    }

    fn close_all(&mut self) {
        let now = Instant::now() + Duration::from_secs(u64::from(u32::MAX));
        for (_, mut session) in self.clients.purge_expired(now) {
            self.deregister(session.stream_mut());
        }
        self.publish_count();
    }

    fn publish_count(&self) {
        self.active.store(self.clients.len(), Ordering::Release);
    }

    fn deregister(&self, stream: &mut TcpStream) {
        if let Err(err) = self.poll.registry().deregister(stream) {
            warn!(error = %err, "failed to deregister connection");
        }
    }
}

/// Whether an accept failure concerns only the connection being accepted,
/// leaving the listener itself fine to keep draining.
fn transient_accept_error(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
    )
}

/// The receiver's clock, in seconds since the epoch.
fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u32::try_from(d.as_secs()).unwrap_or(u32::MAX))
        .unwrap_or_default()
}
