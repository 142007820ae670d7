//! The server: listening socket, connection arena, and the poll loop.
//!
//! The poll loop is the single synchronization point of the crate. Every
//! state transition - admission, connect completion, reads, writes, flag
//! updates, teardown - happens inside one pass, on the calling thread.

use std::any::Any;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Once;
use std::time::{Duration, Instant};

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token};
use slab::Slab;
use tracing::{debug, trace};

use crate::addr;
use crate::config::Config;
use crate::connection::{ConnFlags, ConnId, Connection};
use crate::error::Error;
use crate::event::{Event, EventHandler};
use crate::transport::Transport;

/// Token for the listening socket, outside the slab key range.
const LISTENER: Token = Token(1 << 30);

/// Stack scratch size for one receive pass.
const RECV_CHUNK: usize = 2048;

static BOOTSTRAP: Once = Once::new();

/// Process-wide network bootstrap; runs once, on first server creation.
fn bootstrap() {
    BOOTSTRAP.call_once(|| {
        // Peer resets must surface as EPIPE write errors, not kill the
        // process.
        #[cfg(unix)]
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_IGN);
        }
    });
}

/// Interrupted, would-block, and in-progress results are transient; the
/// operation is retried on the next readiness. Everything else tears the
/// connection down.
fn is_soft_io_error(e: &io::Error) -> bool {
    if matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    ) {
        return true;
    }
    #[cfg(unix)]
    if e.raw_os_error() == Some(libc::EINPROGRESS) {
        return true;
    }
    false
}

/// Owns the listener and every active connection, and drives them through
/// the user's [`EventHandler`] one poll pass at a time.
///
/// Single-threaded by contract: `poll`, `connect`, and connection access
/// must be serialized by the embedder. The only blocking points are the
/// readiness wait inside [`Server::poll`] and name resolution inside
/// [`Server::connect`].
pub struct Server<H: EventHandler> {
    poll: Poll,
    events: Events,
    listener: Option<mio::net::TcpListener>,
    conns: Slab<Connection>,
    handler: H,
    config: Config,
}

impl<H: EventHandler> Server<H> {
    /// Create a server with default configuration.
    pub fn new(handler: H) -> Result<Self, Error> {
        Self::with_config(handler, Config::default())
    }

    /// Create a server with custom configuration.
    pub fn with_config(handler: H, config: Config) -> Result<Self, Error> {
        bootstrap();
        Ok(Server {
            poll: Poll::new()?,
            events: Events::with_capacity(config.events_capacity),
            listener: None,
            conns: Slab::new(),
            handler,
            config,
        })
    }

    /// Bind the listening socket from an endpoint string (see
    /// [`crate::parse_endpoint`] for the grammar). Returns the bound port.
    pub fn bind(&mut self, spec: &str) -> Result<u16, Error> {
        let addr = addr::parse_endpoint(spec)?;
        self.bind_addr(addr)
    }

    /// Bind directly to a socket address, bypassing the endpoint grammar.
    /// Port 0 binds an ephemeral port; the actually-bound port is returned.
    pub fn bind_addr(&mut self, addr: SocketAddr) -> Result<u16, Error> {
        let (mut listener, bound) = addr::open_listener(addr, self.config.backlog)?;
        self.poll
            .registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        if let Some(mut old) = self.listener.take() {
            let _ = self.poll.registry().deregister(&mut old);
        }
        self.listener = Some(listener);
        debug!(%bound, "listening");
        Ok(bound.port())
    }

    /// Initiate an outbound connection. The `Connect` event reports the
    /// result once the poll loop observes completion.
    ///
    /// Name resolution is blocking; literal addresses resolve without
    /// touching the network.
    pub fn connect(
        &mut self,
        host: &str,
        port: u16,
        context: Option<Box<dyn Any>>,
    ) -> Result<ConnId, Error> {
        self.connect_with_transport(host, port, None, context)
    }

    /// Outbound connection with a transport wrapper attached. The wrapper's
    /// handshake is driven to completion before `Connect` is delivered.
    pub fn connect_with_transport(
        &mut self,
        host: &str,
        port: u16,
        transport: Option<Box<dyn Transport>>,
        context: Option<Box<dyn Any>>,
    ) -> Result<ConnId, Error> {
        let target = (host, port)
            .to_socket_addrs()
            .map_err(|_| Error::Resolve(host.to_string()))?
            .next()
            .ok_or_else(|| Error::Resolve(host.to_string()))?;

        let mut stream = TcpStream::connect(target)?;
        let entry = self.conns.vacant_entry();
        let key = entry.key();
        self.poll.registry().register(
            &mut stream,
            Token(key),
            Interest::READABLE | Interest::WRITABLE,
        )?;

        let mut conn = Connection::new(
            ConnId(key),
            stream,
            target,
            ConnFlags::CONNECTING,
            Instant::now(),
            self.config.growth_factor,
            self.config.recv_buffer_capacity,
        );
        conn.transport = transport;
        conn.context = context;
        entry.insert(conn);
        debug!(conn = key, %target, "connecting");
        Ok(ConnId(key))
    }

    /// Outbound TLS connection using the configured client TLS context.
    /// The `Connect` event fires after the TLS handshake completes.
    #[cfg(feature = "tls")]
    pub fn connect_tls(
        &mut self,
        host: &str,
        port: u16,
        context: Option<Box<dyn Any>>,
    ) -> Result<ConnId, Error> {
        let tls = self
            .config
            .tls_client
            .clone()
            .ok_or(Error::TlsNotConfigured)?;
        let transport = crate::transport::TlsTransport::client(tls.client_config, host)?;
        self.connect_with_transport(host, port, Some(Box::new(transport)), context)
    }

    /// Run one poll pass, waiting up to `timeout` for readiness. Returns
    /// the number of active connections after the pass.
    ///
    /// Reentrant in the sense that it may be called in a loop with any
    /// timeout, including zero; without a listener it returns 0 without
    /// doing any work.
    pub fn poll(&mut self, timeout: Duration) -> usize {
        if self.listener.is_none() {
            return 0;
        }
        let now = Instant::now();

        // Pre-select walk: deliver Poll, recompute interest sets, and reap
        // connections already flagged for teardown before blocking.
        if let Some(listener) = self.listener.as_mut() {
            // Re-registering every pass re-arms the readiness edge, so a
            // backlog that was only partially drained reports again.
            let _ = self
                .poll
                .registry()
                .reregister(listener, LISTENER, Interest::READABLE);
        }
        let keys: Vec<usize> = self.conns.iter().map(|(key, _)| key).collect();
        for key in keys {
            self.handler.on_event(&mut self.conns[key], Event::Poll);

            let conn = &self.conns[key];
            let connecting = conn.flags.contains(ConnFlags::CONNECTING);
            let send_pending =
                !conn.send_buf.is_empty() && !conn.flags.contains(ConnFlags::HOLD_OUTPUT);

            if !send_pending && conn.flags.contains(ConnFlags::CLOSE_NOW) {
                self.close_conn(key);
                continue;
            }
            // Writability doubles as the completion signal for an
            // in-progress connect.
            let mut interest = Interest::READABLE;
            if connecting || send_pending {
                interest = interest | Interest::WRITABLE;
            }
            let conn = &mut self.conns[key];
            let _ = self
                .poll
                .registry()
                .reregister(&mut conn.stream, Token(key), interest);
        }

        // Readiness wait. A wait error counts as an empty pass.
        let mut listener_ready = false;
        let mut ready: Vec<(usize, bool, bool)> = Vec::new();
        if self.poll.poll(&mut self.events, Some(timeout)).is_ok() {
            for event in self.events.iter() {
                if event.token() == LISTENER {
                    listener_ready = listener_ready || event.is_readable();
                } else {
                    ready.push((event.token().0, event.is_readable(), event.is_writable()));
                }
            }
        }

        // Post-select walk: admit at most one connection per pass, then
        // service ready sockets.
        let accepted = if listener_ready {
            self.accept_one(now)
        } else {
            None
        };
        for (key, readable, writable) in ready {
            // A freshly accepted connection gets no further I/O events
            // until the next pass.
            if accepted == Some(key) || !self.conns.contains(key) {
                continue;
            }
            if readable {
                self.conns[key].last_io = now;
                self.recv_pass(key);
            }
            if writable && self.conns.contains(key) {
                if self.conns[key].flags.contains(ConnFlags::CONNECTING) {
                    self.finish_connect(key);
                } else if !self.conns[key].flags.contains(ConnFlags::HOLD_OUTPUT) {
                    self.conns[key].last_io = now;
                    self.send_pass(key);
                }
            }
        }

        // Reap walk: destroy everything flagged during the pass.
        let doomed: Vec<usize> = self
            .conns
            .iter()
            .filter(|(_, conn)| conn.flags.contains(ConnFlags::CLOSE_NOW))
            .map(|(key, _)| key)
            .collect();
        for key in doomed {
            self.close_conn(key);
        }

        self.conns.len()
    }

    /// Number of connections currently in the active set.
    pub fn active_connections(&self) -> usize {
        self.conns.len()
    }

    /// Iterate over the active connections in arena order.
    pub fn connections(&self) -> impl Iterator<Item = &Connection> + '_ {
        self.conns.iter().map(|(_, conn)| conn)
    }

    /// Access a connection between poll passes.
    pub fn connection(&self, id: ConnId) -> Option<&Connection> {
        self.conns.get(id.0)
    }

    /// Mutably access a connection between poll passes, e.g. to queue
    /// output from outside the event handler.
    pub fn connection_mut(&mut self, id: ConnId) -> Option<&mut Connection> {
        self.conns.get_mut(id.0)
    }

    /// Borrow the event handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Mutably borrow the event handler.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Accept one pending connection.
    ///
    /// One accept per ready signal: portable across stacks that do not
    /// honor non-blocking semantics on listening sockets, and fair to
    /// connections already being serviced. Re-arming the listener interest
    /// each pass reports the remaining backlog again.
    fn accept_one(&mut self, now: Instant) -> Option<usize> {
        let result = self.listener.as_ref()?.accept();
        match result {
            Ok((mut stream, peer)) => {
                let entry = self.conns.vacant_entry();
                let key = entry.key();
                if let Err(e) = self.poll.registry().register(
                    &mut stream,
                    Token(key),
                    Interest::READABLE | Interest::WRITABLE,
                ) {
                    debug!(error = %e, "failed to register accepted socket");
                    return None;
                }
                let mut conn = Connection::new(
                    ConnId(key),
                    stream,
                    peer,
                    ConnFlags::ACCEPTED,
                    now,
                    self.config.growth_factor,
                    self.config.recv_buffer_capacity,
                );
                #[cfg(feature = "tls")]
                if let Some(tls) = self.config.tls.as_ref() {
                    match crate::transport::TlsTransport::server(tls.server_config.clone()) {
                        Ok(transport) => conn.transport = Some(Box::new(transport)),
                        Err(e) => {
                            debug!(error = %e, "failed to create server TLS session");
                            return None;
                        }
                    }
                }
                entry.insert(conn);
                trace!(conn = key, %peer, "accepted");
                self.handler.on_event(&mut self.conns[key], Event::Accept);
                Some(key)
            }
            Err(e) => {
                if !is_soft_io_error(&e) {
                    debug!(error = %e, "accept failed");
                }
                None
            }
        }
    }

    /// Receive pass for one readable connection.
    fn recv_pass(&mut self, key: usize) {
        // Readability can be the first completion signal for an in-progress
        // connect.
        if self.conns[key].flags.contains(ConnFlags::CONNECTING) {
            self.finish_connect(key);
            return;
        }

        // An attached transport finishes its handshake before any
        // application data flows.
        {
            let conn = &mut self.conns[key];
            if let Some(transport) = conn.transport.as_mut() {
                if !conn.flags.contains(ConnFlags::HANDSHAKE_DONE) {
                    match transport.try_handshake(&mut conn.stream) {
                        Ok(true) => {
                            conn.flags.insert(ConnFlags::HANDSHAKE_DONE);
                            trace!(conn = key, "handshake complete");
                        }
                        Ok(false) => return,
                        Err(e) => {
                            debug!(conn = key, error = %e, "handshake failed");
                            conn.flags.insert(ConnFlags::CLOSE_NOW);
                            return;
                        }
                    }
                }
            }
        }

        let mut scratch = [0u8; RECV_CHUNK];
        let result = {
            let conn = &mut self.conns[key];
            match conn.transport.as_mut() {
                Some(transport) => transport.read(&mut conn.stream, &mut scratch),
                None => conn.stream.read(&mut scratch),
            }
        };

        match result {
            // A zero read is the peer's orderly close.
            Ok(0) => {
                trace!(conn = key, "peer closed");
                self.conns[key].flags.insert(ConnFlags::CLOSE_NOW);
            }
            Ok(n) => {
                #[cfg(feature = "hexdump")]
                crate::hexdump::dump(
                    self.config.hexdump_dir.as_deref(),
                    ConnId(key),
                    "<-",
                    &scratch[..n],
                );
                self.conns[key].recv_buf.append(&scratch[..n]);
                trace!(conn = key, bytes = n, "recv");
                self.handler.on_event(&mut self.conns[key], Event::Recv);
            }
            Err(e) if is_soft_io_error(&e) => {}
            Err(e) => {
                debug!(conn = key, error = %e, "recv error");
                self.conns[key].flags.insert(ConnFlags::CLOSE_NOW);
            }
        }
    }

    /// Resolve an in-progress connect on its first readiness.
    fn finish_connect(&mut self, key: usize) {
        let mut status: io::Result<()> = {
            let conn = &mut self.conns[key];
            conn.flags.remove(ConnFlags::CONNECTING);
            match conn.stream.take_error() {
                Ok(None) => Ok(()),
                Ok(Some(e)) => Err(e),
                Err(e) => Err(e),
            }
        };

        if status.is_ok() {
            let conn = &mut self.conns[key];
            if let Some(transport) = conn.transport.as_mut() {
                match transport.try_handshake(&mut conn.stream) {
                    Ok(true) => {
                        conn.flags.insert(ConnFlags::HANDSHAKE_DONE);
                        trace!(conn = key, "handshake complete");
                    }
                    Ok(false) => {
                        // Still handshaking: re-arm and let the next pass
                        // drive it again.
                        conn.flags.insert(ConnFlags::CONNECTING);
                        return;
                    }
                    Err(e) => status = Err(e),
                }
            }
        }

        let failed = status.is_err();
        debug!(conn = key, ok = !failed, "connect resolved");
        self.handler
            .on_event(&mut self.conns[key], Event::Connect(status));
        if failed {
            self.conns[key].flags.insert(ConnFlags::CLOSE_NOW);
        }
    }

    /// Send pass for one writable connection: write the whole send buffer,
    /// drop the written prefix, close once drained if end-of-stream was
    /// signaled. `Send` fires after every attempt.
    fn send_pass(&mut self, key: usize) {
        let result = {
            let conn = &mut self.conns[key];
            if conn.send_buf.is_empty() {
                None
            } else {
                Some(match conn.transport.as_mut() {
                    Some(transport) => transport.write(&mut conn.stream, conn.send_buf.data()),
                    None => conn.stream.write(conn.send_buf.data()),
                })
            }
        };
        let Some(result) = result else { return };

        match result {
            Ok(0) => {
                self.conns[key].flags.insert(ConnFlags::CLOSE_NOW);
            }
            Ok(n) => {
                #[cfg(feature = "hexdump")]
                crate::hexdump::dump(
                    self.config.hexdump_dir.as_deref(),
                    ConnId(key),
                    "->",
                    &self.conns[key].send_buf.data()[..n],
                );
                self.conns[key].send_buf.consume(n);
                trace!(conn = key, bytes = n, "sent");
            }
            Err(e) if is_soft_io_error(&e) => {}
            Err(e) => {
                debug!(conn = key, error = %e, "send error");
                self.conns[key].flags.insert(ConnFlags::CLOSE_NOW);
            }
        }

        {
            let conn = &mut self.conns[key];
            if conn.send_buf.is_empty() && conn.flags.contains(ConnFlags::FINISHED_SENDING) {
                conn.flags.insert(ConnFlags::CLOSE_NOW);
            }
        }
        self.handler.on_event(&mut self.conns[key], Event::Send);
    }

    /// Destroy one connection: emit `Close`, unlink, deregister. Dropping
    /// the record closes the socket and releases both buffers.
    fn close_conn(&mut self, key: usize) {
        self.handler.on_event(&mut self.conns[key], Event::Close);
        let mut conn = self.conns.remove(key);
        let _ = self.poll.registry().deregister(&mut conn.stream);
        trace!(conn = key, flags = ?conn.flags, "closed");
    }
}

impl<H: EventHandler> Drop for Server<H> {
    fn drop(&mut self) {
        // One zero-timeout pass flushes already-flagged teardowns under
        // normal event semantics before anything is torn out from under
        // the handler.
        self.poll(Duration::ZERO);
        if let Some(mut listener) = self.listener.take() {
            let _ = self.poll.registry().deregister(&mut listener);
        }
        let keys: Vec<usize> = self.conns.iter().map(|(key, _)| key).collect();
        for key in keys {
            self.close_conn(key);
        }
    }
}
