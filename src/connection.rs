//! Per-connection state: socket, buffers, flag word, user context.

use std::any::Any;
use std::net::SocketAddr;
use std::time::Instant;

use mio::net::TcpStream;

use crate::iobuf::IoBuf;
use crate::transport::Transport;

/// Opaque connection identifier.
///
/// The identifier is the connection's slot in the server's arena; it is
/// stable for the connection's lifetime and may be reused after teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(pub(crate) usize);

impl ConnId {
    /// Get the raw value of the connection ID.
    #[inline]
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

bitflags::bitflags! {
    /// Connection state bits. Independent and OR-combined; all transitions
    /// are driven from inside the poll loop.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ConnFlags: u8 {
        /// Created from an inbound accept.
        const ACCEPTED = 1 << 0;
        /// Outbound connect not yet completed.
        const CONNECTING = 1 << 1;
        /// Attached transport has completed its handshake.
        const HANDSHAKE_DONE = 1 << 2;
        /// End-of-stream signaled; close once the send buffer drains.
        const FINISHED_SENDING = 1 << 3;
        /// Suppress writable interest; output accumulates in the send buffer.
        const HOLD_OUTPUT = 1 << 4;
        /// Destroy on the next poll sweep. Monotonic: never cleared.
        const CLOSE_NOW = 1 << 5;
    }
}

/// One active TCP endpoint owned by a [`crate::Server`].
pub struct Connection {
    pub(crate) id: ConnId,
    pub(crate) stream: TcpStream,
    pub(crate) recv_buf: IoBuf,
    pub(crate) send_buf: IoBuf,
    pub(crate) flags: ConnFlags,
    pub(crate) last_io: Instant,
    pub(crate) peer: SocketAddr,
    pub(crate) context: Option<Box<dyn Any>>,
    pub(crate) transport: Option<Box<dyn Transport>>,
}

impl Connection {
    pub(crate) fn new(
        id: ConnId,
        stream: TcpStream,
        peer: SocketAddr,
        flags: ConnFlags,
        now: Instant,
        growth_factor: f64,
        recv_capacity: usize,
    ) -> Self {
        Connection {
            id,
            stream,
            recv_buf: IoBuf::with_capacity(recv_capacity).with_growth_factor(growth_factor),
            send_buf: IoBuf::new().with_growth_factor(growth_factor),
            flags,
            last_io: now,
            peer,
            context: None,
            transport: None,
        }
    }

    /// This connection's identifier.
    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Remote endpoint address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Time of the last accept, read, or write on this connection. The core
    /// records it but imposes no idle timeout; embedders that want idle
    /// reaping check this from the `Poll` event.
    pub fn last_activity(&self) -> Instant {
        self.last_io
    }

    /// Queue bytes for sending. Returns how many bytes were accepted; 0
    /// means backpressure and the caller retries after the buffer drains.
    /// The poll loop writes the buffer out when the socket is writable.
    pub fn send(&mut self, data: &[u8]) -> usize {
        self.send_buf.append(data)
    }

    /// Bytes received so far and not yet consumed.
    pub fn recv_data(&self) -> &[u8] {
        self.recv_buf.data()
    }

    /// Drop the first `n` bytes of the receive buffer.
    pub fn consume(&mut self, n: usize) {
        self.recv_buf.consume(n);
    }

    /// Bytes queued in the send buffer, not yet written to the socket.
    pub fn send_queued(&self) -> usize {
        self.send_buf.len()
    }

    /// Signal end-of-stream: the connection closes once the send buffer
    /// drains. With an already-empty send buffer this closes at the next
    /// sweep.
    pub fn finish_sending(&mut self) {
        self.flags.insert(ConnFlags::FINISHED_SENDING);
        if self.send_buf.is_empty() {
            self.flags.insert(ConnFlags::CLOSE_NOW);
        }
    }

    /// Suppress (or re-enable) writable interest while output accumulates.
    pub fn hold_output(&mut self, hold: bool) {
        self.flags.set(ConnFlags::HOLD_OUTPUT, hold);
    }

    /// Schedule destruction at the next poll sweep. In-flight I/O is not
    /// interrupted; the `Close` event fires just before teardown.
    pub fn close(&mut self) {
        self.flags.insert(ConnFlags::CLOSE_NOW);
    }

    /// Whether this connection came from an inbound accept.
    pub fn is_accepted(&self) -> bool {
        self.flags.contains(ConnFlags::ACCEPTED)
    }

    /// Whether an outbound connect is still in progress.
    pub fn is_connecting(&self) -> bool {
        self.flags.contains(ConnFlags::CONNECTING)
    }

    /// Whether the attached transport has completed its handshake.
    pub fn is_handshake_done(&self) -> bool {
        self.flags.contains(ConnFlags::HANDSHAKE_DONE)
    }

    /// Whether the connection is scheduled for destruction.
    pub fn is_closing(&self) -> bool {
        self.flags.contains(ConnFlags::CLOSE_NOW)
    }

    /// Current flag word.
    pub fn flags(&self) -> ConnFlags {
        self.flags
    }

    /// Attach an opaque context carried verbatim through callbacks. The
    /// core never looks inside it.
    pub fn set_context(&mut self, context: Box<dyn Any>) {
        self.context = Some(context);
    }

    /// Borrow the user context, downcast to `T`.
    pub fn context<T: 'static>(&self) -> Option<&T> {
        self.context.as_ref().and_then(|c| c.downcast_ref())
    }

    /// Mutably borrow the user context, downcast to `T`.
    pub fn context_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.context.as_mut().and_then(|c| c.downcast_mut())
    }

    /// Take the user context out of the connection.
    pub fn take_context(&mut self) -> Option<Box<dyn Any>> {
        self.context.take()
    }
}
