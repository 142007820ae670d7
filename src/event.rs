//! The event callback contract between the poll loop and user code.

use std::io;

use crate::connection::Connection;

/// Events delivered to the [`EventHandler`], one per state transition.
#[derive(Debug)]
pub enum Event {
    /// An inbound connection was just accepted and linked.
    Accept,
    /// An outbound connect resolved. Carries the connect status; `Err` means
    /// the connection is torn down right after this event.
    Connect(io::Result<()>),
    /// Fresh bytes were appended to the receive buffer.
    Recv,
    /// A write attempt finished (successfully or not).
    Send,
    /// Start of a poll pass; the place to queue output or enforce idle
    /// policies before the readiness wait.
    Poll,
    /// The connection is about to be destroyed. Fires exactly once, last.
    Close,
}

/// User-supplied event callback.
///
/// The handler may mutate the connection from within any event: append
/// output with [`Connection::send`], drain input with
/// [`Connection::consume`], or flip the [`Connection::finish_sending`],
/// [`Connection::hold_output`], and [`Connection::close`] state bits. The
/// surrounding [`crate::Server`] owns the connection; the handler must not
/// assume the borrow outlives the callback.
pub trait EventHandler {
    fn on_event(&mut self, conn: &mut Connection, event: Event);
}

impl<F> EventHandler for F
where
    F: FnMut(&mut Connection, Event),
{
    fn on_event(&mut self, conn: &mut Connection, event: Event) {
        self(conn, event)
    }
}
