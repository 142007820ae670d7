//! tcpmux - embeddable single-threaded non-blocking TCP event loop.
//!
//! This crate provides a small networking core for applications that want
//! explicit control over when network work happens: a poll-driven event loop
//! that multiplexes one listening socket and an arbitrary set of accepted and
//! outbound connections, delivering events to a user-supplied handler.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::time::Duration;
//! use tcpmux::{Connection, Event, EventHandler, Server};
//!
//! struct Echo;
//!
//! impl EventHandler for Echo {
//!     fn on_event(&mut self, conn: &mut Connection, event: Event) {
//!         if let Event::Recv = event {
//!             let n = conn.recv_data().len();
//!             let data = conn.recv_data().to_vec();
//!             conn.send(&data);
//!             conn.consume(n);
//!         }
//!     }
//! }
//!
//! let mut server = Server::new(Echo);
//! server.bind("127.0.0.1:7878")?;
//!
//! loop {
//!     server.poll(Duration::from_millis(100));
//! }
//! ```
//!
//! # Model
//!
//! Everything runs on the thread that calls [`Server::poll`]. There are no
//! internal threads and no locks; the only suspension point is the readiness
//! wait inside the poll pass, bounded by the caller-supplied timeout. All
//! connection state transitions happen inside that pass, so handlers observe
//! a consistent view: `Poll` first, then I/O events, then `Close` for
//! connections being torn down.

pub mod addr;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
#[cfg(feature = "hexdump")]
pub(crate) mod hexdump;
pub mod iobuf;
pub mod server;
pub mod transport;

// Public API re-exports
pub use addr::parse_endpoint;
pub use config::Config;
#[cfg(feature = "tls")]
pub use config::{TlsClientConfig, TlsConfig};
pub use connection::{ConnFlags, ConnId, Connection};
pub use error::Error;
pub use event::{Event, EventHandler};
pub use iobuf::IoBuf;
pub use server::Server;
pub use transport::Transport;
#[cfg(feature = "tls")]
pub use transport::TlsTransport;
