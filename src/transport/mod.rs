//! Pluggable transport wrappers.
//!
//! A transport intercepts reads, writes, and handshake progression on one
//! connection (e.g., a TLS layer). The core sees only these three
//! operations; with no transport attached it talks to the socket directly.

#[cfg(feature = "tls")]
mod tls;

#[cfg(feature = "tls")]
pub use tls::TlsTransport;

use std::io;

use mio::net::TcpStream;

/// Wrapper around the socket I/O of a single connection.
///
/// All three operations are non-blocking: `WouldBlock` means retry on the
/// next readiness, any other error tears the connection down.
pub trait Transport {
    /// Progress the handshake. Returns `Ok(true)` once the transport is
    /// ready for application data, `Ok(false)` while it would block.
    fn try_handshake(&mut self, sock: &mut TcpStream) -> io::Result<bool>;

    /// Read decrypted application data from the socket. `Ok(0)` means the
    /// peer closed.
    fn read(&mut self, sock: &mut TcpStream, buf: &mut [u8]) -> io::Result<usize>;

    /// Write application data through the transport to the socket. Returns
    /// the number of plaintext bytes accepted.
    fn write(&mut self, sock: &mut TcpStream, data: &[u8]) -> io::Result<usize>;
}
