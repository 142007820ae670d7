//! TLS transport using rustls.

use std::io::{self, Read, Write};
use std::sync::Arc;

use mio::net::TcpStream;
use rustls::pki_types::ServerName;

use super::Transport;

/// TLS wrapper over one connection's socket, client- or server-side.
///
/// Ciphertext moves between the socket and the rustls state machine inside
/// each operation; the poll loop never sees TLS records, only plaintext.
pub struct TlsTransport {
    conn: rustls::Connection,
    /// Set once the socket reports EOF; the next read drains remaining
    /// plaintext and then reports the close.
    sock_eof: bool,
}

impl TlsTransport {
    /// Create a client-side transport for the given server name.
    pub fn client(config: Arc<rustls::ClientConfig>, server_name: &str) -> io::Result<Self> {
        let name = ServerName::try_from(server_name.to_string())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let conn = rustls::ClientConnection::new(config, name).map_err(io::Error::other)?;
        Ok(TlsTransport {
            conn: conn.into(),
            sock_eof: false,
        })
    }

    /// Create a server-side transport.
    pub fn server(config: Arc<rustls::ServerConfig>) -> io::Result<Self> {
        let conn = rustls::ServerConnection::new(config).map_err(io::Error::other)?;
        Ok(TlsTransport {
            conn: conn.into(),
            sock_eof: false,
        })
    }

    /// Whether the handshake is still in progress.
    pub fn is_handshaking(&self) -> bool {
        self.conn.is_handshaking()
    }

    /// The negotiated ALPN protocol, if any.
    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        self.conn.alpn_protocol()
    }

    /// Write pending ciphertext to the socket. Returns false when the
    /// socket would block with ciphertext still queued.
    fn flush(&mut self, sock: &mut TcpStream) -> io::Result<bool> {
        while self.conn.wants_write() {
            match self.conn.write_tls(sock) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    /// Read ciphertext from the socket into the rustls state machine until
    /// the socket would block or reports EOF.
    fn pump(&mut self, sock: &mut TcpStream) -> io::Result<()> {
        loop {
            match self.conn.read_tls(sock) {
                Ok(0) => {
                    self.sock_eof = true;
                    return Ok(());
                }
                Ok(_) => {
                    self.conn.process_new_packets().map_err(io::Error::other)?;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }
}

impl Transport for TlsTransport {
    fn try_handshake(&mut self, sock: &mut TcpStream) -> io::Result<bool> {
        loop {
            if self.conn.wants_write() {
                match self.conn.write_tls(sock) {
                    Ok(_) => continue,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }
            if !self.conn.is_handshaking() {
                return Ok(true);
            }
            match self.conn.read_tls(sock) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "peer closed during TLS handshake",
                    ));
                }
                Ok(_) => {
                    self.conn.process_new_packets().map_err(io::Error::other)?;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    fn read(&mut self, sock: &mut TcpStream, buf: &mut [u8]) -> io::Result<usize> {
        self.pump(sock)?;
        // Flush any response records rustls queued while processing
        // (post-handshake messages, key updates).
        self.flush(sock)?;

        match self.conn.reader().read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if self.sock_eof {
                    Ok(0)
                } else {
                    Err(e)
                }
            }
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, sock: &mut TcpStream, data: &[u8]) -> io::Result<usize> {
        if self.conn.is_handshaking() {
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }
        let n = self.conn.writer().write(data)?;
        self.flush(sock)?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TlsClientConfig;

    fn client_transport() -> TlsTransport {
        let config = TlsClientConfig::with_webpki_roots();
        TlsTransport::client(config.client_config, "example.com").unwrap()
    }

    /// Loopback stream pair for driving the transport without a TLS peer.
    /// The client side connects blocking first so the socket is fully
    /// established before the transport touches it.
    fn loopback_stream() -> (TcpStream, std::net::TcpStream) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let std_client = std::net::TcpStream::connect(addr).unwrap();
        std_client.set_nonblocking(true).unwrap();
        let client = TcpStream::from_std(std_client);
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn client_starts_handshaking() {
        let transport = client_transport();
        assert!(transport.is_handshaking());
        assert!(transport.alpn_protocol().is_none());
    }

    #[test]
    fn invalid_server_name_rejected() {
        let config = TlsClientConfig::with_webpki_roots();
        let result = TlsTransport::client(config.client_config, "");
        assert!(result.is_err());
    }

    #[test]
    fn write_during_handshake_would_block() {
        let mut transport = client_transport();
        let (mut sock, _peer) = loopback_stream();

        let result = transport.write(&mut sock, b"hello");
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn handshake_sends_client_hello() {
        let mut transport = client_transport();
        let (mut sock, peer) = loopback_stream();

        // First attempt flushes the ClientHello and then blocks waiting for
        // the (nonexistent) server flight.
        let done = transport.try_handshake(&mut sock).unwrap();
        assert!(!done);

        peer.set_read_timeout(Some(std::time::Duration::from_millis(500)))
            .unwrap();
        let mut buf = [0u8; 4096];
        let n = (&peer).read(&mut buf).unwrap();
        assert!(n > 0, "expected ClientHello bytes on the wire");
        // TLS handshake record type.
        assert_eq!(buf[0], 0x16);
    }
}
