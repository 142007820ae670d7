//! Endpoint string parsing and listener socket setup.
//!
//! The accepted endpoint grammar, tried in order:
//!
//! 1. `A.B.C.D:P` - IPv4 literal, specific bind
//! 2. `[IPv6-literal]:P` - IPv6 literal (feature `ipv6`)
//! 3. `P` - port only, IPv4 wildcard bind
//!
//! A spec parses successfully iff the entire string is consumed and the port
//! is in `[1, 65535]`. Port 0 is rejected here; callers that want an
//! ephemeral port bind a `SocketAddr` with port 0 through
//! [`crate::Server::bind_addr`] instead.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use mio::net::TcpListener;
use socket2::{Domain, Protocol, Socket, Type};

use crate::error::Error;

/// Parse a textual endpoint specification into a socket address.
pub fn parse_endpoint(spec: &str) -> Result<SocketAddr, Error> {
    let addr = if let Ok(v4) = spec.parse::<SocketAddrV4>() {
        Some(SocketAddr::V4(v4))
    } else {
        #[cfg(feature = "ipv6")]
        {
            spec.parse::<std::net::SocketAddrV6>()
                .ok()
                .map(SocketAddr::V6)
        }
        #[cfg(not(feature = "ipv6"))]
        {
            None
        }
    };

    // Bare port binds the IPv4 wildcard address.
    let addr = addr.or_else(|| {
        spec.parse::<u16>()
            .ok()
            .map(|port| SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)))
    });

    match addr {
        Some(a) if a.port() != 0 => Ok(a),
        _ => Err(Error::InvalidEndpoint(spec.to_string())),
    }
}

/// Open a non-blocking, address-reusable listening socket.
///
/// Returns the listener and the actually-bound address, so callers binding
/// port 0 learn the ephemeral port the kernel picked.
pub fn open_listener(addr: SocketAddr, backlog: i32) -> io::Result<(TcpListener, SocketAddr)> {
    let domain = match addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    let bound = socket
        .local_addr()?
        .as_socket()
        .ok_or_else(|| io::Error::other("listener bound to a non-IP address"))?;

    let std_listener: std::net::TcpListener = socket.into();
    Ok((TcpListener::from_std(std_listener), bound))
}
