use std::fmt;
use std::io;

/// Errors returned by the tcpmux public API.
#[derive(Debug)]
pub enum Error {
    /// Socket or poller operation failed.
    Io(io::Error),
    /// Endpoint string did not match the accepted grammar, or the port was 0.
    InvalidEndpoint(String),
    /// Host name resolution produced no usable address.
    Resolve(String),
    /// TLS was requested but no client TLS context is configured.
    #[cfg(feature = "tls")]
    TlsNotConfigured,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::InvalidEndpoint(spec) => write!(f, "invalid endpoint: {spec:?}"),
            Error::Resolve(host) => write!(f, "cannot resolve host: {host:?}"),
            #[cfg(feature = "tls")]
            Error::TlsNotConfigured => write!(f, "no client TLS context configured"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
