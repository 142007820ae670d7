//! Server configuration.

use crate::iobuf::DEFAULT_GROWTH_FACTOR;

/// TLS configuration for accepted connections. Pass a pre-built rustls
/// ServerConfig; the user loads certs/keys and configures ALPN etc.
#[cfg(feature = "tls")]
#[derive(Clone)]
pub struct TlsConfig {
    pub server_config: std::sync::Arc<rustls::ServerConfig>,
}

/// TLS client configuration for outbound connections.
#[cfg(feature = "tls")]
#[derive(Clone)]
pub struct TlsClientConfig {
    /// Pre-built rustls ClientConfig. User configures root certs, ALPN, etc.
    pub client_config: std::sync::Arc<rustls::ClientConfig>,
}

#[cfg(feature = "tls")]
impl TlsClientConfig {
    /// Create a client configuration trusting the webpki root certificates.
    pub fn with_webpki_roots() -> Self {
        let root_store =
            rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        TlsClientConfig {
            client_config: std::sync::Arc::new(config),
        }
    }
}

/// Configuration for a [`crate::Server`].
#[derive(Clone)]
pub struct Config {
    /// TCP listen backlog.
    pub backlog: i32,
    /// Capacity of the readiness event batch collected per poll pass.
    pub events_capacity: usize,
    /// Geometric growth multiplier for connection I/O buffers.
    pub growth_factor: f64,
    /// Initial capacity of each connection's receive buffer. 0 means the
    /// buffer allocates lazily on the first read.
    pub recv_buffer_capacity: usize,
    /// Optional TLS configuration. When set, all accepted connections
    /// run a server-side TLS handshake before any data is delivered.
    #[cfg(feature = "tls")]
    pub tls: Option<TlsConfig>,
    /// Optional TLS client configuration for outbound `connect_tls()` calls.
    #[cfg(feature = "tls")]
    pub tls_client: Option<TlsClientConfig>,
    /// Directory for per-connection traffic dump files. None = current
    /// working directory.
    #[cfg(feature = "hexdump")]
    pub hexdump_dir: Option<std::path::PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backlog: 1024,
            events_capacity: 1024,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            recv_buffer_capacity: 0,
            #[cfg(feature = "tls")]
            tls: None,
            #[cfg(feature = "tls")]
            tls_client: None,
            #[cfg(feature = "hexdump")]
            hexdump_dir: None,
        }
    }
}
