//! TLS integration tests: a TLS-configured server echoing to a
//! `connect_tls` client, with the whole handshake driven through the poll
//! loop on both sides.

#![cfg(feature = "tls")]

use std::sync::Arc;
use std::time::Duration;

use tcpmux::{Config, Connection, Event, EventHandler, Server, TlsClientConfig, TlsConfig};

/// Handler that records connect outcomes and optionally echoes or sends a
/// payload once connected.
#[derive(Default)]
struct TlsRecorder {
    connected: bool,
    connect_failed: bool,
    closes: usize,
    echo: bool,
    on_connect_send: Option<Vec<u8>>,
}

impl EventHandler for TlsRecorder {
    fn on_event(&mut self, conn: &mut Connection, event: Event) {
        match event {
            Event::Connect(Ok(())) => {
                self.connected = true;
                if let Some(data) = self.on_connect_send.take() {
                    conn.send(&data);
                }
            }
            Event::Connect(Err(_)) => self.connect_failed = true,
            Event::Recv if self.echo => {
                let data = conn.recv_data().to_vec();
                conn.send(&data);
                conn.consume(data.len());
            }
            Event::Close => self.closes += 1,
            _ => {}
        }
    }
}

/// Self-signed certificate for 127.0.0.1, trusted by the paired client
/// config.
fn certified_configs() -> (TlsConfig, TlsClientConfig) {
    let certified =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string(), "127.0.0.1".to_string()])
            .unwrap();
    let cert_der = certified.cert.der().clone();
    let key_der = rustls::pki_types::PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der());

    let server_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(
            vec![cert_der.clone()],
            rustls::pki_types::PrivateKeyDer::Pkcs8(key_der),
        )
        .unwrap();

    let mut roots = rustls::RootCertStore::empty();
    roots.add(cert_der).unwrap();
    let client_config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    (
        TlsConfig {
            server_config: Arc::new(server_config),
        },
        TlsClientConfig {
            client_config: Arc::new(client_config),
        },
    )
}

#[test]
fn tls_handshake_and_echo_round_trip() {
    let (server_tls, client_tls) = certified_configs();

    let server_config = Config {
        tls: Some(server_tls),
        ..Config::default()
    };
    let handler = TlsRecorder {
        echo: true,
        ..TlsRecorder::default()
    };
    let mut server = Server::with_config(handler, server_config).unwrap();
    let port = server.bind_addr("127.0.0.1:0".parse().unwrap()).unwrap();

    let client_config = Config {
        tls_client: Some(client_tls),
        ..Config::default()
    };
    let handler = TlsRecorder {
        on_connect_send: Some(b"ping".to_vec()),
        ..TlsRecorder::default()
    };
    let mut client = Server::with_config(handler, client_config).unwrap();
    client.bind_addr("127.0.0.1:0".parse().unwrap()).unwrap();

    // The host literal doubles as the TLS server name; the certificate
    // carries 127.0.0.1 as a subject alternative name.
    let id = client.connect_tls("127.0.0.1", port, None).unwrap();

    let mut reply = Vec::new();
    for _ in 0..100 {
        server.poll(Duration::from_millis(10));
        client.poll(Duration::from_millis(10));
        assert!(!client.handler().connect_failed, "TLS connect failed");
        if let Some(conn) = client.connection(id) {
            if !conn.recv_data().is_empty() {
                reply = conn.recv_data().to_vec();
                break;
            }
        }
    }

    // Connect fired only after the handshake completed, and the payload
    // made a full encrypted round trip.
    assert!(client.handler().connected, "Connect event never fired");
    assert_eq!(reply, b"ping");
    let conn = client.connection(id).unwrap();
    assert!(conn.is_handshake_done());
    assert!(!conn.is_connecting());
}

#[test]
fn connect_tls_without_client_config_fails() {
    let handler = TlsRecorder::default();
    let mut client = Server::new(handler).unwrap();
    client.bind_addr("127.0.0.1:0".parse().unwrap()).unwrap();

    let result = client.connect_tls("127.0.0.1", 1, None);
    assert!(result.is_err());
    assert_eq!(client.active_connections(), 0);
}

#[test]
fn untrusted_server_certificate_fails_handshake() {
    let (server_tls, _trusting) = certified_configs();

    let server_config = Config {
        tls: Some(server_tls),
        ..Config::default()
    };
    let mut server =
        Server::with_config(TlsRecorder::default(), server_config).unwrap();
    let port = server.bind_addr("127.0.0.1:0".parse().unwrap()).unwrap();

    // This client only trusts the webpki roots, not the test certificate.
    let client_config = Config {
        tls_client: Some(TlsClientConfig::with_webpki_roots()),
        ..Config::default()
    };
    let mut client = Server::with_config(TlsRecorder::default(), client_config).unwrap();
    client.bind_addr("127.0.0.1:0".parse().unwrap()).unwrap();

    let id = client.connect_tls("127.0.0.1", port, None).unwrap();

    for _ in 0..100 {
        server.poll(Duration::from_millis(10));
        client.poll(Duration::from_millis(10));
        if client.connection(id).is_none() {
            break;
        }
    }

    // Verification failure surfaces as a failed connect followed by
    // teardown.
    assert!(client.handler().connect_failed);
    assert!(!client.handler().connected);
    assert_eq!(client.handler().closes, 1);
    assert!(client.connection(id).is_none());
}
