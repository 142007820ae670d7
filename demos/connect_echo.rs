//! Demonstrates outbound `connect()`: connects to a remote echo server,
//! sends a greeting, prints the echoed response, then exits.
//!
//! Start the echo server first:  cargo run --example echo_server
//! Then run:                     cargo run --example connect_echo
//! Or specify a target:          TARGET=10.0.0.1:8080 cargo run --example connect_echo

use std::time::Duration;

use tcpmux::{Connection, Event, EventHandler, Server};

#[derive(Default)]
struct ConnectHandler {
    done: bool,
}

impl EventHandler for ConnectHandler {
    fn on_event(&mut self, conn: &mut Connection, event: Event) {
        match event {
            Event::Connect(Ok(())) => {
                eprintln!("connected to {}", conn.peer_addr());
                conn.send(b"Hello from tcpmux!\n");
            }
            Event::Connect(Err(e)) => {
                eprintln!("connect failed: {e}");
                self.done = true;
            }
            Event::Recv => {
                let text = String::from_utf8_lossy(conn.recv_data());
                eprintln!("received: {}", text.trim());
                conn.close();
                self.done = true;
            }
            Event::Close => {
                eprintln!("connection closed");
            }
            _ => {}
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let target = std::env::var("TARGET").unwrap_or_else(|_| "127.0.0.1:7878".to_string());
    let (host, port) = match target.rsplit_once(':') {
        Some((host, port)) => (
            host.to_string(),
            port.parse::<u16>().expect("invalid TARGET port"),
        ),
        None => panic!("TARGET must look like host:port"),
    };

    let mut client = Server::new(ConnectHandler::default()).expect("failed to create server");
    // The poll loop needs a listener; bind an ephemeral one.
    client
        .bind_addr("127.0.0.1:0".parse().unwrap())
        .expect("failed to bind");

    client
        .connect(&host, port, None)
        .expect("failed to initiate connect");
    eprintln!("connecting to {target}");

    while !client.handler().done || client.active_connections() > 0 {
        client.poll(Duration::from_millis(100));
    }
}
