use std::time::Duration;

use tcpmux::{Connection, Event, EventHandler, Server};

struct EchoHandler {
    connections: usize,
}

impl EventHandler for EchoHandler {
    fn on_event(&mut self, conn: &mut Connection, event: Event) {
        match event {
            Event::Accept => {
                self.connections += 1;
                eprintln!(
                    "accepted {} from {} (total: {})",
                    conn.id().as_usize(),
                    conn.peer_addr(),
                    self.connections
                );
            }
            Event::Recv => {
                let data = conn.recv_data().to_vec();
                let accepted = conn.send(&data);
                conn.consume(accepted);
            }
            Event::Close => {
                self.connections -= 1;
                eprintln!(
                    "connection {} closed (remaining: {})",
                    conn.id().as_usize(),
                    self.connections
                );
            }
            _ => {}
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:7878".to_string());

    let mut server = Server::new(EchoHandler { connections: 0 }).expect("failed to create server");
    let port = server.bind(&endpoint).expect("failed to bind");
    eprintln!("echo server listening on port {port}");

    loop {
        server.poll(Duration::from_millis(100));
    }
}
