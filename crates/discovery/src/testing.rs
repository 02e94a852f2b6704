//! Minimal loopback HTTP responders for exercising probes in tests.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// A one-endpoint HTTP server that answers every request with a canned
/// JSON body, or (in silent mode) accepts connections and never replies.
pub struct InfoServer {
    port: u16,
    handle: tokio::task::JoinHandle<()>,
}

impl InfoServer {
    /// Spawns a responder answering `200 OK` with the given JSON body.
    pub async fn spawn(body: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        let body = body.to_string();

        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let body = body.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 2048];
                    // Drain the request head; probes send tiny GETs.
                    let _ = stream.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self { port, handle }
    }

    /// Spawns a server that accepts connections and holds them open
    /// without ever responding, forcing probes to run into their timeout.
    pub async fn spawn_silent() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();

        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                held.push(stream);
            }
        });

        Self { port, handle }
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for InfoServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
