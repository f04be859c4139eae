//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use logwire::engine::handlers::Sink;
use logwire::engine::{ComponentRegistry, LogEngine};

/// Handler sink that keeps every line in memory.
#[derive(Default)]
pub struct Capture(Mutex<Vec<String>>);

impl Capture {
    pub fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

impl Sink for Capture {
    fn write_line(&self, line: &str) -> std::io::Result<()> {
        self.0.lock().unwrap().push(line.to_string());
        Ok(())
    }
}

/// Engine with an extra `capture` handler class writing into the returned sink.
pub fn engine_with_capture() -> (Arc<LogEngine>, Arc<Capture>) {
    let capture = Arc::new(Capture::default());
    let sink = capture.clone();
    let mut registry = ComponentRegistry::with_defaults();
    registry.register_handler("capture", move |_, _| Ok(sink.clone() as Arc<dyn Sink>));
    (Arc::new(LogEngine::with_registry(registry)), capture)
}

/// Write raw bytes to `addr` and close the connection.
pub async fn send_raw(addr: SocketAddr, bytes: &[u8]) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(bytes).await.unwrap();
    stream.shutdown().await.unwrap();
}

/// Frame a JSON value the way the sender does.
pub fn frame(value: &serde_json::Value) -> Vec<u8> {
    let payload = serde_json::to_vec(value).unwrap();
    let mut bytes = (payload.len() as u32).to_be_bytes().to_vec();
    bytes.extend_from_slice(&payload);
    bytes
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
