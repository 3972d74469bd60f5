//! Facestream integration test harness.
//!
//! Every test starts its own server on an ephemeral loopback port, backed by
//! a scripted scoring network, and talks to it over real WebSockets:
//!
//!   cargo test --test integration
//!
//! Servers are torn down when their `TestServer` is dropped.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use image::{Rgb, RgbImage};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use facestream_api::ApiState;
use facestream_core::wire::{self, FrameId};
use facestream_core::FacestreamConfig;
use facestream_detect::codec;
use facestream_detect::scripted::ScriptedNetwork;
use facestream_services::{CompletedFrame, FrameReassembler, FrameService};

mod api;
mod detection;
mod stream;

// ── Harness ───────────────────────────────────────────────────────────────────

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long a test waits for a reply before giving up.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a test listens to confirm that nothing arrives.
pub const QUIET_PERIOD: Duration = Duration::from_millis(500);

pub struct TestServer {
    pub addr: SocketAddr,
    pub service: FrameService,
    task: JoinHandle<Result<()>>,
}

impl TestServer {
    pub fn stream_url(&self, user: &str) -> String {
        format!("ws://{}{}/{}", self.addr, facestream_api::STREAM_PATH, user)
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("http://{}/api{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.service.shutdown();
        self.task.abort();
    }
}

pub fn test_config() -> FacestreamConfig {
    let mut config = FacestreamConfig::default();
    config.server.bind_addr = "127.0.0.1".into();
    config.server.port = 0;
    config.detection.max_concurrent_frames = 2;
    config
}

pub async fn start_server(network: ScriptedNetwork) -> TestServer {
    start_server_with(test_config(), network).await
}

pub async fn start_server_with(config: FacestreamConfig, network: ScriptedNetwork) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let service = FrameService::new(&config, Arc::new(network));
    let state = ApiState::new(service.clone(), &config);
    let task = tokio::spawn(facestream_api::serve_listener(listener, state));
    TestServer { addr, service, task }
}

pub async fn connect(server: &TestServer, user: &str) -> Ws {
    let (ws, _) = tokio_tungstenite::connect_async(server.stream_url(user))
        .await
        .expect("websocket handshake should succeed");
    ws
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

// ── Frames ────────────────────────────────────────────────────────────────────

/// A 160x120 black frame with one white square.
pub fn frame_with_patch(x: u32, y: u32, side: u32) -> RgbImage {
    let mut img = RgbImage::new(160, 120);
    for py in y..y + side {
        for px in x..x + side {
            img.put_pixel(px, py, Rgb([255, 255, 255]));
        }
    }
    img
}

pub fn png(img: &RgbImage) -> Bytes {
    Bytes::from(codec::encode_png(img).unwrap())
}

/// Split `payload` into ready-to-send chunk messages.
pub fn chunk_messages(frame_id: FrameId, payload: &Bytes, chunk_size: usize) -> Vec<Bytes> {
    let parts = wire::split_payload(payload, chunk_size).unwrap();
    let total = parts.len() as u32;
    (0u32..)
        .zip(parts.iter())
        .map(|(index, part)| wire::encode(frame_id, index, total, part).unwrap())
        .collect()
}

pub async fn send_messages(ws: &mut Ws, messages: impl IntoIterator<Item = Bytes>) {
    for message in messages {
        ws.send(Message::Binary(message)).await.unwrap();
    }
}

/// Send `payload` as one frame, chunks in order.
pub async fn send_frame(ws: &mut Ws, payload: &Bytes, chunk_size: usize) -> FrameId {
    let frame_id = FrameId::generate();
    send_messages(ws, chunk_messages(frame_id, payload, chunk_size)).await;
    frame_id
}

async fn read_frame(ws: &mut Ws, reassembler: &FrameReassembler) -> Result<CompletedFrame> {
    while let Some(message) = ws.next().await {
        match message.context("connection error")? {
            Message::Binary(data) => {
                let chunk = wire::decode(data).context("server sent a malformed chunk")?;
                if let Some(frame) = reassembler.accept("server", chunk)? {
                    return Ok(frame);
                }
            }
            Message::Close(_) => bail!("server closed the connection"),
            _ => {}
        }
    }
    bail!("connection ended")
}

/// Wait for the next complete frame from the server.
pub async fn recv_frame(ws: &mut Ws) -> Result<CompletedFrame> {
    let reassembler = FrameReassembler::new();
    tokio::time::timeout(REPLY_TIMEOUT, read_frame(ws, &reassembler))
        .await
        .context("timed out waiting for a result")?
}

/// Assert the server sends nothing during the quiet period.
pub async fn expect_silence(ws: &mut Ws) {
    let reassembler = FrameReassembler::new();
    if let Ok(result) = tokio::time::timeout(QUIET_PERIOD, read_frame(ws, &reassembler)).await {
        panic!("expected no reply, got {:?}", result.map(|f| f.frame_id));
    }
}
