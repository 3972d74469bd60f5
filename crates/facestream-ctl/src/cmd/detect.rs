//! `detect`: stream an image to the server and save the annotated result.
//!
//! The client speaks the same chunk protocol as the server and reuses its
//! session, sender and reassembly types for the local end of the socket.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use futures::{SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};

use facestream_core::wire;
use facestream_services::{drive_outbox, send_frame, CompletedFrame, FrameReassembler, SessionRegistry};

pub const DEFAULT_URL: &str = "ws://127.0.0.1:8080/face-detection";
pub const DEFAULT_USER: &str = "facestream-ctl";
pub const DEFAULT_OUT: &str = "output.png";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const OUTBOX_CAPACITY: usize = 64;

pub struct DetectOptions {
    pub image: PathBuf,
    pub out: PathBuf,
    pub user: String,
    pub url: String,
    pub chunk_size: usize,
    pub timeout: Duration,
}

impl DetectOptions {
    pub fn new(image: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
            out: PathBuf::from(DEFAULT_OUT),
            user: DEFAULT_USER.to_string(),
            url: DEFAULT_URL.to_string(),
            chunk_size: wire::DEFAULT_CHUNK_SIZE,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/{}", self.url.trim_end_matches('/'), self.user)
    }
}

pub async fn cmd_detect(opts: DetectOptions) -> Result<()> {
    let payload = tokio::fs::read(&opts.image)
        .await
        .with_context(|| format!("failed to read {}", opts.image.display()))?;
    if payload.is_empty() {
        bail!("{} is empty", opts.image.display());
    }

    let started = Instant::now();
    let endpoint = opts.endpoint();
    let (socket, _) = tokio_tungstenite::connect_async(endpoint.as_str())
        .await
        .with_context(|| format!("failed to connect to {endpoint}, is facestreamd running?"))?;
    let (sink, mut stream) = socket.split();

    let registry = SessionRegistry::new(OUTBOX_CAPACITY);
    let (handle, outbox) = registry.open(&opts.user);
    let sink = sink.with(|payload: Bytes| {
        futures::future::ready(Ok::<_, tungstenite::Error>(Message::Binary(payload)))
    });
    let writer = tokio::spawn(drive_outbox(outbox, Box::pin(sink)));

    let report = send_frame(&handle, Bytes::from(payload), opts.chunk_size)
        .await
        .context("failed to send image")?;
    println!(
        "Sent {} bytes in {} chunks (frame {})",
        report.bytes, report.chunks, report.frame_id
    );

    let reassembler = FrameReassembler::new();
    let received = tokio::time::timeout(
        opts.timeout,
        receive_frame(&mut stream, &reassembler, &opts.user),
    )
    .await;

    registry.close(&handle);
    writer.abort();

    let frame = match received {
        Ok(result) => result?,
        Err(_) => bail!(
            "no result within {}s ({} of the reply's frames still incomplete)",
            opts.timeout.as_secs(),
            reassembler.pending_count()
        ),
    };

    write_output(&opts.out, &frame.payload).await?;

    println!("═══════════════════════════════════════");
    println!("  Detection Result");
    println!("═══════════════════════════════════════");
    println!("  Frame   : {}", frame.frame_id);
    println!("  Chunks  : {}", frame.chunks);
    println!("  Bytes   : {} ({:.1} KB)", frame.payload.len(), frame.payload.len() as f64 / 1024.0);
    println!("  Saved   : {}", opts.out.display());
    println!("  Elapsed : {} ms", started.elapsed().as_millis());

    Ok(())
}

/// Read chunks until the first reply frame is complete.
async fn receive_frame<S>(stream: &mut S, reassembler: &FrameReassembler, peer: &str) -> Result<CompletedFrame>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(message) = stream.next().await {
        let data = match message.context("connection error")? {
            Message::Binary(data) => data,
            Message::Close(_) => bail!("server closed the connection"),
            _ => continue,
        };

        let chunk = match wire::decode(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed chunk");
                continue;
            }
        };
        tracing::debug!(
            frame_id = %chunk.frame_id,
            chunk_index = chunk.index,
            total_chunks = chunk.total,
            "chunk received"
        );

        match reassembler.accept(peer, chunk) {
            Ok(Some(frame)) => return Ok(frame),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "ignoring chunk"),
        }
    }

    bail!("connection closed before a result arrived")
}

async fn write_output(path: &Path, payload: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, payload)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}
