//! facestreamd: face-detection streaming daemon.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};

use facestream_core::config::{ConfigError, FacestreamConfig};
use facestream_services::FrameService;

mod backend;
mod eviction;

/// How often the counters are written to the log.
const STATS_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = FacestreamConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = match FacestreamConfig::load() {
        Ok(config) => config,
        Err(e @ (ConfigError::Transfer(_) | ConfigError::Detection(_))) => {
            return Err(e).context("configuration rejected");
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            FacestreamConfig::default()
        }
    };

    let addr: SocketAddr = format!("{}:{}", config.server.bind_addr, config.server.port)
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind_addr))?;
    tracing::info!(%addr, "facestreamd starting");

    let network = backend::load(&config.detection)?;
    tracing::info!(
        min_face_size = config.detection.min_face_size,
        scale_factor = config.detection.scale_factor,
        workers = config.detection.worker_count(),
        chunk_size = config.transfer.chunk_size,
        "detection ready"
    );

    let service = FrameService::new(&config, network);

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let server_task = {
        let state = facestream_api::ApiState::new(service.clone(), &config);
        tokio::spawn(async move { facestream_api::serve(state, addr).await })
    };

    let eviction_task = {
        let ttl = Duration::from_secs(config.transfer.pending_frame_ttl_secs);
        let every = Duration::from_secs(config.transfer.eviction_interval_secs.max(1));
        tokio::spawn(eviction::eviction_loop(
            service.clone(),
            ttl,
            every,
            shutdown_tx.subscribe(),
        ))
    };

    let stats_printer = {
        let service = service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(STATS_INTERVAL);
            loop {
                interval.tick().await;
                let status = service.status();
                tracing::info!(
                    sessions = status.sessions.len(),
                    pending_frames = status.pending_frames,
                    frames_completed = status.stats.frames_completed,
                    frames_failed = status.stats.frames_failed,
                    faces_detected = status.stats.faces_detected,
                    results_sent = status.stats.results_sent,
                    "service snapshot"
                );
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv()  => tracing::info!("shutting down"),
        r = server_task         => match r {
            Ok(Ok(())) => tracing::error!("server exited"),
            Ok(Err(e)) => return Err(e).context("server failed"),
            Err(e)     => tracing::error!("server task panicked: {:?}", e),
        },
        r = eviction_task       => tracing::error!("eviction task exited: {:?}", r),
        r = stats_printer       => tracing::error!("stats printer exited: {:?}", r),
    }

    service.shutdown();
    Ok(())
}
