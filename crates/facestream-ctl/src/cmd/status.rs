//! Daemon status command.

use anyhow::Result;
use serde::Deserialize;

use super::http::{api_url, get_json};

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StatusResponse {
    sessions: Vec<SessionInfo>,
    pending_frames: usize,
    frames_completed: u64,
    frames_failed: u64,
    faces_detected: u64,
    results_sent: u64,
}

#[derive(Deserialize)]
struct SessionInfo {
    peer: String,
    connection_id: u64,
    connected_secs: u64,
}

// ── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_status(base: &str) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", api_url(base))).await?;

    println!("═══════════════════════════════════════");
    println!("  Facestream Daemon Status");
    println!("═══════════════════════════════════════");
    println!("  Active sessions  : {}", resp.sessions.len());
    println!("  Pending frames   : {}", resp.pending_frames);
    println!("  Frames completed : {}", resp.frames_completed);
    println!("  Frames failed    : {}", resp.frames_failed);
    println!("  Faces detected   : {}", resp.faces_detected);
    println!("  Results sent     : {}", resp.results_sent);

    if resp.sessions.is_empty() {
        println!("\n  No active sessions.");
    } else {
        println!("\n  Sessions:");
        for s in &resp.sessions {
            println!("  ┌─ {}", s.peer);
            println!("  │  connection : {}", s.connection_id);
            println!("  └─ uptime     : {}s", s.connected_secs);
        }
    }

    Ok(())
}
