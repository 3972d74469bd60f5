//! Session management commands.

use anyhow::Result;
use serde::Deserialize;

use super::http::{api_url, delete_json, get_json};

pub async fn cmd_session_drop(base: &str, peer: &str) -> Result<()> {
    #[derive(Deserialize)]
    struct DropResponse {
        peer: String,
        dropped: bool,
    }

    let resp: DropResponse = delete_json(&format!("{}/sessions/{}", api_url(base), peer)).await?;

    if resp.dropped {
        println!("✓ Session dropped: {}", resp.peer);
    } else {
        println!("Session not found: {}", resp.peer);
    }

    Ok(())
}

pub async fn cmd_session_inspect(base: &str, peer: &str) -> Result<()> {
    #[derive(Deserialize)]
    struct InspectResponse {
        peer: String,
        connection_id: u64,
        uptime_secs: u64,
        pending_frames: usize,
    }

    let resp: InspectResponse = get_json(&format!("{}/sessions/{}", api_url(base), peer)).await?;

    println!("═══════════════════════════════════════");
    println!("  Session Details");
    println!("═══════════════════════════════════════");
    println!("  Peer           : {}", resp.peer);
    println!("  Connection     : {}", resp.connection_id);
    println!("  Uptime         : {}s", resp.uptime_secs);
    println!("  Pending frames : {}", resp.pending_frames);

    Ok(())
}
