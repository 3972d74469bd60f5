//! facestream-ctl: command-line client for the Facestream daemon.

use std::time::Duration;

use anyhow::{bail, Context, Result};

mod cmd;

use cmd::detect::DetectOptions;

const DEFAULT_API: &str = "http://127.0.0.1:8080";

fn print_usage() {
    println!("Usage: facestream-ctl [--api <url>] <command>");
    println!();
    println!("Commands:");
    println!("  detect <image> [options]   Stream an image and save the annotated result");
    println!("  status                     Show sessions and frame counters");
    println!("  sessions inspect <peer>    Show one peer's session");
    println!("  sessions drop <peer>       Disconnect a peer");
    println!();
    println!("Options:");
    println!("  --api <url>          Status API base (default: {})", DEFAULT_API);
    println!();
    println!("Detect options:");
    println!("  --out <path>         Where to write the result (default: {})", cmd::detect::DEFAULT_OUT);
    println!("  --user <id>          Peer id to connect as (default: {})", cmd::detect::DEFAULT_USER);
    println!("  --url <ws-url>       Stream endpoint (default: {})", cmd::detect::DEFAULT_URL);
    println!("  --chunk-size <n>     Payload bytes per chunk (default: {})", facestream_core::wire::DEFAULT_CHUNK_SIZE);
    println!("  --timeout <secs>     How long to wait for the result (default: {})", cmd::detect::DEFAULT_TIMEOUT.as_secs());
}

fn parse_detect(image: &str, flags: &[&str]) -> Result<DetectOptions> {
    let mut opts = DetectOptions::new(image);
    let mut i = 0;
    while i < flags.len() {
        let flag = flags[i];
        i += 1;
        let value = flags
            .get(i)
            .copied()
            .with_context(|| format!("{flag} requires a value"))?;
        match flag {
            "--out" => opts.out = value.into(),
            "--user" => opts.user = value.to_string(),
            "--url" => opts.url = value.to_string(),
            "--chunk-size" => {
                opts.chunk_size = value.parse().context("--chunk-size must be a number")?;
                if opts.chunk_size == 0 {
                    bail!("--chunk-size must be positive");
                }
            }
            "--timeout" => {
                let secs: u64 = value.parse().context("--timeout must be a number")?;
                opts.timeout = Duration::from_secs(secs);
            }
            other => bail!("unknown detect option: {other}"),
        }
        i += 1;
    }
    Ok(opts)
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --api option
    let mut api = DEFAULT_API.to_string();
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--api" {
            i += 1;
            api = args.get(i).context("--api requires a value")?.clone();
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["detect", image, flags @ ..]      => cmd::detect::cmd_detect(parse_detect(image, flags)?).await,
        ["status"] | []                    => cmd::status::cmd_status(&api).await,
        ["sessions", "inspect", peer]      => cmd::sessions::cmd_session_inspect(&api, peer).await,
        ["sessions", "drop", peer]         => cmd::sessions::cmd_session_drop(&api, peer).await,
        ["help"] | ["--help"] | ["-h"]     => { print_usage(); Ok(()) }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
