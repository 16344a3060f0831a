use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, ValueEnum};
use dashlink_core::dashboard::{DashboardLog, DashboardSnapshot};
use dashlink_core::{ApiProfile, DeltaSample, Origin, ProfileName, StreamRouter, StreamSession, StreamTag};
use dashlink_otel::Console;
use dashlink_transport::{http_client, ReqwestEngine, TungsteniteConnector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Feed {
    Connections,
    Traffic,
    Logs,
}

impl Feed {
    fn path(self) -> &'static str {
        match self {
            Feed::Connections => "/connections",
            Feed::Traffic => "/traffic",
            Feed::Logs => "/logs",
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "dashlink-watch",
    version,
    about = "Dashboard-shaped view of an engine stream for offline/terminal use"
)]
struct Args {
    #[arg(long, env = "DASHLINK_ENGINE", default_value = "http://127.0.0.1:9999")]
    engine: String,
    /// Engine API profile (indexed or named)
    #[arg(long, env = "DASHLINK_PROFILE", default_value = "named")]
    profile: ProfileName,
    #[arg(long, value_enum, default_value_t = Feed::Traffic)]
    feed: Feed,
    /// Minimum log level for the logs feed (debug, info, warning, error)
    #[arg(long)]
    level: Option<String>,
    /// Snapshot interval for polled connection feeds
    #[arg(long)]
    poll_ms: Option<u64>,
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,
    /// Print each translated message as JSON instead of a one-line summary
    #[arg(long, default_value_t = false)]
    json: bool,
    /// Emit only the first message and exit
    #[arg(long, default_value_t = false)]
    once: bool,
}

fn human_bytes(n: i64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value.abs() >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n}{}", UNITS[0])
    } else {
        format!("{value:.1}{}", UNITS[unit])
    }
}

fn summarize(tag: Option<StreamTag>, data: &str) -> String {
    let summary = match tag {
        Some(StreamTag::Traffic) => serde_json::from_str::<DeltaSample>(data)
            .ok()
            .map(|s| format!("up={} down={}", human_bytes(s.up), human_bytes(s.down))),
        Some(StreamTag::Connections) => serde_json::from_str::<DashboardSnapshot>(data)
            .ok()
            .map(|s| {
                format!(
                    "connections={} upload={} download={}",
                    s.connections.len(),
                    human_bytes(s.upload_total as i64),
                    human_bytes(s.download_total as i64)
                )
            }),
        Some(StreamTag::Logs) => serde_json::from_str::<DashboardLog>(data)
            .ok()
            .map(|l| format!("{:<7} {}", l.level.as_str(), l.payload)),
        None => None,
    };
    summary.unwrap_or_else(|| data.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    dashlink_otel::init_with(Console::Stderr);
    let args = Args::parse();
    let origin = Origin::parse(&args.engine).context("parsing --engine")?;
    let mut profile = ApiProfile::preset(args.profile);
    if let Some(ms) = args.poll_ms {
        profile = profile.with_poll_interval(Duration::from_millis(ms));
    }
    let router = Arc::new(StreamRouter::new(Arc::new(profile)));
    let client = ReqwestEngine::new(
        http_client::client_with_timeout(Duration::from_secs(args.timeout_secs.max(1)))
            .context("client build")?,
    );
    let connector = TungsteniteConnector;
    let query = args.level.as_ref().map(|l| format!("level={l}"));

    let mut backoff = 1u64;
    loop {
        let session = StreamSession::open(router.clone(), &origin, args.feed.path(), query.as_deref())?;
        let tag = session.tag();
        let (json, once) = (args.json, args.once);
        let result = session
            .pump(&origin, &client, &connector, |event| {
                if json {
                    println!("{}", event.data);
                } else {
                    let now = Local::now().format("%H:%M:%S");
                    println!("[{}] {}", now, summarize(tag, &event.data));
                }
                async move { !once }
            })
            .await;
        match result {
            Ok(()) if once => return Ok(()),
            Ok(()) => backoff = 1,
            Err(err) => {
                eprintln!("[watch] stream error: {err}");
                backoff = (backoff * 2).min(30);
            }
        }
        tokio::time::sleep(Duration::from_secs(backoff)).await;
    }
}
