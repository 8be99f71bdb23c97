//! Broadcast Node Binary
//!
//! Speaks line-delimited JSON on stdin/stdout. Logs go to stderr.

use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use ryther_broadcast::node::{BroadcastNode, NodeConfig};
use ryther_broadcast::StdioTransport;

/// Environment variable naming an optional JSON config file.
const CONFIG_ENV: &str = "BROADCAST_CONFIG";

fn load_config() -> (NodeConfig, Option<String>) {
    match std::env::var(CONFIG_ENV) {
        Ok(path) => match NodeConfig::load(&path) {
            Ok(config) => (config, Some(format!("Loaded configuration from {}", path))),
            Err(e) => (
                NodeConfig::default(),
                Some(format!("Failed to load config {}: {}, using defaults", path, e)),
            ),
        },
        Err(_) => (NodeConfig::default(), None),
    }
}

#[tokio::main]
async fn main() {
    let (config, note) = load_config();

    // Initialize logging; stdout is reserved for protocol traffic
    let level = config.log.max_level().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if let Some(note) = note {
        info!("{}", note);
    }
    info!(
        retry_interval_ms = config.gossip.retry_interval_ms,
        rpc_timeout_ms = config.transport.rpc_timeout_ms,
        "Starting broadcast node"
    );

    let transport = Arc::new(StdioTransport::new(config.transport.clone()));
    let writer = transport.spawn_writer(tokio::io::stdout());

    let node = Arc::new(BroadcastNode::new(config, Arc::clone(&transport)));
    let result = node.run(tokio::io::stdin()).await;

    // Flush replies still queued before exiting
    transport.close();
    if let Some(writer) = writer {
        if let Err(e) = writer.await {
            error!("Writer task failed: {}", e);
        }
    }

    if let Err(e) = result {
        error!("Node stopped with error: {}", e);
        std::process::exit(1);
    }

    info!("Goodbye!");
}
