//! Symbion Poller binary: config, node workers, read-only HTTP API

use anyhow::{Context, Result};
use std::sync::Arc;
use symbion_poller::bridge::CommandQueryService;
use symbion_poller::config::{self, MACHINE_DOMAIN_ENV};
use symbion_poller::health::HealthTracker;
use symbion_poller::http::{build_router, AppState};
use symbion_poller::poller::{spawn_node_worker, NodePoller, PollContext, PollIntervals};
use symbion_poller::state::NodeRegistry;
use symbion_query::QueryService;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("symbion_poller=info")),
        )
        .init();

    info!("Starting Symbion Poller v{}", env!("CARGO_PKG_VERSION"));

    let cfg = config::load_config().await.context("Failed to load poller config")?;

    let machine_domain = cfg.resolve_machine_domain(std::env::var(MACHINE_DOMAIN_ENV).ok());
    match machine_domain.as_deref() {
        Some(domain) => info!("Machine domain: {}", domain),
        None => info!("No machine domain, host names are shown unqualified"),
    }

    let bridge = cfg
        .bridge
        .as_ref()
        .context("No query bridge configured (bridge.command)")?;
    let service: Arc<dyn QueryService> = Arc::new(CommandQueryService::new(bridge));

    let ctx = PollContext::new(machine_domain);
    let nodes = NodeRegistry::from_config(&cfg);
    let health_tracker = HealthTracker::new();
    if nodes.is_empty() {
        warn!("No nodes configured, nothing to poll");
    }

    let intervals = PollIntervals {
        info: cfg.info_interval(),
        stats: cfg.stats_interval(),
    };
    let workers: Vec<_> = nodes
        .iter()
        .map(|(id, node)| {
            info!("Polling {} (info every {}s, stats every {}s)", id, cfg.info_interval_secs, cfg.stats_interval_secs);
            let poller = NodePoller::new(service.clone(), ctx.clone(), node.clone(), health_tracker.clone());
            spawn_node_worker(poller, intervals)
        })
        .collect();

    let app = build_router(AppState {
        nodes: nodes.clone(),
        health_tracker,
    });

    let listener = tokio::net::TcpListener::bind(&cfg.listen)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.listen))?;
    info!("API listening on http://{}", cfg.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await
        .context("HTTP server failed")?;

    for worker in workers {
        worker.abort();
    }
    info!("Symbion Poller stopped");
    Ok(())
}
