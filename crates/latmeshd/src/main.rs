//! latmeshd: kernel-RTT latency mesh daemon.

use std::sync::Arc;

use anyhow::{Context, Result};

use latmesh_core::{platform_probe, LatmeshConfig};
use latmesh_services::{DnsTxtResolver, Pinger, RegionRegistry, RegionResolver};

mod discovery;
mod listener;
mod measurement;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Identity problems are fatal before anything binds.
    let config = LatmeshConfig::load().context("failed to load configuration")?;
    tracing::info!(
        region = %config.identity.region,
        app = %config.identity.app_name,
        "latmeshd starting"
    );

    let probe = platform_probe();
    if !probe.is_supported() {
        tracing::warn!("kernel RTT is unavailable on this platform; every measurement will fail");
    }

    // Shared state
    let registry = RegionRegistry::new(&config);
    let pinger = Pinger::from_config(&config, probe);
    let resolver = Arc::new(DnsTxtResolver::from_config(&config));
    tracing::info!(server = %resolver.server(), record = %config.regions_record(), "resolver ready");

    // Listeners
    let ping_addr = config.network.ping_listen_addr();
    let ping_socket = listener::bind(ping_addr)
        .with_context(|| format!("failed to bind ping listener on {ping_addr}"))?;
    let http_addr = config.network.http_listen_addr();
    let http_socket = tokio::net::TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {http_addr}"))?;

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

    let discovery_task = tokio::spawn(
        discovery::Discovery::new(
            &config,
            resolver as Arc<dyn RegionResolver>,
            registry.clone(),
            shutdown_tx.subscribe(),
        )
        .run(),
    );

    let measurement_task = tokio::spawn(
        measurement::Measurement::new(
            &config,
            pinger.clone(),
            registry.clone(),
            shutdown_tx.subscribe(),
        )
        .run(),
    );

    let listener_task = tokio::spawn(
        listener::PingListener::new(&config, ping_socket, pinger, shutdown_tx.subscribe()).run(),
    );

    let api_task = {
        let state = latmesh_api::ApiState::new(registry.clone());
        let mut shutdown = shutdown_tx.subscribe();
        tokio::spawn(latmesh_api::serve_listener(http_socket, state, async move {
            let _ = shutdown.recv().await;
        }))
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv()  => tracing::info!("shutting down"),
        r = discovery_task      => tracing::error!("discovery task exited: {:?}", r),
        r = measurement_task    => tracing::error!("measurement task exited: {:?}", r),
        r = listener_task       => tracing::error!("ping listener exited: {:?}", r),
        r = api_task            => tracing::error!("HTTP server exited: {:?}", r),
    }

    Ok(())
}
