//! Routing core for a layer-7 reverse proxy with dynamic route discovery.
//!
//! Wires the route-config provider to the discovery service and exposes
//! the admin plane. The data plane consumes `provider.config()` snapshots
//! and calls `route(headers, random_value)` per request; wire-level
//! proxying lives in a separate service.

mod admin;
mod config;
mod error;
mod http;
mod init;
mod provider;
mod router;
mod runtime;
mod stats;
mod trace;
mod upstream;
mod util;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::admin::{start_admin_server, AdminState};
use crate::config::RdsConfig;
use crate::init::InitManager;
use crate::provider::{LocalInfo, ProviderManager};
use crate::runtime::{RuntimeHandle, StaticRuntime};
use crate::stats::Scope;
use crate::upstream::{HttpDiscoveryClient, StaticClusterManager};

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("switchyard starting");

    let admin_addr: SocketAddr = env_or("ADMIN_ADDR", "127.0.0.1:9901").parse()?;
    let discovery_url = env_or("RDS_URL", "http://127.0.0.1:8500");
    let rds = RdsConfig {
        cluster: env_or("RDS_CLUSTER", "rds"),
        route_config_name: env_or("ROUTE_CONFIG_NAME", "default"),
        refresh_delay_ms: env_or("RDS_REFRESH_DELAY_MS", "30000").parse()?,
        ..Default::default()
    };
    let local_info = LocalInfo::new(
        &env_or("LOCAL_CLUSTER", "switchyard"),
        &env_or("LOCAL_NODE", "node_0"),
    );

    // Shared components
    let cluster_manager = Arc::new(StaticClusterManager::new());
    cluster_manager
        .add_cluster_with_client(&rds.cluster, Arc::new(HttpDiscoveryClient::new(&discovery_url)));
    let runtime: RuntimeHandle = Arc::new(StaticRuntime::new());

    let providers = Arc::new(ProviderManager::new(cluster_manager, runtime, local_info));
    let init = Arc::new(InitManager::new());
    let scope = Scope::new("http.ingress.");
    let provider = providers.get_or_create(&rds, &scope, &init)?;

    // Admin plane in the background
    let admin_state = AdminState {
        providers: Arc::clone(&providers),
        init: Arc::clone(&init),
    };
    tokio::spawn(async move {
        if let Err(e) = start_admin_server(admin_addr, admin_state).await {
            tracing::error!(error = %e, "admin server error");
        }
    });

    // Serving is gated on the first terminal discovery outcome.
    init.wait_ready().await;
    tracing::info!(
        route_config = %provider.route_config_name(),
        version = %provider.version_info(),
        "route configuration provider ready"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    Ok(())
}
