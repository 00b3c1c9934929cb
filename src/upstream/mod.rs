//! Upstream collaborator contracts.
//!
//! The routing core does not manage clusters or connections; it consumes
//! two narrow interfaces: cluster existence lookups for build-time
//! validation, and an async HTTP client bound to the discovery cluster for
//! the provider's fetch loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::FetchError;

/// Descriptive information about a known cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInfo {
    name: String,
}

impl ClusterInfo {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Cluster registry the core consults.
pub trait ClusterManager: Send + Sync {
    /// Look up a cluster by name.
    fn get(&self, name: &str) -> Option<ClusterInfo>;

    /// The async HTTP client reaching the named cluster, if one exists.
    fn discovery_client(&self, cluster: &str) -> Option<Arc<dyn DiscoveryClient>>;
}

/// Async HTTP GET against a discovery cluster.
///
/// Implementations must honor cancellation: once the caller's task is
/// dropped no callback-side effects may occur.
#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// Fetches `path`, returning the body on a 2xx response.
    async fn fetch(&self, path: &str, timeout: Duration) -> Result<Vec<u8>, FetchError>;
}

/// Discovery client speaking plain HTTP via reqwest.
pub struct HttpDiscoveryClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpDiscoveryClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl DiscoveryClient for HttpDiscoveryClient {
    async fn fetch(&self, path: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(body.to_vec())
    }
}

/// In-memory cluster registry used for wiring and tests.
#[derive(Default)]
pub struct StaticClusterManager {
    clusters: DashMap<String, ClusterInfo>,
    clients: DashMap<String, Arc<dyn DiscoveryClient>>,
}

impl StaticClusterManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cluster without a discovery client.
    pub fn add_cluster(&self, name: &str) {
        self.clusters.insert(name.to_string(), ClusterInfo::new(name));
    }

    /// Registers a cluster reachable through the given client.
    pub fn add_cluster_with_client(&self, name: &str, client: Arc<dyn DiscoveryClient>) {
        self.add_cluster(name);
        self.clients.insert(name.to_string(), client);
    }
}

impl ClusterManager for StaticClusterManager {
    fn get(&self, name: &str) -> Option<ClusterInfo> {
        self.clusters.get(name).map(|info| info.value().clone())
    }

    fn discovery_client(&self, cluster: &str) -> Option<Arc<dyn DiscoveryClient>> {
        self.clients.get(cluster).map(|client| client.value().clone())
    }
}
