//! Immutable, versioned config snapshots.
//!
//! A snapshot is compiled once from a `RouteConfiguration` and never
//! mutated; the provider publishes it behind an atomic pointer swap and it
//! is dropped when the last in-flight request releases its reference. The
//! parsed source table is retained for the admin dump.

use crate::config::RouteConfiguration;
use crate::error::ConfigError;
use crate::http::HeaderMap;
use crate::runtime::RuntimeHandle;
use crate::upstream::ClusterManager;

use super::entry::Route;
use super::matcher::RouteMatcher;

/// An immutable route table plus its derived match structures.
pub struct ConfigSnapshot {
    matcher: RouteMatcher,
    internal_only_headers: Vec<String>,
    response_headers_to_add: Vec<(String, String)>,
    response_headers_to_remove: Vec<String>,
    version_info: String,
    route_table: RouteConfiguration,
}

impl ConfigSnapshot {
    /// Compiles a snapshot. When `validate_clusters` carries a cluster
    /// manager, every statically-referenced cluster must be known to it;
    /// dynamic configs pass `None` to suppress validation.
    pub fn build(
        config: RouteConfiguration,
        version_info: &str,
        runtime: RuntimeHandle,
        validate_clusters: Option<&dyn ClusterManager>,
    ) -> Result<Self, ConfigError> {
        let global_headers_to_add: Vec<(String, String)> = config
            .request_headers_to_add
            .iter()
            .map(|h| (h.key.to_ascii_lowercase(), h.value.clone()))
            .collect();

        let matcher = RouteMatcher::build(&config, &global_headers_to_add, runtime)?;

        if let Some(cluster_manager) = validate_clusters {
            for vhost in matcher.virtual_hosts() {
                for entry in vhost.routes() {
                    for cluster in entry.referenced_clusters() {
                        if cluster_manager.get(cluster).is_none() {
                            return Err(ConfigError::UnknownCluster(cluster.to_string()));
                        }
                    }
                }
            }
        }

        Ok(Self {
            matcher,
            internal_only_headers: config.internal_only_headers.clone(),
            response_headers_to_add: config
                .response_headers_to_add
                .iter()
                .map(|h| (h.key.to_ascii_lowercase(), h.value.clone()))
                .collect(),
            response_headers_to_remove: config.response_headers_to_remove.clone(),
            version_info: version_info.to_string(),
            route_table: config,
        })
    }

    /// The empty snapshot served before the first discovery update: no
    /// routes, no mutations, empty version.
    pub fn empty() -> Self {
        let runtime: RuntimeHandle = std::sync::Arc::new(crate::runtime::StaticRuntime::new());
        Self::build(RouteConfiguration::default(), "", runtime, None)
            .expect("the empty config always compiles")
    }

    /// The hot-path lookup. Pure and non-blocking.
    pub fn route(&self, headers: &HeaderMap, random_value: u64) -> Option<Route<'_>> {
        self.matcher.route(headers, random_value)
    }

    /// Header names to strip from externally-received requests.
    pub fn internal_only_headers(&self) -> &[String] {
        &self.internal_only_headers
    }

    pub fn response_headers_to_add(&self) -> &[(String, String)] {
        &self.response_headers_to_add
    }

    pub fn response_headers_to_remove(&self) -> &[String] {
        &self.response_headers_to_remove
    }

    /// The content hash of the source bytes, `""` for the empty snapshot.
    pub fn version_info(&self) -> &str {
        &self.version_info
    }

    /// The parsed source table, serialized back out by the admin dump.
    pub fn route_table(&self) -> &RouteConfiguration {
        &self.route_table
    }
}
