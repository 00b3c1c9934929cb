//! Virtual hosts: route groups selected by the request's host header.
//!
//! A virtual host owns its routes in declared order (first match wins), an
//! SSL requirement gate, CORS and rate-limit policies, and the virtual
//! cluster classifiers used for per-endpoint stats.

use regex::Regex;

use crate::config::{SslRequirement as SslRequirementConfig, VirtualHostConfig};
use crate::error::ConfigError;
use crate::http::{header_names, path_without_query, HeaderMap};
use crate::runtime::RuntimeHandle;

use super::entry::{RedirectRoute, Route, RouteEntry};
use super::policy::{CorsPolicy, RateLimitPolicy};

/// When a virtual host requires TLS for its traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslRequirement {
    None,
    /// Only externally-received requests must be TLS; requests carrying the
    /// internal trust marker are exempt.
    ExternalOnly,
    All,
}

/// Stats classifier: requests matching the pattern (and method, when set)
/// are attributed to the named virtual cluster.
#[derive(Debug)]
pub struct VirtualCluster {
    pattern: Regex,
    method: Option<String>,
    name: String,
}

/// Name attributed to requests no declared virtual cluster matches.
const VIRTUAL_CLUSTER_CATCH_ALL: &str = "other";

/// A compiled virtual host.
pub struct VirtualHost {
    name: String,
    routes: Vec<RouteEntry>,
    virtual_clusters: Vec<VirtualCluster>,
    ssl_requirement: SslRequirement,
    cors_policy: Option<CorsPolicy>,
    rate_limit_policy: RateLimitPolicy,
    request_headers_to_add: Vec<(String, String)>,
}

impl VirtualHost {
    /// Compiles a virtual host and its routes.
    pub fn build(
        config: &VirtualHostConfig,
        global_headers_to_add: &[(String, String)],
        runtime: RuntimeHandle,
    ) -> Result<Self, ConfigError> {
        let request_headers_to_add: Vec<(String, String)> = config
            .request_headers_to_add
            .iter()
            .map(|h| (h.key.to_ascii_lowercase(), h.value.clone()))
            .collect();

        let routes = config
            .routes
            .iter()
            .map(|spec| {
                RouteEntry::build(
                    spec,
                    config.cors.as_ref(),
                    &request_headers_to_add,
                    global_headers_to_add,
                    runtime.clone(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let virtual_clusters = config
            .virtual_clusters
            .iter()
            .map(|vc| {
                let pattern = Regex::new(&format!("^(?:{})$", vc.pattern)).map_err(|source| {
                    ConfigError::InvalidRegex {
                        pattern: vc.pattern.clone(),
                        source,
                    }
                })?;
                Ok(VirtualCluster {
                    pattern,
                    method: vc.method.clone(),
                    name: vc.name.clone(),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            name: config.name.clone(),
            routes,
            virtual_clusters,
            ssl_requirement: match config.require_ssl {
                SslRequirementConfig::None => SslRequirement::None,
                SslRequirementConfig::ExternalOnly => SslRequirement::ExternalOnly,
                SslRequirementConfig::All => SslRequirement::All,
            },
            cors_policy: config.cors.as_ref().map(CorsPolicy::build),
            rate_limit_policy: RateLimitPolicy::build(&config.rate_limits),
            request_headers_to_add,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cors_policy(&self) -> Option<&CorsPolicy> {
        self.cors_policy.as_ref()
    }

    pub fn rate_limit_policy(&self) -> &RateLimitPolicy {
        &self.rate_limit_policy
    }

    pub fn request_headers_to_add(&self) -> &[(String, String)] {
        &self.request_headers_to_add
    }

    pub(crate) fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }

    /// Resolves a route for the request: the SSL gate first, then the
    /// routes in declared order, first match winning.
    pub fn route_for(&self, headers: &HeaderMap, random_value: u64) -> Option<Route<'_>> {
        if self.requires_ssl_redirect(headers) {
            return Some(Route::Redirect(RedirectRoute::ssl_redirect()));
        }
        self.routes
            .iter()
            .find_map(|entry| entry.matches(self, headers, random_value))
    }

    fn requires_ssl_redirect(&self, headers: &HeaderMap) -> bool {
        let is_tls = headers
            .get(header_names::FORWARDED_PROTO)
            .is_some_and(|proto| proto == "https");
        if is_tls {
            return false;
        }
        match self.ssl_requirement {
            SslRequirement::All => true,
            SslRequirement::ExternalOnly => !request_is_internal(headers),
            SslRequirement::None => false,
        }
    }

    /// The virtual-cluster name for this request, `"other"` when clusters
    /// are declared but none matches, `None` when none are declared.
    pub fn virtual_cluster(&self, headers: &HeaderMap) -> Option<&str> {
        if self.virtual_clusters.is_empty() {
            return None;
        }
        let path = path_without_query(headers.path());
        let method = headers.get(header_names::METHOD);
        self.virtual_clusters
            .iter()
            .find(|vc| {
                vc.pattern.is_match(path)
                    && vc.method.as_deref().map_or(true, |m| method == Some(m))
            })
            .map(|vc| vc.name.as_str())
            .or(Some(VIRTUAL_CLUSTER_CATCH_ALL))
    }

    #[cfg(test)]
    pub(crate) fn for_tests(name: &str) -> Self {
        Self {
            name: name.to_string(),
            routes: Vec::new(),
            virtual_clusters: Vec::new(),
            ssl_requirement: SslRequirement::None,
            cors_policy: None,
            rate_limit_policy: RateLimitPolicy::empty(),
            request_headers_to_add: Vec::new(),
        }
    }
}

/// A request is internal when the proxy in front of us marked it so.
fn request_is_internal(headers: &HeaderMap) -> bool {
    headers
        .get(header_names::ENVOY_INTERNAL)
        .is_some_and(|v| v == "true")
}
