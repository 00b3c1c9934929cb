//! Serde definitions for the route table and the discovery subscription.
//!
//! Empty collections and unset options are skipped when serializing so the
//! admin dump of a freshly-created provider is `{}` and a dumped table
//! round-trips to an equivalent configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root route table: the body fetched from the discovery service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouteConfiguration {
    /// Route table name; filled in by the provider when the body omits it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub virtual_hosts: Vec<VirtualHostConfig>,

    /// Header names stripped from requests that arrive from outside.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub internal_only_headers: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub response_headers_to_add: Vec<HeaderValueConfig>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub response_headers_to_remove: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub request_headers_to_add: Vec<HeaderValueConfig>,
}

/// A `(key, value)` header addition pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderValueConfig {
    pub key: String,
    pub value: String,
}

/// SSL requirement for a virtual host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SslRequirement {
    #[default]
    None,
    ExternalOnly,
    All,
}

impl SslRequirement {
    fn is_none(&self) -> bool {
        matches!(self, SslRequirement::None)
    }
}

/// A named grouping of routes selected by the request's host header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VirtualHostConfig {
    pub name: String,

    /// Domain patterns: exact host, `*.suffix` wildcard, or `*` catch-all.
    pub domains: Vec<String>,

    pub routes: Vec<RouteSpec>,

    #[serde(skip_serializing_if = "SslRequirement::is_none")]
    pub require_ssl: SslRequirement,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cors: Option<CorsConfig>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rate_limits: Vec<RateLimitConfig>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub virtual_clusters: Vec<VirtualClusterConfig>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub request_headers_to_add: Vec<HeaderValueConfig>,
}

/// Request classifier for stats: a path pattern plus optional method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VirtualClusterConfig {
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    pub name: String,
}

/// Upstream resource priority attached to a route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutePriority {
    #[default]
    Default,
    High,
}

impl RoutePriority {
    fn is_default(&self) -> bool {
        matches!(self, RoutePriority::Default)
    }
}

/// A single route: match criteria, an action, and forwarding policies.
///
/// Exactly one of `prefix` / `path` / `regex` must be set, and exactly one
/// of `cluster` / `cluster_header` / `weighted_clusters` / redirect fields.
/// Both invariants are enforced at snapshot build, not here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouteSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_sensitive: Option<bool>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HeaderMatchConfig>,

    /// Runtime fraction gate: the route only matches for the admitted
    /// percentage of requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<RuntimeFractionConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_header: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weighted_clusters: Option<WeightedClustersConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_redirect: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_redirect: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    #[serde(skip_serializing_if = "RoutePriority::is_default")]
    pub priority: RoutePriority,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicyConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadow: Option<ShadowPolicyConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_policy: Option<HashPolicyConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cors: Option<CorsConfig>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rate_limits: Vec<RateLimitConfig>,

    /// Opaque key/value map passed through to filters untouched.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub opaque_config: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub request_headers_to_add: Vec<HeaderValueConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix_rewrite: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_rewrite: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub auto_host_rewrite: bool,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub use_websocket: bool,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub include_vh_rate_limits: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub decorator: Option<DecoratorConfig>,
}

/// Header match criterion: presence, exact value, or regex value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeaderMatchConfig {
    pub name: String,
    /// Unset value means match on presence alone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// When true, `value` is interpreted as an anchored regex.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub regex: bool,
}

/// Runtime gate keyed into the runtime store with a config-time default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeFractionConfig {
    pub key: String,
    pub default: u64,
}

/// Weighted cluster set with a declared total the weights must sum to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeightedClustersConfig {
    pub clusters: Vec<WeightedClusterConfig>,
    #[serde(default = "default_total_weight")]
    pub total_weight: u64,
}

fn default_total_weight() -> u64 {
    100
}

/// One member of a weighted cluster set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeightedClusterConfig {
    pub name: String,
    pub weight: u64,
    /// Runtime key overriding `weight` at selection time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_key: Option<String>,
}

/// Retry behavior exposed to the request-forwarding collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicyConfig {
    /// Comma-separated retry conditions, e.g. `"5xx,connect-failure"`.
    pub retry_on: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_try_timeout_ms: Option<u64>,
}

/// Traffic mirroring target with an optional runtime percentage gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShadowPolicyConfig {
    pub cluster: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_key: Option<String>,
}

/// Hash policy over a single named header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HashPolicyConfig {
    pub header_name: String,
}

/// CORS policy fields; unset fields fall through to the virtual host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allow_origin: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_methods: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_headers: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expose_headers: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_credentials: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// One rate-limit descriptor generator attached to a route or virtual host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    pub stage: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_key: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<RateLimitActionConfig>,
}

/// Rate-limit descriptor entry kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum RateLimitActionConfig {
    SourceCluster,
    DestinationCluster,
    RemoteAddress,
    GenericKey { descriptor_value: String },
    RequestHeaders { header_name: String, descriptor_key: String },
}

/// Tracing decoration: a fixed operation name for the route's span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecoratorConfig {
    pub operation: String,
}

/// Discovery subscription identity and cadence for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RdsConfig {
    /// Cluster name of the discovery service.
    pub cluster: String,
    pub route_config_name: String,
    pub refresh_delay_ms: u64,
    pub request_timeout_ms: u64,
    /// Ceiling for the failure backoff interval.
    pub max_retry_delay_ms: u64,
}

impl Default for RdsConfig {
    fn default() -> Self {
        Self {
            cluster: String::new(),
            route_config_name: String::new(),
            refresh_delay_ms: 30_000,
            request_timeout_ms: 1_000,
            max_retry_delay_ms: 300_000,
        }
    }
}
