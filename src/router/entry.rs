//! Route entries: match criteria, actions, and attached policies.
//!
//! A route entry is compiled once from a `RouteSpec` at snapshot build. The
//! hot path asks it `matches(...)`; on a hit it resolves the action into a
//! `Route` borrowing from the snapshot, so matching allocates only when the
//! cluster name comes out of a request header.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::time::Duration;

use regex::Regex;

use crate::config::{HeaderMatchConfig, RoutePriority, RouteSpec};
use crate::error::ConfigError;
use crate::http::{header_names, path_without_query, HeaderMap};
use crate::runtime::{Runtime, RuntimeHandle};

use super::policy::{
    CorsPolicy, Decorator, HashPolicy, RateLimitPolicy, RetryPolicy, ShadowPolicy,
};
use super::vhost::VirtualHost;

/// Default route timeout when the config does not set one.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Ceiling applied to runtime-sourced weighted-cluster weights.
pub const MAX_CLUSTER_WEIGHT: u64 = 100;

/// How the request path is matched.
#[derive(Debug)]
pub enum PathMatch {
    /// Path starts with the prefix (raw `:path`, query included).
    Prefix(String),
    /// Path equals the value up to any `?` or `#` delimiter.
    Exact(String),
    /// The path portion before `?`/`#` fully matches the anchored regex.
    Regex(Regex),
}

#[derive(Debug)]
enum HeaderMatchKind {
    Present,
    Exact(String),
    Regex(Regex),
}

#[derive(Debug)]
struct HeaderMatcher {
    name: String,
    kind: HeaderMatchKind,
}

impl HeaderMatcher {
    fn build(config: &HeaderMatchConfig) -> Result<Self, ConfigError> {
        let kind = match (&config.value, config.regex) {
            (None, _) => HeaderMatchKind::Present,
            (Some(value), false) => HeaderMatchKind::Exact(value.clone()),
            (Some(value), true) => HeaderMatchKind::Regex(compile_anchored(value)?),
        };
        Ok(Self {
            name: config.name.clone(),
            kind,
        })
    }

    fn matches(&self, headers: &HeaderMap) -> bool {
        match (&self.kind, headers.get(&self.name)) {
            (HeaderMatchKind::Present, found) => found.is_some(),
            (HeaderMatchKind::Exact(want), Some(found)) => found == want,
            (HeaderMatchKind::Regex(re), Some(found)) => re.is_match(found),
            (_, None) => false,
        }
    }
}

#[derive(Debug)]
struct RuntimeGate {
    key: String,
    default: u64,
}

/// One member of a weighted cluster set.
#[derive(Debug)]
pub struct WeightedClusterEntry {
    pub cluster_name: String,
    pub weight: u64,
    pub runtime_key: Option<String>,
}

impl WeightedClusterEntry {
    /// The weight used for this selection: the runtime override when a key
    /// is configured, the declared weight otherwise, clamped to
    /// `MAX_CLUSTER_WEIGHT`. Read once per selection.
    pub fn effective_weight(&self, runtime: &dyn Runtime) -> u64 {
        let base = match &self.runtime_key {
            Some(key) => runtime.get_integer(key, self.weight),
            None => self.weight,
        };
        base.min(MAX_CLUSTER_WEIGHT)
    }
}

/// What a matched route does with the request. Exactly one per entry.
#[derive(Debug)]
pub enum RouteAction {
    /// Forward to the named cluster.
    Cluster(String),
    /// Forward to the cluster named by this request header.
    ClusterHeader(String),
    /// Forward to one of several clusters picked by weighted random draw.
    WeightedClusters(Vec<WeightedClusterEntry>),
    /// Redirect with host and/or path replacement.
    Redirect {
        host: Option<String>,
        path: Option<String>,
    },
}

/// A compiled route entry.
pub struct RouteEntry {
    path_match: PathMatch,
    case_sensitive: bool,
    header_matchers: Vec<HeaderMatcher>,
    runtime_gate: Option<RuntimeGate>,
    action: RouteAction,
    runtime: RuntimeHandle,

    timeout: Duration,
    priority: RoutePriority,
    retry_policy: RetryPolicy,
    shadow_policy: Option<ShadowPolicy>,
    hash_policy: Option<HashPolicy>,
    cors_policy: Option<CorsPolicy>,
    rate_limit_policy: RateLimitPolicy,
    opaque_config: BTreeMap<String, String>,
    request_headers_to_add: Vec<(String, String)>,
    prefix_rewrite: Option<String>,
    host_rewrite: Option<String>,
    auto_host_rewrite: bool,
    use_websocket: bool,
    include_vh_rate_limits: bool,
    decorator: Option<Decorator>,
}

impl RouteEntry {
    /// Compiles a `RouteSpec`. `vhost_headers_to_add` and
    /// `global_headers_to_add` are merged behind the route's own additions,
    /// deduplicated by name with the route winning.
    pub fn build(
        spec: &RouteSpec,
        vhost_cors: Option<&crate::config::CorsConfig>,
        vhost_headers_to_add: &[(String, String)],
        global_headers_to_add: &[(String, String)],
        runtime: RuntimeHandle,
    ) -> Result<Self, ConfigError> {
        let path_match = match (&spec.prefix, &spec.path, &spec.regex) {
            (Some(prefix), None, None) => PathMatch::Prefix(prefix.clone()),
            (None, Some(path), None) => PathMatch::Exact(path.clone()),
            (None, None, Some(pattern)) => PathMatch::Regex(compile_anchored(pattern)?),
            _ => {
                return Err(ConfigError::rejected(
                    "route must set exactly one of prefix, path, regex",
                ))
            }
        };

        let redirect = spec.host_redirect.is_some() || spec.path_redirect.is_some();
        let action = match (&spec.cluster, &spec.cluster_header, &spec.weighted_clusters) {
            (Some(name), None, None) if !redirect => RouteAction::Cluster(name.clone()),
            (None, Some(header), None) if !redirect => {
                if spec.host_rewrite.is_some() || spec.auto_host_rewrite {
                    return Err(ConfigError::rejected(
                        "cluster_header routes cannot rewrite the host",
                    ));
                }
                RouteAction::ClusterHeader(header.to_ascii_lowercase())
            }
            (None, None, Some(weighted)) if !redirect => {
                if weighted.clusters.is_empty() {
                    return Err(ConfigError::rejected("weighted_clusters must not be empty"));
                }
                let declared: u64 = weighted.clusters.iter().map(|c| c.weight).sum();
                if declared != weighted.total_weight {
                    return Err(ConfigError::rejected(format!(
                        "weighted cluster weights sum to {declared}, expected {}",
                        weighted.total_weight
                    )));
                }
                RouteAction::WeightedClusters(
                    weighted
                        .clusters
                        .iter()
                        .map(|c| WeightedClusterEntry {
                            cluster_name: c.name.clone(),
                            weight: c.weight,
                            runtime_key: c.runtime_key.clone(),
                        })
                        .collect(),
                )
            }
            (None, None, None) if redirect => RouteAction::Redirect {
                host: spec.host_redirect.clone(),
                path: spec.path_redirect.clone(),
            },
            _ => {
                return Err(ConfigError::rejected(
                    "route must set exactly one of cluster, cluster_header, weighted_clusters, redirect",
                ))
            }
        };

        let header_matchers = spec
            .headers
            .iter()
            .map(HeaderMatcher::build)
            .collect::<Result<Vec<_>, _>>()?;

        let request_headers_to_add = merge_header_additions(
            &header_pairs(&spec.request_headers_to_add),
            vhost_headers_to_add,
            global_headers_to_add,
        );

        Ok(Self {
            path_match,
            case_sensitive: spec.case_sensitive.unwrap_or(true),
            header_matchers,
            runtime_gate: spec.runtime.as_ref().map(|r| RuntimeGate {
                key: r.key.clone(),
                default: r.default,
            }),
            action,
            runtime,
            timeout: spec
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_TIMEOUT),
            priority: spec.priority,
            retry_policy: RetryPolicy::build(spec.retry_policy.as_ref())?,
            shadow_policy: spec.shadow.as_ref().map(ShadowPolicy::build),
            hash_policy: spec.hash_policy.as_ref().map(|h| HashPolicy {
                header_name: h.header_name.clone(),
            }),
            cors_policy: CorsPolicy::layered(spec.cors.as_ref(), vhost_cors),
            rate_limit_policy: RateLimitPolicy::build(&spec.rate_limits),
            opaque_config: spec.opaque_config.clone(),
            request_headers_to_add,
            prefix_rewrite: spec.prefix_rewrite.clone(),
            host_rewrite: spec.host_rewrite.clone(),
            auto_host_rewrite: spec.auto_host_rewrite,
            use_websocket: spec.use_websocket,
            include_vh_rate_limits: spec.include_vh_rate_limits,
            decorator: spec
                .decorator
                .as_ref()
                .map(|d| Decorator {
                    operation: d.operation.clone(),
                }),
        })
    }

    /// Static cluster names this entry references, for build-time
    /// validation. Cluster-header routes reference none.
    pub fn referenced_clusters(&self) -> Vec<&str> {
        match &self.action {
            RouteAction::Cluster(name) => vec![name.as_str()],
            RouteAction::WeightedClusters(entries) => {
                entries.iter().map(|e| e.cluster_name.as_str()).collect()
            }
            RouteAction::ClusterHeader(_) | RouteAction::Redirect { .. } => Vec::new(),
        }
    }

    /// Tests this entry against the request; on a hit resolves the action.
    pub fn matches<'a>(
        &'a self,
        vhost: &'a VirtualHost,
        headers: &HeaderMap,
        random_value: u64,
    ) -> Option<Route<'a>> {
        if !self.path_matches(headers.path()) {
            return None;
        }
        if !self.header_matchers.iter().all(|m| m.matches(headers)) {
            return None;
        }
        if let Some(gate) = &self.runtime_gate {
            let admit = self.runtime.get_integer(&gate.key, gate.default);
            if random_value % 100 >= admit {
                return None;
            }
        }
        Some(self.resolve_action(vhost, headers, random_value))
    }

    fn path_matches(&self, path: &str) -> bool {
        match &self.path_match {
            PathMatch::Prefix(prefix) => starts_with(path, prefix, self.case_sensitive),
            PathMatch::Exact(exact) => {
                let trimmed = path_without_query(path);
                if self.case_sensitive {
                    trimmed == exact
                } else {
                    trimmed.eq_ignore_ascii_case(exact)
                }
            }
            PathMatch::Regex(re) => re.is_match(path_without_query(path)),
        }
    }

    fn resolve_action<'a>(
        &'a self,
        vhost: &'a VirtualHost,
        headers: &HeaderMap,
        random_value: u64,
    ) -> Route<'a> {
        match &self.action {
            RouteAction::Cluster(name) => Route::Forward(ResolvedRoute {
                entry: self,
                vhost,
                cluster_name: Cow::Borrowed(name.as_str()),
            }),
            RouteAction::ClusterHeader(header) => {
                // An absent header yields an empty cluster name; the
                // downstream cluster lookup will fail and the caller 404s.
                let name = headers.get(header).unwrap_or("").to_string();
                Route::Forward(ResolvedRoute {
                    entry: self,
                    vhost,
                    cluster_name: Cow::Owned(name),
                })
            }
            RouteAction::WeightedClusters(entries) => {
                let selected = select_weighted(entries, &*self.runtime, random_value);
                Route::Forward(ResolvedRoute {
                    entry: self,
                    vhost,
                    cluster_name: Cow::Borrowed(selected.cluster_name.as_str()),
                })
            }
            RouteAction::Redirect { host, path } => Route::Redirect(RedirectRoute {
                host: host.as_deref(),
                path: path.as_deref(),
                force_https: false,
                decorator: self.decorator.as_ref(),
            }),
        }
    }

    /// Applies path rewrite, host rewrite, and header additions, in that
    /// order. The original path is preserved in `x-envoy-original-path`
    /// whenever a rewrite occurs.
    pub fn finalize_request_headers(&self, headers: &mut HeaderMap) {
        if let Some(rewrite) = &self.prefix_rewrite {
            let path = headers.path().to_string();
            let matched_len = match &self.path_match {
                PathMatch::Prefix(prefix) => prefix.len(),
                PathMatch::Exact(exact) => exact.len(),
                PathMatch::Regex(_) => path_without_query(&path).len(),
            };
            let new_path = format!("{rewrite}{}", path.get(matched_len..).unwrap_or(""));
            headers.set(header_names::ENVOY_ORIGINAL_PATH, &path);
            headers.set(header_names::PATH, &new_path);
        }

        if let Some(host) = &self.host_rewrite {
            headers.set(header_names::AUTHORITY, host);
        }

        for (name, value) in &self.request_headers_to_add {
            headers.append(name, value);
        }
    }

    pub fn decorator(&self) -> Option<&Decorator> {
        self.decorator.as_ref()
    }
}

fn starts_with(path: &str, prefix: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        path.starts_with(prefix)
    } else {
        path.len() >= prefix.len()
            && path.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
    }
}

fn compile_anchored(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|source| ConfigError::InvalidRegex {
        pattern: pattern.to_string(),
        source,
    })
}

fn header_pairs(configs: &[crate::config::HeaderValueConfig]) -> Vec<(String, String)> {
    configs
        .iter()
        .map(|h| (h.key.to_ascii_lowercase(), h.value.clone()))
        .collect()
}

/// Merges header-addition levels with route > virtual host > global
/// precedence; within a level declaration order is preserved.
fn merge_header_additions(
    route: &[(String, String)],
    vhost: &[(String, String)],
    global: &[(String, String)],
) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = Vec::new();
    for (name, value) in route.iter().chain(vhost).chain(global) {
        if !merged.iter().any(|(n, _)| n.eq_ignore_ascii_case(name)) {
            merged.push((name.clone(), value.clone()));
        }
    }
    merged
}

/// Weighted random draw over the entries' effective weights. Weights are
/// read once so the total and the pick stay consistent; an all-zero total
/// falls back to the first entry rather than failing the request.
fn select_weighted<'a>(
    entries: &'a [WeightedClusterEntry],
    runtime: &dyn Runtime,
    random_value: u64,
) -> &'a WeightedClusterEntry {
    let weights: Vec<u64> = entries.iter().map(|e| e.effective_weight(runtime)).collect();
    let total: u64 = weights.iter().sum();
    if total == 0 {
        return &entries[0];
    }

    let mut pick = random_value % total;
    for (entry, weight) in entries.iter().zip(&weights) {
        if pick < *weight {
            return entry;
        }
        pick -= weight;
    }
    // Unreachable: pick < total and the weights sum to total.
    &entries[entries.len() - 1]
}

/// A matched route: either forward upstream or answer with a redirect.
pub enum Route<'a> {
    Forward(ResolvedRoute<'a>),
    Redirect(RedirectRoute<'a>),
}

impl<'a> Route<'a> {
    pub fn forward(&self) -> Option<&ResolvedRoute<'a>> {
        match self {
            Route::Forward(route) => Some(route),
            Route::Redirect(_) => None,
        }
    }

    pub fn redirect(&self) -> Option<&RedirectRoute<'a>> {
        match self {
            Route::Redirect(redirect) => Some(redirect),
            Route::Forward(_) => None,
        }
    }

    pub fn decorator(&self) -> Option<&Decorator> {
        match self {
            Route::Forward(route) => route.entry.decorator(),
            Route::Redirect(redirect) => redirect.decorator,
        }
    }
}

/// A route resolved to a concrete cluster, exposing the entry's policies.
pub struct ResolvedRoute<'a> {
    entry: &'a RouteEntry,
    vhost: &'a VirtualHost,
    cluster_name: Cow<'a, str>,
}

impl<'a> ResolvedRoute<'a> {
    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub fn timeout(&self) -> Duration {
        self.entry.timeout
    }

    pub fn priority(&self) -> RoutePriority {
        self.entry.priority
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.entry.retry_policy
    }

    pub fn shadow_policy(&self) -> Option<&ShadowPolicy> {
        self.entry.shadow_policy.as_ref()
    }

    pub fn hash_policy(&self) -> Option<&HashPolicy> {
        self.entry.hash_policy.as_ref()
    }

    pub fn cors_policy(&self) -> Option<&CorsPolicy> {
        self.entry.cors_policy.as_ref()
    }

    pub fn rate_limit_policy(&self) -> &RateLimitPolicy {
        &self.entry.rate_limit_policy
    }

    pub fn include_vh_rate_limits(&self) -> bool {
        self.entry.include_vh_rate_limits
    }

    pub fn opaque_config(&self) -> &BTreeMap<String, String> {
        &self.entry.opaque_config
    }

    pub fn use_websocket(&self) -> bool {
        self.entry.use_websocket
    }

    /// Whether `:authority` should be rewritten to the resolved upstream
    /// host after load balancing. An explicit `host_rewrite` wins; this is
    /// only consulted when none is set.
    pub fn auto_host_rewrite(&self) -> bool {
        self.entry.host_rewrite.is_none() && self.entry.auto_host_rewrite
    }

    pub fn virtual_host(&self) -> &VirtualHost {
        self.vhost
    }

    pub fn virtual_cluster(&self, headers: &HeaderMap) -> Option<&str> {
        self.vhost.virtual_cluster(headers)
    }

    pub fn finalize_request_headers(&self, headers: &mut HeaderMap) {
        self.entry.finalize_request_headers(headers);
    }
}

/// A redirect decision: where to send the client instead of upstream.
#[derive(Debug)]
pub struct RedirectRoute<'a> {
    host: Option<&'a str>,
    path: Option<&'a str>,
    force_https: bool,
    decorator: Option<&'a Decorator>,
}

impl<'a> RedirectRoute<'a> {
    /// The synthetic redirect answering a plaintext request to an
    /// SSL-requiring virtual host: scheme becomes `https`, host and path
    /// are preserved.
    pub fn ssl_redirect() -> Self {
        Self {
            host: None,
            path: None,
            force_https: true,
            decorator: None,
        }
    }

    /// The full redirect location for this request.
    pub fn new_path(&self, headers: &HeaderMap) -> String {
        let scheme = if self.force_https {
            "https"
        } else {
            headers.get(header_names::FORWARDED_PROTO).unwrap_or("http")
        };
        let host = self
            .host
            .unwrap_or_else(|| headers.get(header_names::AUTHORITY).unwrap_or(""));
        let path = self.path.unwrap_or_else(|| headers.path());
        format!("{scheme}://{host}{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        HeaderValueConfig, RuntimeFractionConfig, WeightedClusterConfig, WeightedClustersConfig,
    };
    use crate::runtime::StaticRuntime;
    use std::sync::Arc;

    fn runtime() -> Arc<StaticRuntime> {
        Arc::new(StaticRuntime::new())
    }

    fn build(spec: &RouteSpec, runtime: Arc<StaticRuntime>) -> RouteEntry {
        RouteEntry::build(spec, None, &[], &[], runtime).unwrap()
    }

    fn vhost() -> VirtualHost {
        VirtualHost::for_tests("unit")
    }

    fn prefix_route(prefix: &str, cluster: &str) -> RouteSpec {
        RouteSpec {
            prefix: Some(prefix.to_string()),
            cluster: Some(cluster.to_string()),
            ..Default::default()
        }
    }

    fn request(authority: &str, path: &str) -> HeaderMap {
        HeaderMap::from_pairs([(":authority", authority), (":path", path)])
    }

    // ========== Build validation ==========

    #[test]
    fn test_build_requires_exactly_one_match_kind() {
        let spec = RouteSpec {
            prefix: Some("/a".to_string()),
            path: Some("/b".to_string()),
            cluster: Some("c".to_string()),
            ..Default::default()
        };
        assert!(RouteEntry::build(&spec, None, &[], &[], runtime()).is_err());

        let spec = RouteSpec {
            cluster: Some("c".to_string()),
            ..Default::default()
        };
        assert!(RouteEntry::build(&spec, None, &[], &[], runtime()).is_err());
    }

    #[test]
    fn test_build_requires_exactly_one_action() {
        let spec = RouteSpec {
            prefix: Some("/".to_string()),
            cluster: Some("a".to_string()),
            cluster_header: Some("x-cluster".to_string()),
            ..Default::default()
        };
        assert!(RouteEntry::build(&spec, None, &[], &[], runtime()).is_err());

        let spec = RouteSpec {
            prefix: Some("/".to_string()),
            ..Default::default()
        };
        assert!(RouteEntry::build(&spec, None, &[], &[], runtime()).is_err());
    }

    #[test]
    fn test_build_rejects_cluster_header_with_host_rewrite() {
        let spec = RouteSpec {
            prefix: Some("/".to_string()),
            cluster_header: Some("x-cluster".to_string()),
            host_rewrite: Some("internal.example.com".to_string()),
            ..Default::default()
        };
        assert!(RouteEntry::build(&spec, None, &[], &[], runtime()).is_err());
    }

    #[test]
    fn test_build_rejects_bad_regex() {
        let spec = RouteSpec {
            regex: Some("(unclosed".to_string()),
            cluster: Some("a".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            RouteEntry::build(&spec, None, &[], &[], runtime()),
            Err(ConfigError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_build_rejects_weight_sum_mismatch() {
        let spec = RouteSpec {
            prefix: Some("/".to_string()),
            weighted_clusters: Some(WeightedClustersConfig {
                clusters: vec![
                    WeightedClusterConfig {
                        name: "a".to_string(),
                        weight: 30,
                        runtime_key: None,
                    },
                    WeightedClusterConfig {
                        name: "b".to_string(),
                        weight: 30,
                        runtime_key: None,
                    },
                ],
                total_weight: 100,
            }),
            ..Default::default()
        };
        assert!(RouteEntry::build(&spec, None, &[], &[], runtime()).is_err());
    }

    // ========== Path matching ==========

    #[test]
    fn test_prefix_match() {
        let entry = build(&prefix_route("/api", "backend"), runtime());
        let vh = vhost();

        assert!(entry.matches(&vh, &request("svc", "/api"), 0).is_some());
        assert!(entry.matches(&vh, &request("svc", "/api/users"), 0).is_some());
        assert!(entry.matches(&vh, &request("svc", "/apikeys"), 0).is_some());
        assert!(entry.matches(&vh, &request("svc", "/other"), 0).is_none());
    }

    #[test]
    fn test_prefix_case_sensitivity_flag() {
        let mut spec = prefix_route("/API", "backend");
        let entry = build(&spec, runtime());
        assert!(entry.matches(&vhost(), &request("svc", "/api"), 0).is_none());

        spec.case_sensitive = Some(false);
        let entry = build(&spec, runtime());
        assert!(entry.matches(&vhost(), &request("svc", "/api"), 0).is_some());
    }

    #[test]
    fn test_exact_path_ignores_query_and_fragment() {
        let spec = RouteSpec {
            path: Some("/login".to_string()),
            cluster: Some("auth".to_string()),
            ..Default::default()
        };
        let entry = build(&spec, runtime());
        let vh = vhost();

        assert!(entry.matches(&vh, &request("svc", "/login"), 0).is_some());
        assert!(entry.matches(&vh, &request("svc", "/login?next=/"), 0).is_some());
        assert!(entry.matches(&vh, &request("svc", "/login#top"), 0).is_some());
        assert!(entry.matches(&vh, &request("svc", "/login/x"), 0).is_none());
    }

    #[test]
    fn test_regex_match_is_anchored() {
        let spec = RouteSpec {
            regex: Some("/users/[0-9]+".to_string()),
            cluster: Some("users".to_string()),
            ..Default::default()
        };
        let entry = build(&spec, runtime());
        let vh = vhost();

        assert!(entry.matches(&vh, &request("svc", "/users/123"), 0).is_some());
        assert!(entry.matches(&vh, &request("svc", "/users/123?page=2"), 0).is_some());
        assert!(entry.matches(&vh, &request("svc", "/users/abc"), 0).is_none());
        // Anchored: a regex matching a substring is not enough.
        assert!(entry.matches(&vh, &request("svc", "/v1/users/123"), 0).is_none());
    }

    // ========== Header matchers ==========

    #[test]
    fn test_header_matchers_all_must_hold() {
        let spec = RouteSpec {
            prefix: Some("/".to_string()),
            cluster: Some("backend".to_string()),
            headers: vec![
                HeaderMatchConfig {
                    name: "x-canary".to_string(),
                    value: None,
                    regex: false,
                },
                HeaderMatchConfig {
                    name: "x-version".to_string(),
                    value: Some("v[12]".to_string()),
                    regex: true,
                },
            ],
            ..Default::default()
        };
        let entry = build(&spec, runtime());
        let vh = vhost();

        let mut headers = request("svc", "/");
        assert!(entry.matches(&vh, &headers, 0).is_none());

        headers.set("x-canary", "true");
        headers.set("x-version", "v2");
        assert!(entry.matches(&vh, &headers, 0).is_some());

        headers.set("x-version", "v3");
        assert!(entry.matches(&vh, &headers, 0).is_none());
    }

    // ========== Runtime gate ==========

    #[test]
    fn test_runtime_gate_admits_below_fraction() {
        let rt = runtime();
        rt.set("routing.canary", 30);
        let spec = RouteSpec {
            prefix: Some("/".to_string()),
            cluster: Some("canary".to_string()),
            runtime: Some(RuntimeFractionConfig {
                key: "routing.canary".to_string(),
                default: 0,
            }),
            ..Default::default()
        };
        let entry = build(&spec, rt);
        let vh = vhost();
        let headers = request("svc", "/");

        // Matches exactly when random_value % 100 < 30.
        for random_value in 0..200u64 {
            let matched = entry.matches(&vh, &headers, random_value).is_some();
            assert_eq!(matched, random_value % 100 < 30, "random={random_value}");
        }
    }

    #[test]
    fn test_runtime_gate_uses_default_when_key_unset() {
        let spec = RouteSpec {
            prefix: Some("/".to_string()),
            cluster: Some("canary".to_string()),
            runtime: Some(RuntimeFractionConfig {
                key: "routing.unset".to_string(),
                default: 50,
            }),
            ..Default::default()
        };
        let entry = build(&spec, runtime());
        let vh = vhost();
        let headers = request("svc", "/");

        assert!(entry.matches(&vh, &headers, 49).is_some());
        assert!(entry.matches(&vh, &headers, 50).is_none());
    }

    // ========== Action resolution ==========

    #[test]
    fn test_cluster_header_action_reads_request() {
        let spec = RouteSpec {
            prefix: Some("/bar".to_string()),
            cluster_header: Some(":authority".to_string()),
            ..Default::default()
        };
        let entry = build(&spec, runtime());
        let vh = vhost();

        let route = entry.matches(&vh, &request("svc", "/bar"), 0).unwrap();
        assert_eq!(route.forward().unwrap().cluster_name(), "svc");

        // Absent header resolves to an empty cluster name.
        let headers = HeaderMap::from_pairs([(":path", "/bar")]);
        let route = entry.matches(&vh, &headers, 0).unwrap();
        assert_eq!(route.forward().unwrap().cluster_name(), "");
    }

    fn weighted_spec() -> RouteSpec {
        RouteSpec {
            prefix: Some("/".to_string()),
            weighted_clusters: Some(WeightedClustersConfig {
                clusters: vec![
                    WeightedClusterConfig {
                        name: "a".to_string(),
                        weight: 25,
                        runtime_key: None,
                    },
                    WeightedClusterConfig {
                        name: "b".to_string(),
                        weight: 75,
                        runtime_key: None,
                    },
                ],
                total_weight: 100,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_weighted_selection_deterministic_in_random_value() {
        let entry = build(&weighted_spec(), runtime());
        let vh = vhost();
        let headers = request("svc", "/");

        let pick = |random_value: u64| {
            entry
                .matches(&vh, &headers, random_value)
                .unwrap()
                .forward()
                .unwrap()
                .cluster_name()
                .to_string()
        };

        assert_eq!(pick(10), "a");
        assert_eq!(pick(25), "b");
        assert_eq!(pick(99), "b");
        assert_eq!(pick(100), "a");
        // Same input, same output.
        assert_eq!(pick(42), pick(42));
    }

    #[test]
    fn test_weighted_distribution_matches_weights() {
        let entry = build(&weighted_spec(), runtime());
        let vh = vhost();
        let headers = request("svc", "/");

        let mut a_count = 0;
        for random_value in 0..100u64 {
            let route = entry.matches(&vh, &headers, random_value).unwrap();
            if route.forward().unwrap().cluster_name() == "a" {
                a_count += 1;
            }
        }
        assert_eq!(a_count, 25);
    }

    #[test]
    fn test_weighted_runtime_override_and_clamp() {
        let rt = runtime();
        let spec = RouteSpec {
            prefix: Some("/".to_string()),
            weighted_clusters: Some(WeightedClustersConfig {
                clusters: vec![
                    WeightedClusterConfig {
                        name: "a".to_string(),
                        weight: 50,
                        runtime_key: Some("weights.a".to_string()),
                    },
                    WeightedClusterConfig {
                        name: "b".to_string(),
                        weight: 50,
                        runtime_key: None,
                    },
                ],
                total_weight: 100,
            }),
            ..Default::default()
        };
        let entry = build(&spec, rt.clone());
        let vh = vhost();
        let headers = request("svc", "/");

        // Override a's weight to zero: everything lands on b.
        rt.set("weights.a", 0);
        for random_value in 0..50u64 {
            let route = entry.matches(&vh, &headers, random_value).unwrap();
            assert_eq!(route.forward().unwrap().cluster_name(), "b");
        }

        // Values above MAX_CLUSTER_WEIGHT are clamped.
        rt.set("weights.a", 1_000);
        let route = entry.matches(&vh, &headers, MAX_CLUSTER_WEIGHT - 1).unwrap();
        assert_eq!(route.forward().unwrap().cluster_name(), "a");
    }

    #[test]
    fn test_weighted_all_zero_falls_back_to_first() {
        let rt = runtime();
        rt.set("weights.a", 0);
        rt.set("weights.b", 0);
        let spec = RouteSpec {
            prefix: Some("/".to_string()),
            weighted_clusters: Some(WeightedClustersConfig {
                clusters: vec![
                    WeightedClusterConfig {
                        name: "a".to_string(),
                        weight: 50,
                        runtime_key: Some("weights.a".to_string()),
                    },
                    WeightedClusterConfig {
                        name: "b".to_string(),
                        weight: 50,
                        runtime_key: Some("weights.b".to_string()),
                    },
                ],
                total_weight: 100,
            }),
            ..Default::default()
        };
        let entry = build(&spec, rt);
        let vh = vhost();
        let route = entry.matches(&vh, &request("svc", "/"), 7).unwrap();
        assert_eq!(route.forward().unwrap().cluster_name(), "a");
    }

    #[test]
    fn test_redirect_action() {
        let spec = RouteSpec {
            prefix: Some("/old".to_string()),
            host_redirect: Some("new.example.com".to_string()),
            ..Default::default()
        };
        let entry = build(&spec, runtime());
        let vh = vhost();

        let headers = request("old.example.com", "/old/page");
        let route = entry.matches(&vh, &headers, 0).unwrap();
        let redirect = route.redirect().unwrap();
        assert_eq!(redirect.new_path(&headers), "http://new.example.com/old/page");
    }

    #[test]
    fn test_redirect_path_replacement_and_scheme() {
        let spec = RouteSpec {
            prefix: Some("/old".to_string()),
            path_redirect: Some("/new".to_string()),
            ..Default::default()
        };
        let entry = build(&spec, runtime());
        let mut headers = request("svc.example.com", "/old");
        headers.set("x-forwarded-proto", "https");

        let vh = vhost();
        let route = entry.matches(&vh, &headers, 0).unwrap();
        assert_eq!(
            route.redirect().unwrap().new_path(&headers),
            "https://svc.example.com/new"
        );
    }

    #[test]
    fn test_ssl_redirect_preserves_host_and_path() {
        let headers = request("svc.example.com", "/a/b?c=1");
        let redirect = RedirectRoute::ssl_redirect();
        assert_eq!(redirect.new_path(&headers), "https://svc.example.com/a/b?c=1");
    }

    // ========== Header finalization ==========

    #[test]
    fn test_prefix_rewrite_preserves_original_path() {
        let spec = RouteSpec {
            prefix: Some("/api".to_string()),
            cluster: Some("backend".to_string()),
            prefix_rewrite: Some("/v2".to_string()),
            ..Default::default()
        };
        let entry = build(&spec, runtime());

        let mut headers = request("svc", "/api/users?page=1");
        entry.finalize_request_headers(&mut headers);

        assert_eq!(headers.path(), "/v2/users?page=1");
        assert_eq!(headers.get("x-envoy-original-path"), Some("/api/users?page=1"));
    }

    #[test]
    fn test_exact_path_rewrite_keeps_query() {
        let spec = RouteSpec {
            path: Some("/login".to_string()),
            cluster: Some("auth".to_string()),
            prefix_rewrite: Some("/signin".to_string()),
            ..Default::default()
        };
        let entry = build(&spec, runtime());

        let mut headers = request("svc", "/login?next=/home");
        entry.finalize_request_headers(&mut headers);
        assert_eq!(headers.path(), "/signin?next=/home");
    }

    #[test]
    fn test_no_rewrite_leaves_path_untouched() {
        let entry = build(&prefix_route("/api", "backend"), runtime());
        let mut headers = request("svc", "/api/users");
        entry.finalize_request_headers(&mut headers);

        assert_eq!(headers.path(), "/api/users");
        assert!(!headers.contains("x-envoy-original-path"));
    }

    #[test]
    fn test_host_rewrite_sets_authority() {
        let spec = RouteSpec {
            prefix: Some("/".to_string()),
            cluster: Some("backend".to_string()),
            host_rewrite: Some("internal.example.com".to_string()),
            ..Default::default()
        };
        let entry = build(&spec, runtime());

        let mut headers = request("public.example.com", "/");
        entry.finalize_request_headers(&mut headers);
        assert_eq!(headers.get(":authority"), Some("internal.example.com"));
    }

    #[test]
    fn test_explicit_host_rewrite_wins_over_auto() {
        let spec = RouteSpec {
            prefix: Some("/".to_string()),
            cluster: Some("backend".to_string()),
            host_rewrite: Some("internal.example.com".to_string()),
            auto_host_rewrite: true,
            ..Default::default()
        };
        let entry = build(&spec, runtime());
        let vh = vhost();
        let headers = request("svc", "/");

        let route = entry.matches(&vh, &headers, 0).unwrap();
        assert!(!route.forward().unwrap().auto_host_rewrite());
    }

    #[test]
    fn test_header_additions_route_wins_over_vhost_and_global() {
        let spec = RouteSpec {
            prefix: Some("/".to_string()),
            cluster: Some("backend".to_string()),
            request_headers_to_add: vec![HeaderValueConfig {
                key: "x-source".to_string(),
                value: "route".to_string(),
            }],
            ..Default::default()
        };
        let vhost_adds = vec![
            ("x-source".to_string(), "vhost".to_string()),
            ("x-vhost".to_string(), "www".to_string()),
        ];
        let global_adds = vec![
            ("x-source".to_string(), "global".to_string()),
            ("x-global".to_string(), "edge".to_string()),
        ];
        let entry = RouteEntry::build(&spec, None, &vhost_adds, &global_adds, runtime()).unwrap();

        let mut headers = request("svc", "/");
        entry.finalize_request_headers(&mut headers);

        let sources: Vec<&str> = headers.get_all("x-source").collect();
        assert_eq!(sources, vec!["route"]);
        assert_eq!(headers.get("x-vhost"), Some("www"));
        assert_eq!(headers.get("x-global"), Some("edge"));
    }

    #[test]
    fn test_timeout_default_and_override() {
        let entry = build(&prefix_route("/", "backend"), runtime());
        let vh = vhost();
        let route = entry.matches(&vh, &request("svc", "/"), 0).unwrap();
        assert_eq!(route.forward().unwrap().timeout(), Duration::from_secs(15));

        let spec = RouteSpec {
            timeout_ms: Some(500),
            ..prefix_route("/", "backend")
        };
        let entry = build(&spec, runtime());
        let route = entry.matches(&vh, &request("svc", "/"), 0).unwrap();
        assert_eq!(route.forward().unwrap().timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_referenced_clusters() {
        let entry = build(&prefix_route("/", "backend"), runtime());
        assert_eq!(entry.referenced_clusters(), vec!["backend"]);

        let entry = build(&weighted_spec(), runtime());
        assert_eq!(entry.referenced_clusters(), vec!["a", "b"]);

        let spec = RouteSpec {
            prefix: Some("/".to_string()),
            cluster_header: Some("x-cluster".to_string()),
            ..Default::default()
        };
        let entry = build(&spec, runtime());
        assert!(entry.referenced_clusters().is_empty());
    }
}
