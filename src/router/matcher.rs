//! Host-header resolution and top-level route matching.
//!
//! Domains are resolved in specificity order: exact match, then the
//! longest wildcard suffix, then the catch-all virtual host. Wildcard
//! suffixes live in per-length buckets iterated from longest to shortest
//! so the first hit is the most specific.

use std::collections::{BTreeMap, HashMap};

use crate::config::RouteConfiguration;
use crate::error::ConfigError;
use crate::http::HeaderMap;
use crate::runtime::RuntimeHandle;

use super::entry::Route;
use super::vhost::VirtualHost;

/// Matches request headers to a virtual host and then to a route.
pub struct RouteMatcher {
    virtual_hosts: Vec<VirtualHost>,
    /// Exact domain, lowercased, to index into `virtual_hosts`.
    exact_domains: HashMap<String, usize>,
    /// Wildcard suffixes (including the leading dot) bucketed by length.
    /// Iterated in reverse so longer suffixes win.
    wildcard_suffixes: BTreeMap<usize, HashMap<String, usize>>,
    catch_all: Option<usize>,
}

impl RouteMatcher {
    /// Compiles the virtual hosts and indexes their domains, enforcing the
    /// uniqueness invariants.
    pub fn build(
        config: &RouteConfiguration,
        global_headers_to_add: &[(String, String)],
        runtime: RuntimeHandle,
    ) -> Result<Self, ConfigError> {
        let mut virtual_hosts = Vec::with_capacity(config.virtual_hosts.len());
        let mut exact_domains = HashMap::new();
        let mut wildcard_suffixes: BTreeMap<usize, HashMap<String, usize>> = BTreeMap::new();
        let mut catch_all = None;

        for vhost_config in &config.virtual_hosts {
            let index = virtual_hosts.len();
            virtual_hosts.push(VirtualHost::build(
                vhost_config,
                global_headers_to_add,
                runtime.clone(),
            )?);

            for domain in &vhost_config.domains {
                let domain = domain.to_ascii_lowercase();
                if domain == "*" {
                    if catch_all.is_some() {
                        return Err(ConfigError::rejected(
                            "only one virtual host may declare the catch-all domain '*'",
                        ));
                    }
                    catch_all = Some(index);
                } else if let Some(suffix) = domain.strip_prefix('*') {
                    if !suffix.starts_with('.') {
                        return Err(ConfigError::rejected(format!(
                            "invalid wildcard domain '{domain}'"
                        )));
                    }
                    let bucket = wildcard_suffixes.entry(suffix.len()).or_default();
                    if bucket.insert(suffix.to_string(), index).is_some() {
                        return Err(ConfigError::rejected(format!(
                            "duplicate wildcard domain '*{suffix}'"
                        )));
                    }
                } else if exact_domains.insert(domain.clone(), index).is_some() {
                    return Err(ConfigError::rejected(format!(
                        "duplicate domain '{domain}' across virtual hosts"
                    )));
                }
            }
        }

        Ok(Self {
            virtual_hosts,
            exact_domains,
            wildcard_suffixes,
            catch_all,
        })
    }

    /// The hot-path lookup: headers plus a caller-supplied random value to
    /// a route decision. Pure; same inputs give the same output.
    pub fn route(&self, headers: &HeaderMap, random_value: u64) -> Option<Route<'_>> {
        self.find_virtual_host(headers)
            .and_then(|vhost| vhost.route_for(headers, random_value))
    }

    /// The virtual host serving this request's host, if any.
    pub fn find_virtual_host(&self, headers: &HeaderMap) -> Option<&VirtualHost> {
        let host = headers.host().to_ascii_lowercase();

        if let Some(&index) = self.exact_domains.get(&host) {
            return Some(&self.virtual_hosts[index]);
        }

        // Longest wildcard suffix wins; a suffix must be strictly shorter
        // than the host so `*.example.com` never matches `.example.com`.
        for (len, bucket) in self.wildcard_suffixes.iter().rev() {
            if *len >= host.len() {
                continue;
            }
            if let Some(&index) = host.get(host.len() - len..).and_then(|tail| bucket.get(tail)) {
                return Some(&self.virtual_hosts[index]);
            }
        }

        self.catch_all.map(|index| &self.virtual_hosts[index])
    }

    pub fn virtual_hosts(&self) -> &[VirtualHost] {
        &self.virtual_hosts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RouteSpec, VirtualHostConfig};
    use crate::runtime::StaticRuntime;
    use std::sync::Arc;

    fn runtime() -> RuntimeHandle {
        Arc::new(StaticRuntime::new())
    }

    fn vhost(name: &str, domains: Vec<&str>) -> VirtualHostConfig {
        VirtualHostConfig {
            name: name.to_string(),
            domains: domains.into_iter().map(String::from).collect(),
            routes: vec![RouteSpec {
                prefix: Some("/".to_string()),
                cluster: Some(name.to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn matcher(vhosts: Vec<VirtualHostConfig>) -> RouteMatcher {
        let config = RouteConfiguration {
            virtual_hosts: vhosts,
            ..Default::default()
        };
        RouteMatcher::build(&config, &[], runtime()).unwrap()
    }

    fn request(authority: &str) -> HeaderMap {
        HeaderMap::from_pairs([(":authority", authority), (":path", "/")])
    }

    fn selected(matcher: &RouteMatcher, authority: &str) -> String {
        matcher
            .route(&request(authority), 0)
            .unwrap()
            .forward()
            .unwrap()
            .cluster_name()
            .to_string()
    }

    #[test]
    fn test_domain_specificity_order() {
        let m = matcher(vec![
            vhost("exact", vec!["a.b.c"]),
            vhost("suffix_long", vec!["*.b.c"]),
            vhost("suffix_short", vec!["*.c"]),
            vhost("fallback", vec!["*"]),
        ]);

        assert_eq!(selected(&m, "a.b.c"), "exact");
        assert_eq!(selected(&m, "x.b.c"), "suffix_long");
        assert_eq!(selected(&m, "x.c"), "suffix_short");
        assert_eq!(selected(&m, "x.y"), "fallback");
        // Multi-level subdomains still match a wildcard suffix.
        assert_eq!(selected(&m, "deep.x.b.c"), "suffix_long");
    }

    #[test]
    fn test_wildcard_requires_strict_suffix() {
        let m = matcher(vec![vhost("wild", vec!["*.example.com"])]);

        assert!(m.route(&request("foo.example.com"), 0).is_some());
        // The bare suffix itself is not covered by the wildcard.
        assert!(m.route(&request("example.com"), 0).is_none());
        assert!(m.route(&request(".example.com"), 0).is_none());
    }

    #[test]
    fn test_no_match_without_catch_all() {
        let m = matcher(vec![vhost("only", vec!["api.example.com"])]);
        assert!(m.route(&request("other.example.com"), 0).is_none());
    }

    #[test]
    fn test_host_lookup_is_case_insensitive_and_ignores_port() {
        let m = matcher(vec![vhost("www", vec!["WWW.Example.com"])]);
        assert_eq!(selected(&m, "www.example.COM:8443"), "www");
    }

    #[test]
    fn test_multiple_domains_share_one_virtual_host() {
        let m = matcher(vec![vhost("multi", vec!["a.com", "b.com"])]);
        assert_eq!(selected(&m, "a.com"), "multi");
        assert_eq!(selected(&m, "b.com"), "multi");
        assert!(m.route(&request("c.com"), 0).is_none());
    }

    #[test]
    fn test_duplicate_exact_domain_rejected() {
        let config = RouteConfiguration {
            virtual_hosts: vec![vhost("one", vec!["dup.com"]), vhost("two", vec!["dup.com"])],
            ..Default::default()
        };
        assert!(RouteMatcher::build(&config, &[], runtime()).is_err());
    }

    #[test]
    fn test_duplicate_wildcard_suffix_rejected() {
        let config = RouteConfiguration {
            virtual_hosts: vec![vhost("one", vec!["*.dup.com"]), vhost("two", vec!["*.dup.com"])],
            ..Default::default()
        };
        assert!(RouteMatcher::build(&config, &[], runtime()).is_err());
    }

    #[test]
    fn test_second_catch_all_rejected() {
        let config = RouteConfiguration {
            virtual_hosts: vec![vhost("one", vec!["*"]), vhost("two", vec!["*"])],
            ..Default::default()
        };
        assert!(RouteMatcher::build(&config, &[], runtime()).is_err());
    }

    #[test]
    fn test_invalid_wildcard_form_rejected() {
        let config = RouteConfiguration {
            virtual_hosts: vec![vhost("bad", vec!["*example.com"])],
            ..Default::default()
        };
        assert!(RouteMatcher::build(&config, &[], runtime()).is_err());
    }

    #[test]
    fn test_route_is_deterministic() {
        let m = matcher(vec![vhost("svc", vec!["*"])]);
        let headers = request("anything.example.com");
        for random_value in [0u64, 17, 9_999] {
            let first = m.route(&headers, random_value).is_some();
            let again = m.route(&headers, random_value).is_some();
            assert!(first && again, "random={random_value}");
        }
    }
}
