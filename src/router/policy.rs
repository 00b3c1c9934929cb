//! Per-route forwarding policies.
//!
//! Each policy is an immutable sub-object compiled from config and hung off
//! a route entry. The router never acts on these itself; it exposes them to
//! the request-forwarding, rate-limiting, and tracing collaborators.

use crate::config::{
    CorsConfig, RateLimitActionConfig, RateLimitConfig, RetryPolicyConfig, ShadowPolicyConfig,
};
use crate::error::ConfigError;
use crate::http::HeaderMap;
use crate::runtime::Runtime;
use crate::util::stable_hash64;
use std::time::Duration;

/// Bitmask values for the retry conditions a route enables.
pub mod retry_on {
    pub const FIVE_XX: u32 = 0x1;
    pub const GATEWAY_ERROR: u32 = 0x2;
    pub const CONNECT_FAILURE: u32 = 0x4;
    pub const RETRIABLE_4XX: u32 = 0x8;
    pub const REFUSED_STREAM: u32 = 0x10;
}

/// Retry behavior for a route. The router exposes this; the forwarding
/// collaborator performs the actual retries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    pub per_try_timeout: Option<Duration>,
    pub num_retries: u32,
    pub retry_on: u32,
}

impl RetryPolicy {
    /// Builds the policy from config. An absent config yields the disabled
    /// policy; a present `retry_on` enables one retry unless overridden.
    pub fn build(config: Option<&RetryPolicyConfig>) -> Result<Self, ConfigError> {
        let Some(config) = config else {
            return Ok(Self::default());
        };

        let retry_on = parse_retry_on(&config.retry_on)?;
        let num_retries = match config.num_retries {
            Some(n) => n,
            None if retry_on != 0 => 1,
            None => 0,
        };

        Ok(Self {
            per_try_timeout: config.per_try_timeout_ms.map(Duration::from_millis),
            num_retries,
            retry_on,
        })
    }

    pub fn enabled(&self) -> bool {
        self.retry_on != 0
    }
}

fn parse_retry_on(source: &str) -> Result<u32, ConfigError> {
    let mut mask = 0;
    for token in source.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        mask |= match token {
            "5xx" => retry_on::FIVE_XX,
            "gateway-error" => retry_on::GATEWAY_ERROR,
            "connect-failure" => retry_on::CONNECT_FAILURE,
            "retriable-4xx" => retry_on::RETRIABLE_4XX,
            "refused-stream" => retry_on::REFUSED_STREAM,
            other => {
                return Err(ConfigError::rejected(format!(
                    "unknown retry_on condition '{other}'"
                )))
            }
        };
    }
    Ok(mask)
}

/// Traffic mirroring policy: which cluster receives the shadow copy and the
/// runtime key gating the mirrored fraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowPolicy {
    pub cluster: String,
    pub runtime_key: Option<String>,
}

impl ShadowPolicy {
    pub fn build(config: &ShadowPolicyConfig) -> Self {
        Self {
            cluster: config.cluster.clone(),
            runtime_key: config.runtime_key.clone(),
        }
    }

    /// Whether this particular request should be mirrored. Without a
    /// runtime key every request is.
    pub fn should_shadow(&self, runtime: &dyn Runtime, random_value: u64) -> bool {
        match &self.runtime_key {
            Some(key) => random_value % 100 < runtime.get_integer(key, 100).min(100),
            None => true,
        }
    }
}

/// Hash policy over a single named header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashPolicy {
    pub header_name: String,
}

impl HashPolicy {
    /// Stable 64-bit hash of the header's value; `None` when the header is
    /// absent. Every snapshot uses the same algorithm (`stable_hash64`).
    pub fn generate_hash(&self, headers: &HeaderMap) -> Option<u64> {
        headers
            .get(&self.header_name)
            .map(|value| stable_hash64(value.as_bytes()))
    }
}

/// CORS policy with route-over-virtual-host field layering already applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorsPolicy {
    pub allow_origins: Vec<String>,
    pub allow_methods: String,
    pub allow_headers: String,
    pub expose_headers: String,
    pub max_age: String,
    pub allow_credentials: Option<bool>,
    pub enabled: bool,
}

impl CorsPolicy {
    pub fn build(config: &CorsConfig) -> Self {
        Self {
            allow_origins: config.allow_origin.clone(),
            allow_methods: config.allow_methods.clone().unwrap_or_default(),
            allow_headers: config.allow_headers.clone().unwrap_or_default(),
            expose_headers: config.expose_headers.clone().unwrap_or_default(),
            max_age: config.max_age.clone().unwrap_or_default(),
            allow_credentials: config.allow_credentials,
            enabled: config.enabled.unwrap_or(true),
        }
    }

    /// Layers a route-level config over a virtual-host-level one: set route
    /// fields win, unset fields fall through.
    pub fn layered(route: Option<&CorsConfig>, vhost: Option<&CorsConfig>) -> Option<Self> {
        match (route, vhost) {
            (None, None) => None,
            (Some(r), None) => Some(Self::build(r)),
            (None, Some(v)) => Some(Self::build(v)),
            (Some(r), Some(v)) => {
                let merged = CorsConfig {
                    allow_origin: if r.allow_origin.is_empty() {
                        v.allow_origin.clone()
                    } else {
                        r.allow_origin.clone()
                    },
                    allow_methods: r.allow_methods.clone().or_else(|| v.allow_methods.clone()),
                    allow_headers: r.allow_headers.clone().or_else(|| v.allow_headers.clone()),
                    expose_headers: r
                        .expose_headers
                        .clone()
                        .or_else(|| v.expose_headers.clone()),
                    max_age: r.max_age.clone().or_else(|| v.max_age.clone()),
                    allow_credentials: r.allow_credentials.or(v.allow_credentials),
                    enabled: r.enabled.or(v.enabled),
                };
                Some(Self::build(&merged))
            }
        }
    }
}

/// One compiled rate-limit entry: a stage, an optional kill-switch runtime
/// key, and descriptor actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub stage: u64,
    pub disable_key: Option<String>,
    pub actions: Vec<RateLimitActionConfig>,
}

/// Ordered set of rate-limit entries attached to a route or virtual host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitPolicy {
    entries: Vec<RateLimitEntry>,
}

impl RateLimitPolicy {
    pub fn build(configs: &[RateLimitConfig]) -> Self {
        Self {
            entries: configs
                .iter()
                .map(|c| RateLimitEntry {
                    stage: c.stage,
                    disable_key: c.disable_key.clone(),
                    actions: c.actions.clone(),
                })
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries applicable at `stage`, in declaration order.
    pub fn entries_for_stage(&self, stage: u64) -> impl Iterator<Item = &RateLimitEntry> {
        self.entries.iter().filter(move |e| e.stage == stage)
    }
}

/// Tracing decoration: a fixed operation name applied to the route's span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decorator {
    pub operation: String,
}

impl Decorator {
    pub fn apply(&self, span: &mut crate::trace::Span) {
        span.set_operation(&self.operation);
    }
}
