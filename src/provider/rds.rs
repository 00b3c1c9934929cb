//! The route-discovery provider.
//!
//! Fetch loop: GET `/v1/routes/<route_config_name>/<local_cluster>/<node>`
//! every `refresh_delay_ms`, with jittered exponential backoff after a
//! failure. A response whose content hash matches the current one is a
//! no-op success; a new body is parsed, compiled (cluster validation
//! disabled for dynamic configs), and published with an atomic swap.
//! Readers holding the old snapshot keep it until they drop their
//! reference; nobody ever observes a half-built snapshot.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use rand::Rng;
use tokio::task::JoinHandle;

use crate::config::{RdsConfig, RouteConfiguration};
use crate::error::{ConfigError, FetchError};
use crate::init::{InitManager, InitTarget};
use crate::router::ConfigSnapshot;
use crate::runtime::RuntimeHandle;
use crate::stats::{Counter, Scope};
use crate::upstream::{ClusterManager, DiscoveryClient};
use crate::util::stable_hash64;

use super::LocalInfo;

struct ProviderStats {
    update_attempt: Arc<Counter>,
    update_success: Arc<Counter>,
    update_failure: Arc<Counter>,
    update_empty: Arc<Counter>,
    config_reload: Arc<Counter>,
}

impl ProviderStats {
    fn new(scope: &Scope) -> Self {
        Self {
            update_attempt: scope.counter("rds.update_attempt"),
            update_success: scope.counter("rds.update_success"),
            update_failure: scope.counter("rds.update_failure"),
            update_empty: scope.counter("rds.update_empty"),
            config_reload: scope.counter("rds.config_reload"),
        }
    }
}

/// A shared provider for one `(discovery_cluster, route_config_name)`.
pub struct RdsProvider {
    cluster_name: String,
    route_config_name: String,
    fetch_path: String,
    refresh_delay: Duration,
    request_timeout: Duration,
    max_retry_delay: Duration,
    client: Arc<dyn DiscoveryClient>,
    runtime: RuntimeHandle,
    snapshot: ArcSwap<ConfigSnapshot>,
    last_hash: Mutex<Option<u64>>,
    last_parse_error: Mutex<Option<String>>,
    stats: ProviderStats,
    init_target: InitTarget,
    fetch_task: Mutex<Option<JoinHandle<()>>>,
}

impl RdsProvider {
    /// Validates the subscription identity and builds an idle provider;
    /// `start` launches the fetch loop.
    pub fn new(
        rds: &RdsConfig,
        local_info: &LocalInfo,
        cluster_manager: &dyn ClusterManager,
        runtime: RuntimeHandle,
        scope: &Scope,
        init_manager: &InitManager,
    ) -> Result<Arc<Self>, ConfigError> {
        if rds.route_config_name.is_empty() {
            return Err(ConfigError::rejected("rds requires route_config_name"));
        }
        if local_info.cluster_name.is_empty() || local_info.node_name.is_empty() {
            return Err(ConfigError::rejected(
                "rds requires local cluster name and node name to be defined",
            ));
        }
        let client = cluster_manager
            .discovery_client(&rds.cluster)
            .ok_or_else(|| ConfigError::UnknownCluster(rds.cluster.clone()))?;

        Ok(Arc::new(Self {
            cluster_name: rds.cluster.clone(),
            route_config_name: rds.route_config_name.clone(),
            fetch_path: format!(
                "/v1/routes/{}/{}/{}",
                rds.route_config_name, local_info.cluster_name, local_info.node_name
            ),
            refresh_delay: Duration::from_millis(rds.refresh_delay_ms),
            request_timeout: Duration::from_millis(rds.request_timeout_ms),
            max_retry_delay: Duration::from_millis(rds.max_retry_delay_ms),
            client,
            runtime,
            snapshot: ArcSwap::from_pointee(ConfigSnapshot::empty()),
            last_hash: Mutex::new(None),
            last_parse_error: Mutex::new(None),
            stats: ProviderStats::new(scope),
            init_target: init_manager.register_target(),
            fetch_task: Mutex::new(None),
        }))
    }

    /// Launches the fetch loop: an immediate first fetch, then the refresh
    /// timer. Idempotent; the loop holds only a weak back-reference and is
    /// aborted when the provider drops.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.fetch_task.lock().expect("fetch task lock");
        if task.is_some() {
            return;
        }

        let weak = Arc::downgrade(self);
        *task = Some(tokio::spawn(async move {
            let mut consecutive_failures: u32 = 0;
            loop {
                let Some(provider) = weak.upgrade() else { return };
                let delay = provider.run_fetch_cycle(&mut consecutive_failures).await;
                drop(provider);
                tokio::time::sleep(delay).await;
            }
        }));
    }

    /// One fetch plus the delay until the next tick.
    async fn run_fetch_cycle(&self, consecutive_failures: &mut u32) -> Duration {
        if self.fetch_once().await {
            *consecutive_failures = 0;
            self.refresh_delay
        } else {
            *consecutive_failures = consecutive_failures.saturating_add(1);
            self.backoff_interval(*consecutive_failures)
        }
    }

    /// Issues one discovery request and applies the outcome. Returns true
    /// on success (including a hash-identical no-op).
    pub(crate) async fn fetch_once(&self) -> bool {
        self.stats.update_attempt.inc();
        match self
            .client
            .fetch(&self.fetch_path, self.request_timeout)
            .await
        {
            Ok(body) => self.on_fetch_success(&body),
            Err(err) => {
                self.on_fetch_failure(&err);
                false
            }
        }
    }

    fn on_fetch_success(&self, body: &[u8]) -> bool {
        let hash = stable_hash64(body);
        let mut last_hash = self.last_hash.lock().expect("hash lock");
        if *last_hash == Some(hash) {
            self.stats.update_success.inc();
            self.init_target.ready();
            return true;
        }

        let mut config: RouteConfiguration = match serde_json::from_slice(body) {
            Ok(config) => config,
            Err(err) => {
                self.record_parse_error(err.to_string());
                self.init_target.ready();
                return false;
            }
        };

        if config.name.is_none() {
            config.name = Some(self.route_config_name.clone());
        }

        let version_info = format_version(hash);
        // Dynamic configs skip cluster validation.
        let snapshot =
            match ConfigSnapshot::build(config, &version_info, self.runtime.clone(), None) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    self.record_parse_error(err.to_string());
                    self.init_target.ready();
                    return false;
                }
            };

        let empty = snapshot.route_table().virtual_hosts.is_empty();
        *last_hash = Some(hash);
        // Release store; readers that loaded the old snapshot keep it
        // alive until their reference drops.
        self.snapshot.store(Arc::new(snapshot));

        self.stats.config_reload.inc();
        self.stats.update_success.inc();
        if empty {
            self.stats.update_empty.inc();
        }
        *self.last_parse_error.lock().expect("error lock") = None;

        tracing::info!(
            route_config = %self.route_config_name,
            version = %version_info,
            "route configuration reloaded"
        );
        self.init_target.ready();
        true
    }

    fn on_fetch_failure(&self, err: &FetchError) {
        self.stats.update_failure.inc();
        tracing::warn!(
            route_config = %self.route_config_name,
            cluster = %self.cluster_name,
            error = %err,
            "route discovery fetch failed"
        );
        // The first terminal outcome, success or failure, unblocks init.
        self.init_target.ready();
    }

    /// Logs a config rejection once per distinct error text.
    fn record_parse_error(&self, message: String) {
        self.stats.update_failure.inc();
        let mut last = self.last_parse_error.lock().expect("error lock");
        if last.as_deref() != Some(&message) {
            tracing::error!(
                route_config = %self.route_config_name,
                error = %message,
                "rejecting dynamic route configuration, keeping previous snapshot"
            );
            *last = Some(message);
        }
    }

    /// Backoff after `failures` consecutive failures: the refresh delay
    /// doubled per failure up to the cap, plus jitter of at most half the
    /// interval.
    fn backoff_interval(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        let base = self
            .refresh_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_retry_delay)
            .max(self.refresh_delay);
        let jitter_ceiling = (base.as_millis() / 2) as u64;
        let jitter = if jitter_ceiling > 0 {
            rand::thread_rng().gen_range(0..=jitter_ceiling)
        } else {
            0
        };
        base + Duration::from_millis(jitter)
    }

    /// The current snapshot. Lock-free; the returned reference keeps the
    /// snapshot alive across the request even if a swap happens meanwhile.
    pub fn config(&self) -> Arc<ConfigSnapshot> {
        self.snapshot.load_full()
    }

    /// The current content hash as `hash_<hex16>`, empty before the first
    /// successful update.
    pub fn version_info(&self) -> String {
        self.snapshot.load().version_info().to_string()
    }

    pub fn route_config_name(&self) -> &str {
        &self.route_config_name
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub(crate) fn fetch_path(&self) -> &str {
        &self.fetch_path
    }
}

impl Drop for RdsProvider {
    fn drop(&mut self) {
        // Cancel any outstanding fetch; the async client delivers no
        // further callbacks once the task is gone.
        if let Some(task) = self.fetch_task.lock().expect("fetch task lock").take() {
            task.abort();
        }
    }
}

fn format_version(hash: u64) -> String {
    format!("hash_{hash:016x}")
}
