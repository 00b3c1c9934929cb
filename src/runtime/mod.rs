//! Runtime key/value store collaborator.
//!
//! A process-wide keyed integer store sourced externally and sampled on
//! every read. The matcher consults it for route fraction gates and
//! weighted-cluster overrides; values may change between reads.

use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;

/// Read access to the runtime store.
pub trait Runtime: Send + Sync {
    /// Returns the integer stored under `key`, or `default` when unset.
    fn get_integer(&self, key: &str, default: u64) -> u64;

    /// Returns true for roughly `default_pct` percent of calls, unless the
    /// percentage is overridden under `key`.
    fn feature_enabled(&self, key: &str, default_pct: u64) -> bool;
}

/// In-memory runtime used for wiring and tests; values are set explicitly.
#[derive(Default)]
pub struct StaticRuntime {
    values: DashMap<String, u64>,
}

impl StaticRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, visible to subsequent reads.
    pub fn set(&self, key: &str, value: u64) {
        self.values.insert(key.to_string(), value);
    }

    /// Removes `key`, restoring default-value reads.
    pub fn clear(&self, key: &str) {
        self.values.remove(key);
    }
}

impl Runtime for StaticRuntime {
    fn get_integer(&self, key: &str, default: u64) -> u64 {
        self.values.get(key).map(|v| *v).unwrap_or(default)
    }

    fn feature_enabled(&self, key: &str, default_pct: u64) -> bool {
        let pct = self.get_integer(key, default_pct).min(100);
        rand::thread_rng().gen_range(0..100) < pct
    }
}

/// Shared handle type used throughout the router.
pub type RuntimeHandle = Arc<dyn Runtime>;

/// Source of the per-request random values used for runtime gating,
/// weighted-cluster draws, and span id generation.
pub trait RandomGenerator: Send + Sync {
    fn random(&self) -> u64;
}

/// Default generator backed by the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandomGenerator;

impl RandomGenerator for ThreadRandomGenerator {
    fn random(&self) -> u64 {
        rand::thread_rng().gen()
    }
}
