//! Named counters, readable in-process.
//!
//! Counters are created on first use under a scope prefix and shared via
//! `Arc`, so the provider holds its counters directly while tests and the
//! admin plane read them back by name.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, delta: u64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A prefix-scoped collection of counters.
#[derive(Debug, Default)]
pub struct Scope {
    prefix: String,
    counters: DashMap<String, Arc<Counter>>,
}

impl Scope {
    /// Creates a scope; every counter name is prefixed with `prefix`.
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            counters: DashMap::new(),
        }
    }

    /// Returns the counter named `prefix + name`, creating it at zero.
    pub fn counter(&self, name: &str) -> Arc<Counter> {
        let full = format!("{}{}", self.prefix, name);
        self.counters
            .entry(full)
            .or_insert_with(|| Arc::new(Counter::default()))
            .value()
            .clone()
    }

    /// All counters as `(name, value)` pairs, unordered.
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        self.counters
            .iter()
            .map(|e| (e.key().clone(), e.value().value()))
            .collect()
    }
}
