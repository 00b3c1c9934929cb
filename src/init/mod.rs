//! One-shot initialization barrier.
//!
//! Providers register a target before serving begins; each target fires
//! `ready()` exactly once, on the first terminal outcome of its first fetch
//! (success or failure). Listener startup awaits the barrier.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

/// Barrier over a set of one-shot targets.
pub struct InitManager {
    pending: Arc<AtomicUsize>,
    tx: watch::Sender<()>,
    rx: watch::Receiver<()>,
}

impl Default for InitManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InitManager {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(());
        Self {
            pending: Arc::new(AtomicUsize::new(0)),
            tx,
            rx,
        }
    }

    /// Registers a new target that must become ready.
    pub fn register_target(&self) -> InitTarget {
        self.pending.fetch_add(1, Ordering::SeqCst);
        InitTarget {
            pending: Arc::clone(&self.pending),
            fired: AtomicBool::new(false),
            tx: self.tx.clone(),
        }
    }

    /// True once every registered target has fired.
    pub fn is_ready(&self) -> bool {
        self.pending.load(Ordering::SeqCst) == 0
    }

    /// Waits until every registered target has fired.
    pub async fn wait_ready(&self) {
        let mut rx = self.rx.clone();
        while !self.is_ready() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// A single one-shot readiness target.
pub struct InitTarget {
    pending: Arc<AtomicUsize>,
    fired: AtomicBool,
    tx: watch::Sender<()>,
}

impl InitTarget {
    /// Marks the target ready. Only the first call has any effect.
    pub fn ready(&self) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            let _ = self.tx.send(());
        }
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}
