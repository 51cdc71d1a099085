//! Cooperative shutdown for long-running ingestion.
//!
//! The pipeline checks the flag between batch flushes: once triggered it
//! stops accepting new work and lets the in-flight append complete, so no
//! partial record ever reaches a store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

/// Shared, clonable shutdown signal.
#[derive(Clone, Debug, Default)]
pub struct ShutdownFlag {
    triggered: Arc<AtomicBool>,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the flag; safe to call more than once.
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Triggers the flag when the process receives ctrl-c.
    pub async fn listen_ctrl_c(self) {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("termination signal received, finishing in-flight work");
            self.trigger();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_is_visible_to_clones() {
        let flag = ShutdownFlag::new();
        let observer = flag.clone();
        assert!(!observer.is_triggered());
        flag.trigger();
        assert!(observer.is_triggered());
        flag.trigger();
        assert!(observer.is_triggered());
    }
}
