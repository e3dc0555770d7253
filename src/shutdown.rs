//! Graceful stop on Ctrl+C.
//!
//! The downloader checks a [`ShutdownSignal`] before every detail fetch. Once
//! triggered, in-flight requests finish, their artifacts are written, and the
//! sweep returns early. Whatever is on disk is a valid resume point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared handle to a shutdown signal.
pub type SharedShutdown = Arc<ShutdownSignal>;

/// One-shot stop flag shared across tasks.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    triggered: AtomicBool,
}

impl ShutdownSignal {
    /// Create a new shared, untriggered signal.
    pub fn shared() -> SharedShutdown {
        Arc::new(Self::default())
    }

    /// Trigger the signal. Later calls have no further effect.
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
    }

    /// Whether a stop has been requested.
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}

/// Trigger `signal` when the process receives Ctrl+C.
pub fn install_ctrl_c_handler(signal: SharedShutdown) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl+C received - finishing in-flight changes...");
            signal.trigger();
        }
    });
}
