//! Cooperative cancellation shared by the control loop, probes and lock calls.

use std::future::Future;
use tokio::sync::watch;

/// Receiving side of a `watch::channel(false)` shutdown signal.
///
/// Cancelled once the sender publishes `true` or is dropped.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: Option<watch::Receiver<bool>>,
}

impl Shutdown {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx: Some(rx) }
    }

    /// A signal that never fires, for one-off callers such as the CLI.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow() || rx.has_changed().is_err())
    }

    /// Resolves when shutdown is requested.
    pub async fn cancelled(&mut self) {
        let Some(rx) = self.rx.as_mut() else {
            return std::future::pending().await;
        };
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Drive `fut` unless shutdown comes first.
    pub async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        let mut signal = self.clone();
        tokio::select! {
            biased;
            () = signal.cancelled() => None,
            out = fut => Some(out),
        }
    }
}
