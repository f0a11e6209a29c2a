//! Graceful shutdown signal.
//!
//! A single `broadcast::Sender<()>` shared by every subsystem that needs to
//! stop on its own terms: the accept loop stops taking new connections, the
//! config-reload task and health monitor exit their `select!` loops. There
//! is no separate drain/timeout phase; in-flight requests are short-lived
//! HTTP/1.1 exchanges and are allowed to finish naturally once the accept
//! loop stops handing out new work.

use tokio::sync::broadcast;

/// Handle used to trigger and observe process shutdown.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe a new receiver; every subsystem needs its own since
    /// `broadcast::Receiver` is not `Clone`-shared across tasks.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger shutdown. Safe to call more than once; later calls are no-ops
    /// once all receivers have already observed the first signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
