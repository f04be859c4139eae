//! Shutdown signalling for background tasks.

use tokio::sync::watch;

/// Owner side of a shutdown signal.
///
/// Backed by a watch channel, so a listener subscribed after `trigger` still
/// observes the signal. Dropping the `Shutdown` also counts as a signal.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Task side of a shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Resolves once shutdown is triggered or the owner is gone.
    pub async fn recv(&mut self) {
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn late_subscriber_sees_trigger() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let mut listener = shutdown.subscribe();
        tokio::time::timeout(Duration::from_secs(1), listener.recv())
            .await
            .expect("signal already sent");
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn dropping_owner_releases_listeners() {
        let shutdown = Shutdown::new();
        let mut listener = shutdown.subscribe();
        drop(shutdown);
        tokio::time::timeout(Duration::from_secs(1), listener.recv())
            .await
            .expect("owner dropped");
    }
}
