//! Cooperative shutdown signal.
//!
//! A [`ShutdownTrigger`] owns the sending side; any number of cloned
//! [`Shutdown`] handles observe it. Accept loops, the client loop and the
//! metrics flusher all `select!` on [`Shutdown::wait`].

use std::sync::Arc;

use tokio::sync::watch;

/// Trips every associated [`Shutdown`] handle.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Observes a [`ShutdownTrigger`].
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
    /// Holds the sender of a [`Shutdown::never`] handle open.
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

/// Creates a connected trigger/handle pair.
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (
        ShutdownTrigger { tx },
        Shutdown {
            rx,
            _keepalive: None,
        },
    )
}

impl ShutdownTrigger {
    /// Signals shutdown. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// A new observer handle.
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
            _keepalive: None,
        }
    }
}

impl Shutdown {
    /// A handle that never fires. For one-off tasks and tests.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    /// Returns `true` once shutdown has been signalled.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been signalled. If the trigger is dropped
    /// without firing, this also resolves: nobody is left to keep us alive.
    pub async fn wait(&mut self) {
        // wait_for returns Err only when the sender is gone.
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_wakes_all_handles() {
        let (trigger, mut a) = channel();
        let mut b = trigger.subscribe();
        assert!(!a.is_triggered());

        trigger.trigger();
        a.wait().await;
        b.wait().await;
        assert!(a.is_triggered());
    }

    #[tokio::test]
    async fn wait_after_trigger_returns_immediately() {
        let (trigger, mut s) = channel();
        trigger.trigger();
        tokio::time::timeout(Duration::from_millis(100), s.wait())
            .await
            .expect("already triggered");
    }

    #[tokio::test]
    async fn never_does_not_fire() {
        let mut s = Shutdown::never();
        let res = tokio::time::timeout(Duration::from_millis(20), s.wait()).await;
        assert!(res.is_err());
    }
}
