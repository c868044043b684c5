//! Cancellation for the apply loop.
//!
//! A [`Shutdown`] handle is cloned into every await point that must give up
//! when the user interrupts. It is backed by a `tokio::sync::watch` channel
//! so that late subscribers still observe a request made earlier.

use tokio::sync::watch;
use tracing::{info, warn};

/// Sending half: requests shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // send_replace succeeds even when every receiver is gone.
        self.tx.send_replace(true);
    }
}

/// Receiving half: observed by the loop.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// A handle that is never triggered.
    pub fn never() -> Self {
        let (_, shutdown) = channel();
        shutdown
    }

    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested. Pends forever if the
    /// trigger is dropped without firing.
    pub async fn requested(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Create a linked trigger/handle pair.
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

/// Register OS signal handlers and return a handle that fires on SIGTERM or
/// SIGINT (Ctrl+C).
pub fn setup_signal_handlers() -> Shutdown {
    let (trigger, shutdown) = channel();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "failed to register SIGTERM handler");
                    if ctrl_c.await.is_ok() {
                        info!("received SIGINT (Ctrl+C), cancelling");
                        trigger.trigger();
                    }
                    return;
                }
            };

            tokio::select! {
                _ = ctrl_c => {
                    info!("received SIGINT (Ctrl+C), cancelling");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, cancelling");
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = ctrl_c.await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("received Ctrl+C, cancelling");
        }

        trigger.trigger();
    });

    shutdown
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_wakes_waiter() {
        let (trigger, mut shutdown) = channel();
        assert!(!shutdown.is_requested());

        let waiter = tokio::spawn(async move {
            shutdown.requested().await;
        });
        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter did not wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_request() {
        let (trigger, shutdown) = channel();
        trigger.trigger();
        let mut late = shutdown.clone();
        assert!(late.is_requested());
        tokio::time::timeout(Duration::from_millis(100), late.requested())
            .await
            .expect("already-requested shutdown should resolve immediately");
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_pends() {
        let mut shutdown = Shutdown::never();
        let result = tokio::time::timeout(Duration::from_secs(5), shutdown.requested()).await;
        assert!(result.is_err());
    }
}
