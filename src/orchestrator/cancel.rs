//! Cooperative cancellation of a running match.

use tokio::sync::watch;

/// Requests cancellation. Dropping it without cancelling does nothing.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Asks the match to stop at the next safe point.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observed by the orchestrator between and during plies.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Pends forever if the handle
    /// was dropped without cancelling.
    pub async fn cancelled(&mut self) {
        let fired = self.rx.wait_for(|cancelled| *cancelled).await.is_ok();
        if !fired {
            std::future::pending::<()>().await;
        }
    }
}

/// Creates a connected handle and signal.
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}
