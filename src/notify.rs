//! Shutdown signal shared between a connection task and its handles.

use std::future::pending;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub(crate) struct Sender(Arc<tokio::sync::watch::Sender<bool>>);

impl Sender {
    /// Request shutdown. Repeated calls have no further effect.
    pub(crate) fn send(&self) {
        if !self.0.send_replace(true) {
            tracing::trace!("sending shutdown signal");
        }
    }

    pub(crate) fn is_sent(&self) -> bool {
        *self.0.borrow()
    }
}

#[derive(Debug)]
pub(crate) struct Receiver(tokio::sync::watch::Receiver<bool>);

impl Receiver {
    /// Resolves once shutdown was requested.
    ///
    /// Never resolves when every sender is gone without having sent.
    pub(crate) async fn recv(&mut self) {
        if self.0.wait_for(|closed| *closed).await.is_err() {
            pending::<()>().await;
        }
    }

    pub(crate) fn is_sent(&self) -> bool {
        *self.0.borrow()
    }
}

pub(crate) fn channel() -> (Sender, Receiver) {
    let (tx, rx) = tokio::sync::watch::channel(false);
    (Sender(Arc::new(tx)), Receiver(rx))
}
