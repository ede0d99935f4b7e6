//! Idle timeout for a connection.
//!
//! The watchdog holds a deadline which is pushed forward every time the
//! connection makes progress. The timer underneath is only re-armed lazily:
//! when it fires before the (moved) deadline, it goes back to sleep until the
//! new deadline instead of failing the connection.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{sleep_until, Instant, Sleep};

#[derive(Debug)]
pub(crate) struct Watchdog {
    timeout: Option<Duration>,
    deadline: Instant,
    timer: Pin<Box<Sleep>>,
}

impl Watchdog {
    /// Create a watchdog. `None` or a zero timeout never expires.
    pub(crate) fn new(timeout: Option<Duration>) -> Self {
        let timeout = timeout.filter(|timeout| !timeout.is_zero());
        let deadline = Instant::now() + timeout.unwrap_or_default();
        Self {
            timeout,
            deadline,
            timer: Box::pin(sleep_until(deadline)),
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.timeout.is_some()
    }

    /// Record progress, moving the deadline to one timeout from now.
    pub(crate) fn reset(&mut self) {
        if let Some(timeout) = self.timeout {
            self.deadline = Instant::now() + timeout;
        }
    }

    /// Resolves once the deadline has truly passed.
    ///
    /// Cancel safe: dropping this future leaves the timer armed.
    pub(crate) async fn expired(&mut self) {
        if self.timeout.is_none() {
            return pending().await;
        }

        loop {
            self.timer.as_mut().await;

            if self.deadline > Instant::now() {
                tracing::trace!("deadline moved, re-arming timer");
                let deadline = self.deadline;
                self.timer.as_mut().reset(deadline);
                continue;
            }

            return;
        }
    }
}
