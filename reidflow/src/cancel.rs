//! Shared cancellation for pipeline stages
//!
//! Cancelling drops the only sender of an internal channel, so every stage
//! waiting in `select!` on [`CancellationToken::done`] wakes up at once.

use crate::error::{PipelineError, Result};
use crossbeam::channel::{bounded, select, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    trigger: Arc<Mutex<Option<Sender<()>>>>,
    done: Receiver<()>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        let (trigger, done) = bounded(0);
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            trigger: Arc::new(Mutex::new(Some(trigger))),
            done,
        }
    }

    /// Idempotent
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            log::debug!("Cancellation requested");
        }
        let mut trigger = self
            .trigger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        trigger.take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Becomes ready (disconnected) once cancelled
    pub fn done(&self) -> &Receiver<()> {
        &self.done
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Blocking send that gives up on cancellation
pub fn send_or_cancel<T>(
    tx: &Sender<T>,
    value: T,
    cancel: &CancellationToken,
    channel: &'static str,
) -> Result<()> {
    select! {
        send(tx, value) -> res => res.map_err(|_| PipelineError::Disconnected(channel)),
        recv(cancel.done()) -> _ => Err(PipelineError::Cancelled),
    }
}

/// Blocking receive that gives up on cancellation.
/// `Ok(None)` means the upstream side closed.
pub fn recv_or_cancel<T>(rx: &Receiver<T>, cancel: &CancellationToken) -> Result<Option<T>> {
    select! {
        recv(rx) -> msg => Ok(msg.ok()),
        recv(cancel.done()) -> _ => Err(PipelineError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_cancel_wakes_blocked_receiver() {
        let token = CancellationToken::new();
        let (_tx, rx) = bounded::<u32>(1);

        let waiter = {
            let token = token.clone();
            thread::spawn(move || recv_or_cancel(&rx, &token))
        };
        thread::sleep(Duration::from_millis(20));
        token.cancel();

        let result = waiter.join().unwrap();
        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert!(token.is_cancelled());
        assert!(token.check().is_err());
    }

    #[test]
    fn test_cancel_wakes_blocked_sender() {
        let token = CancellationToken::new();
        let (tx, _rx) = bounded::<u32>(1);
        tx.send(1).unwrap();

        token.cancel();
        token.cancel();
        let result = send_or_cancel(&tx, 2, &token, "test");
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }

    #[test]
    fn test_closed_upstream_is_not_an_error() {
        let token = CancellationToken::new();
        let (tx, rx) = bounded::<u32>(1);
        tx.send(7).unwrap();
        drop(tx);

        assert_eq!(recv_or_cancel(&rx, &token).unwrap(), Some(7));
        assert_eq!(recv_or_cancel(&rx, &token).unwrap(), None);
    }
}
