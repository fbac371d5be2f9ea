//! Result hand-off to presentation threads
//!
//! Every new [`MeasurementResult`] is sent as an owned copy over a bounded
//! crossbeam channel to each subscriber. Consumers (a UI thread, a logger)
//! never see the engine's locked state. Delivery is best effort: a
//! subscriber whose queue is full misses the update and can always fetch
//! the latest record with [`crate::DelayMeter::last_result`].

use crate::meter::result::MeasurementResult;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::{Mutex, PoisonError};

/// Results queued per subscriber before updates are dropped
pub const SUBSCRIBER_QUEUE_DEPTH: usize = 16;

/// Fan-out of result updates
#[derive(Debug, Default)]
pub struct ResultNotifier {
    subscribers: Mutex<Vec<Sender<MeasurementResult>>>,
}

impl ResultNotifier {
    /// Create a notifier with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Receiver<MeasurementResult> {
        let (tx, rx) = crossbeam_channel::bounded(SUBSCRIBER_QUEUE_DEPTH);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Send a copy of `result` to every subscriber
    ///
    /// Returns how many subscribers received it. Subscribers whose receiver
    /// was dropped are removed.
    pub fn publish(&self, result: &MeasurementResult) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut delivered = 0;
        subscribers.retain(|tx| match tx.try_send(result.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::debug!("Result subscriber queue full, update dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });

        delivered
    }
}
