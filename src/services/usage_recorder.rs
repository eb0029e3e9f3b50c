//! Fire-and-forget usage event logging.
//!
//! Events are queued on a bounded channel and written by one background
//! task. The request path only does a non-blocking `try_send`; a full queue or
//! a failed write drops the event with a warning.

use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::{models::usage::UsageEvent, store::UsageLedger};

#[derive(Debug, Clone)]
pub struct UsageRecorder {
    tx: mpsc::Sender<UsageEvent>,
}

impl UsageRecorder {
    /// Start the writer task. Must be called inside a Tokio runtime.
    pub fn spawn(ledger: Arc<dyn UsageLedger>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<UsageEvent>(capacity.max(1));

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let api_key_id = event.api_key_id;
                if let Err(e) = ledger.record_event(event).await {
                    tracing::warn!(%api_key_id, error = %e, "failed to record usage event");
                }
            }
            tracing::debug!("usage recorder stopped");
        });

        Self { tx }
    }

    /// Queue an event. Never blocks and never fails the caller.
    pub fn record(&self, event: UsageEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!(api_key_id = %event.api_key_id, "usage queue full, dropping event");
            }
            Err(TrySendError::Closed(event)) => {
                tracing::warn!(api_key_id = %event.api_key_id, "usage recorder closed, dropping event");
            }
        }
    }
}
