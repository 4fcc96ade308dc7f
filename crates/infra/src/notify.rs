//! Post-commit signals and the notifiers that carry them out of the core.
//!
//! Signals are raised only after the unit of work that caused them has
//! committed. Delivery is best-effort: a failing notifier is logged and
//! ignored, it never rolls back or blocks the mutation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use storekeep_core::{RequestId, UserId};
use storekeep_events::{Event, EventBus, EventEnvelope};
use storekeep_inventory::LowStockAlert;
use storekeep_requests::{RequestStatus, RequestType};

/// Something the outside world may want to hear about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Signal {
    /// One item is at or below its threshold after a committed change.
    LowStock {
        alert: LowStockAlert,
        occurred_at: DateTime<Utc>,
    },
    /// Every low item, after a bulk change such as finalize.
    LowStockSnapshot {
        alerts: Vec<LowStockAlert>,
        occurred_at: DateTime<Utc>,
    },
    RequestStatusChanged {
        request_id: RequestId,
        request_type: RequestType,
        status: RequestStatus,
        actor: UserId,
        occurred_at: DateTime<Utc>,
    },
}

impl Signal {
    /// `(subject_type, subject_id)` for envelopes.
    pub fn subject(&self) -> (&'static str, String) {
        match self {
            Signal::LowStock { alert, .. } => ("inventory.item", alert.item_id.to_string()),
            Signal::LowStockSnapshot { .. } => ("inventory.stock", "snapshot".to_string()),
            Signal::RequestStatusChanged { request_id, .. } => ("requests.request", request_id.to_string()),
        }
    }
}

impl Event for Signal {
    fn event_type(&self) -> &'static str {
        match self {
            Signal::LowStock { .. } => "inventory.item.low_stock",
            Signal::LowStockSnapshot { .. } => "inventory.stock.low_stock_snapshot",
            Signal::RequestStatusChanged { .. } => "requests.request.status_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Signal::LowStock { occurred_at, .. }
            | Signal::LowStockSnapshot { occurred_at, .. }
            | Signal::RequestStatusChanged { occurred_at, .. } => *occurred_at,
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notifier unavailable: {0}")]
    Unavailable(String),
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Receives signals after commit. Implementations must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, signal: &Signal) -> Result<(), NotifyError>;
}

/// Deliver a signal, logging and dropping any failure.
pub fn dispatch(notifier: &dyn Notifier, signal: Signal) {
    if let Err(e) = notifier.notify(&signal) {
        tracing::warn!(
            event_type = signal.event_type(),
            error = %e,
            "signal delivery failed; ignoring"
        );
    }
}

/// Writes every signal to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, signal: &Signal) -> Result<(), NotifyError> {
        match signal {
            Signal::LowStock { alert, .. } => tracing::warn!(
                item_id = %alert.item_id,
                item = %alert.item_name,
                quantity = alert.quantity,
                threshold = alert.threshold,
                "item stock is low"
            ),
            Signal::LowStockSnapshot { alerts, .. } => tracing::warn!(
                low_items = alerts.len(),
                "low-stock snapshot"
            ),
            Signal::RequestStatusChanged {
                request_id,
                status,
                actor,
                ..
            } => tracing::info!(
                request_id = %request_id,
                status = %status,
                actor = %actor,
                "request status changed"
            ),
        }
        Ok(())
    }
}

/// Publishes signals as envelopes on an [`EventBus`] (e.g. for a mailer).
pub struct BusNotifier<B> {
    bus: B,
}

impl<B> BusNotifier<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }
}

impl<B> Notifier for BusNotifier<B>
where
    B: EventBus<EventEnvelope<Signal>>,
{
    fn notify(&self, signal: &Signal) -> Result<(), NotifyError> {
        let (subject_type, subject_id) = signal.subject();
        let envelope = EventEnvelope::wrap(subject_type, subject_id, signal.clone());
        self.bus
            .publish(envelope)
            .map_err(|e| NotifyError::Delivery(format!("{e:?}")))
    }
}

/// Fans signals out to live stream subscribers.
///
/// Having no subscriber is not a failure.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Signal>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.tx.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, signal: &Signal) -> Result<(), NotifyError> {
        // `send` only fails when nobody is listening.
        let _ = self.tx.send(signal.clone());
        Ok(())
    }
}

/// Sends each signal to every inner notifier. One failing does not stop the
/// others; the first error is reported.
#[derive(Default, Clone)]
pub struct FanoutNotifier {
    targets: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.targets.push(notifier);
        self
    }
}

impl Notifier for FanoutNotifier {
    fn notify(&self, signal: &Signal) -> Result<(), NotifyError> {
        let mut first_err = None;
        for target in &self.targets {
            if let Err(e) = target.notify(signal) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
