//! Service wiring: one store handle shared by the engines, queries and the
//! signal channels (realtime stream and notification outbox).

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use storekeep_events::{Event, EventBus, EventEnvelope, InMemoryEventBus};
use storekeep_infra::notify::dispatch;
use storekeep_infra::{
    BroadcastNotifier, BusNotifier, CatalogService, FanoutNotifier, InMemoryStore, InventoryStore,
    IssuanceEngine, Notifier, QueryService, Signal, TracingNotifier, WorkflowEngine,
};

/// Outbound notification queue handed to the mailer.
pub type Outbox = InMemoryEventBus<EventEnvelope<Signal>>;

pub struct AppServices {
    catalog: CatalogService,
    issuance: IssuanceEngine,
    workflow: WorkflowEngine,
    queries: QueryService,
    realtime: BroadcastNotifier,
    outbox: Arc<Outbox>,
}

impl AppServices {
    /// Wire the engines over `store`. Signals go to the notification outbox
    /// and to the realtime channel. Must be called inside a Tokio runtime:
    /// the outbox relay runs on a blocking task.
    pub fn new(store: Arc<dyn InventoryStore>, signal_capacity: usize) -> Self {
        let realtime = BroadcastNotifier::new(signal_capacity);
        let outbox: Arc<Outbox> = Arc::new(InMemoryEventBus::new());
        spawn_outbox_relay(&outbox);

        let notifier: Arc<dyn Notifier> = Arc::new(
            FanoutNotifier::new()
                .with(Arc::new(BusNotifier::new(outbox.clone())))
                .with(Arc::new(realtime.clone())),
        );

        Self {
            catalog: CatalogService::new(store.clone(), notifier.clone()),
            issuance: IssuanceEngine::new(store.clone(), notifier.clone()),
            workflow: WorkflowEngine::new(store.clone(), notifier),
            queries: QueryService::new(store),
            realtime,
            outbox,
        }
    }

    /// Fresh in-memory store; used by tests and local runs.
    pub fn in_memory(signal_capacity: usize) -> Self {
        Self::new(Arc::new(InMemoryStore::new()), signal_capacity)
    }

    pub fn catalog(&self) -> &CatalogService {
        &self.catalog
    }

    pub fn issuance(&self) -> &IssuanceEngine {
        &self.issuance
    }

    pub fn workflow(&self) -> &WorkflowEngine {
        &self.workflow
    }

    pub fn queries(&self) -> &QueryService {
        &self.queries
    }

    pub fn realtime(&self) -> &BroadcastNotifier {
        &self.realtime
    }

    /// Subscribe here to deliver notifications (mail, chat, pager).
    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }
}

/// Drain the outbox into the log on a blocking task. The loop ends once the
/// outbox is dropped.
fn spawn_outbox_relay(outbox: &Outbox) {
    let sub = outbox.subscribe();
    tokio::task::spawn_blocking(move || {
        while let Ok(envelope) = sub.recv() {
            tracing::debug!(
                event_id = %envelope.event_id(),
                event_type = envelope.event_type(),
                subject = envelope.subject_id(),
                "outbox envelope"
            );
            dispatch(&TracingNotifier, envelope.into_payload());
        }
    });
}

/// SSE stream of signals. Lagged subscribers skip what they missed.
pub fn signal_sse_stream(
    services: &AppServices,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>> + use<>> {
    let rx = services.realtime().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(signal) => {
            let data = serde_json::to_string(&signal).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(signal.event_type()).data(data)))
        }
        Err(e) => {
            tracing::debug!(error = %e, "sse subscriber lagged");
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
