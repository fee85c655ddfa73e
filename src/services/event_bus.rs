//! In-process event bus for lifecycle events
//!
//! Publishers never wait: `publish` uses `try_send` on a bounded channel and
//! drops the event when it is full. The dispatcher owns the receiving end and
//! runs every subscribed handler on its own task, bounded by a semaphore.
//! Delivery is at most once; nothing is persisted.

use crate::domain::events::LifecycleEvent;
use crate::infra::metrics::Metrics;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

/// Subscriber invoked for every published event
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &LifecycleEvent) -> anyhow::Result<()>;
}

/// Cloneable publishing handle
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::Sender<LifecycleEvent>,
    metrics: Arc<Metrics>,
}

impl EventBus {
    /// Enqueue without blocking. Returns false when the event was dropped.
    pub fn publish(&self, event: LifecycleEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.metrics.record_event_published();
                true
            }
            Err(TrySendError::Full(event)) => {
                self.metrics.record_event_dropped();
                warn!(
                    event = event.name(),
                    tracking_code = %event.tracking_code(),
                    "event_dropped_channel_full"
                );
                false
            }
            Err(TrySendError::Closed(event)) => {
                self.metrics.record_event_dropped();
                warn!(
                    event = event.name(),
                    tracking_code = %event.tracking_code(),
                    "event_dropped_bus_closed"
                );
                false
            }
        }
    }
}

/// Receives published events and fans them out to the handlers
pub struct EventDispatcher {
    rx: mpsc::Receiver<LifecycleEvent>,
    handlers: Vec<Arc<dyn EventHandler>>,
    permits: Arc<Semaphore>,
    workers: u32,
    metrics: Arc<Metrics>,
}

impl EventDispatcher {
    pub fn subscribe(&mut self, handler: Arc<dyn EventHandler>) {
        info!(handler = handler.name(), "event_handler_subscribed");
        self.handlers.push(handler);
    }

    /// Dispatch until every `EventBus` handle is dropped, then wait for the
    /// handlers still running
    pub async fn run(mut self) {
        info!(handlers = self.handlers.len(), workers = self.workers, "event_dispatcher_started");

        while let Some(event) = self.rx.recv().await {
            let event = Arc::new(event);
            for handler in &self.handlers {
                let Ok(permit) = self.permits.clone().acquire_owned().await else {
                    return;
                };
                let handler = handler.clone();
                let event = event.clone();
                let metrics = self.metrics.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    let name = handler.name();
                    let event_name = event.name();
                    let tracking_code = event.tracking_code().clone();

                    // Inner task so a panicking handler surfaces as a JoinError
                    let outcome = tokio::spawn(async move { handler.handle(&event).await }).await;
                    match outcome {
                        Ok(Ok(())) => {
                            debug!(handler = name, event = event_name, %tracking_code, "event_handled");
                        }
                        Ok(Err(e)) => {
                            metrics.record_handler_failure();
                            error!(
                                handler = name,
                                event = event_name,
                                %tracking_code,
                                error = %format!("{e:#}"),
                                "event_handler_failed"
                            );
                        }
                        Err(join_error) => {
                            metrics.record_handler_failure();
                            error!(
                                handler = name,
                                event = event_name,
                                %tracking_code,
                                panicked = join_error.is_panic(),
                                "event_handler_aborted"
                            );
                        }
                    }
                });
            }
        }

        // Channel closed: wait for in-flight handlers by taking every permit
        let _ = self.permits.acquire_many(self.workers).await;
        info!("event_dispatcher_stopped");
    }
}

/// Create the publishing handle and its dispatcher
///
/// Returns the bus (for the lifecycle) and the dispatcher (to be spawned
/// after handlers are subscribed)
pub fn create_event_bus(
    buffer_size: usize,
    workers: usize,
    metrics: Arc<Metrics>,
) -> (EventBus, EventDispatcher) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    let workers = u32::try_from(workers.max(1)).unwrap_or(u32::MAX);
    let bus = EventBus { tx, metrics: metrics.clone() };
    let dispatcher = EventDispatcher {
        rx,
        handlers: Vec::new(),
        permits: Arc::new(Semaphore::new(workers as usize)),
        workers,
        metrics,
    };
    (bus, dispatcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::package::{Package, Recipient, Sender};
    use crate::domain::types::TrackingCode;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn event() -> LifecycleEvent {
        LifecycleEvent::created(Package::register(
            TrackingCode::from("TRK-BUS00001"),
            Recipient { name: "R".into(), address: "A".into(), phone: "3001234567".into() },
            Sender { name: "S".into(), address: "B".into() },
            Utc::now(),
        ))
    }

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl EventHandler for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn handle(&self, _event: &LifecycleEvent) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl EventHandler for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn handle(&self, _event: &LifecycleEvent) -> anyhow::Result<()> {
            anyhow::bail!("downstream unavailable")
        }
    }

    struct Panicking;

    #[async_trait]
    impl EventHandler for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn handle(&self, _event: &LifecycleEvent) -> anyhow::Result<()> {
            panic!("handler bug")
        }
    }

    #[tokio::test]
    async fn test_publish_drops_when_full() {
        let metrics = Arc::new(Metrics::new());
        let (bus, _dispatcher) = create_event_bus(1, 1, metrics.clone());

        assert!(bus.publish(event()));
        assert!(!bus.publish(event()));
        assert_eq!(metrics.events_dropped(), 1);
    }

    #[tokio::test]
    async fn test_publish_after_dispatcher_gone_is_dropped() {
        let metrics = Arc::new(Metrics::new());
        let (bus, dispatcher) = create_event_bus(4, 1, metrics.clone());
        drop(dispatcher);

        assert!(!bus.publish(event()));
        assert_eq!(metrics.events_dropped(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_isolated_from_other_handlers() {
        let metrics = Arc::new(Metrics::new());
        let (bus, mut dispatcher) = create_event_bus(16, 2, metrics.clone());
        let seen = Arc::new(AtomicUsize::new(0));
        dispatcher.subscribe(Arc::new(Failing));
        dispatcher.subscribe(Arc::new(Panicking));
        dispatcher.subscribe(Arc::new(Counting(seen.clone())));
        let worker = tokio::spawn(dispatcher.run());

        for _ in 0..3 {
            assert!(bus.publish(event()));
        }
        drop(bus);
        tokio::time::timeout(Duration::from_secs(5), worker).await.unwrap().unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(metrics.handler_failures(), 6);
    }
}
