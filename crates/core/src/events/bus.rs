//! In-process publish/subscribe bus for [`DomainEvent`]s.
//!
//! Publishing never fails and never blocks on slow observers:
//! - synchronous handlers run inline, each isolated with `catch_unwind`, so an
//!   `Err` or a panic is logged and the remaining handlers still run
//! - asynchronous handlers are spawned on the current tokio runtime and not
//!   awaited
//!
//! Type-scoped handlers run before wildcard handlers; within each group,
//! handlers run in subscription order. The last published events are kept in
//! a bounded history for diagnostics.

use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use fieldsync_common::collections::RingBuffer;
use fieldsync_common::time::{SharedClock, SystemClock};
use fieldsync_domain::constants::EVENT_HISTORY_CAPACITY;
use fieldsync_domain::{DomainEvent, EventKind, EventType};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, warn};

/// Outcome of a subscriber; errors are logged by the bus
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type SyncHandler = Arc<dyn Fn(&DomainEvent) -> HandlerResult + Send + Sync>;
type AsyncHandler = Arc<dyn Fn(DomainEvent) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

#[derive(Clone)]
enum Handler {
    Sync(SyncHandler),
    Async(AsyncHandler),
}

struct Subscriber {
    id: u64,
    scope: Option<EventType>,
    handler: Handler,
}

struct Inner {
    subscribers: RwLock<Vec<Subscriber>>,
    history: Mutex<RingBuffer<DomainEvent>>,
    next_id: AtomicU64,
    clock: SharedClock,
}

impl Inner {
    fn remove(&self, id: u64) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }
}

/// Cheaply cloneable handle to a shared bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("history", &self.inner.history.lock().len())
            .finish()
    }
}

/// Keeps a subscription addressable. Dropping the handle does not
/// unsubscribe; call [`dispose`](Self::dispose).
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: u64,
    bus: Weak<Inner>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Unsubscribe. Returns `false` if the subscription was already gone
    /// (for example after [`EventBus::clear_all`]).
    pub fn dispose(self) -> bool {
        self.bus.upgrade().is_some_and(|inner| inner.remove(self.id))
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(SystemClock::shared())
    }
}

impl EventBus {
    /// Bus with the default history capacity.
    pub fn new(clock: SharedClock) -> Self {
        Self::with_history_capacity(EVENT_HISTORY_CAPACITY, clock)
    }

    pub fn with_history_capacity(capacity: usize, clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: RwLock::new(Vec::new()),
                history: Mutex::new(RingBuffer::new(capacity)),
                next_id: AtomicU64::new(1),
                clock,
            }),
        }
    }

    /// Stamp `kind` with an id and timestamp, record it, and notify subscribers.
    pub fn publish(&self, kind: EventKind) -> DomainEvent {
        let event = DomainEvent::new(kind, self.inner.clock.now());
        self.inner.history.lock().push(event.clone());

        // Snapshot so handlers may subscribe, dispose or publish re-entrantly.
        let handlers = self.handlers_for(event.event_type());
        debug!(
            event_type = %event.event_type(),
            event_id = %event.event_id,
            handlers = handlers.len(),
            "Publishing event"
        );

        for (id, handler) in handlers {
            match handler {
                Handler::Sync(handler) => dispatch_sync(id, &handler, &event),
                Handler::Async(handler) => dispatch_async(id, &handler, &event),
            }
        }

        event
    }

    /// Subscribe to one event type with a synchronous handler.
    pub fn subscribe<F>(&self, event_type: EventType, handler: F) -> SubscriptionHandle
    where
        F: Fn(&DomainEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(Some(event_type), Handler::Sync(Arc::new(handler)))
    }

    /// Subscribe to every event with a synchronous handler.
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionHandle
    where
        F: Fn(&DomainEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(None, Handler::Sync(Arc::new(handler)))
    }

    /// Subscribe with an asynchronous handler; `None` means every event type.
    ///
    /// The returned future is spawned on the publisher's tokio runtime.
    pub fn subscribe_async<F, Fut>(
        &self,
        event_type: Option<EventType>,
        handler: F,
    ) -> SubscriptionHandle
    where
        F: Fn(DomainEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: AsyncHandler = Arc::new(move |event| handler(event).boxed());
        self.register(event_type, Handler::Async(handler))
    }

    /// Remove every subscriber. History is kept.
    pub fn clear_all(&self) {
        self.inner.subscribers.write().clear();
    }

    /// The most recent `limit` events (all retained events for `None`), oldest first.
    pub fn history(&self, limit: Option<usize>) -> Vec<DomainEvent> {
        let history = self.inner.history.lock();
        match limit {
            Some(n) => history.latest(n).cloned().collect(),
            None => history.to_vec(),
        }
    }

    pub fn clear_history(&self) {
        self.inner.history.lock().clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    fn register(&self, scope: Option<EventType>, handler: Handler) -> SubscriptionHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.write().push(Subscriber { id, scope, handler });
        SubscriptionHandle { id, bus: Arc::downgrade(&self.inner) }
    }

    fn handlers_for(&self, event_type: EventType) -> Vec<(u64, Handler)> {
        let subscribers = self.inner.subscribers.read();
        let scoped = subscribers.iter().filter(|s| s.scope == Some(event_type));
        let wildcard = subscribers.iter().filter(|s| s.scope.is_none());
        scoped.chain(wildcard).map(|s| (s.id, s.handler.clone())).collect()
    }
}

fn dispatch_sync(id: u64, handler: &SyncHandler, event: &DomainEvent) {
    match catch_unwind(AssertUnwindSafe(|| handler(event))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            warn!(subscriber = id, event_type = %event.event_type(), error = %err, "Event handler failed");
        }
        Err(panic) => {
            error!(
                subscriber = id,
                event_type = %event.event_type(),
                panic = %panic_message(panic.as_ref()),
                "Event handler panicked"
            );
        }
    }
}

fn dispatch_async(id: u64, handler: &AsyncHandler, event: &DomainEvent) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!(subscriber = id, "No tokio runtime available, async handler skipped");
        return;
    };

    let event_type = event.event_type();
    let future = match catch_unwind(AssertUnwindSafe(|| handler(event.clone()))) {
        Ok(future) => future,
        Err(panic) => {
            error!(subscriber = id, %event_type, panic = %panic_message(panic.as_ref()), "Async event handler panicked");
            return;
        }
    };

    runtime.spawn(async move {
        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(subscriber = id, %event_type, error = %err, "Async event handler failed");
            }
            Err(panic) => {
                error!(subscriber = id, %event_type, panic = %panic_message(panic.as_ref()), "Async event handler panicked");
            }
        }
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use fieldsync_common::time::{Clock, MockClock};
    use fieldsync_domain::SyncTrigger;

    use super::*;

    fn bus() -> EventBus {
        EventBus::new(Arc::new(MockClock::new()))
    }

    fn started() -> EventKind {
        EventKind::SyncStarted { trigger: SyncTrigger::Manual }
    }

    fn deleted(id: &str) -> EventKind {
        EventKind::SubmissionDeleted { submission_id: id.to_string() }
    }

    #[test]
    fn publish_stamps_event_and_records_history() {
        let clock = MockClock::new();
        let bus = EventBus::new(Arc::new(clock.clone()));

        let event = bus.publish(started());

        assert_eq!(event.timestamp, clock.now());
        assert_eq!(event.event_type(), EventType::SyncStarted);
        assert_eq!(bus.history(None), vec![event]);
    }

    #[test]
    fn scoped_handlers_run_before_wildcards_in_subscription_order() {
        let bus = bus();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = Arc::clone(&order);
        bus.subscribe_all(move |_| {
            o.lock().push("wildcard-1");
            Ok(())
        });
        let o = Arc::clone(&order);
        bus.subscribe(EventType::SyncStarted, move |_| {
            o.lock().push("scoped-1");
            Ok(())
        });
        let o = Arc::clone(&order);
        bus.subscribe(EventType::SyncCompleted, move |_| {
            o.lock().push("other-type");
            Ok(())
        });
        let o = Arc::clone(&order);
        bus.subscribe(EventType::SyncStarted, move |_| {
            o.lock().push("scoped-2");
            Ok(())
        });
        let o = Arc::clone(&order);
        bus.subscribe_all(move |_| {
            o.lock().push("wildcard-2");
            Ok(())
        });

        bus.publish(started());

        assert_eq!(*order.lock(), vec!["scoped-1", "scoped-2", "wildcard-1", "wildcard-2"]);
    }

    #[test]
    fn failing_and_panicking_handlers_are_isolated() {
        let bus = bus();
        let calls = Arc::new(AtomicUsize::new(0));

        bus.subscribe_all(|_| Err("observer broke".into()));
        bus.subscribe_all(|_| panic!("observer exploded"));
        let c = Arc::clone(&calls);
        bus.subscribe_all(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.publish(started());
        bus.publish(started());

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(bus.history(None).len(), 2);
    }

    #[test]
    fn dispose_unsubscribes_but_drop_does_not() {
        let bus = bus();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&calls);
        let handle = bus.subscribe(EventType::SubmissionDeleted, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let c = Arc::clone(&calls);
        drop(bus.subscribe_all(move |_| {
            c.fetch_add(10, Ordering::SeqCst);
            Ok(())
        }));
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(deleted("a"));
        assert_eq!(calls.load(Ordering::SeqCst), 11);

        assert!(handle.dispose());
        assert_eq!(bus.subscriber_count(), 1);
        bus.publish(deleted("b"));
        assert_eq!(calls.load(Ordering::SeqCst), 21);
    }

    #[test]
    fn clear_all_removes_subscribers_and_keeps_history() {
        let bus = bus();
        let handle = bus.subscribe_all(|_| Ok(()));
        bus.publish(started());

        bus.clear_all();

        assert_eq!(bus.subscriber_count(), 0);
        assert!(!handle.dispose());
        assert_eq!(bus.history(None).len(), 1);
    }

    #[test]
    fn history_is_bounded_and_limit_returns_latest() {
        let bus = EventBus::with_history_capacity(3, Arc::new(MockClock::new()));
        for id in ["a", "b", "c", "d", "e"] {
            bus.publish(deleted(id));
        }

        let ids: Vec<_> = bus
            .history(None)
            .iter()
            .filter_map(|e| e.kind.submission_id().map(str::to_string))
            .collect();
        assert_eq!(ids, vec!["c", "d", "e"]);

        let latest = bus.history(Some(1));
        assert_eq!(latest[0].kind.submission_id(), Some("e"));

        bus.clear_history();
        assert!(bus.history(None).is_empty());
    }

    #[test]
    fn handlers_may_publish_reentrantly() {
        let bus = bus();
        let inner = bus.clone();
        bus.subscribe(EventType::SyncStarted, move |_| {
            inner.publish(deleted("nested"));
            Ok(())
        });

        bus.publish(started());

        let types: Vec<_> = bus.history(None).iter().map(DomainEvent::event_type).collect();
        assert_eq!(types, vec![EventType::SyncStarted, EventType::SubmissionDeleted]);
    }

    #[tokio::test]
    async fn async_handlers_are_spawned_and_failures_contained() {
        let bus = bus();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        bus.subscribe_async(Some(EventType::SubmissionDeleted), |_| async {
            HandlerResult::Err("remote logger down".into())
        });
        bus.subscribe_async(None, move |event| {
            let tx = tx.clone();
            async move {
                let sent: HandlerResult = tx.send(event.event_type()).map_err(Into::into);
                sent
            }
        });

        bus.publish(deleted("x"));

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(received, Some(EventType::SubmissionDeleted));
    }

    #[test]
    fn async_handler_without_runtime_is_skipped() {
        let bus = bus();
        bus.subscribe_async(None, |_| async { Ok(()) });
        let event = bus.publish(started());
        assert_eq!(bus.history(None), vec![event]);
    }
}
