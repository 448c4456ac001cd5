//! Event dispatcher: routes decoded events to independent subscribers.
//!
//! Two delivery styles share one dispatcher:
//!
//! - callbacks registered globally or per [`EventType`], invoked synchronously in
//!   registration order (global callbacks first);
//! - [`Dispatcher::events`] streams backed by a broadcast channel, for async consumers.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock};

use async_stream::stream;
use futures::Stream;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use super::error::WsError;
use super::types::response::{EventType, InboundEvent};
use crate::Result;
use crate::error::Error;

/// Broadcast channel capacity for event streams.
const BROADCAST_CAPACITY: usize = 1024;

type Callback = Arc<dyn Fn(&InboundEvent) + Send + Sync>;

/// Handle returned by a subscribe call, used to unsubscribe.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

struct Registration {
    id: SubscriptionId,
    callback: Callback,
}

#[derive(Default)]
struct Subscriptions {
    global: Vec<Registration>,
    by_type: HashMap<EventType, Vec<Registration>>,
}

impl Subscriptions {
    fn callbacks_for(&self, event_type: EventType) -> Vec<Callback> {
        self.global
            .iter()
            .chain(self.by_type.get(&event_type).into_iter().flatten())
            .map(|registration| Arc::clone(&registration.callback))
            .collect()
    }

    fn len(&self) -> usize {
        self.global.len() + self.by_type.values().map(Vec::len).sum::<usize>()
    }
}

struct DispatcherInner {
    subscriptions: RwLock<Subscriptions>,
    broadcast_tx: broadcast::Sender<InboundEvent>,
}

/// Routes [`InboundEvent`]s to subscribers. Cheap to clone; clones share subscriptions.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(DispatcherInner {
                subscriptions: RwLock::new(Subscriptions::default()),
                broadcast_tx,
            }),
        }
    }

    /// Register a callback for one event type.
    pub fn subscribe<F>(&self, event_type: EventType, callback: F) -> SubscriptionId
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        // We can recover from a poisoned lock because callbacks never run while it is held.
        self.inner
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .by_type
            .entry(event_type)
            .or_default()
            .push(Registration {
                id,
                callback: Arc::new(callback),
            });
        id
    }

    /// Register a callback invoked for every event, before any per-type callback.
    pub fn subscribe_all<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        self.inner
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .global
            .push(Registration {
                id,
                callback: Arc::new(callback),
            });
        id
    }

    /// Remove a callback. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self
            .inner
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(index) = subscriptions.global.iter().position(|r| r.id == id) {
            subscriptions.global.remove(index);
            return true;
        }

        let mut emptied = None;
        let mut removed = false;
        for (event_type, registrations) in &mut subscriptions.by_type {
            if let Some(index) = registrations.iter().position(|r| r.id == id) {
                registrations.remove(index);
                removed = true;
                if registrations.is_empty() {
                    emptied = Some(*event_type);
                }
                break;
            }
        }
        if let Some(event_type) = emptied {
            subscriptions.by_type.remove(&event_type);
        }
        removed
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver an event to every interested subscriber.
    ///
    /// Callbacks run outside the subscription lock, so they may subscribe or unsubscribe. A
    /// panicking callback is logged and skipped; the remaining callbacks still run.
    pub fn dispatch(&self, event: &InboundEvent) {
        let event_type = event.event_type();
        let callbacks = self
            .inner
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .callbacks_for(event_type);

        for callback in callbacks {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(event))) {
                let message = panic_message(panic.as_ref());
                #[cfg(feature = "tracing")]
                tracing::error!(
                    connection = %event.connection,
                    %event_type,
                    %message,
                    "Event subscriber panicked"
                );
                #[cfg(not(feature = "tracing"))]
                let _ = &message;
            }
        }

        if self.inner.broadcast_tx.receiver_count() > 0 {
            _ = self.inner.broadcast_tx.send(event.clone());
        }
    }

    /// Stream of every dispatched event.
    ///
    /// Each call returns a new independent stream. A stream that falls more than
    /// 1024 events behind yields [`WsError::Lagged`] and then continues with the
    /// oldest retained event.
    pub fn events(&self) -> impl Stream<Item = Result<InboundEvent>> + use<> {
        let mut rx = self.inner.broadcast_tx.subscribe();

        stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield Ok(event),
                    Err(RecvError::Lagged(count)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("Event stream lagged, missed {count} events");
                        yield Err(Error::from(WsError::Lagged { count }));
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::StreamExt as _;
    use serde_json::json;

    use super::*;
    use crate::ws::types::response::EventKind;

    fn event(kind: EventKind) -> InboundEvent {
        InboundEvent::new("default", kind)
    }

    type Recorded = Box<dyn Fn(&InboundEvent) + Send + Sync>;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Recorded) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = Arc::clone(&log);
        let make = move |name: &'static str| -> Recorded {
            let log = Arc::clone(&log_clone);
            Box::new(move |_: &InboundEvent| log.lock().unwrap().push(name))
        };
        (log, make)
    }

    #[test]
    fn global_then_typed_in_registration_order() {
        let dispatcher = Dispatcher::new();
        let (log, make) = recorder();

        dispatcher.subscribe_all(make("A"));
        dispatcher.subscribe(EventType::PriceUpdate, make("B"));
        dispatcher.subscribe(EventType::PriceUpdate, make("C"));
        dispatcher.subscribe(EventType::LiveAlert, make("D"));

        dispatcher.dispatch(&event(EventKind::PriceUpdate(json!({}))));

        assert_eq!(*log.lock().unwrap(), vec!["A", "B", "C"]);
    }

    #[test]
    fn global_registered_after_typed_still_runs_first() {
        let dispatcher = Dispatcher::new();
        let (log, make) = recorder();

        dispatcher.subscribe(EventType::Pong, make("typed"));
        dispatcher.subscribe_all(make("global"));

        dispatcher.dispatch(&event(EventKind::Pong { timestamp: None }));

        assert_eq!(*log.lock().unwrap(), vec!["global", "typed"]);
    }

    #[test]
    fn panicking_callback_does_not_stop_others() {
        let dispatcher = Dispatcher::new();
        let (log, make) = recorder();

        dispatcher.subscribe(EventType::StatsUpdate, |_: &InboundEvent| {
            panic!("subscriber bug");
        });
        dispatcher.subscribe(EventType::StatsUpdate, make("after"));

        dispatcher.dispatch(&event(EventKind::StatsUpdate(json!({}))));

        assert_eq!(*log.lock().unwrap(), vec!["after"]);
    }

    #[test]
    fn unsubscribe_removes_callback_and_empty_type() {
        let dispatcher = Dispatcher::new();
        let (log, make) = recorder();

        let typed = dispatcher.subscribe(EventType::MarketStatus, make("typed"));
        let global = dispatcher.subscribe_all(make("global"));
        assert_eq!(dispatcher.subscriber_count(), 2);

        assert!(dispatcher.unsubscribe(typed));
        assert!(dispatcher.unsubscribe(global));
        assert!(!dispatcher.unsubscribe(typed));
        assert_eq!(dispatcher.subscriber_count(), 0);

        dispatcher.dispatch(&event(EventKind::MarketStatus(json!({}))));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn callback_may_unsubscribe_itself() {
        let dispatcher = Dispatcher::new();
        let calls = Arc::new(Mutex::new(0_u32));
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let id = {
            let handle = dispatcher.clone();
            let calls = Arc::clone(&calls);
            let slot = Arc::clone(&slot);
            dispatcher.subscribe(EventType::LiveAlert, move |_: &InboundEvent| {
                *calls.lock().unwrap() += 1;
                if let Some(id) = *slot.lock().unwrap() {
                    handle.unsubscribe(id);
                }
            })
        };
        *slot.lock().unwrap() = Some(id);

        dispatcher.dispatch(&event(EventKind::LiveAlert(json!({}))));
        dispatcher.dispatch(&event(EventKind::LiveAlert(json!({}))));

        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn events_stream_receives_dispatched_events() {
        let dispatcher = Dispatcher::new();
        let mut stream = Box::pin(dispatcher.events());

        dispatcher.dispatch(&event(EventKind::TokenDiscovery(json!({ "symbol": "ABC" }))));

        let received = stream.next().await.unwrap().unwrap();
        assert_eq!(received.event_type(), EventType::TokenDiscovery);
    }

    #[tokio::test]
    async fn lagging_stream_reports_and_continues() {
        let dispatcher = Dispatcher::new();
        let mut stream = Box::pin(dispatcher.events());

        for _ in 0..(BROADCAST_CAPACITY + 5) {
            dispatcher.dispatch(&event(EventKind::StatsUpdate(json!({}))));
        }

        let first = stream.next().await.unwrap();
        assert!(matches!(
            first.unwrap_err().downcast_ref::<WsError>(),
            Some(WsError::Lagged { count: 5 })
        ));
        assert!(stream.next().await.unwrap().is_ok());
    }
}
