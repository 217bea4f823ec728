//! # Event Trigger
//!
//! The source's `trigger.Trigger` is a named-event dispatcher: `On(name, fn)`
//! registers, `FireBackground(name, code, data)` delivers to every registered
//! handler without blocking the firing goroutine. This is that, with the
//! `interface{}` payload replaced by [`FabricEvent`] (see `events.rs`).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::events::FabricEvent;
use crate::safe::safe_spawn;

/// One entry per wire event name. Kept as a real enum (rather than `&str`
/// keys everywhere) so a typo in an event name is a compile error, not a
/// silently-dropped handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    Open,
    Accept,
    Message,
    Close,
    Error,
}

impl EventName {
    pub const fn as_str(self) -> &'static str {
        match self {
            EventName::Open => "Open",
            EventName::Accept => "Accept",
            EventName::Message => "Message",
            EventName::Close => "Close",
            EventName::Error => "Error",
        }
    }
}

type Handler = Arc<dyn Fn(FabricEvent) + Send + Sync>;

/// Named-event dispatcher bound to one endpoint or forwarder side.
///
/// Firing never blocks the caller: each registered handler runs in its own
/// spawned task, so a slow or panicking handler can't stall the read loop
/// that fired the event, and a panic in one handler never touches its
/// siblings (the source's "SafeFunction-wrapped callback" contract).
#[derive(Default)]
pub struct EventTrigger {
    handlers: Mutex<HashMap<EventName, Vec<Handler>>>,
}

impl EventTrigger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { handlers: Mutex::new(HashMap::new()) })
    }

    /// Registers `handler` for `name`. Multiple handlers per name are kept
    /// and fired in registration order.
    pub fn on<F>(&self, name: EventName, handler: F)
    where
        F: Fn(FabricEvent) + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .expect("event trigger lock poisoned")
            .entry(name)
            .or_default()
            .push(Arc::new(handler));
    }

    /// True if at least one handler is registered for `name`.
    pub fn has_event(&self, name: EventName) -> bool {
        self.handlers
            .lock()
            .expect("event trigger lock poisoned")
            .get(&name)
            .is_some_and(|v| !v.is_empty())
    }

    /// Schedules `event` for delivery to every handler registered under
    /// `name`, without waiting for any of them to run.
    pub fn fire_background(self: &Arc<Self>, name: EventName, event: FabricEvent) {
        let handlers = {
            let guard = self.handlers.lock().expect("event trigger lock poisoned");
            guard.get(&name).cloned().unwrap_or_default()
        };
        for handler in handlers {
            let event = event.clone();
            safe_spawn(name.as_str(), async move { handler(event) });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ErrorPayload;
    use crate::error::FabricErrorCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn fires_registered_handlers_in_order() {
        let trigger = EventTrigger::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = order.clone();
        trigger.on(EventName::Message, move |_| o1.lock().unwrap().push(1));
        let o2 = order.clone();
        trigger.on(EventName::Message, move |_| o2.lock().unwrap().push(2));

        trigger.fire_background(
            EventName::Message,
            FabricEvent::Error(ErrorPayload { code: FabricErrorCode::Info, description: String::new() }),
        );
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn unhandled_events_are_silently_dropped() {
        let trigger = EventTrigger::new();
        assert!(!trigger.has_event(EventName::Close));
        trigger.fire_background(
            EventName::Close,
            FabricEvent::Error(ErrorPayload { code: FabricErrorCode::Info, description: String::new() }),
        );
        // No handler, no panic, nothing to assert beyond "this didn't block or blow up".
    }

    #[tokio::test]
    async fn panicking_handler_does_not_affect_siblings() {
        let trigger = EventTrigger::new();
        let ran = Arc::new(AtomicUsize::new(0));

        trigger.on(EventName::Message, |_| panic!("boom"));
        let r = ran.clone();
        trigger.on(EventName::Message, move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        });

        trigger.fire_background(
            EventName::Message,
            FabricEvent::Error(ErrorPayload { code: FabricErrorCode::Info, description: String::new() }),
        );
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
