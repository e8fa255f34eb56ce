//! Typed single-threaded publish/subscribe bus for runtime lifecycle events
//! (C7). No durable delivery and no backpressure — a slow subscriber is the
//! subscriber's problem, never the publisher's. Used only for state
//! transitions, never for payload streaming.

use std::collections::HashMap;
use std::sync::Mutex;

use forge_protocol::RuntimeEvent;
use tokio::sync::mpsc;

const WILDCARD: &str = "*";

/// Subscribers register by event kind (`RuntimeEvent::kind()`) and receive
/// events in publish order. Registering for `"*"` via [`EventBus::subscribe_all`]
/// receives every kind.
pub struct EventBus {
    subscribers: Mutex<HashMap<&'static str, Vec<mpsc::UnboundedSender<RuntimeEvent>>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self { subscribers: Mutex::new(HashMap::new()) }
    }

    pub fn subscribe(&self, kind: &'static str) -> mpsc::UnboundedReceiver<RuntimeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner()).entry(kind).or_default().push(tx);
        rx
    }

    pub fn subscribe_all(&self) -> mpsc::UnboundedReceiver<RuntimeEvent> {
        self.subscribe(WILDCARD)
    }

    /// Delivers `event` to every live subscriber of its kind plus every
    /// wildcard subscriber, in registration order. The subscriber list lock
    /// is held only for the duration of this iteration — never across a
    /// subscriber's own processing, since callers only get a channel, not a
    /// callback invoked inline.
    pub fn publish(&self, event: RuntimeEvent) {
        let kind = event.kind();
        let mut guard = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());

        for bucket_kind in [kind, WILDCARD] {
            if let Some(subs) = guard.get_mut(bucket_kind) {
                subs.retain(|tx| tx.send(event.clone()).is_ok());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_protocol::mcp::McpConnectionStatus;

    #[test]
    fn subscriber_receives_only_its_kind() {
        let bus = EventBus::new();
        let mut pty_rx = bus.subscribe("pty.deleted");
        let mut mcp_rx = bus.subscribe("mcp.status");

        bus.publish(RuntimeEvent::PtyDeleted { id: "s1".into() });

        assert!(matches!(pty_rx.try_recv(), Ok(RuntimeEvent::PtyDeleted { .. })));
        assert!(mcp_rx.try_recv().is_err());
    }

    #[test]
    fn wildcard_subscriber_receives_every_kind() {
        let bus = EventBus::new();
        let mut all_rx = bus.subscribe_all();

        bus.publish(RuntimeEvent::PtyDeleted { id: "s1".into() });
        bus.publish(RuntimeEvent::McpStatus { name: "serverA".into(), status: McpConnectionStatus::Connected });

        assert!(matches!(all_rx.try_recv(), Ok(RuntimeEvent::PtyDeleted { .. })));
        assert!(matches!(all_rx.try_recv(), Ok(RuntimeEvent::McpStatus { .. })));
    }

    #[test]
    fn delivers_in_publish_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe("pty.deleted");
        bus.publish(RuntimeEvent::PtyDeleted { id: "first".into() });
        bus.publish(RuntimeEvent::PtyDeleted { id: "second".into() });

        let RuntimeEvent::PtyDeleted { id: first } = rx.try_recv().unwrap() else { unreachable!() };
        let RuntimeEvent::PtyDeleted { id: second } = rx.try_recv().unwrap() else { unreachable!() };
        assert_eq!(first, "first");
        assert_eq!(second, "second");
    }

    #[test]
    fn dropped_subscribers_are_pruned_without_affecting_others() {
        let bus = EventBus::new();
        {
            let _dropped = bus.subscribe("pty.deleted");
        }
        let mut alive = bus.subscribe("pty.deleted");
        bus.publish(RuntimeEvent::PtyDeleted { id: "s1".into() });
        assert!(matches!(alive.try_recv(), Ok(RuntimeEvent::PtyDeleted { .. })));
    }
}
