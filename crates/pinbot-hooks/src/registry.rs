//! Status registry: channel subscriptions and fire-and-forget dispatch.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::events::StatusEvent;

/// Async status handler function type.
pub type StatusHandler =
    Arc<dyn Fn(StatusEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Routes published events to the handlers subscribed to their channel.
pub struct StatusRegistry {
    /// Map from channel name to handlers.
    handlers: RwLock<HashMap<String, Vec<StatusHandler>>>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler for one channel (`"*"` receives every channel).
    pub async fn on(&self, channel: &str, handler: StatusHandler) {
        let mut handlers = self.handlers.write().await;
        handlers.entry(channel.to_string()).or_default().push(handler);
    }

    /// Publish an event. Handlers run on their own tasks; the caller never
    /// waits for them and their failures never reach it.
    pub async fn emit(&self, event: StatusEvent) {
        let handlers = self.handlers.read().await;
        let targeted = handlers.get(event.channel()).into_iter().flatten();
        let wildcard = handlers.get("*").into_iter().flatten();

        let mut delivered = 0usize;
        for handler in targeted.chain(wildcard) {
            let event = event.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                handler(event).await;
            });
            delivered += 1;
        }
        if delivered == 0 {
            tracing::trace!(channel = event.channel(), "No status handlers registered");
        }
    }
}

impl Default for StatusRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{AGENT_LOGS, AGENT_STATUS};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting(counter: Arc<AtomicU32>) -> StatusHandler {
        Arc::new(move |_event| {
            let c = counter.clone();
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test]
    async fn test_emit_routes_by_channel() {
        let registry = StatusRegistry::new();
        let status = Arc::new(AtomicU32::new(0));
        let logs = Arc::new(AtomicU32::new(0));
        registry.on(AGENT_STATUS, counting(status.clone())).await;
        registry.on(AGENT_LOGS, counting(logs.clone())).await;

        registry
            .emit(StatusEvent::AgentOnline {
                agent_id: "a".into(),
            })
            .await;
        registry.emit(StatusEvent::log("a", "hello")).await;
        registry.emit(StatusEvent::log("a", "again")).await;
        // Give the spawned tasks time to run
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        assert_eq!(status.load(Ordering::SeqCst), 1);
        assert_eq!(logs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_wildcard_handler() {
        let registry = StatusRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        registry
            .on(
                "*",
                Arc::new(move |event: StatusEvent| {
                    let s = s.clone();
                    Box::pin(async move {
                        s.lock().unwrap().push(event.message());
                    })
                }),
            )
            .await;

        registry.emit(StatusEvent::ServiceStartup).await;
        registry
            .emit(StatusEvent::AgentOffline {
                agent_id: "b".into(),
            })
            .await;
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["b:Offline", "startup"]);
    }

    #[tokio::test]
    async fn test_emit_without_handlers_is_noop() {
        let registry = StatusRegistry::default();
        registry.emit(StatusEvent::ServiceShutdown).await;
    }
}
