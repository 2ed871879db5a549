//! Inbound method handler registry.
//!
//! Owned by the lifecycle manager and shared with every epoch's connection,
//! so subscribers survive connection rebuilds without re-subscribing.
//! Handlers may close over context from an earlier epoch; keeping that
//! context valid is the subscriber's responsibility.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use hublink_protocol::Frame;

/// Identifies one registered handler for targeted removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type MethodHandler = Arc<dyn Fn(Frame) + Send + Sync>;

/// Method name → ordered handler list.
#[derive(Default)]
pub struct HandlerRegistry {
    next_id: AtomicU64,
    entries: std::sync::Mutex<HashMap<String, Vec<(HandlerId, MethodHandler)>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for inbound invocations of `target`.
    /// Handlers for one target fire in registration order.
    pub fn on(
        &self,
        target: impl Into<String>,
        handler: impl Fn(Frame) + Send + Sync + 'static,
    ) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut entries) = self.entries.lock() {
            entries
                .entry(target.into())
                .or_default()
                .push((id, Arc::new(handler)));
        }
        id
    }

    /// Removes one handler. Returns whether it was registered.
    pub fn off(&self, target: &str, id: HandlerId) -> bool {
        let Ok(mut entries) = self.entries.lock() else {
            return false;
        };
        let Some(list) = entries.get_mut(target) else {
            return false;
        };
        let before = list.len();
        list.retain(|(hid, _)| *hid != id);
        let removed = list.len() < before;
        if list.is_empty() {
            entries.remove(target);
        }
        removed
    }

    /// Removes every handler for `target`.
    pub fn clear(&self, target: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(target);
        }
    }

    /// Dispatches an inbound push frame to all handlers of its target.
    /// Handlers are cloned out before invocation so callbacks may register
    /// or remove handlers without deadlocking.
    pub(crate) fn dispatch(&self, frame: &Frame) {
        let Some(target) = frame.target.as_deref() else {
            warn!(id = %frame.id, "push frame without target, dropping");
            return;
        };
        let handlers: Vec<MethodHandler> = match self.entries.lock() {
            Ok(entries) => entries
                .get(target)
                .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        if handlers.is_empty() {
            warn!(target, id = %frame.id, "no handler registered, dropping frame");
            return;
        }
        for handler in handlers {
            handler(frame.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hublink_protocol::FrameKind;

    fn push_frame(target: &str) -> Frame {
        Frame::new::<()>("f-1", FrameKind::Send, Some(target), None).unwrap()
    }

    #[test]
    fn handlers_fire_in_registration_order() {
        let registry = HandlerRegistry::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        for n in 0..3 {
            let order = order.clone();
            registry.on("Tick", move |_| order.lock().unwrap().push(n));
        }

        registry.dispatch(&push_frame("Tick"));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn off_removes_only_the_given_handler() {
        let registry = HandlerRegistry::new();
        let hits = Arc::new(AtomicU64::new(0));

        let h1 = hits.clone();
        let id1 = registry.on("Tick", move |_| {
            h1.fetch_add(1, Ordering::Relaxed);
        });
        let h2 = hits.clone();
        let _id2 = registry.on("Tick", move |_| {
            h2.fetch_add(10, Ordering::Relaxed);
        });

        assert!(registry.off("Tick", id1));
        assert!(!registry.off("Tick", id1));

        registry.dispatch(&push_frame("Tick"));
        assert_eq!(hits.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn clear_removes_all_handlers_for_target() {
        let registry = HandlerRegistry::new();
        let hits = Arc::new(AtomicU64::new(0));

        let h = hits.clone();
        registry.on("Tick", move |_| {
            h.fetch_add(1, Ordering::Relaxed);
        });
        registry.clear("Tick");

        registry.dispatch(&push_frame("Tick"));
        assert_eq!(hits.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn dispatch_without_target_is_dropped() {
        let registry = HandlerRegistry::new();
        let frame = Frame::new::<()>("f-2", FrameKind::Send, None, None).unwrap();
        registry.dispatch(&frame);
    }

    #[test]
    fn handler_may_mutate_registry_during_dispatch() {
        let registry = Arc::new(HandlerRegistry::new());
        let reg = registry.clone();
        registry.on("Tick", move |_| {
            reg.clear("Tick");
        });
        registry.dispatch(&push_frame("Tick"));
        // Second dispatch finds no handlers.
        registry.dispatch(&push_frame("Tick"));
    }
}
