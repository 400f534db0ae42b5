//! ProtocolSession - the seam to the debugging connection.
//!
//! Coverage trackers never talk to a socket directly. They send
//! [`ProtocolCommand`]s and subscribe to named events through the
//! [`ProtocolSession`] trait, so the same lifecycle runs against a real CDP
//! WebSocket ([`crate::WebSocketSession`]) or the scripted
//! [`crate::MockSession`] in tests.
//!
//! Subscriptions are handles: dropping an [`EventSubscription`] (or calling
//! [`EventSubscription::release`]) removes the listener from the session.

use crate::result::CoverageResult;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// CDP method and event names used by the coverage trackers
#[allow(missing_docs)]
pub mod methods {
    pub const PROFILER_ENABLE: &str = "Profiler.enable";
    pub const PROFILER_DISABLE: &str = "Profiler.disable";
    pub const PROFILER_START_PRECISE_COVERAGE: &str = "Profiler.startPreciseCoverage";
    pub const PROFILER_TAKE_PRECISE_COVERAGE: &str = "Profiler.takePreciseCoverage";
    pub const PROFILER_STOP_PRECISE_COVERAGE: &str = "Profiler.stopPreciseCoverage";
    pub const DEBUGGER_ENABLE: &str = "Debugger.enable";
    pub const DEBUGGER_DISABLE: &str = "Debugger.disable";
    pub const DEBUGGER_SET_SKIP_ALL_PAUSES: &str = "Debugger.setSkipAllPauses";
    pub const DEBUGGER_GET_SCRIPT_SOURCE: &str = "Debugger.getScriptSource";
    pub const DOM_ENABLE: &str = "DOM.enable";
    pub const DOM_DISABLE: &str = "DOM.disable";
    pub const CSS_ENABLE: &str = "CSS.enable";
    pub const CSS_DISABLE: &str = "CSS.disable";
    pub const CSS_START_RULE_USAGE_TRACKING: &str = "CSS.startRuleUsageTracking";
    pub const CSS_STOP_RULE_USAGE_TRACKING: &str = "CSS.stopRuleUsageTracking";
    pub const CSS_GET_STYLE_SHEET_TEXT: &str = "CSS.getStyleSheetText";
    pub const RUNTIME_ENABLE: &str = "Runtime.enable";

    pub const EVENT_SCRIPT_PARSED: &str = "Debugger.scriptParsed";
    pub const EVENT_STYLE_SHEET_ADDED: &str = "CSS.styleSheetAdded";
    pub const EVENT_EXECUTION_CONTEXTS_CLEARED: &str = "Runtime.executionContextsCleared";
}

/// A request sent to the target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolCommand {
    /// CDP method name
    pub method: &'static str,
    /// Command parameters (an empty object when none)
    pub params: Value,
}

impl ProtocolCommand {
    /// Command without parameters
    #[must_use]
    pub fn new(method: &'static str) -> Self {
        Self {
            method,
            params: Value::Object(serde_json::Map::new()),
        }
    }

    /// Command with parameters
    #[must_use]
    pub fn with_params(method: &'static str, params: Value) -> Self {
        Self { method, params }
    }
}

/// An event delivered by the target
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolEvent {
    /// CDP event name
    pub method: String,
    /// Event payload
    pub params: Value,
}

/// Where a subscription delivers its events.
///
/// Several subscriptions may share one sink; events then arrive in the order
/// the session dispatched them.
pub type EventSink = mpsc::UnboundedSender<ProtocolEvent>;

/// Connection to an instrumented target
#[async_trait]
pub trait ProtocolSession: Send + Sync {
    /// Send a command and wait for its result
    async fn send_command(&self, command: ProtocolCommand) -> CoverageResult<Value>;

    /// Route every `event` into `sink` until the returned handle is released
    fn subscribe(&self, event: &str, sink: EventSink) -> CoverageResult<EventSubscription>;
}

type ReleaseFn = Box<dyn FnOnce() + Send + Sync>;

/// Handle for one event subscription; releases the listener on drop
pub struct EventSubscription {
    event: String,
    release: Option<ReleaseFn>,
}

impl EventSubscription {
    /// Create a handle that runs `release` exactly once
    pub fn new(event: impl Into<String>, release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            event: event.into(),
            release: Some(Box::new(release)),
        }
    }

    /// Event name this handle listens to
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Release the listener now
    pub fn release(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSubscription")
            .field("event", &self.event)
            .field("active", &self.release.is_some())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct Listener {
    id: u64,
    sink: EventSink,
}

/// Fan-out table from event name to subscribed sinks
#[derive(Debug, Default)]
pub struct EventRouter {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<String, Vec<Listener>>>,
}

impl EventRouter {
    /// Create an empty router
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sink` for `event`; the handle unregisters it
    pub fn subscribe(self: &Arc<Self>, event: &str, sink: EventSink) -> EventSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners)
            .entry(event.to_string())
            .or_default()
            .push(Listener { id, sink });

        let router = Arc::downgrade(self);
        let name = event.to_string();
        EventSubscription::new(event, move || {
            if let Some(router) = router.upgrade() {
                router.unsubscribe(&name, id);
            }
        })
    }

    fn unsubscribe(&self, event: &str, id: u64) {
        let mut listeners = lock(&self.listeners);
        if let Some(list) = listeners.get_mut(event) {
            list.retain(|l| l.id != id);
            if list.is_empty() {
                listeners.remove(event);
            }
        }
    }

    /// Deliver an event to every live listener; returns how many received it
    pub fn dispatch(&self, method: &str, params: &Value) -> usize {
        let mut listeners = lock(&self.listeners);
        let Some(list) = listeners.get_mut(method) else {
            return 0;
        };
        list.retain(|l| {
            l.sink
                .send(ProtocolEvent {
                    method: method.to_string(),
                    params: params.clone(),
                })
                .is_ok()
        });
        list.len()
    }

    /// Number of listeners currently registered for `event`
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        lock(&self.listeners).get(event).map_or(0, Vec::len)
    }

    /// Drop every listener, closing their sinks
    pub fn clear(&self) {
        lock(&self.listeners).clear();
    }
}

// ============================================================================
// Tests
// ============================================================================
