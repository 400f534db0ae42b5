//! Scripted protocol session for tests.
//!
//! `MockSession` answers commands from canned responders, records every
//! command it receives, and lets a test push events to subscribers at chosen
//! moments. Commands can be held behind a [`MockGate`] to model slow round
//! trips and out-of-order completions.

use crate::protocol::{methods, EventRouter, EventSink, EventSubscription, ProtocolCommand, ProtocolSession};
use crate::result::{CoverageError, CoverageResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

type Responder = Arc<dyn Fn(&Value) -> CoverageResult<Value> + Send + Sync>;

struct Gate {
    method: String,
    params: Option<Value>,
    released: watch::Receiver<bool>,
}

impl Gate {
    fn matches(&self, command: &ProtocolCommand) -> bool {
        self.method == command.method && self.params.as_ref().map_or(true, |p| *p == command.params)
    }
}

/// Releases commands held by [`MockSession::hold`]
#[derive(Debug)]
pub struct MockGate {
    release: watch::Sender<bool>,
}

impl MockGate {
    /// Let every held and future matching command proceed
    pub fn release(&self) {
        self.release.send_replace(true);
    }
}

#[derive(Default)]
struct MockState {
    responders: HashMap<String, Responder>,
    gates: Vec<Gate>,
    history: Vec<ProtocolCommand>,
    script_sources: HashMap<String, String>,
    stylesheet_texts: HashMap<String, String>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock protocol session for unit and integration tests
#[derive(Default)]
pub struct MockSession {
    router: Arc<EventRouter>,
    state: Mutex<MockState>,
}

impl MockSession {
    /// Create a mock that answers every command with `{}`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `method` with a fixed result
    pub fn respond(&self, method: &str, result: Value) {
        self.respond_with(method, move |_| Ok(result.clone()));
    }

    /// Answer `method` by computing a result from the command parameters
    pub fn respond_with(
        &self,
        method: &str,
        responder: impl Fn(&Value) -> CoverageResult<Value> + Send + Sync + 'static,
    ) {
        lock(&self.state)
            .responders
            .insert(method.to_string(), Arc::new(responder));
    }

    /// Reject `method` with a protocol error
    pub fn fail(&self, method: &str, message: &str) {
        let name = method.to_string();
        let message = message.to_string();
        self.respond_with(method, move |_| Err(CoverageError::protocol(name.clone(), message.clone())));
    }

    /// Hold every call to `method` until the gate is released
    #[must_use]
    pub fn hold(&self, method: &str) -> MockGate {
        self.add_gate(method, None)
    }

    /// Hold calls to `method` whose parameters equal `params`
    #[must_use]
    pub fn hold_with(&self, method: &str, params: Value) -> MockGate {
        self.add_gate(method, Some(params))
    }

    fn add_gate(&self, method: &str, params: Option<Value>) -> MockGate {
        let (release, released) = watch::channel(false);
        lock(&self.state).gates.push(Gate {
            method: method.to_string(),
            params,
            released,
        });
        MockGate { release }
    }

    /// Source returned by `Debugger.getScriptSource` for `script_id`
    pub fn add_script_source(&self, script_id: &str, source: &str) {
        lock(&self.state)
            .script_sources
            .insert(script_id.to_string(), source.to_string());
    }

    /// Text returned by `CSS.getStyleSheetText` for `style_sheet_id`
    pub fn add_stylesheet_text(&self, style_sheet_id: &str, text: &str) {
        lock(&self.state)
            .stylesheet_texts
            .insert(style_sheet_id.to_string(), text.to_string());
    }

    /// Deliver an event to current subscribers; returns how many received it
    pub fn emit(&self, event: &str, params: Value) -> usize {
        self.router.dispatch(event, &params)
    }

    /// Emit `Debugger.scriptParsed`
    pub fn emit_script_parsed(&self, script_id: &str, url: &str) -> usize {
        self.emit(methods::EVENT_SCRIPT_PARSED, json!({"scriptId": script_id, "url": url}))
    }

    /// Emit `CSS.styleSheetAdded`
    pub fn emit_style_sheet_added(&self, style_sheet_id: &str, source_url: &str) -> usize {
        self.emit(
            methods::EVENT_STYLE_SHEET_ADDED,
            json!({"header": {"styleSheetId": style_sheet_id, "sourceURL": source_url}}),
        )
    }

    /// Emit `Runtime.executionContextsCleared`
    pub fn emit_contexts_cleared(&self) -> usize {
        self.emit(methods::EVENT_EXECUTION_CONTEXTS_CLEARED, json!({}))
    }

    /// Every command received so far, in call order
    #[must_use]
    pub fn history(&self) -> Vec<ProtocolCommand> {
        lock(&self.state).history.clone()
    }

    /// Check if a method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.call_count(method) > 0
    }

    /// Number of calls to `method`
    #[must_use]
    pub fn call_count(&self, method: &str) -> usize {
        lock(&self.state)
            .history
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    /// Live subscriptions for `event`
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.router.listener_count(event)
    }

    /// Wait until `method` has been called at least `count` times.
    ///
    /// Returns `false` if that does not happen within a second.
    pub async fn wait_for_calls(&self, method: &str, count: usize) -> bool {
        for _ in 0..1000 {
            if self.call_count(method) >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        self.call_count(method) >= count
    }

    fn builtin_response(state: &MockState, command: &ProtocolCommand) -> CoverageResult<Value> {
        let lookup = |sources: &HashMap<String, String>, key: &str| {
            let id = command.params[key].as_str().unwrap_or_default();
            sources.get(id).cloned().ok_or_else(|| {
                CoverageError::protocol(command.method, format!("No resource with given id found: {id}"))
            })
        };
        match command.method {
            methods::DEBUGGER_GET_SCRIPT_SOURCE => {
                let source = lookup(&state.script_sources, "scriptId")?;
                Ok(json!({"scriptSource": source}))
            }
            methods::CSS_GET_STYLE_SHEET_TEXT => {
                let text = lookup(&state.stylesheet_texts, "styleSheetId")?;
                Ok(json!({"text": text}))
            }
            _ => Ok(json!({})),
        }
    }
}

impl std::fmt::Debug for MockSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSession")
            .field("calls", &lock(&self.state).history.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ProtocolSession for MockSession {
    async fn send_command(&self, command: ProtocolCommand) -> CoverageResult<Value> {
        let gates: Vec<_> = {
            let mut state = lock(&self.state);
            state.history.push(command.clone());
            state
                .gates
                .iter()
                .filter(|g| g.matches(&command))
                .map(|g| g.released.clone())
                .collect()
        };
        for mut released in gates {
            // A dropped gate counts as released.
            let _ = released.wait_for(|open| *open).await;
        }

        let responder = lock(&self.state).responders.get(command.method).cloned();
        match responder {
            Some(responder) => responder(&command.params),
            None => Self::builtin_response(&lock(&self.state), &command),
        }
    }

    fn subscribe(&self, event: &str, sink: EventSink) -> CoverageResult<EventSubscription> {
        Ok(self.router.subscribe(event, sink))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_unknown_method_answers_empty_object() {
        let mock = MockSession::new();
        let result = mock
            .send_command(ProtocolCommand::new(methods::PROFILER_ENABLE))
            .await
            .unwrap();
        assert_eq!(result, json!({}));
        assert!(mock.was_called(methods::PROFILER_ENABLE));
        assert_eq!(mock.history().len(), 1);
    }

    #[tokio::test]
    async fn test_responders_and_failures() {
        let mock = MockSession::new();
        mock.respond(methods::PROFILER_TAKE_PRECISE_COVERAGE, json!({"result": []}));
        mock.fail(methods::CSS_ENABLE, "CSS agent was not enabled");

        let snapshot = mock
            .send_command(ProtocolCommand::new(methods::PROFILER_TAKE_PRECISE_COVERAGE))
            .await
            .unwrap();
        assert_eq!(snapshot, json!({"result": []}));

        let err = mock
            .send_command(ProtocolCommand::new(methods::CSS_ENABLE))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("CSS agent was not enabled"));
    }

    #[tokio::test]
    async fn test_builtin_sources() {
        let mock = MockSession::new();
        mock.add_script_source("1", "var a;");
        let found = mock
            .send_command(ProtocolCommand::with_params(
                methods::DEBUGGER_GET_SCRIPT_SOURCE,
                json!({"scriptId": "1"}),
            ))
            .await
            .unwrap();
        assert_eq!(found["scriptSource"], "var a;");

        let missing = mock
            .send_command(ProtocolCommand::with_params(
                methods::CSS_GET_STYLE_SHEET_TEXT,
                json!({"styleSheetId": "nope"}),
            ))
            .await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn test_gate_holds_until_released() {
        let mock = Arc::new(MockSession::new());
        let gate = mock.hold(methods::DEBUGGER_ENABLE);

        let pending = {
            let mock = Arc::clone(&mock);
            tokio::spawn(async move {
                mock.send_command(ProtocolCommand::new(methods::DEBUGGER_ENABLE))
                    .await
            })
        };
        assert!(mock.wait_for_calls(methods::DEBUGGER_ENABLE, 1).await);
        assert!(!pending.is_finished());

        gate.release();
        assert!(pending.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_emit_reaches_subscribers() {
        let mock = MockSession::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = mock.subscribe(methods::EVENT_SCRIPT_PARSED, tx).unwrap();
        assert_eq!(mock.listener_count(methods::EVENT_SCRIPT_PARSED), 1);

        assert_eq!(mock.emit_script_parsed("3", "a.js"), 1);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.params["scriptId"], "3");

        drop(sub);
        assert_eq!(mock.emit_script_parsed("4", "b.js"), 0);
    }
}
