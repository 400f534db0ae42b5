//! CDP over a page WebSocket.
//!
//! Connects straight to a target's debugger URL (the
//! `webSocketDebuggerUrl` listed by `http://<host>:9222/json`). Commands are
//! matched to responses by id; frames without an id are events and go to the
//! [`EventRouter`].

use crate::protocol::{EventRouter, EventSink, EventSubscription, ProtocolCommand, ProtocolSession};
use crate::result::{CoverageError, CoverageResult};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

#[derive(Serialize)]
struct OutgoingCommand<'a> {
    id: u64,
    method: &'a str,
    params: &'a Value,
}

#[derive(Debug, Deserialize)]
struct IncomingFrame {
    id: Option<u64>,
    method: Option<String>,
    #[serde(default)]
    params: Value,
    result: Option<Value>,
    error: Option<RemoteError>,
}

#[derive(Debug, Deserialize)]
struct RemoteError {
    #[serde(default)]
    code: i64,
    message: String,
}

struct PendingCall {
    method: &'static str,
    reply: oneshot::Sender<CoverageResult<Value>>,
}

#[derive(Default)]
struct CallTable {
    closed: bool,
    pending: HashMap<u64, PendingCall>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Table entry of an outstanding command; removed when dropped, so a
/// cancelled caller leaves nothing behind.
struct PendingCallGuard<'a> {
    calls: &'a Mutex<CallTable>,
    id: u64,
}

impl std::fmt::Debug for PendingCallGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCallGuard")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl<'a> PendingCallGuard<'a> {
    fn register(
        calls: &'a Mutex<CallTable>,
        id: u64,
        method: &'static str,
        reply: oneshot::Sender<CoverageResult<Value>>,
    ) -> CoverageResult<Self> {
        let mut table = lock(calls);
        if table.closed {
            return Err(CoverageError::ConnectionClosed);
        }
        table.pending.insert(id, PendingCall { method, reply });
        Ok(Self { calls, id })
    }
}

impl Drop for PendingCallGuard<'_> {
    fn drop(&mut self) {
        lock(self.calls).pending.remove(&self.id);
    }
}

/// Protocol session backed by a CDP WebSocket
pub struct WebSocketSession {
    next_id: AtomicU64,
    calls: Arc<Mutex<CallTable>>,
    router: Arc<EventRouter>,
    outbound: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl WebSocketSession {
    /// Connect to a target's debugger WebSocket
    pub async fn connect(url: &str) -> CoverageResult<Self> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| CoverageError::ConnectionFailed {
                message: format!("{url}: {e}"),
            })?;
        debug!(url, "connected to debugging target");

        let (mut sink, mut source) = stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if let Err(e) = sink.send(message).await {
                    warn!("debugger socket write failed: {e}");
                    break;
                }
            }
        });

        let calls = Arc::new(Mutex::new(CallTable::default()));
        let router = Arc::new(EventRouter::new());
        let reader = {
            let calls = Arc::clone(&calls);
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                while let Some(frame) = source.next().await {
                    match frame {
                        Ok(Message::Text(text)) => handle_frame(&calls, &router, text.as_str()),
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {}
                        Err(e) => {
                            warn!("debugger socket read failed: {e}");
                            break;
                        }
                    }
                }
                shut_down(&calls, &router);
            })
        };

        Ok(Self {
            next_id: AtomicU64::new(1),
            calls,
            router,
            outbound,
            reader,
            writer,
        })
    }

    /// Whether the connection has gone away
    #[must_use]
    pub fn is_closed(&self) -> bool {
        lock(&self.calls).closed
    }

    /// Ask the target to close the connection
    pub fn close(&self) {
        let _ = self.outbound.send(Message::Close(None));
    }
}

fn handle_frame(calls: &Mutex<CallTable>, router: &EventRouter, text: &str) {
    let frame: IncomingFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("ignoring malformed debugger frame: {e}");
            return;
        }
    };
    if let Some(id) = frame.id {
        let Some(call) = lock(calls).pending.remove(&id) else {
            trace!(id, "response for unknown command");
            return;
        };
        let outcome = match frame.error {
            Some(error) => Err(CoverageError::protocol(
                call.method,
                format!("{} ({})", error.message, error.code),
            )),
            None => Ok(frame.result.unwrap_or_else(|| Value::Object(serde_json::Map::new()))),
        };
        let _ = call.reply.send(outcome);
    } else if let Some(method) = frame.method {
        router.dispatch(&method, &frame.params);
    }
}

fn shut_down(calls: &Mutex<CallTable>, router: &EventRouter) {
    let mut table = lock(calls);
    table.closed = true;
    // Dropping the reply senders wakes every waiter with ConnectionClosed.
    table.pending.clear();
    drop(table);
    router.clear();
    debug!("debugger connection closed");
}

#[async_trait]
impl ProtocolSession for WebSocketSession {
    async fn send_command(&self, command: ProtocolCommand) -> CoverageResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let text = serde_json::to_string(&OutgoingCommand {
            id,
            method: command.method,
            params: &command.params,
        })?;

        let (reply, response) = oneshot::channel();
        let _pending = PendingCallGuard::register(&self.calls, id, command.method, reply)?;

        trace!(id, method = command.method, "sending command");
        if self.outbound.send(Message::Text(text.into())).is_err() {
            return Err(CoverageError::ConnectionClosed);
        }
        response.await.map_err(|_| CoverageError::ConnectionClosed)?
    }

    fn subscribe(&self, event: &str, sink: EventSink) -> CoverageResult<EventSubscription> {
        if self.is_closed() {
            return Err(CoverageError::ConnectionClosed);
        }
        Ok(self.router.subscribe(event, sink))
    }
}

impl Drop for WebSocketSession {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

impl std::fmt::Debug for WebSocketSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketSession")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table_with_call(id: u64) -> (Mutex<CallTable>, oneshot::Receiver<CoverageResult<Value>>) {
        let (reply, response) = oneshot::channel();
        let mut table = CallTable::default();
        table.pending.insert(
            id,
            PendingCall {
                method: "Profiler.enable",
                reply,
            },
        );
        (Mutex::new(table), response)
    }

    #[test]
    fn test_outgoing_shape() {
        let params = json!({"scriptId": "4"});
        let text = serde_json::to_string(&OutgoingCommand {
            id: 7,
            method: "Debugger.getScriptSource",
            params: &params,
        })
        .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({"id": 7, "method": "Debugger.getScriptSource", "params": {"scriptId": "4"}})
        );
    }

    #[test]
    fn test_response_resolves_pending_call() {
        let (calls, mut response) = table_with_call(3);
        let router = EventRouter::new();
        handle_frame(&calls, &router, r#"{"id":3,"result":{"ok":true}}"#);
        assert_eq!(response.try_recv().unwrap().unwrap(), json!({"ok": true}));
        assert!(lock(&calls).pending.is_empty());
    }

    #[test]
    fn test_error_response_names_method() {
        let (calls, mut response) = table_with_call(1);
        let router = EventRouter::new();
        handle_frame(
            &calls,
            &router,
            r#"{"id":1,"error":{"code":-32601,"message":"'Profiler.enable' wasn't found"}}"#,
        );
        let err = response.try_recv().unwrap().unwrap_err();
        assert!(matches!(err, CoverageError::ProtocolCommand { ref method, .. } if method == "Profiler.enable"));
        assert!(err.to_string().contains("-32601"));
    }

    #[test]
    fn test_event_frame_is_routed() {
        let calls = Mutex::new(CallTable::default());
        let router = Arc::new(EventRouter::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = router.subscribe("Debugger.scriptParsed", tx);

        handle_frame(
            &calls,
            &router,
            r#"{"method":"Debugger.scriptParsed","params":{"scriptId":"9","url":"a.js"}}"#,
        );
        let event = rx.try_recv().unwrap();
        assert_eq!(event.params["url"], "a.js");
    }

    #[test]
    fn test_shut_down_fails_pending_and_closes() {
        let (calls, mut response) = table_with_call(5);
        let router = EventRouter::new();
        shut_down(&calls, &router);
        assert!(lock(&calls).closed);
        assert!(response.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cancelled_call_leaves_no_entry() {
        let calls = Mutex::new(CallTable::default());
        let (reply, response) = oneshot::channel();
        let call = async {
            let _pending = PendingCallGuard::register(&calls, 4, "Profiler.enable", reply)?;
            response.await.map_err(|_| CoverageError::ConnectionClosed)?
        };
        let outcome = tokio::time::timeout(std::time::Duration::from_millis(5), call).await;
        assert!(outcome.is_err());
        assert!(lock(&calls).pending.is_empty());
    }

    #[test]
    fn test_register_refused_after_shut_down() {
        let calls = Mutex::new(CallTable::default());
        shut_down(&calls, &EventRouter::new());
        let (reply, _response) = oneshot::channel();
        let err = PendingCallGuard::register(&calls, 1, "CSS.enable", reply).unwrap_err();
        assert!(matches!(err, CoverageError::ConnectionClosed));
    }

    #[test]
    fn test_malformed_frame_ignored() {
        let (calls, _response) = table_with_call(2);
        let router = EventRouter::new();
        handle_frame(&calls, &router, "not json");
        assert_eq!(lock(&calls).pending.len(), 1);
    }
}
