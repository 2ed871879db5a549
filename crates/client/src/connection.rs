//! One hub connection: a single epoch's link to the remote hub.
//!
//! Built by [`HubConnection::build`] in `Disconnected`, started once,
//! stopped unconditionally. Outbound calls are UUID-correlated over the
//! transport link; inbound push frames go through the shared handler
//! registry. Mid-session link loss is serviced by the run loop in
//! [`crate::reconnection`] — the owner only observes transitions through
//! the close/reconnecting/reconnected hooks.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use hublink_protocol::{Frame, FrameKind};

use crate::config::{ClientConfig, ConfigError};
use crate::handlers::{HandlerId, HandlerRegistry};
use crate::transport::{Link, Transport, TransportError};
use crate::types::{ConnectionState, RetryPolicy};

/// Errors from starting a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("connection already started")]
    AlreadyStarted,

    #[error("connection stopped")]
    Stopped,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors from outbound calls.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("request timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,

    #[error("hub error {code}: {message}")]
    Hub { code: i32, message: String },
}

/// One item of a server-to-client stream.
pub type StreamItem = Result<Frame, CallError>;

type TransitionHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct TransitionHooks {
    on_close: std::sync::Mutex<Option<TransitionHook>>,
    on_reconnecting: std::sync::Mutex<Option<TransitionHook>>,
    on_reconnected: std::sync::Mutex<Option<TransitionHook>>,
}

/// A hub connection for one lifecycle epoch.
pub struct HubConnection {
    url: String,
    request_timeout: Duration,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    handlers: Arc<HandlerRegistry>,
    state: std::sync::Mutex<ConnectionState>,
    /// Assigned only once fully established; fresh per (re)connect.
    connection_id: std::sync::Mutex<Option<String>>,
    pending: Mutex<HashMap<String, oneshot::Sender<Frame>>>,
    streams: Mutex<HashMap<String, mpsc::Sender<StreamItem>>>,
    outbound: Mutex<Option<mpsc::Sender<Frame>>>,
    hooks: TransitionHooks,
    /// Cancelled by [`stop`](Self::stop); every asynchronous continuation
    /// consults it before applying state.
    cancel: CancellationToken,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl HubConnection {
    /// Builds a connection in `Disconnected` with the retry policy from
    /// the config attached. No side effects beyond allocation; network
    /// conditions surface later, at [`start`](Self::start).
    pub fn build(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        handlers: Arc<HandlerRegistry>,
    ) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        Ok(Arc::new(Self {
            url: config.url.clone(),
            request_timeout: config.request_timeout,
            transport,
            retry: config.retry.clone(),
            handlers,
            state: std::sync::Mutex::new(ConnectionState::Disconnected),
            connection_id: std::sync::Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            streams: Mutex::new(HashMap::new()),
            outbound: Mutex::new(None),
            hooks: TransitionHooks::default(),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }))
    }

    /// Dials the hub and spawns the run loop. Callable once.
    ///
    /// If [`stop`](Self::stop) lands while the dial is in flight, the
    /// completion applies no state and returns [`ConnectError::Stopped`].
    pub async fn start(self: &Arc<Self>) -> Result<(), ConnectError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ConnectError::AlreadyStarted);
        }
        if self.cancel.is_cancelled() {
            return Err(ConnectError::Stopped);
        }

        self.set_state(ConnectionState::Connecting);
        let link = match self.transport.dial(&self.url).await {
            Ok(link) => link,
            Err(e) => {
                if !self.cancel.is_cancelled() {
                    self.set_state(ConnectionState::Disconnected);
                }
                return Err(e.into());
            }
        };

        if !self.install_link(&link).await {
            return Err(ConnectError::Stopped);
        }
        debug!(url = %self.url, "connected to hub");
        tokio::spawn(crate::reconnection::run_loop(self.clone(), link));
        Ok(())
    }

    /// Tears the connection down. Safe to call in any state, including
    /// before a start ever began; idempotent; never fails.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.set_state(ConnectionState::Disconnecting);
        self.cancel.cancel();
        self.clear_link().await;
        self.fail_inflight().await;
        if let Ok(mut id) = self.connection_id.lock() {
            *id = None;
        }
        self.set_state(ConnectionState::Disconnected);
        debug!("connection stopped");
        self.fire_close();
    }

    /// Fire-and-forget invocation.
    pub async fn send<T: Serialize>(&self, target: &str, args: Option<&T>) -> Result<(), CallError> {
        let out = self.outbound.lock().await.clone().ok_or(CallError::Closed)?;
        let id = uuid::Uuid::new_v4().to_string();
        let frame = Frame::new(&id, FrameKind::Send, Some(target), args)?;
        out.send(frame).await.map_err(|_| CallError::Closed)
    }

    /// Request/response invocation with timeout.
    pub async fn invoke<T: Serialize>(
        &self,
        target: &str,
        args: Option<&T>,
    ) -> Result<Frame, CallError> {
        let out = self.outbound.lock().await.clone().ok_or(CallError::Closed)?;
        let id = uuid::Uuid::new_v4().to_string();
        let frame = Frame::new(&id, FrameKind::Invoke, Some(target), args)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        if out.send(frame).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(CallError::Closed);
        }

        let result = tokio::time::timeout(self.request_timeout, rx).await;

        // Clean up pending entry on any exit path.
        self.pending.lock().await.remove(&id);

        match result {
            Ok(Ok(resp)) => {
                if let Some(err) = &resp.error {
                    return Err(CallError::Hub {
                        code: err.code,
                        message: err.message.clone(),
                    });
                }
                Ok(resp)
            }
            Ok(Err(_)) => Err(CallError::Closed),
            Err(_) => Err(CallError::Timeout),
        }
    }

    /// Opens a server-to-client item stream. The receiver yields items
    /// until the hub completes the stream; a hub-side failure arrives as
    /// an `Err` item. Failures here stay with the caller.
    pub async fn stream<T: Serialize>(
        &self,
        target: &str,
        args: Option<&T>,
    ) -> Result<mpsc::Receiver<StreamItem>, CallError> {
        let out = self.outbound.lock().await.clone().ok_or(CallError::Closed)?;
        let id = uuid::Uuid::new_v4().to_string();
        let frame = Frame::new(&id, FrameKind::StreamInvoke, Some(target), args)?;

        let (tx, rx) = mpsc::channel(32);
        self.streams.lock().await.insert(id.clone(), tx);

        if out.send(frame).await.is_err() {
            self.streams.lock().await.remove(&id);
            return Err(CallError::Closed);
        }
        Ok(rx)
    }

    /// Registers an inbound handler on the shared registry.
    pub fn on(
        &self,
        target: impl Into<String>,
        handler: impl Fn(Frame) + Send + Sync + 'static,
    ) -> HandlerId {
        self.handlers.on(target, handler)
    }

    /// Removes an inbound handler from the shared registry.
    pub fn off(&self, target: &str, id: HandlerId) -> bool {
        self.handlers.off(target, id)
    }

    /// Current logical state.
    pub fn state(&self) -> ConnectionState {
        self.state
            .lock()
            .map(|s| s.clone())
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Connection identifier, present only while established.
    pub fn connection_id(&self) -> Option<String> {
        self.connection_id.lock().map(|id| id.clone()).unwrap_or(None)
    }

    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }

    pub(crate) fn set_on_close(&self, cb: impl Fn() + Send + Sync + 'static) {
        if let Ok(mut slot) = self.hooks.on_close.lock() {
            *slot = Some(Arc::new(cb));
        }
    }

    pub(crate) fn set_on_reconnecting(&self, cb: impl Fn() + Send + Sync + 'static) {
        if let Ok(mut slot) = self.hooks.on_reconnecting.lock() {
            *slot = Some(Arc::new(cb));
        }
    }

    pub(crate) fn set_on_reconnected(&self, cb: impl Fn() + Send + Sync + 'static) {
        if let Ok(mut slot) = self.hooks.on_reconnected.lock() {
            *slot = Some(Arc::new(cb));
        }
    }

    // ---- run-loop support -------------------------------------------------

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub(crate) fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub(crate) async fn dial(&self) -> Result<Link, TransportError> {
        self.transport.dial(&self.url).await
    }

    /// Adopts a freshly dialed link, minting a new connection id. Refuses
    /// (and cancels the link) if `stop` already ran, so a racing start or
    /// reconnect cannot resurrect a stopped connection.
    pub(crate) async fn install_link(&self, link: &Link) -> bool {
        let mut out = self.outbound.lock().await;
        if self.is_stopped() {
            link.cancel.cancel();
            return false;
        }
        *out = Some(link.outbound.clone());
        if let Ok(mut id) = self.connection_id.lock() {
            *id = Some(uuid::Uuid::new_v4().to_string());
        }
        self.set_state(ConnectionState::Connected);
        true
    }

    pub(crate) async fn clear_link(&self) {
        self.outbound.lock().await.take();
    }

    /// Fails every in-flight invocation and stream with `Closed`.
    pub(crate) async fn fail_inflight(&self) {
        // Dropping the oneshot senders wakes the invoke continuations.
        self.pending.lock().await.clear();
        let mut streams = self.streams.lock().await;
        for (_, tx) in streams.drain() {
            let _ = tx.try_send(Err(CallError::Closed));
        }
    }

    /// Routes one inbound frame.
    pub(crate) async fn dispatch(&self, frame: Frame) {
        match frame.kind {
            FrameKind::Result => {
                let mut pending = self.pending.lock().await;
                if let Some(tx) = pending.remove(&frame.id) {
                    let _ = tx.send(frame);
                } else {
                    warn!(id = %frame.id, "result frame with no pending invocation, dropping");
                }
            }
            FrameKind::StreamItem => {
                let streams = self.streams.lock().await;
                if let Some(tx) = streams.get(&frame.id) {
                    if let Err(e) = tx.try_send(Ok(frame)) {
                        warn!("stream consumer lagging or gone: {e}");
                    }
                } else {
                    warn!(id = %frame.id, "stream item with no open stream, dropping");
                }
            }
            FrameKind::StreamEnd => {
                let mut streams = self.streams.lock().await;
                if let Some(tx) = streams.remove(&frame.id)
                    && let Some(err) = frame.error
                {
                    let _ = tx.try_send(Err(CallError::Hub {
                        code: err.code,
                        message: err.message,
                    }));
                }
            }
            FrameKind::Send | FrameKind::Invoke => self.handlers.dispatch(&frame),
            FrameKind::StreamInvoke | FrameKind::Unknown => {
                warn!(kind = ?frame.kind, id = %frame.id, "unexpected inbound frame, dropping");
            }
        }
    }

    pub(crate) fn set_state(&self, new_state: ConnectionState) {
        if let Ok(mut state) = self.state.lock() {
            *state = new_state;
        }
    }

    /// Moves to `Reconnecting` unless teardown already began. The stopped
    /// check and the write happen under the state lock `stop` transitions
    /// through: a stop that raced past the check still overwrites this on
    /// its way to `Disconnected`, and a stop observed by the check makes
    /// the reconnect loop exit without touching state at all.
    pub(crate) fn begin_reconnect_attempt(&self, attempt: u32) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if self.stopped.load(Ordering::SeqCst) {
            return false;
        }
        *state = ConnectionState::Reconnecting { attempt };
        true
    }

    pub(crate) fn fire_close(&self) {
        Self::fire(&self.hooks.on_close);
    }

    pub(crate) fn fire_reconnecting(&self) {
        Self::fire(&self.hooks.on_reconnecting);
    }

    pub(crate) fn fire_reconnected(&self) {
        Self::fire(&self.hooks.on_reconnected);
    }

    /// Clones the hook out of its slot before invoking it, so callbacks
    /// never run under the slot lock.
    fn fire(slot: &std::sync::Mutex<Option<TransitionHook>>) {
        let cb = slot.lock().ok().and_then(|guard| guard.clone());
        if let Some(cb) = cb {
            cb();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hublink_protocol::constants::ERR_CODE_NOT_FOUND;

    /// Transport whose dials always fail.
    struct DownTransport;

    #[async_trait]
    impl Transport for DownTransport {
        async fn dial(&self, _url: &str) -> Result<Link, TransportError> {
            Err(TransportError::Dial("network down".into()))
        }
    }

    fn build_conn() -> Arc<HubConnection> {
        HubConnection::build(
            &ClientConfig::new("ws://hub.local/link"),
            Arc::new(DownTransport),
            Arc::new(HandlerRegistry::new()),
        )
        .unwrap()
    }

    #[test]
    fn build_yields_disconnected_unstarted() {
        let conn = build_conn();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.connection_id().is_none());
    }

    #[test]
    fn build_rejects_malformed_config() {
        let result = HubConnection::build(
            &ClientConfig::new("http://hub.local/link"),
            Arc::new(DownTransport),
            Arc::new(HandlerRegistry::new()),
        );
        assert!(matches!(result, Err(ConfigError::UnsupportedScheme(_))));
    }

    #[tokio::test]
    async fn start_failure_returns_to_disconnected() {
        let conn = build_conn();
        let result = conn.start().await;
        assert!(matches!(
            result,
            Err(ConnectError::Transport(TransportError::Dial(_)))
        ));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.connection_id().is_none());
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let conn = build_conn();
        let _ = conn.start().await;
        let result = conn.start().await;
        assert!(matches!(result, Err(ConnectError::AlreadyStarted)));
    }

    #[tokio::test]
    async fn start_after_stop_applies_nothing() {
        let conn = build_conn();
        conn.stop().await;
        let result = conn.start().await;
        assert!(matches!(result, Err(ConnectError::Stopped)));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_safe_before_start() {
        let conn = build_conn();
        conn.stop().await;
        conn.stop().await;
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn stop_fires_close_hook_once() {
        let conn = build_conn();
        let closes = Arc::new(AtomicBool::new(false));
        let c = closes.clone();
        conn.set_on_close(move || {
            assert!(!c.swap(true, Ordering::SeqCst), "close fired twice");
        });
        conn.stop().await;
        conn.stop().await;
        assert!(closes.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn reconnect_transition_refused_after_stop() {
        let conn = build_conn();
        assert!(conn.begin_reconnect_attempt(1));
        assert_eq!(conn.state(), ConnectionState::Reconnecting { attempt: 1 });

        conn.stop().await;
        assert!(!conn.begin_reconnect_attempt(2));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn calls_without_link_fail_closed() {
        let conn = build_conn();
        assert!(matches!(
            conn.send::<()>("Notify", None).await,
            Err(CallError::Closed)
        ));
        assert!(matches!(
            conn.invoke::<()>("Echo", None).await,
            Err(CallError::Closed)
        ));
        assert!(matches!(
            conn.stream::<()>("Feed", None).await,
            Err(CallError::Closed)
        ));
    }

    #[tokio::test]
    async fn dispatch_routes_result_to_pending() {
        let conn = build_conn();
        let (tx, rx) = oneshot::channel();
        conn.pending.lock().await.insert("req-1".into(), tx);

        let frame = Frame::new::<()>("req-1", FrameKind::Result, None, None).unwrap();
        conn.dispatch(frame).await;

        let resp = rx.await.unwrap();
        assert_eq!(resp.id, "req-1");
        assert!(conn.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn dispatch_routes_error_reply_to_pending() {
        let conn = build_conn();
        let (tx, rx) = oneshot::channel();
        conn.pending.lock().await.insert("req-2".into(), tx);

        let frame = Frame::error("req-2", ERR_CODE_NOT_FOUND, "no such method");
        conn.dispatch(frame).await;

        let resp = rx.await.unwrap();
        let err = resp.error.expect("error reply carries details");
        assert_eq!(err.code, ERR_CODE_NOT_FOUND);
    }

    #[tokio::test]
    async fn dispatch_routes_push_to_handlers() {
        let conn = build_conn();
        let hits = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let h = hits.clone();
        conn.on("Tick", move |_| {
            h.fetch_add(1, Ordering::Relaxed);
        });

        let frame = Frame::new::<()>("push-1", FrameKind::Send, Some("Tick"), None).unwrap();
        conn.dispatch(frame).await;
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn fail_inflight_closes_pending_and_streams() {
        let conn = build_conn();
        let (tx, rx) = oneshot::channel();
        conn.pending.lock().await.insert("req-1".into(), tx);
        let (stx, mut srx) = mpsc::channel(4);
        conn.streams.lock().await.insert("stream-1".into(), stx);

        conn.fail_inflight().await;

        assert!(rx.await.is_err());
        assert!(matches!(srx.recv().await, Some(Err(CallError::Closed))));
        assert!(srx.recv().await.is_none());
    }
}
