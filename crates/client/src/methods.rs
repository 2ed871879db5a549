//! Method wrapper: centralizes error routing for outbound calls.
//!
//! A composition layer over an owned connection, not a mutation of it.
//! `send`/`invoke` failures are forwarded exactly once to the error sink
//! and suppressed; callers needing local failure handling cannot get it
//! through this path — a deliberate trade-off. `stream` is left unwrapped
//! so streaming consumers keep direct failure visibility for their own
//! retry logic.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

use hublink_protocol::Frame;

use crate::connection::{CallError, HubConnection, StreamItem};
use crate::handlers::HandlerId;
use crate::types::ErrorNotice;

/// Wraps a connection's call surface with sink-routed error handling.
pub struct HubProxy {
    conn: Arc<HubConnection>,
    errors: mpsc::Sender<ErrorNotice>,
}

impl HubProxy {
    pub fn new(conn: Arc<HubConnection>, errors: mpsc::Sender<ErrorNotice>) -> Self {
        Self { conn, errors }
    }

    /// Fire-and-forget. A failure goes to the sink; the caller's
    /// continuation never observes it.
    pub async fn send<T: Serialize>(&self, target: &str, args: Option<&T>) {
        if let Err(e) = self.conn.send(target, args).await {
            self.report(format!("failed to send {target}: {e}"));
        }
    }

    /// Request/response. Returns the reply on success, `None` after a
    /// suppressed failure.
    pub async fn invoke<T: Serialize>(&self, target: &str, args: Option<&T>) -> Option<Frame> {
        match self.conn.invoke(target, args).await {
            Ok(frame) => Some(frame),
            Err(e) => {
                self.report(format!("failed to invoke {target}: {e}"));
                None
            }
        }
    }

    /// Server-to-client stream, passed through unwrapped: failures
    /// propagate to the caller untouched and never reach the sink.
    pub async fn stream<T: Serialize>(
        &self,
        target: &str,
        args: Option<&T>,
    ) -> Result<mpsc::Receiver<StreamItem>, CallError> {
        self.conn.stream(target, args).await
    }

    /// Handler registration, passed through to the wrapped connection.
    pub fn on(
        &self,
        target: impl Into<String>,
        handler: impl Fn(Frame) + Send + Sync + 'static,
    ) -> HandlerId {
        self.conn.on(target, handler)
    }

    pub fn off(&self, target: &str, id: HandlerId) -> bool {
        self.conn.off(target, id)
    }

    pub fn connection(&self) -> &Arc<HubConnection> {
        &self.conn
    }

    fn report(&self, message: String) {
        warn!("{message}");
        if self.errors.try_send(ErrorNotice::long(message)).is_err() {
            warn!("error sink full or gone, notice dropped");
        }
    }
}
