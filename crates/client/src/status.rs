//! Status snapshots: immutable, revision-stamped views of a connection.
//!
//! Every close/reconnecting/reconnected transition publishes a fresh
//! snapshot through a `watch` channel, bumping the revision even when no
//! logical field changed — observers rely on snapshot identity, not field
//! diffing, to know a transition occurred (e.g. "still reconnecting"
//! pulses).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

use crate::connection::HubConnection;
use crate::types::ConnectionState;

/// Point-in-time view of a connection. Replace-only; never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Increments on every publish; the identity observers compare.
    pub revision: u64,
    pub state: ConnectionState,
    pub connection_id: Option<String>,
}

impl StatusSnapshot {
    fn initial() -> Self {
        Self {
            revision: 0,
            state: ConnectionState::Disconnected,
            connection_id: None,
        }
    }
}

/// Publishes snapshots on connection transitions.
pub struct StatusWatch {
    tx: watch::Sender<StatusSnapshot>,
    revision: AtomicU64,
}

impl Default for StatusWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusWatch {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(StatusSnapshot::initial());
        Self {
            tx,
            revision: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> StatusSnapshot {
        self.tx.borrow().clone()
    }

    /// Copies the connection's observable fields into a fresh snapshot and
    /// publishes it, regardless of whether anything changed.
    pub(crate) fn publish(&self, conn: &HubConnection) {
        let snapshot = StatusSnapshot {
            revision: self.revision.fetch_add(1, Ordering::SeqCst) + 1,
            state: conn.state(),
            connection_id: conn.connection_id(),
        };
        let _ = self.tx.send(snapshot);
    }

    /// Installs the three transition hooks on a connection. Holds only a
    /// weak reference back to it, so hook wiring never keeps an epoch's
    /// connection alive.
    pub(crate) fn wire(self: &Arc<Self>, conn: &Arc<HubConnection>) {
        let watch = self.clone();
        let weak = Arc::downgrade(conn);
        conn.set_on_close(move || {
            if let Some(conn) = weak.upgrade() {
                watch.publish(&conn);
            }
        });

        let watch = self.clone();
        let weak = Arc::downgrade(conn);
        conn.set_on_reconnecting(move || {
            if let Some(conn) = weak.upgrade() {
                watch.publish(&conn);
            }
        });

        let watch = self.clone();
        let weak = Arc::downgrade(conn);
        conn.set_on_reconnected(move || {
            if let Some(conn) = weak.upgrade() {
                watch.publish(&conn);
            }
        });
    }
}
