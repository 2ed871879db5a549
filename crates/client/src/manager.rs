//! Lifecycle manager: one connection epoch per readiness/dependency key.
//!
//! An epoch is bounded by the readiness signal and the dependency-set
//! identity. On every [`apply`](LifecycleManager::apply) the manager tears
//! down the stale epoch (teardown is *issued* before the next build
//! begins), builds a replacement through the connection factory with the
//! shared handler registry, wires the status emitter, and conditionally
//! issues the start. Each epoch owns a guard token, cancelled
//! synchronously before `stop`; the start's asynchronous continuation
//! consults that token, never the connection's own state, so a start can
//! never land after teardown began for its epoch.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, ConfigError};
use crate::connection::HubConnection;
use crate::handlers::HandlerRegistry;
use crate::methods::HubProxy;
use crate::status::{StatusSnapshot, StatusWatch};
use crate::transport::Transport;
use crate::types::{ConnectionState, ErrorNotice, LifecycleInput};

/// Manager phase, observable for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Starting,
    Started,
    Stopping,
}

type EpochKey = (Option<String>, Option<Vec<String>>);

struct Epoch {
    key: EpochKey,
    conn: Arc<HubConnection>,
    /// Cancelled synchronously at teardown, before `stop` is issued.
    guard: CancellationToken,
    start_issued: bool,
}

/// Owns one hub connection per epoch and the surfaces around it.
pub struct LifecycleManager {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    handlers: Arc<HandlerRegistry>,
    status: Arc<StatusWatch>,
    errors_tx: mpsc::Sender<ErrorNotice>,
    errors_rx: Mutex<Option<mpsc::Receiver<ErrorNotice>>>,
    phase: Arc<std::sync::Mutex<Phase>>,
    current: Mutex<Option<Epoch>>,
}

impl LifecycleManager {
    /// Creates a manager. Fails only on malformed configuration.
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self, ConfigError> {
        config.validate()?;
        let (errors_tx, errors_rx) = mpsc::channel(64);
        Ok(Self {
            config,
            transport,
            handlers: Arc::new(HandlerRegistry::new()),
            status: Arc::new(StatusWatch::new()),
            errors_tx,
            errors_rx: Mutex::new(Some(errors_rx)),
            phase: Arc::new(std::sync::Mutex::new(Phase::Idle)),
            current: Mutex::new(None),
        })
    }

    /// Takes the error-sink receiver. Can only be called once.
    pub async fn take_errors(&self) -> Option<mpsc::Receiver<ErrorNotice>> {
        self.errors_rx.lock().await.take()
    }

    /// Subscribes to status snapshots.
    pub fn status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.subscribe()
    }

    /// Current status snapshot. Replace-only; treat as a value.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.status.current()
    }

    pub fn phase(&self) -> Phase {
        self.phase.lock().map(|p| *p).unwrap_or(Phase::Idle)
    }

    /// The shared handler registry. Registrations made here survive
    /// connection rebuilds across epochs.
    pub fn handlers(&self) -> Arc<HandlerRegistry> {
        self.handlers.clone()
    }

    /// The current epoch's connection, if one exists.
    pub async fn connection(&self) -> Option<Arc<HubConnection>> {
        self.current.lock().await.as_ref().map(|e| e.conn.clone())
    }

    /// A method wrapper over the current epoch's connection.
    pub async fn proxy(&self) -> Option<HubProxy> {
        let conn = self.connection().await?;
        Some(HubProxy::new(conn, self.errors_tx.clone()))
    }

    /// Drives the epoch state machine from a readiness/dependency input.
    ///
    /// Teardown of a stale epoch always completes (is issued) before the
    /// next epoch's connection is constructed; together with the lock held
    /// across this method that keeps at most one connection live.
    pub async fn apply(&self, input: LifecycleInput) -> Result<(), ConfigError> {
        let mut current = self.current.lock().await;
        let key: EpochKey = (input.identity.clone(), input.dependencies.clone());

        if let Some(epoch) = current.as_mut()
            && input.ready
            && epoch.key == key
        {
            // Same epoch. A start condition that has since become true
            // issues the start on the existing unstarted connection.
            if input.start_condition {
                self.issue_start(epoch);
            }
            return Ok(());
        }

        if let Some(epoch) = current.take() {
            self.teardown(epoch).await;
        }

        if !input.ready {
            return Ok(());
        }

        debug!(identity = ?key.0, "beginning new epoch");
        let conn = HubConnection::build(&self.config, self.transport.clone(), self.handlers.clone())?;
        self.status.wire(&conn);

        let mut epoch = Epoch {
            key,
            conn,
            guard: CancellationToken::new(),
            start_issued: false,
        };
        if input.start_condition {
            self.issue_start(&mut epoch);
        }
        *current = Some(epoch);
        Ok(())
    }

    /// Tears down the current epoch, if any. Unconditional and idempotent.
    pub async fn shutdown(&self) {
        let mut current = self.current.lock().await;
        if let Some(epoch) = current.take() {
            self.teardown(epoch).await;
        }
        info!("lifecycle manager shut down");
    }

    /// Cancels the epoch guard *before* issuing stop: a pending start's
    /// continuation checks the guard, not the connection's (asynchronously
    /// updated) state, so it cannot land after this point.
    async fn teardown(&self, epoch: Epoch) {
        self.set_phase(Phase::Stopping);
        epoch.guard.cancel();
        epoch.conn.stop().await;
        self.set_phase(Phase::Idle);
        debug!("epoch torn down");
    }

    /// Issues the asynchronous start for an epoch, at most once, and only
    /// for a connection still in `Disconnected`.
    fn issue_start(&self, epoch: &mut Epoch) {
        if epoch.start_issued {
            return;
        }
        if !matches!(epoch.conn.state(), ConnectionState::Disconnected) {
            return;
        }
        epoch.start_issued = true;
        self.set_phase(Phase::Starting);

        let conn = epoch.conn.clone();
        let guard = epoch.guard.clone();
        let status = self.status.clone();
        let errors = self.errors_tx.clone();
        let phase = self.phase.clone();

        tokio::spawn(async move {
            let result = conn.start().await;
            if guard.is_cancelled() {
                debug!("start completed after teardown, ignoring");
                return;
            }
            match result {
                Ok(()) => {
                    if let Ok(mut p) = phase.lock() {
                        *p = Phase::Started;
                    }
                    status.publish(&conn);
                }
                Err(e) => {
                    warn!(error = %e, "hub connection failed");
                    let notice = ErrorNotice::long(format!("hub connection failed: {e}"));
                    if errors.try_send(notice).is_err() {
                        warn!("error sink full or gone, notice dropped");
                    }
                    if let Ok(mut p) = phase.lock() {
                        *p = Phase::Idle;
                    }
                    // Observers still see the resulting Disconnected state.
                    status.publish(&conn);
                }
            }
        });
    }

    fn set_phase(&self, new_phase: Phase) {
        if let Ok(mut p) = self.phase.lock() {
            *p = new_phase;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Link, TransportError};
    use async_trait::async_trait;

    struct DownTransport;

    #[async_trait]
    impl Transport for DownTransport {
        async fn dial(&self, _url: &str) -> Result<Link, TransportError> {
            Err(TransportError::Dial("unreachable".into()))
        }
    }

    fn manager() -> LifecycleManager {
        LifecycleManager::new(ClientConfig::new("ws://hub.local/link"), Arc::new(DownTransport))
            .unwrap()
    }

    #[test]
    fn new_rejects_malformed_config() {
        let result =
            LifecycleManager::new(ClientConfig::new("not a url"), Arc::new(DownTransport));
        assert!(matches!(result, Err(ConfigError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn take_errors_once() {
        let mgr = manager();
        assert!(mgr.take_errors().await.is_some());
        assert!(mgr.take_errors().await.is_none());
    }

    #[tokio::test]
    async fn not_ready_input_builds_nothing() {
        let mgr = manager();
        mgr.apply(LifecycleInput::not_ready()).await.unwrap();
        assert!(mgr.connection().await.is_none());
        assert_eq!(mgr.phase(), Phase::Idle);
        assert_eq!(mgr.snapshot().revision, 0);
    }

    #[tokio::test]
    async fn ready_without_start_condition_builds_unstarted_connection() {
        let mgr = manager();
        let input = LifecycleInput {
            start_condition: false,
            ..LifecycleInput::ready("user-1")
        };
        mgr.apply(input).await.unwrap();

        let conn = mgr.connection().await.expect("epoch exists");
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(mgr.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let mgr = manager();
        mgr.apply(LifecycleInput::ready("user-1")).await.unwrap();
        mgr.shutdown().await;
        mgr.shutdown().await;
        assert!(mgr.connection().await.is_none());
        assert_eq!(mgr.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn proxy_requires_an_epoch() {
        let mgr = manager();
        assert!(mgr.proxy().await.is_none());
        mgr.apply(LifecycleInput::ready("user-1")).await.unwrap();
        assert!(mgr.proxy().await.is_some());
    }
}
