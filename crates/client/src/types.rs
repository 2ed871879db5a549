//! Public types for the hub connection lifecycle manager.

use std::time::Duration;

use rand::Rng;

/// Connection state for a hub connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Built but not started, or terminally closed.
    Disconnected,
    /// Initial dial in progress.
    Connecting,
    /// Link established.
    Connected,
    /// Link lost, attempting to re-establish.
    Reconnecting { attempt: u32 },
    /// Teardown requested, link closing.
    Disconnecting,
}

/// External readiness signal plus dependency set, pushed into
/// [`LifecycleManager::apply`](crate::manager::LifecycleManager::apply).
///
/// `(identity, dependencies)` keys an epoch: a change to either while
/// `ready` stays true forces a rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleInput {
    /// Whether a connection should exist at all.
    pub ready: bool,
    /// Opaque session identity (e.g. the signed-in user).
    pub identity: Option<String>,
    /// Dependency set; identity change forces a new epoch.
    pub dependencies: Option<Vec<String>>,
    /// When false, the epoch's connection is built but never started.
    pub start_condition: bool,
}

impl Default for LifecycleInput {
    fn default() -> Self {
        Self {
            ready: false,
            identity: None,
            dependencies: None,
            start_condition: true,
        }
    }
}

impl LifecycleInput {
    /// A ready signal with the given identity and default remaining fields.
    pub fn ready(identity: impl Into<String>) -> Self {
        Self {
            ready: true,
            identity: Some(identity.into()),
            ..Self::default()
        }
    }

    /// A not-ready signal.
    pub fn not_ready() -> Self {
        Self::default()
    }
}

/// How long the error-display collaborator should keep a notice visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayDuration {
    Short,
    Long,
    OneDay,
}

/// A failure notice routed to the external error sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorNotice {
    pub message: String,
    pub duration: DisplayDuration,
}

impl ErrorNotice {
    pub fn long(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            duration: DisplayDuration::Long,
        }
    }
}

/// Reconnection delay policy: uniform random jitter, unlimited attempts.
///
/// Every attempt draws its delay uniformly from `[0, max_jitter)`,
/// independent of the attempt count. Deliberate trade-off: no exponential
/// backoff, but no thundering-herd synchronization across many clients
/// reconnecting at once, and retries never give up until the epoch is
/// torn down.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Upper bound (exclusive) for the per-attempt delay.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_jitter: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// Delay before the given attempt (1-based). The attempt number does
    /// not influence the draw; it is kept for logging parity.
    pub fn delay_for_attempt(&self, _attempt: u32) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        let ms = rand::rng().random_range(0..max_ms.max(1));
        Duration::from_millis(ms)
    }
}
