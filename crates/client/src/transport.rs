//! Transport seam: dialing a hub yields a framed, cancellable link.
//!
//! The lifecycle manager and connection are written against this trait so
//! tests can substitute channel-backed links; [`WsTransport`](crate::ws)
//! is the bundled production implementation.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;

use hublink_protocol::Frame;

/// Errors from a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("dial failed: {0}")]
    Dial(String),

    #[error("link closed")]
    Closed,
}

/// An established link to the hub.
///
/// Frames pushed into `outbound` go to the hub; frames from the hub arrive
/// on `inbound`. The link is dead once `inbound` closes; cancelling
/// `cancel` closes it from this side.
pub struct Link {
    pub outbound: mpsc::Sender<Frame>,
    pub inbound: mpsc::Receiver<Frame>,
    pub cancel: CancellationToken,
}

/// Dials a hub address into a live [`Link`].
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn dial(&self, url: &str) -> Result<Link, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_display() {
        let err = TransportError::Dial("network down".into());
        assert_eq!(err.to_string(), "dial failed: network down");

        let err = TransportError::Closed;
        assert_eq!(err.to_string(), "link closed");
    }
}
