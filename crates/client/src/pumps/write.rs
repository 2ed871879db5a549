//! Outbound pump: frame encoding, keepalive, and socket writes in one task.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use hublink_protocol::Frame;
use hublink_protocol::constants::WS_PING_PERIOD;

/// Drains outbound [`Frame`]s and control messages into the socket.
///
/// Frames are serialised to text here, so nothing outside the pumps ever
/// touches `tungstenite` message types; an unencodable frame is dropped
/// with a warning rather than killing the link. Keepalive pings go out
/// every [`WS_PING_PERIOD`] from the same task, which keeps all writes on
/// one sink without sharing it. Sends a close frame on exit.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut frames_rx: mpsc::Receiver<Frame>,
    mut control_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    let mut keepalive = tokio::time::interval(WS_PING_PERIOD);
    keepalive.tick().await; // Skip immediate first tick.

    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frames_rx.recv() => match frame {
                Some(f) => match encode(&f) {
                    Some(m) => m,
                    None => continue,
                },
                None => break,
            },
            ctrl = control_rx.recv() => match ctrl {
                Some(m) => m,
                None => break,
            },
            _ = keepalive.tick() => tungstenite::Message::Ping(vec![].into()),
        };

        if let Err(e) = write.send(msg).await {
            error!("WebSocket write error: {e}");
            break;
        }
    }

    let _ = write.send(tungstenite::Message::Close(None)).await;
}

fn encode(frame: &Frame) -> Option<tungstenite::Message> {
    match serde_json::to_string(frame) {
        Ok(json) => Some(tungstenite::Message::Text(json.into())),
        Err(e) => {
            warn!(id = %frame.id, "failed to encode frame: {e}");
            None
        }
    }
}
