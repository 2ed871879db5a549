//! WebSocket read pump — parses incoming frames.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use hublink_protocol::Frame;
use hublink_protocol::constants::{WS_MAX_MESSAGE_SIZE, WS_PONG_WAIT};

/// Reads messages from the WebSocket, parses them into [`Frame`]s, and
/// forwards them on `inbound_tx`.
///
/// Uses a pong deadline to detect dead links: if no message of any kind
/// arrives within [`WS_PONG_WAIT`], the link is considered dead and the
/// pump exits. Pings are answered through `control_tx`, the write pump's
/// control channel. On exit the cancel token is cancelled (stopping the
/// sibling write pump) and `inbound_tx` is dropped, which is how the
/// connection's run loop observes link loss.
pub(crate) async fn read_pump<S>(
    mut read: S,
    inbound_tx: mpsc::Sender<Frame>,
    control_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let pong_deadline = tokio::time::sleep(WS_PONG_WAIT);
    tokio::pin!(pong_deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            () = &mut pong_deadline => {
                warn!("pong timeout — link dead, closing");
                break;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        // ANY incoming message resets the deadline.
                        pong_deadline.as_mut().reset(tokio::time::Instant::now() + WS_PONG_WAIT);

                        match msg {
                            tungstenite::Message::Text(text) => {
                                if let Some(frame) = parse_frame(&text)
                                    && inbound_tx.send(frame).await.is_err()
                                {
                                    break;
                                }
                            }
                            tungstenite::Message::Ping(data) => {
                                trace!("received ping, sending pong");
                                let _ = control_tx.send(tungstenite::Message::Pong(data)).await;
                            }
                            tungstenite::Message::Pong(_) => {
                                trace!("received pong");
                            }
                            tungstenite::Message::Close(_) => {
                                debug!("received close frame");
                                break;
                            }
                            _ => {} // Binary — ignore
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    cancel.cancel();
}

/// Parses one text message into a [`Frame`]; oversized or malformed
/// messages are dropped with a warning.
fn parse_frame(text: &str) -> Option<Frame> {
    if text.len() > WS_MAX_MESSAGE_SIZE {
        warn!("message too large ({} bytes), dropping", text.len());
        return None;
    }

    match serde_json::from_str::<Frame>(text) {
        Ok(frame) => {
            trace!(kind = ?frame.kind, id = %frame.id, "received frame");
            Some(frame)
        }
        Err(e) => {
            warn!("failed to parse frame: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use hublink_protocol::FrameKind;

    #[test]
    fn parse_frame_roundtrip() {
        let frame = Frame::new::<()>("f-1", FrameKind::Result, None, None).unwrap();
        let json = serde_json::to_string(&frame).unwrap();

        let parsed = parse_frame(&json).unwrap();
        assert_eq!(parsed.id, "f-1");
        assert_eq!(parsed.kind, FrameKind::Result);
    }

    #[test]
    fn parse_frame_ignores_malformed_json() {
        assert!(parse_frame("not valid json {{{").is_none());
    }

    #[test]
    fn parse_frame_rejects_oversized_message() {
        let huge = "x".repeat(WS_MAX_MESSAGE_SIZE + 1);
        assert!(parse_frame(&huge).is_none());
    }

    #[tokio::test]
    async fn read_pump_forwards_frames_and_closes_on_stream_end() {
        let frame = Frame::new::<()>("f-2", FrameKind::Send, Some("Notify"), None).unwrap();
        let json = serde_json::to_string(&frame).unwrap();
        let msgs = vec![Ok(tungstenite::Message::Text(json.into()))];

        let (inbound_tx, mut inbound_rx) = mpsc::channel(16);
        let (control_tx, _control_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        read_pump(stream::iter(msgs), inbound_tx, control_tx, cancel.clone()).await;

        let forwarded = inbound_rx.recv().await.unwrap();
        assert_eq!(forwarded.id, "f-2");
        // Stream ended: inbound closed and siblings cancelled.
        assert!(inbound_rx.recv().await.is_none());
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn read_pump_answers_pings() {
        let msgs = vec![Ok(tungstenite::Message::Ping(vec![1, 2].into()))];

        let (inbound_tx, _inbound_rx) = mpsc::channel(16);
        let (control_tx, mut control_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        read_pump(stream::iter(msgs), inbound_tx, control_tx, cancel).await;

        let pong = control_rx.recv().await.unwrap();
        assert!(matches!(pong, tungstenite::Message::Pong(d) if d.as_ref() == [1, 2]));
    }

    #[tokio::test]
    async fn read_pump_times_out_on_silence() {
        tokio::time::pause();

        let (inbound_tx, mut inbound_rx) = mpsc::channel(16);
        let (control_tx, _control_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        // A stream that never yields — simulates silence.
        let silent = stream::pending::<Result<tungstenite::Message, tungstenite::Error>>();
        let handle = tokio::spawn(read_pump(silent, inbound_tx, control_tx, cancel));

        tokio::time::advance(WS_PONG_WAIT + std::time::Duration::from_secs(1)).await;
        handle.await.unwrap();

        assert!(inbound_rx.recv().await.is_none(), "link should be dead");
    }
}
