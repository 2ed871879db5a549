//! Bundled WebSocket transport over tokio-tungstenite.

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;

use hublink_protocol::Frame;
use hublink_protocol::constants::WS_MAX_MESSAGE_SIZE;

use crate::transport::{Link, Transport, TransportError};

/// WebSocket [`Transport`]: each dial splits the socket into a write pump
/// (frame encoding, keepalive, control messages) and a read pump (frame
/// parsing, pong answering, dead-link detection), tied to one cancel token.
#[derive(Debug, Default)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn dial(&self, url: &str) -> Result<Link, TransportError> {
        let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false).await?;
        let (write, read) = ws_stream.split();

        let (control_tx, control_rx) = mpsc::channel::<tungstenite::Message>(256);
        let (outbound_tx, outbound_rx) = mpsc::channel::<Frame>(256);
        let (inbound_tx, inbound_rx) = mpsc::channel::<Frame>(256);
        let cancel = CancellationToken::new();

        tokio::spawn(crate::pumps::write::write_pump(
            write,
            outbound_rx,
            control_rx,
            cancel.clone(),
        ));
        tokio::spawn(crate::pumps::read::read_pump(
            read,
            inbound_tx,
            control_tx,
            cancel.clone(),
        ));

        Ok(Link {
            outbound: outbound_tx,
            inbound: inbound_rx,
            cancel,
        })
    }
}
