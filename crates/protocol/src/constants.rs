use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Time to wait for a pong response (or any incoming message).
///
/// Acts as a read deadline: if *nothing* arrives within this window
/// (no pong, no response, no push frame), the link is considered dead.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// How often to send keepalive pings (must be < the hub's pong wait).
pub const WS_PING_PERIOD: Duration = Duration::from_secs(5);

/// Maximum frame size in bytes (4 MB).
pub const WS_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Timeout for request/response invocations.
pub const WS_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Frame kind identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameKind {
    /// Fire-and-forget invocation, no reply expected.
    #[serde(rename = "send")]
    Send,
    /// Invocation expecting exactly one `Result` reply.
    #[serde(rename = "invoke")]
    Invoke,
    /// Reply to an `Invoke` (or terminal error for any correlated request).
    #[serde(rename = "result")]
    Result,
    /// Opens a server-to-client item stream.
    #[serde(rename = "stream_invoke")]
    StreamInvoke,
    /// One item of an open stream.
    #[serde(rename = "stream_item")]
    StreamItem,
    /// Stream completed; an attached error means it failed.
    #[serde(rename = "stream_end")]
    StreamEnd,

    /// Forward compatibility: unknown frame kinds deserialize here.
    #[serde(other)]
    Unknown,
}

/// Common hub error codes.
pub const ERR_CODE_BAD_REQUEST: i32 = 400;
pub const ERR_CODE_NOT_FOUND: i32 = 404;
pub const ERR_CODE_INTERNAL: i32 = 500;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&FrameKind::Invoke).unwrap(),
            "\"invoke\""
        );
        assert_eq!(
            serde_json::to_string(&FrameKind::StreamItem).unwrap(),
            "\"stream_item\""
        );
    }

    #[test]
    fn frame_kind_deserialization() {
        let kind: FrameKind = serde_json::from_str("\"result\"").unwrap();
        assert_eq!(kind, FrameKind::Result);
    }

    #[test]
    fn unknown_frame_kind() {
        let kind: FrameKind = serde_json::from_str("\"some_future_kind\"").unwrap();
        assert_eq!(kind, FrameKind::Unknown);
    }
}
