use serde::{Deserialize, Serialize};

use crate::constants::FrameKind;

/// Error details attached to a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameError {
    pub code: i32,
    pub message: String,
}

/// Envelope for all hublink WebSocket traffic.
///
/// The `payload` field uses `serde_json::value::RawValue` to defer
/// deserialization until a handler knows the concrete type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: FrameKind,
    /// Target method name. Present on outbound invocations and on inbound
    /// push frames; absent on replies (the `id` correlates those).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Box<serde_json::value::RawValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FrameError>,
}

impl Frame {
    /// Creates a new frame with the given kind, target, and payload.
    pub fn new<T: Serialize>(
        id: impl Into<String>,
        kind: FrameKind,
        target: Option<&str>,
        payload: Option<&T>,
    ) -> Result<Self, serde_json::Error> {
        let raw = match payload {
            Some(p) => {
                let json = serde_json::to_string(p)?;
                Some(serde_json::value::RawValue::from_string(json)?)
            }
            None => None,
        };
        Ok(Self {
            id: id.into(),
            kind,
            target: target.map(str::to_string),
            payload: raw,
            error: None,
        })
    }

    /// Deserializes the payload into the given type.
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(
        &self,
    ) -> Result<Option<T>, serde_json::Error> {
        match &self.payload {
            Some(raw) => Ok(Some(serde_json::from_str(raw.get())?)),
            None => Ok(None),
        }
    }

    /// Creates a terminal error frame.
    pub fn error(id: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: FrameKind::Result,
            target: None,
            payload: None,
            error: Some(FrameError {
                code,
                message: message.into(),
            }),
        }
    }

    /// Creates a reply frame for this request.
    pub fn reply<T: Serialize>(
        &self,
        kind: FrameKind,
        payload: Option<&T>,
    ) -> Result<Self, serde_json::Error> {
        Frame::new(&self.id, kind, None, payload)
    }
}
