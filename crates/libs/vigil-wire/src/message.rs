use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::netstring;
use crate::JSONRPC_VERSION;

/// Errors from wire envelope and frame operations.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("invalid message payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame length prefix contains invalid byte 0x{0:02x}")]
    InvalidLengthPrefix(u8),

    #[error("frame of {0} bytes exceeds the limit of {} bytes", netstring::MAX_FRAME_LEN)]
    Oversize(usize),

    #[error("frame is missing its ',' terminator")]
    MissingTerminator,
}

/// One cluster message: a JSON-RPC shaped mapping.
///
/// Requests carry `method`; the presence of `id` means the sender expects a
/// reply. `ts` is the replicated log position stamped on relayed events and
/// `originZone` names the zone a relayed message originally came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<f64>,
    #[serde(rename = "originZone", default, skip_serializing_if = "Option::is_none")]
    pub origin_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Message {
    pub fn request(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: Some(method.into()),
            params: Some(params),
            ..Self::default()
        }
    }

    /// Successful reply: version tag, echoed id, result payload.
    pub fn response(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: Some(id),
            result: Some(result),
            ..Self::default()
        }
    }

    /// Failed reply: version tag, echoed id, error text.
    pub fn error_response(id: Value, error: impl Into<String>) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: Some(id),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: Value) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_ts(mut self, ts: f64) -> Self {
        self.ts = Some(ts);
        self
    }

    pub fn with_origin_zone(mut self, zone: impl Into<String>) -> Self {
        self.origin_zone = Some(zone.into());
        self
    }

    pub fn method_is(&self, name: &str) -> bool {
        self.method.as_deref() == Some(name)
    }

    /// A reply is expected iff the sender attached an `id`.
    pub fn expects_reply(&self) -> bool {
        self.id.is_some()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serialize and wrap in a netstring frame, ready for the stream.
    pub fn to_frame(&self) -> Result<Vec<u8>, WireError> {
        Ok(netstring::encode_frame(&self.to_bytes()?))
    }
}
