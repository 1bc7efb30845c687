//! # vigil-wire
//!
//! Wire envelope and frame codec for Vigil cluster traffic.
//!
//! Every message exchanged between cluster peers is a single JSON object
//! wrapped in a netstring frame:
//!
//! ```text
//! <length>:<json payload>,
//!  digits    UTF-8 bytes   terminator
//! ```
//!
//! The JSON payload is JSON-RPC shaped. Requests carry `method` and
//! optionally `params`, `id`, `ts` and `originZone`; responses echo `id`
//! with a `jsonrpc` version tag and either `result` or `error`.
//!
//! ## Example
//!
//! ```rust
//! use vigil_wire::{FrameBuffer, Message};
//!
//! let request = Message::request("log.setLogPosition", serde_json::json!({
//!     "log_position": 42.0,
//! }));
//! let frame = request.to_frame().unwrap();
//!
//! let mut buffer = FrameBuffer::new();
//! buffer.extend(&frame);
//! let payload = buffer.next_frame().unwrap().unwrap();
//! let decoded = Message::from_bytes(&payload).unwrap();
//! assert_eq!(decoded.method.as_deref(), Some("log.setLogPosition"));
//! ```

pub mod message;
pub mod netstring;

pub use message::{Message, WireError};
pub use netstring::{encode_frame, FrameBuffer, MAX_FRAME_LEN};

/// Version tag stamped on every response envelope.
pub const JSONRPC_VERSION: &str = "2.0";
