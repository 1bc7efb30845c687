//! Vigil cluster daemon.
//!
//! Wires the connection core to the real world: TOML configuration, TLS
//! listener and outbound connections, and the netstring transport that
//! implements the core's `SessionTransport` seam.

pub mod config;
pub mod node;
pub mod tls;
pub mod transport;

pub use config::NodeConfig;
pub use node::{Node, NodeError};
pub use transport::FramedStream;
