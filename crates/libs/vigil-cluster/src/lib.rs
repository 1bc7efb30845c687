//! # vigil-cluster
//!
//! Peer-connection core of the Vigil monitoring cluster.
//!
//! Each cluster peer session is one [`PeerConnection`]: it owns the secure
//! transport stream, drives the inbound read/dispatch loop, and feeds a
//! bounded outbound queue with a single consumer. Inbound requests are
//! routed through a process-wide [`DispatchTable`]; two methods are built
//! in — ticket-authenticated certificate issuance
//! (`pki.requestCertificate`) and the replication heartbeat
//! (`log.setLogPosition`). Messages stamped with a replication position
//! older than the peer's recorded one are replayed duplicates and are
//! dropped before dispatch.
//!
//! The transport itself (TLS handshake, byte framing) sits behind the
//! [`SessionTransport`] trait; `vigild` provides the production
//! implementation.

pub mod connection;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod transport;

pub use connection::{ConnectionRole, ConnectionState, PeerConnection, OUTBOUND_QUEUE_LIMIT};
pub use directory::{Directory, Endpoint, Zone};
pub use dispatch::{DispatchTable, MethodResult, Origin, RpcMethod};
pub use error::{DispatchError, MethodError, TransportError};
pub use transport::{PeerCertificate, SessionTransport};
