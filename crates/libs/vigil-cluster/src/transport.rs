use async_trait::async_trait;
use vigil_wire::Message;

use crate::error::TransportError;

/// DER bytes of the transport-verified peer leaf certificate.
#[derive(Debug, Clone)]
pub struct PeerCertificate {
    pub der: Vec<u8>,
}

/// A completed secure session, as seen by the connection layer.
///
/// The read side is a two-step contract: [`try_receive`] decodes one
/// message out of whatever bytes the transport has already buffered, and
/// [`wait_data`] suspends until there is more to decode. The connection
/// drains buffered messages before its first wait, so data that arrived
/// between session setup and task startup is never lost.
///
/// [`try_receive`]: SessionTransport::try_receive
/// [`wait_data`]: SessionTransport::wait_data
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Decode one buffered message without touching the stream.
    /// `Ok(None)` means no complete frame is buffered yet.
    fn try_receive(&self) -> Result<Option<Message>, TransportError>;

    /// Suspend until more inbound data has been buffered or the stream
    /// reached end-of-stream.
    async fn wait_data(&self) -> Result<(), TransportError>;

    /// Serialize and write one message. Writes are serialized by the
    /// connection's send lock; implementations need not re-serialize.
    async fn send(&self, message: &Message) -> Result<(), TransportError>;

    /// True once the peer has closed its side or the stream was shut down.
    fn is_eof(&self) -> bool;

    /// The peer's verified certificate, when the session presented one.
    fn peer_certificate(&self) -> Option<PeerCertificate>;

    /// Shut the stream down. Must tolerate repeated calls.
    async fn close(&self);
}
