//! Netstring-framed JSON messages over any async byte stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use vigil_cluster::{PeerCertificate, SessionTransport, TransportError};
use vigil_wire::{FrameBuffer, Message};

const READ_CHUNK: usize = 16 * 1024;

/// The production `SessionTransport`: one TLS (or test) stream, a
/// per-connection frame reassembly buffer, and an EOF flag.
///
/// Reads happen in `wait_data`, decoding in `try_receive`; the connection
/// core serializes writes through its send lock, so the writer mutex here
/// is only contended against `close`.
pub struct FramedStream<S> {
    reader: Mutex<ReadHalf<S>>,
    writer: Mutex<WriteHalf<S>>,
    frames: StdMutex<FrameBuffer>,
    eof: AtomicBool,
    peer_cert: Option<Vec<u8>>,
}

impl<S: AsyncRead + AsyncWrite> FramedStream<S> {
    /// Wrap a completed session. `peer_cert` is the DER of the verified
    /// peer certificate, when the handshake produced one.
    pub fn new(stream: S, peer_cert: Option<Vec<u8>>) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            frames: StdMutex::new(FrameBuffer::new()),
            eof: AtomicBool::new(false),
            peer_cert,
        }
    }
}

#[async_trait]
impl<S> SessionTransport for FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    fn try_receive(&self) -> Result<Option<Message>, TransportError> {
        let mut frames = self.frames.lock().unwrap();
        loop {
            let Some(payload) = frames.next_frame()? else {
                return Ok(None);
            };
            match Message::from_bytes(&payload) {
                Ok(message) => return Ok(Some(message)),
                Err(err) => {
                    // A complete but undecodable frame is the peer's bug,
                    // not a framing loss; skip it and keep reading.
                    log::debug!("transport: skipping undecodable frame: {}", err);
                }
            }
        }
    }

    async fn wait_data(&self) -> Result<(), TransportError> {
        let mut reader = self.reader.lock().await;
        let mut chunk = [0u8; READ_CHUNK];
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            self.eof.store(true, Ordering::SeqCst);
            return Ok(());
        }
        self.frames.lock().unwrap().extend(&chunk[..read]);
        Ok(())
    }

    async fn send(&self, message: &Message) -> Result<(), TransportError> {
        let frame = message.to_frame()?;
        let mut writer = self.writer.lock().await;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }

    fn is_eof(&self) -> bool {
        self.eof.load(Ordering::SeqCst)
    }

    fn peer_certificate(&self) -> Option<PeerCertificate> {
        self.peer_cert
            .clone()
            .map(|der| PeerCertificate { der })
    }

    async fn close(&self) {
        self.eof.store(true, Ordering::SeqCst);
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}
