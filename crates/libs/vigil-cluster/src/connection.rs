//! One peer session: inbound dispatch loop, outbound queue, teardown.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use vigil_wire::Message;

use crate::directory::{Directory, Endpoint};
use crate::dispatch::{DispatchTable, Origin};
use crate::error::MethodError;
use crate::handlers::SET_LOG_POSITION;
use crate::transport::{PeerCertificate, SessionTransport};

/// Hard limit on queued outbound messages. A peer that lets this many pile
/// up is unresponsive and gets dropped rather than blocking producers.
pub const OUTBOUND_QUEUE_LIMIT: usize = 20_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    /// We dialed the peer.
    Initiator,
    /// The peer dialed us.
    Acceptor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Active,
    Disconnecting,
    Closed,
}

const STATE_ACTIVE: u8 = 0;
const STATE_DISCONNECTING: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// One cluster peer session.
///
/// Created once the transport session is complete (and, for authenticated
/// peers, identity-verified). The inbound path and the outbound queue
/// consumer run as separate tasks; all stream writes — queued sends and
/// synchronous replies alike — serialize through the send lock.
///
/// The connection hands references to itself into its own tasks and into
/// handler invocations, so it keeps a weak self-handle; the strong handles
/// live in the directory's client sets and the running tasks.
pub struct PeerConnection {
    this: Weak<PeerConnection>,
    identity: Option<String>,
    role: ConnectionRole,
    stream: Arc<dyn SessionTransport>,
    dispatch: Arc<DispatchTable>,
    directory: Arc<Directory>,
    endpoint: Option<Weak<Endpoint>>,
    // f64 bit pattern, unix seconds.
    last_seen: AtomicU64,
    state: AtomicU8,
    send_lock: tokio::sync::Mutex<()>,
    outbound: mpsc::Sender<Message>,
    outbound_rx: Mutex<Option<mpsc::Receiver<Message>>>,
    shutdown: CancellationToken,
}

impl PeerConnection {
    /// Create a connection for a completed session and attach it to the
    /// directory: authenticated peers join their endpoint's client set,
    /// anonymous peers the directory's anonymous set.
    ///
    /// `identity` must be the transport-verified peer name; pass `None`
    /// for sessions that did not present a trusted certificate.
    pub fn attach(
        identity: Option<String>,
        stream: Arc<dyn SessionTransport>,
        role: ConnectionRole,
        dispatch: Arc<DispatchTable>,
        directory: Arc<Directory>,
    ) -> Arc<Self> {
        let identity = identity.filter(|name| !name.is_empty());
        let endpoint = identity
            .as_deref()
            .and_then(|name| directory.endpoint_by_name(name));
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_LIMIT);

        let connection = Arc::new_cyclic(|this| Self {
            this: this.clone(),
            identity,
            role,
            stream,
            dispatch,
            directory: Arc::clone(&directory),
            endpoint: endpoint.as_ref().map(Arc::downgrade),
            last_seen: AtomicU64::new(unix_now().to_bits()),
            state: AtomicU8::new(STATE_ACTIVE),
            send_lock: tokio::sync::Mutex::new(()),
            outbound,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            shutdown: CancellationToken::new(),
        });

        match endpoint {
            Some(endpoint) => endpoint.add_client(&connection),
            None => directory.add_anonymous_client(&connection),
        }
        connection
    }

    /// Spawn the outbound consumer and the inbound driver. The driver's
    /// first pass drains whatever the transport already buffered before it
    /// waits for readiness, so nothing that arrived between session setup
    /// and task startup is lost. Calling `start` twice is a no-op.
    pub fn start(&self) {
        let Some(queue) = self.outbound_rx.lock().unwrap().take() else {
            return;
        };
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let writer = Arc::clone(&this);
        tokio::spawn(async move { writer.run_writer(queue).await });
        tokio::spawn(async move { this.run_reader().await });
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn role(&self) -> ConnectionRole {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        match self.state.load(Ordering::SeqCst) {
            STATE_ACTIVE => ConnectionState::Active,
            STATE_DISCONNECTING => ConnectionState::Disconnecting,
            _ => ConnectionState::Closed,
        }
    }

    /// The directory endpoint this session is bound to, while it exists.
    pub fn endpoint(&self) -> Option<Arc<Endpoint>> {
        self.endpoint.as_ref().and_then(Weak::upgrade)
    }

    pub fn peer_certificate(&self) -> Option<PeerCertificate> {
        self.stream.peer_certificate()
    }

    /// Unix timestamp of the last non-heartbeat traffic on this session.
    pub fn last_seen(&self) -> f64 {
        f64::from_bits(self.last_seen.load(Ordering::Relaxed))
    }

    fn touch(&self) {
        self.last_seen
            .store(unix_now().to_bits(), Ordering::Relaxed);
    }

    fn label(&self) -> &str {
        self.identity.as_deref().unwrap_or("<anonymous>")
    }

    /// Queue an outbound message. Never blocks: a full queue means the
    /// peer is unresponsive, which drops the whole connection — the
    /// message and everything still queued are considered undelivered.
    pub fn enqueue(&self, message: Message) {
        if self.state.load(Ordering::SeqCst) != STATE_ACTIVE {
            log::debug!(
                "connection({}): dropping message for closed connection",
                self.label()
            );
            return;
        }
        match self.outbound.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::warn!(
                    "connection({}): too many queued messages, closing connection",
                    self.label()
                );
                self.disconnect();
            }
            Err(TrySendError::Closed(_)) => {
                log::debug!(
                    "connection({}): dropping message for closed connection",
                    self.label()
                );
            }
        }
    }

    /// Write one message under the send lock. Shared by the queue consumer
    /// and the synchronous reply path; a write failure drops the session.
    pub async fn send_now(&self, message: &Message) {
        let _sender = self.send_lock.lock().await;
        if self.stream.is_eof() {
            return;
        }
        match self.stream.send(message).await {
            Ok(()) => {
                if !message.method_is(SET_LOG_POSITION) {
                    self.touch();
                }
            }
            Err(err) => {
                log::warn!(
                    "connection({}): error while sending message: {}",
                    self.label(),
                    err
                );
                self.disconnect();
            }
        }
    }

    async fn run_writer(self: Arc<Self>, mut queue: mpsc::Receiver<Message>) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                next = queue.recv() => {
                    let Some(message) = next else { break };
                    // A send stuck on a dead peer must not outlive teardown.
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = self.send_now(&message) => {}
                    }
                }
            }
        }
    }

    async fn run_reader(self: Arc<Self>) {
        loop {
            loop {
                if self.state.load(Ordering::SeqCst) != STATE_ACTIVE {
                    return;
                }
                if self.stream.is_eof() {
                    self.disconnect();
                    return;
                }
                match self.stream.try_receive() {
                    Ok(Some(message)) => self.process_message(message).await,
                    Ok(None) => break,
                    Err(err) => {
                        log::warn!(
                            "connection({}): error while reading message: {}",
                            self.label(),
                            err
                        );
                        self.disconnect();
                        return;
                    }
                }
            }
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                waited = self.stream.wait_data() => {
                    if let Err(err) = waited {
                        log::warn!(
                            "connection({}): error while waiting for messages: {}",
                            self.label(),
                            err
                        );
                        self.disconnect();
                        return;
                    }
                }
            }
        }
    }

    async fn process_message(&self, message: Message) {
        let method = message.method.clone().unwrap_or_default();

        if method != SET_LOG_POSITION {
            self.touch();
        }

        let endpoint = self.endpoint();
        if let (Some(endpoint), Some(ts)) = (endpoint.as_ref(), message.ts) {
            // Replayed events from before the last sync arrive with an old
            // position stamp; they must not reach any handler twice.
            if ts < endpoint.remote_log_position() {
                log::trace!(
                    "connection({}): ignoring stale message (ts {} < {})",
                    self.label(),
                    ts,
                    endpoint.remote_log_position()
                );
                return;
            }
            endpoint.advance_remote_log_position(ts);
        }

        let Some(this) = self.this.upgrade() else {
            return;
        };
        let from_zone = endpoint.as_ref().and_then(|endpoint| {
            if endpoint.zone_name() == self.directory.local_zone_name() {
                Some(self.directory.local_zone())
            } else {
                // Relayed through an intermediate node; the stamped origin
                // zone names where it really came from.
                message
                    .origin_zone
                    .as_deref()
                    .and_then(|name| self.directory.zone_by_name(name))
            }
        });
        let origin = Origin {
            from_connection: this,
            from_zone,
        };

        log::debug!(
            "connection({}): received '{}' message",
            self.label(),
            method
        );

        let result = match self.dispatch.lookup(&method) {
            Some(handler) => handler.invoke(&origin, message.params.as_ref()),
            None => Err(MethodError::UnknownMethod(method)),
        };

        if let Some(id) = message.id {
            let response = match result {
                Ok(value) => Message::response(id, value),
                Err(err) => Message::error_response(id, err.to_string()),
            };
            // Replies go straight to the stream from the read path; the
            // outbound queue is for application traffic only.
            self.send_now(&response).await;
        }
    }

    /// Schedule teardown. Teardown never runs inline on the caller's
    /// stack — both the read-dispatch path and the queue consumer call
    /// this from inside their own loops.
    pub fn disconnect(&self) {
        if self.state.load(Ordering::SeqCst) != STATE_ACTIVE {
            return;
        }
        let Some(connection) = self.this.upgrade() else {
            return;
        };
        tokio::spawn(async move { connection.disconnect_now().await });
    }

    /// Tear the connection down: detach from the directory and close the
    /// stream. Tolerates concurrent and repeated invocation; only the
    /// first caller acts, later ones observe the state flag and return.
    pub async fn disconnect_now(&self) {
        if self
            .state
            .compare_exchange(
                STATE_ACTIVE,
                STATE_DISCONNECTING,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return;
        }

        log::warn!("connection({}): client disconnected", self.label());
        self.shutdown.cancel();

        if let Some(this) = self.this.upgrade() {
            match &self.endpoint {
                Some(endpoint) => {
                    if let Some(endpoint) = endpoint.upgrade() {
                        endpoint.remove_client(&this);
                    }
                }
                None => {
                    self.directory.remove_anonymous_client(&this);
                }
            }
        }

        self.stream.close().await;
        self.state.store(STATE_CLOSED, Ordering::SeqCst);
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
