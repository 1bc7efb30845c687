#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;
use vigil_cluster::{PeerCertificate, SessionTransport, TransportError};
use vigil_wire::Message;

/// In-memory transport: tests feed inbound messages and inspect writes.
#[derive(Default)]
pub struct FakeTransport {
    inbound: Mutex<VecDeque<Message>>,
    sent: Mutex<Vec<Message>>,
    eof: AtomicBool,
    close_calls: AtomicUsize,
    readable: Notify,
    written: Notify,
    peer_cert: Option<Vec<u8>>,
    stall_sends: AtomicBool,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_peer_certificate(der: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            peer_cert: Some(der),
            ..Self::default()
        })
    }

    /// A transport whose sends never complete, for backpressure tests.
    pub fn stalled() -> Arc<Self> {
        let transport = Self::default();
        transport.stall_sends.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    /// Feed one inbound message, as if a frame had arrived on the stream.
    pub fn push(&self, message: Message) {
        self.inbound.lock().unwrap().push_back(message);
        self.readable.notify_one();
    }

    /// Signal end-of-stream, as if the peer had closed its side.
    pub fn finish(&self) {
        self.eof.store(true, Ordering::SeqCst);
        self.readable.notify_one();
    }

    pub fn sent_messages(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` messages have been written.
    pub async fn wait_for_sent(&self, count: usize) -> Vec<Message> {
        loop {
            let sent = self.sent_messages();
            if sent.len() >= count {
                return sent;
            }
            self.written.notified().await;
        }
    }

    /// Wait for the reply echoing the given id.
    pub async fn reply_with_id(&self, id: &str) -> Message {
        let id = Value::String(id.to_string());
        loop {
            if let Some(reply) = self
                .sent_messages()
                .into_iter()
                .find(|message| message.id.as_ref() == Some(&id))
            {
                return reply;
            }
            self.written.notified().await;
        }
    }
}

#[async_trait]
impl SessionTransport for FakeTransport {
    fn try_receive(&self) -> Result<Option<Message>, TransportError> {
        Ok(self.inbound.lock().unwrap().pop_front())
    }

    async fn wait_data(&self) -> Result<(), TransportError> {
        loop {
            if self.eof.load(Ordering::SeqCst) || !self.inbound.lock().unwrap().is_empty() {
                return Ok(());
            }
            self.readable.notified().await;
        }
    }

    async fn send(&self, message: &Message) -> Result<(), TransportError> {
        if self.stall_sends.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.sent.lock().unwrap().push(message.clone());
        self.written.notify_one();
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
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.eof.store(true, Ordering::SeqCst);
        self.readable.notify_one();
    }
}

/// Poll a condition until it holds, failing the test after five seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition was not reached in time");
}
