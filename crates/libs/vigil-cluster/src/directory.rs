//! In-memory endpoint/zone directory.
//!
//! The directory owns the cluster topology records. Endpoints hold strong
//! references to their attached connections (the client set keeps a session
//! alive); a connection's back-reference to its endpoint is weak, so there
//! is no ownership cycle and teardown can always detach cleanly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::connection::PeerConnection;

/// A named grouping of endpoints in the cluster topology.
#[derive(Debug)]
pub struct Zone {
    name: String,
}

impl Zone {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A named cluster peer: zone membership, replication positions and the
/// set of currently attached connections.
pub struct Endpoint {
    name: String,
    zone: String,
    // f64 bit patterns; both positions only ever move forward.
    remote_log_position: AtomicU64,
    local_log_position: AtomicU64,
    clients: Mutex<Vec<Arc<PeerConnection>>>,
}

impl Endpoint {
    fn new(name: &str, zone: &str) -> Self {
        Self {
            name: name.to_string(),
            zone: zone.to_string(),
            remote_log_position: AtomicU64::new(0f64.to_bits()),
            local_log_position: AtomicU64::new(0f64.to_bits()),
            clients: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn zone_name(&self) -> &str {
        &self.zone
    }

    /// Highest replication position observed on messages from this peer.
    pub fn remote_log_position(&self) -> f64 {
        f64::from_bits(self.remote_log_position.load(Ordering::SeqCst))
    }

    pub fn advance_remote_log_position(&self, position: f64) {
        advance(&self.remote_log_position, position);
    }

    /// Highest replication position this peer has acknowledged.
    pub fn local_log_position(&self) -> f64 {
        f64::from_bits(self.local_log_position.load(Ordering::SeqCst))
    }

    pub fn advance_local_log_position(&self, position: f64) {
        advance(&self.local_log_position, position);
    }

    pub fn add_client(&self, client: &Arc<PeerConnection>) {
        self.clients.lock().unwrap().push(Arc::clone(client));
    }

    /// Detach a connection. Returns false when it was already gone.
    pub fn remove_client(&self, client: &Arc<PeerConnection>) -> bool {
        let mut clients = self.clients.lock().unwrap();
        let before = clients.len();
        clients.retain(|existing| !Arc::ptr_eq(existing, client));
        clients.len() != before
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().unwrap().len()
    }
}

/// Positions never move backwards; a lower value is a stale write and loses.
fn advance(cell: &AtomicU64, position: f64) {
    let _ = cell.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |bits| {
        (position > f64::from_bits(bits)).then(|| position.to_bits())
    });
}

/// Process-wide topology directory. Internally synchronized; safe to share
/// behind an `Arc` across all connections.
pub struct Directory {
    local_zone: Arc<Zone>,
    zones: RwLock<HashMap<String, Arc<Zone>>>,
    endpoints: RwLock<HashMap<String, Arc<Endpoint>>>,
    anonymous: Mutex<Vec<Arc<PeerConnection>>>,
}

impl Directory {
    pub fn new(local_zone: &str) -> Self {
        let local = Arc::new(Zone {
            name: local_zone.to_string(),
        });
        let mut zones = HashMap::new();
        zones.insert(local_zone.to_string(), Arc::clone(&local));
        Self {
            local_zone: local,
            zones: RwLock::new(zones),
            endpoints: RwLock::new(HashMap::new()),
            anonymous: Mutex::new(Vec::new()),
        }
    }

    pub fn local_zone(&self) -> Arc<Zone> {
        Arc::clone(&self.local_zone)
    }

    pub fn local_zone_name(&self) -> &str {
        self.local_zone.name()
    }

    pub fn register_zone(&self, name: &str) -> Arc<Zone> {
        let mut zones = self.zones.write().unwrap();
        Arc::clone(zones.entry(name.to_string()).or_insert_with(|| {
            Arc::new(Zone {
                name: name.to_string(),
            })
        }))
    }

    /// Register an endpoint (and its zone). Returns the existing record if
    /// the name is already known.
    pub fn register_endpoint(&self, name: &str, zone: &str) -> Arc<Endpoint> {
        self.register_zone(zone);
        let mut endpoints = self.endpoints.write().unwrap();
        Arc::clone(
            endpoints
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Endpoint::new(name, zone))),
        )
    }

    pub fn endpoint_by_name(&self, name: &str) -> Option<Arc<Endpoint>> {
        self.endpoints.read().unwrap().get(name).cloned()
    }

    pub fn zone_by_name(&self, name: &str) -> Option<Arc<Zone>> {
        self.zones.read().unwrap().get(name).cloned()
    }

    /// Sessions without a verified identity live in the anonymous set until
    /// they disconnect (or bootstrap a certificate and reconnect).
    pub fn add_anonymous_client(&self, client: &Arc<PeerConnection>) {
        self.anonymous.lock().unwrap().push(Arc::clone(client));
    }

    /// Detach an anonymous connection. Returns false when already gone.
    pub fn remove_anonymous_client(&self, client: &Arc<PeerConnection>) -> bool {
        let mut anonymous = self.anonymous.lock().unwrap();
        let before = anonymous.len();
        anonymous.retain(|existing| !Arc::ptr_eq(existing, client));
        anonymous.len() != before
    }

    pub fn anonymous_client_count(&self) -> usize {
        self.anonymous.lock().unwrap().len()
    }
}
