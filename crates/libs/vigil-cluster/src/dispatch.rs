//! RPC method dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::connection::PeerConnection;
use crate::directory::Zone;
use crate::error::{DispatchError, MethodError};

/// Per-invocation context: which connection a request arrived on and which
/// zone it logically originated in.
#[derive(Clone)]
pub struct Origin {
    pub from_connection: Arc<PeerConnection>,
    pub from_zone: Option<Arc<Zone>>,
}

pub type MethodResult = Result<Value, MethodError>;

/// A registered RPC method. Failures are returned, not raised — the
/// dispatch boundary turns them into the `error` field of the reply.
pub trait RpcMethod: Send + Sync {
    fn invoke(&self, origin: &Origin, params: Option<&Value>) -> MethodResult;
}

impl<F> RpcMethod for F
where
    F: Fn(&Origin, Option<&Value>) -> MethodResult + Send + Sync,
{
    fn invoke(&self, origin: &Origin, params: Option<&Value>) -> MethodResult {
        self(origin, params)
    }
}

/// Process-wide method table.
///
/// Built during process initialization and handed to the connection layer
/// behind an `Arc`; after that it is read-only and safe for concurrent
/// lookup from every connection.
#[derive(Default)]
pub struct DispatchTable {
    methods: HashMap<String, Arc<dyn RpcMethod>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method. Registering a name twice is a configuration bug
    /// and fails; use [`replace`](Self::replace) to overwrite on purpose.
    pub fn register(
        &mut self,
        name: &str,
        method: impl RpcMethod + 'static,
    ) -> Result<(), DispatchError> {
        if self.methods.contains_key(name) {
            return Err(DispatchError::DuplicateMethod(name.to_string()));
        }
        self.methods.insert(name.to_string(), Arc::new(method));
        Ok(())
    }

    /// Register a method, overwriting any existing registration.
    pub fn replace(&mut self, name: &str, method: impl RpcMethod + 'static) {
        self.methods.insert(name.to_string(), Arc::new(method));
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn RpcMethod>> {
        self.methods.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
