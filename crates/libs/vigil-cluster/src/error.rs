use vigil_wire::WireError;

/// Failures reported by a [`SessionTransport`](crate::SessionTransport).
///
/// Any of these tears the connection down; reconnecting is the caller's
/// responsibility.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Startup-time dispatch table misconfiguration.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("method '{0}' is already registered")]
    DuplicateMethod(String),
}

/// Failures raised by an RPC method invocation.
///
/// These never terminate the connection; they are converted into the
/// `error` field of the response at the dispatch boundary.
#[derive(Debug, thiserror::Error)]
pub enum MethodError {
    #[error("method '{0}' does not exist")]
    UnknownMethod(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("{0}")]
    Failed(String),
}

impl MethodError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
