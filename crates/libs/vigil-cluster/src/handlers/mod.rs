//! Built-in cluster RPC methods.

mod log_position;
mod pki;

pub use log_position::SetLogPosition;
pub use pki::RequestCertificate;

use std::sync::Arc;

use vigil_pki::Authority;

use crate::dispatch::DispatchTable;
use crate::error::DispatchError;

/// Trust bootstrap: ticket-authenticated certificate issuance.
pub const REQUEST_CERTIFICATE: &str = "pki.requestCertificate";

/// Replication heartbeat advancing a peer's acknowledged log position.
pub const SET_LOG_POSITION: &str = "log.setLogPosition";

/// Register the built-in methods on a dispatch table.
pub fn register_builtin(
    table: &mut DispatchTable,
    ticket_salt: Option<String>,
    authority: Arc<dyn Authority>,
) -> Result<(), DispatchError> {
    table.register(
        REQUEST_CERTIFICATE,
        RequestCertificate::new(ticket_salt, authority),
    )?;
    table.register(SET_LOG_POSITION, SetLogPosition)?;
    Ok(())
}
