use std::sync::Arc;

use serde_json::{json, Value};
use vigil_pki::{peer_key_and_subject, verify_ticket, Authority};

use crate::dispatch::{MethodResult, Origin, RpcMethod};
use crate::error::MethodError;

/// `pki.requestCertificate` — ticket-authenticated certificate issuance.
///
/// A peer proves knowledge of its ticket (derived from its identity and
/// the cluster-wide salt) and gets the public key of its transport
/// certificate re-signed by the cluster CA. Expected failures — missing
/// salt, wrong ticket — are reported inside the result payload so the
/// requesting side can surface them; the connection stays up either way.
/// The handler never mutates connection or endpoint state.
pub struct RequestCertificate {
    ticket_salt: Option<String>,
    authority: Arc<dyn Authority>,
}

impl RequestCertificate {
    pub fn new(ticket_salt: Option<String>, authority: Arc<dyn Authority>) -> Self {
        Self {
            ticket_salt: ticket_salt.filter(|salt| !salt.is_empty()),
            authority,
        }
    }
}

impl RpcMethod for RequestCertificate {
    fn invoke(&self, origin: &Origin, params: Option<&Value>) -> MethodResult {
        let Some(params) = params else {
            return Ok(Value::Null);
        };
        let Some(salt) = self.ticket_salt.as_deref() else {
            return Ok(json!({ "error": "Ticket salt is not configured." }));
        };

        let ticket = params
            .get("ticket")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let identity = origin.from_connection.identity().unwrap_or_default();
        if !verify_ticket(ticket, identity, salt) {
            return Ok(json!({ "error": "Invalid ticket." }));
        }

        let certificate = origin
            .from_connection
            .peer_certificate()
            .ok_or_else(|| MethodError::failed("peer did not present a certificate"))?;
        let (public_key, subject) = peer_key_and_subject(&certificate.der)
            .map_err(|err| MethodError::failed(err.to_string()))?;
        let cert = self
            .authority
            .sign_leaf(&public_key, &subject)
            .map_err(|err| MethodError::failed(err.to_string()))?;

        Ok(json!({
            "cert": cert,
            "ca": self.authority.ca_certificate_pem(),
        }))
    }
}
