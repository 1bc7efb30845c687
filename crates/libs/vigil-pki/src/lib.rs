//! # vigil-pki
//!
//! Trust-bootstrap primitives for the Vigil cluster: shared-secret ticket
//! derivation and an X.509 certificate authority that signs leaf
//! certificates for peers presenting a valid ticket.
//!
//! A ticket is `hex(PBKDF2-HMAC-SHA1(identity, salt, 50 000))` — the peer's
//! name keyed with the cluster-wide ticket salt. A peer that proves
//! knowledge of its ticket gets the public key from its transport
//! certificate re-signed by the cluster CA, upgrading a self-signed
//! bootstrap identity to a trusted one.

pub mod authority;
pub mod error;
pub mod ticket;

pub use authority::{peer_key_and_subject, Authority, CertificateAuthority};
pub use error::PkiError;
pub use ticket::{derive_ticket, verify_ticket, TICKET_ROUNDS};
