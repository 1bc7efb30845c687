//! Shared-secret tickets authorizing certificate requests.

use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;
use subtle::ConstantTimeEq;

/// PBKDF2 iteration count. Fixed by the cluster protocol — both sides must
/// derive identical tokens.
pub const TICKET_ROUNDS: u32 = 50_000;

const TICKET_DIGEST_LEN: usize = 20;

fn pbkdf2_sha1_hex(secret: &[u8], salt: &[u8], rounds: u32) -> String {
    let mut digest = [0u8; TICKET_DIGEST_LEN];
    pbkdf2_hmac::<Sha1>(secret, salt, rounds, &mut digest);
    hex::encode(digest)
}

/// Derive the ticket for a peer identity under the cluster ticket salt.
pub fn derive_ticket(identity: &str, salt: &str) -> String {
    pbkdf2_sha1_hex(identity.as_bytes(), salt.as_bytes(), TICKET_ROUNDS)
}

/// Check a presented ticket against the derived one.
///
/// The token comparison is constant-time; only the (public) token length
/// can short-circuit.
pub fn verify_ticket(presented: &str, identity: &str, salt: &str) -> bool {
    let expected = derive_ticket(identity, salt);
    if presented.len() != expected.len() {
        return false;
    }
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 6070 PBKDF2-HMAC-SHA1 vectors.
    #[test]
    fn pbkdf2_sha1_matches_rfc6070_vectors() {
        assert_eq!(
            pbkdf2_sha1_hex(b"password", b"salt", 1),
            "0c60c80f961f0e71f3a9b524af6012062fe037a6"
        );
        assert_eq!(
            pbkdf2_sha1_hex(b"password", b"salt", 2),
            "ea6c014dc72d6f8ccd1ed92ace1d41f0d8de8957"
        );
        assert_eq!(
            pbkdf2_sha1_hex(b"password", b"salt", 4096),
            "4b007901b765489abead49d926f721d065a429c1"
        );
    }

    #[test]
    fn derived_tickets_are_stable_and_identity_bound() {
        let ticket = derive_ticket("satellite-1", "cluster salt");
        assert_eq!(ticket.len(), TICKET_DIGEST_LEN * 2);
        assert_eq!(ticket, derive_ticket("satellite-1", "cluster salt"));
        assert_ne!(ticket, derive_ticket("satellite-2", "cluster salt"));
        assert_ne!(ticket, derive_ticket("satellite-1", "other salt"));
    }

    #[test]
    fn verify_accepts_the_derived_ticket_only() {
        let ticket = derive_ticket("satellite-1", "cluster salt");
        assert!(verify_ticket(&ticket, "satellite-1", "cluster salt"));
        assert!(!verify_ticket(&ticket, "satellite-2", "cluster salt"));
        assert!(!verify_ticket("deadbeef", "satellite-1", "cluster salt"));
        assert!(!verify_ticket("", "satellite-1", "cluster salt"));
    }
}
