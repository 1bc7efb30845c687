//! TLS configuration for cluster sessions.
//!
//! Every node presents its own certificate and verifies peers against the
//! cluster CA. Unauthenticated sessions are allowed in — they can only
//! reach the trust-bootstrap method, since they never bind to an endpoint.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use rustls_pemfile::private_key;
use x509_parser::prelude::{FromDer, X509Certificate};

/// Listener-side config: verify client certificates against the cluster
/// CA, but let certificate-less peers complete the handshake.
pub fn build_server_config(
    cert_path: &Path,
    key_path: &Path,
    ca_path: &Path,
) -> io::Result<Arc<ServerConfig>> {
    let chain = load_cert_chain(cert_path)?;
    let key = load_private_key(key_path)?;
    let roots = load_root_store(ca_path)?;

    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .allow_unauthenticated()
        .build()
        .map_err(|err| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "failed to build client verifier from {}: {}",
                    ca_path.display(),
                    err
                ),
            )
        })?;

    let config = ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(chain, key)
        .map_err(|err| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid tls server certificate/key configuration: {}", err),
            )
        })?;
    Ok(Arc::new(config))
}

/// Dialer-side config: trust the cluster CA and present our certificate.
pub fn build_client_config(
    cert_path: &Path,
    key_path: &Path,
    ca_path: &Path,
) -> io::Result<Arc<ClientConfig>> {
    let chain = load_cert_chain(cert_path)?;
    let key = load_private_key(key_path)?;
    let roots = load_root_store(ca_path)?;

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(chain, key)
        .map_err(|err| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid tls client certificate/key configuration: {}", err),
            )
        })?;
    Ok(Arc::new(config))
}

pub fn load_cert_chain(path: &Path) -> io::Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let certificates = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to parse PEM certs from {}: {}", path.display(), err),
            )
        })?;
    if certificates.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("no certificates found in {}", path.display()),
        ));
    }
    Ok(certificates)
}

pub fn load_private_key(path: &Path) -> io::Result<PrivateKeyDer<'static>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let key = private_key(&mut reader).map_err(|err| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("failed to parse private key {}: {}", path.display(), err),
        )
    })?;
    key.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("no private key found in {}", path.display()),
        )
    })
}

pub fn load_root_store(path: &Path) -> io::Result<RootCertStore> {
    let certificates = load_cert_chain(path)?;
    let mut roots = RootCertStore::empty();
    let (added, _ignored) = roots.add_parsable_certificates(certificates);
    if added == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("no valid CA certificates found in {}", path.display()),
        ));
    }
    Ok(roots)
}

/// Subject common name of a verified peer certificate.
pub fn common_name(cert_der: &[u8]) -> Option<String> {
    let Ok((_remaining, certificate)) = X509Certificate::from_der(cert_der) else {
        return None;
    };
    let name = certificate
        .subject()
        .iter_common_name()
        .find_map(|name| name.as_str().ok().map(str::to_string));
    name
}
