//! Cluster certificate authority.
//!
//! The authority holds the CA key pair and signs leaf certificates for
//! peers that passed ticket verification. The subject public key comes
//! straight from the requester's transport certificate — the authority
//! never sees a private key other than its own.

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    Issuer, KeyPair, KeyUsagePurpose, SubjectPublicKeyInfo,
};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::error::PkiError;

/// Signing interface consumed by the trust-bootstrap RPC handler.
pub trait Authority: Send + Sync {
    /// Sign a leaf certificate binding `public_key_der` (SPKI DER) to
    /// `subject`, returning the certificate as PEM.
    fn sign_leaf(&self, public_key_der: &[u8], subject: &str) -> Result<String, PkiError>;

    /// The current CA certificate as PEM.
    fn ca_certificate_pem(&self) -> String;
}

/// rcgen-backed authority.
pub struct CertificateAuthority {
    issuer: Issuer<'static, KeyPair>,
    ca_pem: String,
    ca_key_pem: String,
}

impl CertificateAuthority {
    /// Generate a fresh CA with the given common name.
    pub fn generate(common_name: &str) -> Result<Self, PkiError> {
        let key = KeyPair::generate()?;
        let mut params = CertificateParams::new(Vec::new())?;
        params.distinguished_name = DistinguishedName::new();
        params.distinguished_name.push(DnType::CommonName, common_name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let certificate = params.clone().self_signed(&key)?;
        let ca_pem = certificate.pem();
        let ca_key_pem = key.serialize_pem();
        Ok(Self {
            issuer: Issuer::new(params, key),
            ca_pem,
            ca_key_pem,
        })
    }

    /// Load an existing CA from its certificate and private key PEM.
    pub fn from_pem(ca_cert_pem: &str, ca_key_pem: &str) -> Result<Self, PkiError> {
        let key = KeyPair::from_pem(ca_key_pem)?;
        let issuer = Issuer::from_ca_cert_pem(ca_cert_pem, key)?;
        Ok(Self {
            issuer,
            ca_pem: ca_cert_pem.to_string(),
            ca_key_pem: ca_key_pem.to_string(),
        })
    }

    /// The CA private key as PEM, for persisting a generated CA.
    pub fn ca_key_pem(&self) -> &str {
        &self.ca_key_pem
    }
}

impl Authority for CertificateAuthority {
    fn sign_leaf(&self, public_key_der: &[u8], subject: &str) -> Result<String, PkiError> {
        let public_key = SubjectPublicKeyInfo::from_der(public_key_der)?;

        // The peer name doubles as a dNSName SAN so rustls peers can verify
        // each other by endpoint name.
        let mut params = CertificateParams::new(vec![subject.to_string()])?;
        params.distinguished_name = DistinguishedName::new();
        params.distinguished_name.push(DnType::CommonName, subject);
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];

        let certificate = params.signed_by(&public_key, &self.issuer)?;
        Ok(certificate.pem())
    }

    fn ca_certificate_pem(&self) -> String {
        self.ca_pem.clone()
    }
}

/// Extract the SPKI DER and subject common name from a peer's certificate.
pub fn peer_key_and_subject(cert_der: &[u8]) -> Result<(Vec<u8>, String), PkiError> {
    let (_, certificate) =
        X509Certificate::from_der(cert_der).map_err(|err| PkiError::Der(err.to_string()))?;
    let public_key = certificate.public_key().raw.to_vec();
    let subject = certificate
        .subject()
        .iter_common_name()
        .find_map(|attr| attr.as_str().ok())
        .map(str::to_string)
        .ok_or(PkiError::MissingCommonName)?;
    Ok((public_key, subject))
}
