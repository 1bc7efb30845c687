/// Errors from certificate authority and peer-certificate operations.
#[derive(Debug, thiserror::Error)]
pub enum PkiError {
    #[error("certificate generation failed: {0}")]
    Generation(#[from] rcgen::Error),

    #[error("certificate is not valid DER: {0}")]
    Der(String),

    #[error("certificate subject has no common name")]
    MissingCommonName,

    #[error("this node does not hold the cluster CA key")]
    CaUnavailable,
}
