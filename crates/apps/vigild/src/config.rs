use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Daemon configuration, loaded from a TOML file.
#[derive(Debug, Deserialize)]
pub struct NodeConfig {
    /// This node's endpoint name; must match the CN of its certificate.
    pub node: String,
    /// The zone this node belongs to.
    pub zone: String,
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Shared secret for ticket-authenticated certificate requests.
    /// Leave unset on nodes that do not issue certificates.
    pub ticket_salt: Option<String>,
    pub tls: TlsConfig,
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

#[derive(Debug, Deserialize)]
pub struct TlsConfig {
    /// This node's certificate chain (PEM).
    pub cert: PathBuf,
    /// This node's private key (PEM).
    pub key: PathBuf,
    /// Cluster CA certificate used to verify peers (PEM).
    pub ca: PathBuf,
    /// CA private key; only present on nodes that sign certificates.
    pub ca_key: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    pub zone: String,
    /// `host:port` to dial; absent for peers that connect to us.
    pub connect: Option<String>,
}

impl NodeConfig {
    pub fn from_toml(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }
}

fn default_listen() -> String {
    "0.0.0.0:5665".to_string()
}
