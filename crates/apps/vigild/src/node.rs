//! Node assembly: directory and dispatch construction, session attachment,
//! and the listener/dialer loops.

use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use vigil_cluster::handlers;
use vigil_cluster::{ConnectionRole, ConnectionState, Directory, DispatchTable, PeerConnection};
use vigil_pki::{Authority, CertificateAuthority, PkiError};

use crate::config::NodeConfig;
use crate::tls;
use crate::transport::FramedStream;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Pki(#[from] PkiError),

    #[error(transparent)]
    Dispatch(#[from] vigil_cluster::DispatchError),

    #[error("'{0}' is not a valid peer name for tls verification")]
    InvalidPeerName(String),
}

/// One running cluster node: the topology directory plus the method table,
/// shared by every session.
pub struct Node {
    pub name: String,
    pub directory: Arc<Directory>,
    pub dispatch: Arc<DispatchTable>,
}

impl Node {
    pub fn build(config: &NodeConfig) -> Result<Arc<Self>, NodeError> {
        let directory = Arc::new(Directory::new(&config.zone));
        for endpoint in &config.endpoints {
            directory.register_endpoint(&endpoint.name, &endpoint.zone);
        }

        let authority = build_authority(config)?;
        let mut dispatch = DispatchTable::new();
        handlers::register_builtin(&mut dispatch, config.ticket_salt.clone(), authority)?;

        Ok(Arc::new(Self {
            name: config.node.clone(),
            directory,
            dispatch: Arc::new(dispatch),
        }))
    }

    /// Attach a completed session to the cluster and start serving it.
    ///
    /// `peer_cert` must be the DER of the certificate the transport
    /// verified during the handshake; its subject common name becomes the
    /// session identity. Sessions without one stay anonymous.
    pub fn attach_session<S>(
        &self,
        stream: S,
        peer_cert: Option<Vec<u8>>,
        role: ConnectionRole,
    ) -> Arc<PeerConnection>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let identity = peer_cert.as_deref().and_then(tls::common_name);
        match identity.as_deref() {
            Some(name) => log::info!("node({}): peer '{}' connected", self.name, name),
            None => log::info!("node({}): anonymous peer connected", self.name),
        }
        let transport = Arc::new(FramedStream::new(stream, peer_cert));
        let connection = PeerConnection::attach(
            identity,
            transport,
            role,
            Arc::clone(&self.dispatch),
            Arc::clone(&self.directory),
        );
        connection.start();
        connection
    }
}

fn build_authority(config: &NodeConfig) -> Result<Arc<dyn Authority>, NodeError> {
    match &config.tls.ca_key {
        Some(ca_key) => {
            let cert_pem = std::fs::read_to_string(&config.tls.ca)?;
            let key_pem = std::fs::read_to_string(ca_key)?;
            Ok(Arc::new(CertificateAuthority::from_pem(&cert_pem, &key_pem)?))
        }
        None => Ok(Arc::new(UnsignedAuthority)),
    }
}

/// Stand-in on nodes without the CA key: certificate requests get a clean
/// error reply instead of a signature.
struct UnsignedAuthority;

impl Authority for UnsignedAuthority {
    fn sign_leaf(&self, _public_key_der: &[u8], _subject: &str) -> Result<String, PkiError> {
        Err(PkiError::CaUnavailable)
    }

    fn ca_certificate_pem(&self) -> String {
        String::new()
    }
}

/// Accept cluster sessions forever.
pub async fn serve(node: Arc<Node>, listener: TcpListener, acceptor: TlsAcceptor) {
    loop {
        let (socket, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                log::warn!("node({}): accept failed: {}", node.name, err);
                continue;
            }
        };
        let node = Arc::clone(&node);
        let acceptor = acceptor.clone();
        tokio::spawn(async move {
            match acceptor.accept(socket).await {
                Ok(stream) => {
                    let peer_cert = {
                        let (_socket, session) = stream.get_ref();
                        session
                            .peer_certificates()
                            .and_then(|certs| certs.first())
                            .map(|cert| cert.as_ref().to_vec())
                    };
                    node.attach_session(stream, peer_cert, ConnectionRole::Acceptor);
                }
                Err(err) => {
                    log::warn!(
                        "node({}): tls handshake failed with {}: {}",
                        node.name,
                        peer_addr,
                        err
                    );
                }
            }
        });
    }
}

/// Keep one outbound session to a configured peer alive, redialing with a
/// fixed delay whenever it drops.
pub async fn maintain_connection(
    node: Arc<Node>,
    connector: TlsConnector,
    endpoint: String,
    addr: String,
) {
    loop {
        match connect_once(&node, &connector, &endpoint, &addr).await {
            Ok(connection) => {
                while connection.state() != ConnectionState::Closed {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                log::info!("node({}): connection to '{}' closed", node.name, endpoint);
            }
            Err(err) => {
                log::info!(
                    "node({}): couldn't connect to '{}' at {}: {}",
                    node.name,
                    endpoint,
                    addr,
                    err
                );
            }
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn connect_once(
    node: &Arc<Node>,
    connector: &TlsConnector,
    endpoint: &str,
    addr: &str,
) -> Result<Arc<PeerConnection>, NodeError> {
    let socket = TcpStream::connect(addr).await?;
    let server_name = ServerName::try_from(endpoint.to_string())
        .map_err(|_| NodeError::InvalidPeerName(endpoint.to_string()))?;
    let stream = connector.connect(server_name, socket).await?;
    let peer_cert = {
        let (_socket, session) = stream.get_ref();
        session
            .peer_certificates()
            .and_then(|certs| certs.first())
            .map(|cert| cert.as_ref().to_vec())
    };
    Ok(node.attach_session(stream, peer_cert, ConnectionRole::Initiator))
}
