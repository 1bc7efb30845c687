use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use vigild::config::NodeConfig;
use vigild::{node, tls};

#[derive(Parser, Debug)]
#[command(name = "vigild")]
struct Args {
    #[arg(long, default_value = "vigild.toml")]
    config: PathBuf,
    #[arg(long)]
    listen: Option<String>,
    #[arg(long)]
    cert: Option<PathBuf>,
    #[arg(long)]
    key: Option<PathBuf>,
    #[arg(long)]
    ca: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let mut config = NodeConfig::from_path(&args.config).expect("load configuration");
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(cert) = args.cert {
        config.tls.cert = cert;
    }
    if let Some(key) = args.key {
        config.tls.key = key;
    }
    if let Some(ca) = args.ca {
        config.tls.ca = ca;
    }

    let node = node::Node::build(&config).expect("assemble node");

    let server_config = tls::build_server_config(&config.tls.cert, &config.tls.key, &config.tls.ca)
        .expect("build tls server config");
    let client_config = tls::build_client_config(&config.tls.cert, &config.tls.key, &config.tls.ca)
        .expect("build tls client config");
    let acceptor = TlsAcceptor::from(server_config);
    let connector = TlsConnector::from(client_config);

    for endpoint in &config.endpoints {
        if let Some(addr) = &endpoint.connect {
            tokio::spawn(node::maintain_connection(
                Arc::clone(&node),
                connector.clone(),
                endpoint.name.clone(),
                addr.clone(),
            ));
        }
    }

    let listener = TcpListener::bind(&config.listen)
        .await
        .expect("bind cluster listener");
    log::info!("vigild listening on {}", config.listen);
    node::serve(node, listener, acceptor).await;
}
