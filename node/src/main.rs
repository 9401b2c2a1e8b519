use chainlib::{Ledger, PrivateKey};
use clap::Parser;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::mpsc;
use tracing::{error, info};

mod core;
mod peer;
mod rpc;

const NODE_KEY_PATH: &str = "./id_rsa";
const LISTEN_PORT: u16 = 8000;

/// A minimal proof-of-work ledger node.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Peer hostnames (host:port) to announce newly mined blocks to.
    peers: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let node_key = load_or_generate_key(NODE_KEY_PATH).map_err(|err| {
        error!(error = %err, "could not load node key");
        err
    })?;
    let fingerprint = node_key.public_key().to_hex();
    info!(fingerprint = %&fingerprint[..16.min(fingerprint.len())], peers = ?args.peers, "node starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let runtime_handle = runtime.handle().clone();

    let (core_tx, core_rx) = mpsc::channel();
    let core = core::Core::new(Ledger::new(), node_key, args.peers, runtime_handle);
    std::thread::spawn(move || core.run(core_rx));

    let addr = SocketAddr::from(([0, 0, 0, 0], LISTEN_PORT));
    runtime.block_on(async move {
        if let Err(err) = rpc::serve(addr, core_tx).await {
            error!(error = %err, "RPC server exited");
            return Err(err);
        }
        Ok(())
    })
}

fn load_or_generate_key(path: impl AsRef<Path>) -> anyhow::Result<PrivateKey> {
    let path = path.as_ref();
    if path.exists() {
        return Ok(PrivateKey::load(path)?);
    }
    info!(?path, "no node key found, generating one");
    let (private, public) = PrivateKey::generate()?;
    private.write_to(path)?;
    public.write_to(path.with_extension("pub"))?;
    Ok(private)
}
