use chainlib::wire::{self, RpcRequest, RpcResponse};
use chainlib::{PrivateKey, PublicKey, Transaction};
use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{error, info};

const NODE_ADDR: &str = "localhost:8000";

/// A client for submitting transactions against a local node.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to this wallet's private key.
    #[arg(long)]
    key: String,

    /// Path to the recipient's public key.
    #[arg(long, required_unless_present = "generate")]
    to: Option<String>,

    /// Amount to send.
    #[arg(long, required_unless_present = "generate")]
    amount: Option<i64>,

    /// Generate a fresh keypair at `--key` (and `<key>.pub`) instead of sending anything.
    #[arg(long)]
    generate: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    if args.generate {
        return generate_keypair(&args.key);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(send(args))
}

fn generate_keypair(key_path: &str) -> anyhow::Result<()> {
    let (private, public) = PrivateKey::generate()?;
    private.write_to(key_path)?;
    let pub_path = format!("{key_path}.pub");
    public.write_to(&pub_path)?;
    info!(key_path, pub_path, "generated a new keypair");
    Ok(())
}

async fn send(args: Args) -> anyhow::Result<()> {
    let sender = PrivateKey::load(&args.key)?;
    let sender_pub = sender.public_key();
    let recipient = PublicKey::load(
        args.to
            .as_ref()
            .expect("clap requires --to unless --generate is set"),
    )?;
    let amount = args
        .amount
        .expect("clap requires --amount unless --generate is set");

    let open = call(RpcRequest::GetOpenInputs(sender_pub)).await?;
    let RpcResponse::GetOpenInputs(open) = open else {
        anyhow::bail!("node returned an unexpected response to GetOpenInputs");
    };
    let inputs: Vec<(chainlib::Digest, i64)> = open.into_iter().collect();

    let tx = Transaction::new_from_open_inputs(&inputs, &sender, &recipient, amount)?;

    let result = call(RpcRequest::Transact(tx)).await?;
    let RpcResponse::Transact(result) = result else {
        anyhow::bail!("node returned an unexpected response to Transact");
    };

    match result {
        Ok(accepted) => {
            println!("{accepted}");
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "node rejected the transaction");
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}

async fn call(request: RpcRequest) -> anyhow::Result<RpcResponse> {
    let mut stream = TcpStream::connect(NODE_ADDR).await?;
    let bytes = wire::encode(&request)?;
    let len = u32::try_from(bytes.len())?;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(&bytes).await?;

    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes);
    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf).await?;
    wire::decode(&buf)
}
