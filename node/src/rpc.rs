//! The TCP front door: one task per connection, each request framed as a
//! big-endian `u32` byte length followed by that many CBOR bytes, matching
//! the framing the wallet and peer-dialer both speak (see `wire.rs`).

use crate::core::CoreMessage;
use chainlib::wire::{self, RpcRequest, RpcResponse};
use std::net::SocketAddr;
use std::sync::mpsc::Sender as SyncSender;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

pub async fn serve(addr: SocketAddr, core_tx: SyncSender<CoreMessage>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "RPC server listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        let core_tx = core_tx.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, core_tx).await {
                warn!(%peer, error = %err, "RPC connection ended with an error");
            }
        });
    }
}

async fn handle_connection(mut stream: TcpStream, core_tx: SyncSender<CoreMessage>) -> anyhow::Result<()> {
    loop {
        let request = match read_frame(&mut stream).await? {
            Some(bytes) => bytes,
            None => return Ok(()),
        };
        let request: RpcRequest = wire::decode(&request)?;
        debug!(method = request.method_name(), "dispatching RPC request");
        let response = dispatch(&core_tx, request).await?;
        let bytes = wire::encode(&response)?;
        write_frame(&mut stream, &bytes).await?;
    }
}

async fn dispatch(core_tx: &SyncSender<CoreMessage>, request: RpcRequest) -> anyhow::Result<RpcResponse> {
    match request {
        RpcRequest::Transact(tx) => {
            let (reply_tx, reply_rx) = oneshot::channel();
            core_tx.send(CoreMessage::Transact { tx, reply: reply_tx })?;
            Ok(RpcResponse::Transact(reply_rx.await?))
        }
        RpcRequest::GetOpenInputs(key) => {
            let (reply_tx, reply_rx) = oneshot::channel();
            core_tx.send(CoreMessage::GetOpenInputs { key, reply: reply_tx })?;
            Ok(RpcResponse::GetOpenInputs(reply_rx.await?))
        }
        RpcRequest::GetBlock(hash) => {
            let (reply_tx, reply_rx) = oneshot::channel();
            core_tx.send(CoreMessage::GetBlock { hash, reply: reply_tx })?;
            Ok(RpcResponse::GetBlock(reply_rx.await?))
        }
        RpcRequest::NewBlock(block) => {
            core_tx.send(CoreMessage::NewBlock { block })?;
            Ok(RpcResponse::NewBlockAck)
        }
    }
}

async fn read_frame(stream: &mut TcpStream) -> anyhow::Result<Option<Vec<u8>>> {
    let mut len_bytes = [0u8; 4];
    match stream.read_exact(&mut len_bytes).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }
    let len = u32::from_be_bytes(len_bytes);
    anyhow::ensure!(len <= MAX_FRAME_BYTES, "frame of {len} bytes exceeds the {MAX_FRAME_BYTES} byte limit");
    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

pub async fn write_frame(stream: &mut TcpStream, bytes: &[u8]) -> anyhow::Result<()> {
    let len = u32::try_from(bytes.len())?;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(bytes).await?;
    Ok(())
}
