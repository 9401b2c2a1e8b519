//! Outbound gossip: after mining a block locally, tell every known peer
//! about it. Fire-and-forget — a peer that is down or slow to answer does
//! not hold up mining, nor does it hold up announcing to any other peer,
//! since each peer gets its own dialer task.

use chainlib::wire::{self, RpcRequest};
use chainlib::Block;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tracing::warn;

/// Spawns one dialer task per peer on `runtime`, each independently
/// connecting and writing the encoded block. A peer that is down or slow
/// only delays its own task, never the announcement to the others.
pub fn broadcast_new_block(runtime: &Handle, peers: &[String], block: &Block) {
    let request = RpcRequest::NewBlock(block.clone());
    let bytes = match wire::encode(&request) {
        Ok(bytes) => Arc::new(bytes),
        Err(err) => {
            warn!(error = %err, "failed to encode outgoing NewBlock");
            return;
        }
    };

    for peer in peers {
        let peer = peer.clone();
        let bytes = Arc::clone(&bytes);
        runtime.spawn(async move {
            if let Err(err) = send_to(&peer, &bytes).await {
                warn!(%peer, error = %err, "failed to announce new block to peer");
            }
        });
    }
}

async fn send_to(peer: &str, bytes: &[u8]) -> anyhow::Result<()> {
    let mut stream = TcpStream::connect(peer).await?;
    let len = u32::try_from(bytes.len())?;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(bytes).await?;
    Ok(())
}
