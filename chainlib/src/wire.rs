//! The messages that cross the TCP wire between nodes and wallets. Framing
//! (the node and wallet crates use a big-endian `u32` length prefix) lives
//! with the socket I/O, not here; this module only defines what gets
//! encoded and decoded, and the canonical CBOR (`ciborium`) codec for it.

use crate::block::Block;
use crate::crypto::PublicKey;
use crate::digest::Digest;
use crate::error::{LedgerError, TxError};
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;

/// One of the four remotely callable procedures, named to match
/// `BlockChainServer.<Method>` on the wire.
#[derive(Serialize, Deserialize, Debug)]
pub enum RpcRequest {
    Transact(Transaction),
    GetOpenInputs(PublicKey),
    GetBlock(Digest),
    NewBlock(Block),
}

impl RpcRequest {
    pub fn method_name(&self) -> &'static str {
        match self {
            RpcRequest::Transact(_) => "BlockChainServer.Transact",
            RpcRequest::GetOpenInputs(_) => "BlockChainServer.GetOpenInputs",
            RpcRequest::GetBlock(_) => "BlockChainServer.GetBlock",
            RpcRequest::NewBlock(_) => "BlockChainServer.NewBlock",
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub enum RpcResponse {
    Transact(Result<bool, TxError>),
    GetOpenInputs(HashMap<Digest, i64>),
    GetBlock(Option<Block>),
    /// `NewBlock` is fire-and-forget at the ledger layer, but the
    /// connection still gets an ack frame so the framing code does not
    /// need a special one-way case.
    NewBlockAck,
}

/// The error a peer-announced block was rejected for; kept distinct from
/// `RpcResponse` because `NewBlock` has no reply slot in the RPC surface
/// (§4.6) — this is only ever logged locally, never sent back to the peer.
pub type NewBlockOutcome = Result<(), LedgerError>;

pub fn encode<T: Serialize>(value: &T) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    Ok(buf)
}

pub fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> io::Result<T> {
    ciborium::de::from_reader(bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PrivateKey;

    #[test]
    fn get_open_inputs_round_trips() {
        let (_, key) = PrivateKey::generate().unwrap();
        let req = RpcRequest::GetOpenInputs(key);
        let bytes = encode(&req).unwrap();
        let decoded: RpcRequest = decode(&bytes).unwrap();
        assert_eq!(decoded.method_name(), "BlockChainServer.GetOpenInputs");
    }
}
