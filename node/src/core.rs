//! The single-writer core: owns the ledger, the pending-transaction buffer,
//! and the mining nonce cursor. Runs on its own OS thread (not a tokio
//! task) because mining and signature verification are CPU work that must
//! run to completion without yielding — the only suspension point is
//! waiting for the next message, and even that is a non-blocking poll so
//! the loop can fall through to a mining slice whenever the queue is empty.

use chainlib::crypto::PublicKey;
use chainlib::digest::Digest;
use chainlib::error::TxError;
use chainlib::transaction::Transaction;
use chainlib::{Block, Ledger, PrivateKey};
use std::collections::HashMap;
use std::sync::mpsc::{Receiver, TryRecvError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

pub enum CoreMessage {
    Transact {
        tx: Transaction,
        reply: oneshot::Sender<Result<bool, TxError>>,
    },
    GetOpenInputs {
        key: PublicKey,
        reply: oneshot::Sender<HashMap<Digest, i64>>,
    },
    GetBlock {
        hash: Digest,
        reply: oneshot::Sender<Option<Block>>,
    },
    NewBlock {
        block: Block,
    },
}

pub struct Core {
    ledger: Ledger,
    pending: Vec<Transaction>,
    current_nonce: u64,
    node_key: PrivateKey,
    peers: Vec<String>,
    runtime: tokio::runtime::Handle,
}

impl Core {
    pub fn new(
        ledger: Ledger,
        node_key: PrivateKey,
        peers: Vec<String>,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        Core {
            ledger,
            pending: Vec::new(),
            current_nonce: 0,
            node_key,
            peers,
            runtime,
        }
    }

    /// Drains messages in arrival order; mines one bounded slice only when
    /// the queue is empty at the point of inspection.
    pub fn run(mut self, rx: Receiver<CoreMessage>) {
        loop {
            match rx.try_recv() {
                Ok(msg) => self.handle(msg),
                Err(TryRecvError::Empty) => self.mine_one_slice(),
                Err(TryRecvError::Disconnected) => {
                    info!("core message channel closed, shutting down");
                    return;
                }
            }
        }
    }

    fn handle(&mut self, msg: CoreMessage) {
        match msg {
            CoreMessage::Transact { tx, reply } => {
                debug!(sender = %tx.sender.to_hex(), "received Transact request");
                let result = self.ledger.verify(&tx).map(|()| {
                    self.pending.push(tx);
                    true
                });
                let _ = reply.send(result);
            }
            CoreMessage::GetOpenInputs { key, reply } => {
                debug!("received GetOpenInputs request");
                let _ = reply.send(self.ledger.get_open_inputs(&key));
            }
            CoreMessage::GetBlock { hash, reply } => {
                debug!(hash = %hash, "received GetBlock request");
                let _ = reply.send(self.ledger.get_block(&hash).cloned());
            }
            CoreMessage::NewBlock { block } => self.handle_new_block(block),
        }
    }

    fn handle_new_block(&mut self, block: Block) {
        let incoming_hashes: Vec<Digest> = block.transactions.iter().map(Transaction::hash).collect();
        match self.ledger.accept_peer_block(block) {
            Ok(()) => {
                self.current_nonce = 0;
                self.pending
                    .retain(|tx| !incoming_hashes.contains(&tx.hash()));
                info!(height = self.ledger.chain_length(), "accepted peer block");
            }
            Err(err) => {
                warn!(error = %err, "rejected peer block");
            }
        }
    }

    fn mine_one_slice(&mut self) {
        match miner::mine_slice(&mut self.ledger, &self.pending, &self.node_key, self.current_nonce) {
            miner::MiningOutcome::Mined { block, next_nonce } => {
                self.pending.clear();
                self.current_nonce = next_nonce;
                info!(height = self.ledger.chain_length(), "mined new block");
                self.broadcast(block);
            }
            miner::MiningOutcome::LimitReached { next_nonce } => {
                debug!(next_nonce, "mining slice exhausted without a valid nonce");
                self.current_nonce = next_nonce;
            }
            miner::MiningOutcome::Pruned { still_valid, next_nonce } => {
                let dropped = self.pending.len() - still_valid.len();
                warn!(dropped, remaining = still_valid.len(), "dropped pending transactions that no longer verify");
                self.pending = still_valid;
                self.current_nonce = next_nonce;
            }
        }
    }

    fn broadcast(&self, block: Block) {
        if self.peers.is_empty() {
            return;
        }
        crate::peer::broadcast_new_block(&self.runtime, &self.peers, &block);
    }
}
