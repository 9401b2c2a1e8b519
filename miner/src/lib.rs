//! Coinbase assembly and the bounded-attempt proof-of-work search the node
//! core loop drives once per idle turn. Kept separate from the ledger
//! (which only knows how to validate and append a block someone hands it)
//! and from the node (which only knows about the message queue).

use chainlib::transaction::Transaction;
use chainlib::{Digest, Ledger, LedgerError, PrivateKey};
use std::collections::BTreeMap;

pub const DIFFICULTY: usize = chainlib::NETWORK_DIFFICULTY;
pub const ATTEMPT_LIMIT: u64 = chainlib::DEFAULT_ATTEMPT_LIMIT;

/// Outcome of one bounded mining attempt.
pub enum MiningOutcome {
    Mined { block: chainlib::Block, next_nonce: u64 },
    LimitReached { next_nonce: u64 },
    /// The candidate block was rejected before any nonce search ran because
    /// one of `pending`'s transactions no longer verifies against `ledger`
    /// (typically a peer block already consumed one of its inputs through a
    /// different transaction). `still_valid` is `pending` with every
    /// transaction that no longer verifies removed; the caller must replace
    /// its buffer with it so the poisoned transaction cannot block mining
    /// forever.
    Pruned {
        still_valid: Vec<Transaction>,
        next_nonce: u64,
    },
}

/// Build the coinbase paying the block reward to `node_key`'s own account.
///
/// `inputs` records `[latest]` — a non-spendable marker that exists only so
/// two otherwise-identical coinbases (same recipient, same reward) hash
/// differently across blocks — but the signature authenticates the signing
/// pre-image for an *empty* input list, not `[latest]`. Position-0
/// transactions are never signature-checked (`Ledger` only checks their
/// reward total), so this mismatch between the recorded input and what was
/// actually signed is inert; it is kept because peers must be able to
/// recompute the same coinbase hash the miner did.
pub fn build_coinbase(node_key: &PrivateKey, latest: Digest) -> Transaction {
    let node_pub = node_key.public_key();
    let empty_inputs: [Digest; 0] = [];
    let signing_preimage = Transaction::signing_preimage(&node_pub, &empty_inputs);
    let signature = node_key
        .sign(&signing_preimage)
        .expect("signing with a freshly loaded key does not fail");

    let mut outputs = BTreeMap::new();
    outputs.insert(node_pub.to_hex(), chainlib::block::BLOCK_REWARD);

    Transaction {
        inputs: vec![latest],
        sender: node_pub.clone(),
        recipient: node_pub,
        outputs,
        signature,
    }
}

/// Assemble `[coinbase] ++ pending` and spend up to `ATTEMPT_LIMIT` nonce
/// increments, starting from `starting_nonce`, trying to extend `ledger`.
pub fn mine_slice(
    ledger: &mut Ledger,
    pending: &[Transaction],
    node_key: &PrivateKey,
    starting_nonce: u64,
) -> MiningOutcome {
    let coinbase = build_coinbase(node_key, ledger.latest());
    let mut txs = Vec::with_capacity(pending.len() + 1);
    txs.push(coinbase);
    txs.extend_from_slice(pending);

    match ledger.add_next_block(DIFFICULTY, ATTEMPT_LIMIT, starting_nonce, txs) {
        Ok(block) => MiningOutcome::Mined { block, next_nonce: 0 },
        Err(LedgerError::LimitReached) => MiningOutcome::LimitReached {
            next_nonce: starting_nonce + ATTEMPT_LIMIT,
        },
        Err(other) => {
            // verify_ordinary_transactions runs before any nonce search, so
            // this rejected the candidate without spending any hash budget:
            // something already consumed one of `pending`'s inputs between
            // buffering and mining. Re-verify each buffered transaction and
            // report only the survivors, rather than retrying the same
            // poisoned set forever.
            tracing::warn!(error = %other, "mining slice rejected a buffered transaction, pruning pending");
            let still_valid: Vec<Transaction> = pending
                .iter()
                .filter(|tx| ledger.verify(tx).is_ok())
                .cloned()
                .collect();
            MiningOutcome::Pruned {
                still_valid,
                next_nonce: starting_nonce,
            }
        }
    }
}
