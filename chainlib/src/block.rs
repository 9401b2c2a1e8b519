use crate::digest::Digest;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};

pub const BLOCK_REWARD: i64 = 25;

/// An immutable, already-mined block: a link to its predecessor, the nonce
/// that made its hash satisfy the difficulty predicate, and its transactions
/// (position 0 is always the coinbase).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub prev_hash: Digest,
    pub nonce: u64,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(prev_hash: Digest, nonce: u64, transactions: Vec<Transaction>) -> Self {
        Block {
            prev_hash,
            nonce,
            transactions,
        }
    }

    /// `SHA256(prev_hash ‖ little_endian_u64(nonce) ‖ hash(tx₀) ‖ hash(tx₁) ‖ …)`.
    pub fn hash(&self) -> Digest {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(self.prev_hash.as_bytes());
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        for tx in &self.transactions {
            bytes.extend_from_slice(tx.hash().as_bytes());
        }
        Digest::of(&bytes)
    }

    pub fn is_valid(&self, difficulty: usize) -> bool {
        self.hash().satisfies_difficulty(difficulty)
    }

    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_changes_the_hash() {
        let genesis_hash = Digest::of(b"genesis");
        let a = Block::new(genesis_hash, 0, vec![]);
        let b = Block::new(genesis_hash, 1, vec![]);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn difficulty_zero_always_valid() {
        let genesis_hash = Digest::of(b"genesis");
        let block = Block::new(genesis_hash, 0, vec![]);
        assert!(block.is_valid(0));
    }
}
