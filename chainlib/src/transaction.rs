use crate::crypto::{PrivateKey, PublicKey, Signature};
use crate::digest::Digest;
use crate::error::TxError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An immutable transfer of coins from `sender` to `recipient` (plus change
/// back to `sender`, if any), spending the outputs named by `inputs`.
///
/// `outputs` is a `BTreeMap` rather than a `HashMap` on purpose: its
/// iteration order is always the ascending order of its keys, which is
/// exactly the order the identity pre-image (see [`Transaction::hash`])
/// needs so that two nodes computing the hash of the same logical
/// transaction always agree.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub inputs: Vec<Digest>,
    pub sender: PublicKey,
    pub recipient: PublicKey,
    pub outputs: BTreeMap<String, i64>,
    pub signature: Signature,
}

impl Transaction {
    /// `encode_public(recipient) ‖ input[0] ‖ input[1] ‖ …`, the bytes whose
    /// SHA-256 the sender's signature authenticates.
    pub fn signing_preimage(recipient: &PublicKey, inputs: &[Digest]) -> Vec<u8> {
        let mut bytes = recipient.encode();
        for input in inputs {
            bytes.extend_from_slice(input.as_bytes());
        }
        bytes
    }

    /// `input[0] ‖ … ‖ key₀ ‖ key₁ ‖ … ‖ signature`, the bytes whose SHA-256
    /// is this transaction's identity.
    fn identity_preimage(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        for input in &self.inputs {
            bytes.extend_from_slice(input.as_bytes());
        }
        // BTreeMap already iterates keys in ascending order.
        for key in self.outputs.keys() {
            bytes.extend_from_slice(key.as_bytes());
        }
        bytes.extend_from_slice(self.signature.as_bytes());
        bytes
    }

    pub fn hash(&self) -> Digest {
        Digest::of(&self.identity_preimage())
    }

    pub fn output_total(&self) -> i64 {
        self.outputs.values().sum()
    }

    /// Build and sign a transaction spending `inputs`' outputs belonging to
    /// `sender`, paying `amount` to `recipient` and any leftover back to
    /// `sender` as change.
    pub fn new(
        inputs: &[Transaction],
        sender: &PrivateKey,
        recipient: &PublicKey,
        amount: i64,
    ) -> Result<Transaction, TxError> {
        let sender_pub = sender.public_key();
        let pairs: Vec<(Digest, i64)> = inputs
            .iter()
            .map(|tx| {
                let amount = tx
                    .outputs
                    .get(&sender_pub.to_hex())
                    .copied()
                    .unwrap_or(0);
                (tx.hash(), amount)
            })
            .collect();
        Self::new_from_open_inputs(&pairs, sender, recipient, amount)
    }

    /// Same as [`Transaction::new`], but for callers that only hold the
    /// spendable (digest, amount) pairs a `GetOpenInputs` query returns
    /// rather than the full prior `Transaction` values — the only inputs a
    /// remote wallet ever has.
    pub fn new_from_open_inputs(
        inputs: &[(Digest, i64)],
        sender: &PrivateKey,
        recipient: &PublicKey,
        amount: i64,
    ) -> Result<Transaction, TxError> {
        let sender_pub = sender.public_key();
        let input_total: i64 = inputs.iter().map(|(_, amount)| amount).sum();

        if amount > input_total {
            return Err(TxError::InsufficientFunds {
                requested: amount,
                available: input_total,
            });
        }

        let mut outputs = BTreeMap::new();
        outputs.insert(recipient.to_hex(), amount);
        let change = input_total - amount;
        if change > 0 {
            outputs.insert(sender_pub.to_hex(), change);
        }

        let input_hashes: Vec<Digest> = inputs.iter().map(|(hash, _)| *hash).collect();
        let preimage = Transaction::signing_preimage(recipient, &input_hashes);
        let signature = sender.sign(&preimage)?;

        Ok(Transaction {
            inputs: input_hashes,
            sender: sender_pub,
            recipient: recipient.clone(),
            outputs,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PrivateKey;

    fn seed_transaction(recipient: &PublicKey, sender: &PrivateKey, amount: i64) -> Transaction {
        let preimage = Transaction::signing_preimage(recipient, &[]);
        let signature = sender.sign(&preimage).unwrap();
        let mut outputs = BTreeMap::new();
        outputs.insert(recipient.to_hex(), amount);
        Transaction {
            inputs: vec![],
            sender: sender.public_key(),
            recipient: recipient.clone(),
            outputs,
            signature,
        }
    }

    #[test]
    fn hash_is_deterministic_for_the_same_logical_transaction() {
        let (priv_key, pub_key) = PrivateKey::generate().unwrap();
        let tx = seed_transaction(&pub_key, &priv_key, 25);
        assert_eq!(tx.hash(), tx.hash());
    }

    #[test]
    fn spend_with_change_splits_outputs_correctly() {
        let (sender_priv, sender_pub) = PrivateKey::generate().unwrap();
        let (_, recipient_pub) = PrivateKey::generate().unwrap();
        let seed = seed_transaction(&sender_pub, &sender_priv, 25);

        let spend = Transaction::new(&[seed], &sender_priv, &recipient_pub, 10).unwrap();
        assert_eq!(spend.outputs.get(&recipient_pub.to_hex()), Some(&10));
        assert_eq!(spend.outputs.get(&sender_pub.to_hex()), Some(&15));
        assert_eq!(spend.output_total(), 25);
    }

    #[test]
    fn insufficient_funds_is_rejected_before_signing() {
        let (sender_priv, sender_pub) = PrivateKey::generate().unwrap();
        let (_, recipient_pub) = PrivateKey::generate().unwrap();
        let seed = seed_transaction(&sender_pub, &sender_priv, 2);

        let result = Transaction::new(&[seed], &sender_priv, &recipient_pub, 5);
        assert!(matches!(result, Err(TxError::InsufficientFunds { .. })));
    }
}
