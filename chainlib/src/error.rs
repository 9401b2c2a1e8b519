use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Key material and signature failures; these never depend on ledger state.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CryptoError {
    #[error("malformed key: {0}")]
    Key(String),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("signature does not match")]
    InvalidSignature,
    #[error("PEM decoding failed: {0}")]
    Pem(String),
    #[error("I/O error: {0}")]
    Io(String),
}

/// Rejections a single transaction can earn, surfaced back to the submitter.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxError {
    #[error("signature does not match sender")]
    InvalidSignature,
    #[error("input {0} is not a currently open output")]
    UnknownInput(String),
    #[error("sender does not own input {0}")]
    NotOwner(String),
    #[error("input total does not equal output total")]
    UnbalancedAmounts,
    #[error("transaction has a negative output")]
    NegativeOutput,
    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: i64, available: i64 },
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Rejections that apply to an entire candidate or peer-announced block.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerError {
    #[error("coinbase transaction does not create exactly 25 coins")]
    InvalidCoinbase,
    #[error(transparent)]
    Tx(#[from] TxError),
    #[error("exhausted the nonce search budget without finding a valid block")]
    LimitReached,
    #[error("block's prev_hash does not match the current chain tip")]
    NotNextInChain,
    #[error("block contains no transactions")]
    EmptyBlock,
    #[error("block's hash does not satisfy the difficulty predicate")]
    InvalidProofOfWork,
}
