pub mod block;
pub mod crypto;
pub mod digest;
pub mod error;
pub mod ledger;
pub mod transaction;
pub mod wire;

pub use block::Block;
pub use crypto::{PrivateKey, PublicKey, Signature};
pub use digest::Digest;
pub use error::{CryptoError, LedgerError, TxError};
pub use ledger::{Ledger, DEFAULT_ATTEMPT_LIMIT, NETWORK_DIFFICULTY};
pub use transaction::Transaction;
