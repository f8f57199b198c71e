//! chainee core library.
//!
//! A minimal single-node blockchain ledger: canonical binary encodings
//! for blocks and transactions, secp256k1 recoverable signatures with
//! SHA3-256 hashing, an account-balance state-transition function, and
//! the layered append-only indexes that persist the chain.

pub mod block;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod error;
pub mod index;
pub mod transaction;

pub use block::Block;
pub use chain::Blockchain;
pub use config::Config;
pub use error::{Error, Result};
pub use transaction::Transaction;

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the UNIX timestamp in seconds.
pub fn timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_secs() as u32
}
