//! Error types for the **chainee** core crate.
//!
//! All fallible operations return [`crate::Result`], an alias for
//! `core::result::Result<T, Error>`.
//!
//! Validation errors carry the exact condition that failed; the chain never
//! catches its own errors, so a failed append surfaces one of these variants
//! with live state untouched.

use thiserror::Error;

/// Core crate error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Address is not 40 lowercase hex characters.
    #[error("Address not valid")]
    InvalidAddress,

    /// Transaction output amount below 1.
    #[error("Amount not valid")]
    InvalidAmount,

    /// Stored transactions root does not match the recomputed root.
    #[error("Invalid root")]
    InvalidRoot,

    /// Block number is not exactly one past the tip (or 0 on an empty chain).
    #[error("Invalid number")]
    InvalidNumber,

    /// Block parent hash does not match the tip hash.
    #[error("Invalid parent hash")]
    InvalidParent,

    /// A transaction output pays its own sender.
    #[error("Receiver same as sender")]
    SelfPayment,

    /// Transaction value exceeds the sender's balance.
    #[error("Insufficient balance")]
    InsufficientBalance,

    /// Transaction nonce is below the sender's account nonce.
    #[error("Previously used nonce")]
    StaleNonce,

    /// A 64-bit sum would overflow.
    #[error("Value overflow")]
    Overflow,

    /// Sender queried on a transaction that carries no signature.
    #[error("Transaction not signed")]
    MissingSignature,

    /// Private key is not a hex scalar in (0, n) on secp256k1.
    #[error("Private key not valid")]
    InvalidPrivateKey,

    /// Truncated or wrong-size input.
    #[error("Malformed input: {0}")]
    Malformed(&'static str),

    /// Hex decoding failed.
    #[error("Invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Signing or recovery failed.
    #[error("Signature error: {0}")]
    Signature(#[from] k256::ecdsa::Error),

    /// Persistence I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenient result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
