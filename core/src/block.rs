//! Blocks and their canonical encoding.
//!
//! The 100-byte header (all integers little-endian):
//!
//! ```text
//! number            : u32
//! parent_hash       : 32 raw bytes
//! beneficiary       : 20 raw bytes
//! transactions_root : 32 raw bytes
//! target            : u32
//! timestamp         : u32
//! nonce             : u32
//! ```
//!
//! The block hash is SHA3-256 of the header only; transactions are
//! committed to through `transactions_root`, the Merkle root of the
//! ascending-sorted transaction ids. The full encoding appends a u16
//! transaction count followed by each transaction, u16-size-prefixed.

use serde_json::{json, Value};

use crate::crypto;
use crate::error::{Error, Result};
use crate::transaction::Transaction;

/// Header size in bytes.
const HEADER_SIZE: usize = 100;

/// A chain block: header fields plus its ordered transactions.
#[derive(Debug, Clone)]
pub struct Block {
    /// Index in the chain, 0 for genesis.
    pub number: u32,
    /// Hash of the parent block, all zeros for genesis.
    pub parent_hash: String,
    /// Address credited with the block reward.
    pub beneficiary: String,
    /// Packed difficulty target; stored, not enforced.
    pub target: u32,
    /// Seconds since the UNIX epoch.
    pub timestamp: u32,
    /// Proof-of-work nonce; stored, not enforced.
    pub nonce: u32,
    transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(
        number: u32,
        parent_hash: &str,
        beneficiary: &str,
        target: u32,
        timestamp: u32,
        nonce: u32,
        transactions: Vec<Transaction>,
    ) -> Result<Self> {
        if parent_hash.len() != 64 || !crypto::is_hex_string(parent_hash) {
            return Err(Error::Malformed("parent hash must be 64 hex chars"));
        }
        if !crypto::validate_address(beneficiary) {
            return Err(Error::InvalidAddress);
        }
        let mut block = Self {
            number,
            parent_hash: parent_hash.to_string(),
            beneficiary: beneficiary.to_string(),
            target,
            timestamp,
            nonce,
            transactions: Vec::with_capacity(transactions.len()),
        };
        for transaction in transactions {
            block.add_transaction(transaction)?;
        }
        Ok(block)
    }

    /// Block hash: SHA3-256 of the serialized header.
    pub fn hash(&self) -> String {
        crypto::sha3(&self.serialize(false))
    }

    /// Merkle root of the ascending-sorted transaction ids, or the hash of
    /// the empty byte string when the block carries none.
    pub fn transactions_root(&self) -> String {
        if self.transactions.is_empty() {
            return crypto::sha3(&[]);
        }
        let mut ids: Vec<String> = self.transactions.iter().map(Transaction::id).collect();
        ids.sort();
        crypto::merkle_tree_root(&ids).expect("transaction ids are valid hex")
    }

    /// Appends a transaction. A block holds at most 65,535 transactions,
    /// the largest count the encoding can frame.
    pub fn add_transaction(&mut self, transaction: Transaction) -> Result<()> {
        if self.transactions.len() >= u16::MAX as usize {
            return Err(Error::Malformed("too many transactions"));
        }
        self.transactions.push(transaction);
        Ok(())
    }

    /// Transactions in block order.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Canonical encoding: the 100-byte header, and with
    /// `include_transactions` the framed transaction list.
    pub fn serialize(&self, include_transactions: bool) -> Vec<u8> {
        let mut data = Vec::with_capacity(HEADER_SIZE);
        data.extend_from_slice(&self.number.to_le_bytes());
        data.extend_from_slice(
            &hex::decode(&self.parent_hash).expect("parent hash is validated hex"),
        );
        data.extend_from_slice(
            &hex::decode(&self.beneficiary).expect("beneficiary is a validated address"),
        );
        data.extend_from_slice(
            &hex::decode(self.transactions_root()).expect("root is a hash"),
        );
        data.extend_from_slice(&self.target.to_le_bytes());
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        data.extend_from_slice(&self.nonce.to_le_bytes());
        if !include_transactions {
            return data;
        }
        let count = u16::try_from(self.transactions.len())
            .expect("add_transaction caps the count at u16::MAX");
        data.extend_from_slice(&count.to_le_bytes());
        for transaction in &self.transactions {
            let serialized = transaction.serialize(true);
            let size = u16::try_from(serialized.len()).expect("transaction fits u16 framing");
            data.extend_from_slice(&size.to_le_bytes());
            data.extend_from_slice(&serialized);
        }
        data
    }

    /// Parses the canonical encoding.
    ///
    /// A header-only input is exactly 100 bytes. Anything longer is parsed
    /// as a full block, and the stored transactions root must match the
    /// root recomputed from the parsed transactions.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::Malformed("block header too short"));
        }
        let number = u32::from_le_bytes(data[0..4].try_into().expect("four bytes"));
        let parent_hash = hex::encode(&data[4..36]);
        let beneficiary = hex::encode(&data[36..56]);
        let stored_root = hex::encode(&data[56..88]);
        let target = u32::from_le_bytes(data[88..92].try_into().expect("four bytes"));
        let timestamp = u32::from_le_bytes(data[92..96].try_into().expect("four bytes"));
        let nonce = u32::from_le_bytes(data[96..100].try_into().expect("four bytes"));
        let mut block = Self::new(
            number,
            &parent_hash,
            &beneficiary,
            target,
            timestamp,
            nonce,
            Vec::new(),
        )?;
        if data.len() == HEADER_SIZE {
            return Ok(block);
        }
        // two count bytes follow the header; the list itself is the framing
        // that is trusted
        let body = data.get(HEADER_SIZE + 2..).unwrap_or(&[]);
        let mut pos = 0;
        while pos < body.len() {
            let size = body
                .get(pos..pos + 2)
                .ok_or(Error::Malformed("truncated transaction frame"))?;
            let size = u16::from_le_bytes([size[0], size[1]]) as usize;
            pos += 2;
            let bytes = body
                .get(pos..pos + size)
                .ok_or(Error::Malformed("truncated transaction"))?;
            pos += size;
            block.add_transaction(Transaction::deserialize(bytes)?)?;
        }
        if stored_root != block.transactions_root() {
            return Err(Error::InvalidRoot);
        }
        Ok(block)
    }

    /// JSON view for the shell and tools.
    pub fn to_json(&self) -> Result<Value> {
        let mut transactions = Vec::with_capacity(self.transactions.len());
        for transaction in &self.transactions {
            transactions.push(transaction.to_json()?);
        }
        Ok(json!({
            "number": self.number,
            "parent_hash": self.parent_hash,
            "beneficiary": self.beneficiary,
            "target": self.target,
            "timestamp": self.timestamp,
            "nonce": self.nonce,
            "hash": self.hash(),
            "transactions": transactions,
        }))
    }
}
