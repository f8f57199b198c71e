//! Account-model transactions.
//!
//! A transaction moves value from one signer to an ordered set of
//! recipient outputs. The canonical encoding is little-endian:
//!
//! ```text
//! nonce        : u16
//! output count : i8
//! per output   : 20-byte address ‖ u64 amount   (insertion order)
//! signature    : 65 raw bytes, appended unframed when present
//! ```
//!
//! The id is SHA3-256 over the *signed* encoding, so two transactions
//! differing only in signature have different ids. The signature itself
//! covers the unsigned encoding, which is what `sender()` recovers from.

use serde_json::{json, Value};

use crate::crypto;
use crate::error::{Error, Result};

/// Size of one encoded output: 20-byte address plus u64 amount.
const OUTPUT_SIZE: usize = 28;

/// A transfer from a single signer to one or more recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Per-sender replay counter; the account nonce is the next value
    /// accepted here.
    pub nonce: u16,
    out: Vec<(String, u64)>,
    signature: Option<Vec<u8>>,
}

impl Transaction {
    /// Builds a transaction, validating every output.
    pub fn new(nonce: u16, out: &[(&str, u64)]) -> Result<Self> {
        let mut transaction = Self {
            nonce,
            out: Vec::with_capacity(out.len()),
            signature: None,
        };
        for (address, amount) in out {
            transaction.set_out(address, *amount)?;
        }
        Ok(transaction)
    }

    /// Adds or replaces an output. Replacing keeps the original position,
    /// since output order is part of the encoded form.
    pub fn set_out(&mut self, address: &str, amount: u64) -> Result<()> {
        if !crypto::validate_address(address) {
            return Err(Error::InvalidAddress);
        }
        if amount < 1 {
            return Err(Error::InvalidAmount);
        }
        if let Some(entry) = self.out.iter_mut().find(|(a, _)| a == address) {
            entry.1 = amount;
            return Ok(());
        }
        // the wire count is a signed byte
        if self.out.len() >= i8::MAX as usize {
            return Err(Error::Malformed("too many outputs"));
        }
        self.out.push((address.to_string(), amount));
        Ok(())
    }

    /// Outputs in insertion order.
    pub fn outputs(&self) -> &[(String, u64)] {
        &self.out
    }

    pub fn signature(&self) -> Option<&[u8]> {
        self.signature.as_deref()
    }

    /// Transaction id: SHA3-256 over the full serialized form.
    pub fn id(&self) -> String {
        crypto::sha3(&self.serialize(true))
    }

    /// Total output value, rejecting u64 overflow.
    pub fn value(&self) -> Result<u64> {
        let mut value: u64 = 0;
        for (_, amount) in &self.out {
            value = value.checked_add(*amount).ok_or(Error::Overflow)?;
        }
        Ok(value)
    }

    /// Signs the unsigned encoding, replacing any prior signature.
    pub fn sign(&mut self, private_key: &str) -> Result<()> {
        self.signature = Some(crypto::sign(&self.serialize(false), private_key)?);
        Ok(())
    }

    /// Recovers the signer's address; defined only once signed.
    pub fn sender(&self) -> Result<String> {
        let signature = self.signature.as_ref().ok_or(Error::MissingSignature)?;
        crypto::recover(&self.serialize(false), signature)
    }

    /// Canonical encoding; the signature is appended only when requested
    /// and present.
    pub fn serialize(&self, include_signature: bool) -> Vec<u8> {
        let mut data = Vec::with_capacity(3 + self.out.len() * OUTPUT_SIZE);
        data.extend_from_slice(&self.nonce.to_le_bytes());
        data.push(self.out.len() as u8);
        for (address, amount) in &self.out {
            let address = hex::decode(address).expect("output address is validated hex");
            data.extend_from_slice(&address);
            data.extend_from_slice(&amount.to_le_bytes());
        }
        if include_signature {
            if let Some(signature) = &self.signature {
                data.extend_from_slice(signature);
            }
        }
        data
    }

    /// Parses the canonical encoding. Bytes past the last output are taken
    /// as the signature; outputs are re-validated through [`set_out`].
    ///
    /// No cryptographic check happens here; the signature is verified by
    /// sender recovery when a block is applied.
    ///
    /// [`set_out`]: Transaction::set_out
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        if data.len() < 3 {
            return Err(Error::Malformed("transaction too short"));
        }
        let nonce = u16::from_le_bytes([data[0], data[1]]);
        let count = data[2] as i8;
        let mut transaction = Self {
            nonce,
            out: Vec::new(),
            signature: None,
        };
        let mut pos = 3;
        for _ in 0..count.max(0) {
            let record = data
                .get(pos..pos + OUTPUT_SIZE)
                .ok_or(Error::Malformed("truncated transaction output"))?;
            let amount = u64::from_le_bytes(
                record[20..].try_into().expect("slice is eight bytes"),
            );
            transaction.set_out(&hex::encode(&record[..20]), amount)?;
            pos += OUTPUT_SIZE;
        }
        if data.len() > pos {
            transaction.signature = Some(data[pos..].to_vec());
        }
        Ok(transaction)
    }

    /// JSON view for the shell and tools: outputs, id, and when signed the
    /// signature hex and recovered sender address.
    pub fn to_json(&self) -> Result<Value> {
        let mut outputs = serde_json::Map::new();
        for (address, amount) in &self.out {
            outputs.insert(address.clone(), json!(amount));
        }
        let mut value = json!({
            "nonce": self.nonce,
            "out": outputs,
            "signature": Value::Null,
            "id": self.id(),
        });
        if let Some(signature) = &self.signature {
            value["signature"] = json!(hex::encode(signature));
            value["address"] = json!(self.sender()?);
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIVATE_KEY: &str = "685cf62751cef607271ed7190b6a707405c5b07ec0830156e748c0c2ea4a2cfe";
    const RECIPIENT: &str = "38fb65b08416b9870067b6cba63fa50a81bc78c8";

    fn signed_transaction() -> Transaction {
        let mut transaction = Transaction::new(1, &[(RECIPIENT, 100)]).unwrap();
        transaction.sign(PRIVATE_KEY).unwrap();
        transaction
    }

    #[test]
    fn id_matches_reference() {
        assert_eq!(
            signed_transaction().id(),
            "d1ed0b9ab80eb6dcacb8d54cc164700e34a1950fbe0589a181b158568f7c4041"
        );
    }

    #[test]
    fn sender_is_recovered() {
        assert_eq!(
            signed_transaction().sender().unwrap(),
            "c70f4891d2ce22b1f62492605c1d5c2fc1a8ef47"
        );
    }

    #[test]
    fn value_sums_outputs() {
        assert_eq!(signed_transaction().value().unwrap(), 100);
    }

    #[test]
    fn value_detects_overflow() {
        let transaction = Transaction::new(
            0,
            &[
                ("0000000000000000000000000000000000000001", u64::MAX),
                ("0000000000000000000000000000000000000002", 1),
            ],
        )
        .unwrap();
        assert!(matches!(transaction.value(), Err(Error::Overflow)));
    }

    #[test]
    fn serialized_form_matches_reference() {
        assert_eq!(
            hex::encode(signed_transaction().serialize(true)),
            "01000138fb65b08416b9870067b6cba63fa50a81bc78c8640000000000000034c4ac66523f355dba984e99baff0d991096bcf52b64909201a604b78fb48433106b598de5a8a69a79655414338dc43f8f197ed0d607e29f12d6f67b6fb852a301"
        );
    }

    #[test]
    fn round_trip() {
        let transaction = signed_transaction();
        let decoded = Transaction::deserialize(&transaction.serialize(true)).unwrap();
        assert_eq!(decoded.serialize(true), transaction.serialize(true));
        assert_eq!(decoded.id(), transaction.id());
    }

    #[test]
    fn unsigned_round_trip_has_no_signature() {
        let unsigned = Transaction::new(1, &[(RECIPIENT, 100)]).unwrap();
        let decoded = Transaction::deserialize(&unsigned.serialize(true)).unwrap();
        assert!(decoded.signature().is_none());
        assert!(matches!(decoded.sender(), Err(Error::MissingSignature)));
    }

    #[test]
    fn rejects_invalid_address() {
        assert!(matches!(
            Transaction::new(0, &[("not an address", 5)]),
            Err(Error::InvalidAddress)
        ));
    }

    #[test]
    fn rejects_zero_amount() {
        assert!(matches!(
            Transaction::new(0, &[(RECIPIENT, 0)]),
            Err(Error::InvalidAmount)
        ));
    }

    #[test]
    fn replacing_an_output_keeps_its_position() {
        let mut transaction = Transaction::new(
            0,
            &[
                ("0000000000000000000000000000000000000001", 1),
                ("0000000000000000000000000000000000000002", 2),
            ],
        )
        .unwrap();
        transaction
            .set_out("0000000000000000000000000000000000000001", 9)
            .unwrap();
        assert_eq!(
            transaction.outputs()[0],
            ("0000000000000000000000000000000000000001".to_string(), 9)
        );
        assert_eq!(transaction.outputs().len(), 2);
    }

    #[test]
    fn truncated_output_is_rejected() {
        let mut data = signed_transaction().serialize(false);
        data.truncate(10);
        assert!(matches!(
            Transaction::deserialize(&data),
            Err(Error::Malformed(_))
        ));
    }
}
