//! Layered keyed stores backing the chain.
//!
//! An [`Index`] maps string keys (semantically bytes) to values and
//! remembers insertion order, which the persistence format and the chain
//! replay depend on. Each specialization supplies a [`Codec`] fixing how
//! keys and values hit the disk. The on-disk form is a flat record stream
//! with no file header:
//!
//! ```text
//! repeat until EOF:
//!     key size   : u8
//!     value size : u16 little-endian
//!     key bytes
//!     value bytes
//! ```
//!
//! [`StateOverlay`] is the copy-on-write view used while a block is
//! evaluated: reads fall through to a borrowed parent state, writes stay
//! local until the chain merges them in.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::block::Block;
use crate::crypto::validate_address;
use crate::error::{Error, Result};

/// Binary codec for one index specialization.
///
/// `validate_key` runs on every `set`; the default accepts anything.
pub trait Codec {
    type Value;

    fn validate_key(_key: &str) -> Result<()> {
        Ok(())
    }
    fn encode_key(key: &str) -> Result<Vec<u8>>;
    fn decode_key(bytes: &[u8]) -> Result<String>;
    fn encode_value(value: &Self::Value) -> Result<Vec<u8>>;
    fn decode_value(bytes: &[u8]) -> Result<Self::Value>;
}

/// Insertion-ordered key→value store with binary persistence.
pub struct Index<C: Codec> {
    entries: HashMap<String, C::Value>,
    order: Vec<String>,
}

impl<C: Codec> Index<C> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn is_set(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&C::Value> {
        self.entries.get(key)
    }

    /// Inserts or replaces a value. A replaced key keeps its position.
    pub fn set(&mut self, key: &str, value: C::Value) -> Result<()> {
        C::validate_key(key)?;
        if self.entries.insert(key.to_string(), value).is_none() {
            self.order.push(key.to_string());
        }
        Ok(())
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &C::Value)> {
        self.order.iter().map(move |key| (key, &self.entries[key]))
    }

    /// Consumes the index, yielding entries in insertion order.
    pub fn into_entries(self) -> Vec<(String, C::Value)> {
        let Self { mut entries, order } = self;
        order
            .into_iter()
            .map(|key| {
                let value = entries.remove(&key).expect("ordered key is present");
                (key, value)
            })
            .collect()
    }

    /// Copies every entry of `overlay` into `self`, preserving the
    /// overlay's insertion order for fresh keys.
    pub fn merge(&mut self, overlay: Index<C>) -> Result<()> {
        for (key, value) in overlay.into_entries() {
            self.set(&key, value)?;
        }
        Ok(())
    }

    /// Writes the record stream, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut data = Vec::new();
        for (key, value) in self.iter() {
            let key_bytes = C::encode_key(key)?;
            let value_bytes = C::encode_value(value)?;
            let key_size =
                u8::try_from(key_bytes.len()).map_err(|_| Error::Malformed("key too large"))?;
            let value_size = u16::try_from(value_bytes.len())
                .map_err(|_| Error::Malformed("value too large"))?;
            data.push(key_size);
            data.extend_from_slice(&value_size.to_le_bytes());
            data.extend_from_slice(&key_bytes);
            data.extend_from_slice(&value_bytes);
        }
        fs::write(path, data)?;
        Ok(())
    }

    /// Reads a record stream produced by [`save`], inserting every record.
    ///
    /// [`save`]: Index::save
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let data = fs::read(path)?;
        let mut pos = 0;
        while pos < data.len() {
            let header = data
                .get(pos..pos + 3)
                .ok_or(Error::Malformed("truncated record header"))?;
            let key_size = header[0] as usize;
            let value_size = u16::from_le_bytes([header[1], header[2]]) as usize;
            pos += 3;
            let key_bytes = data
                .get(pos..pos + key_size)
                .ok_or(Error::Malformed("truncated record key"))?;
            pos += key_size;
            let value_bytes = data
                .get(pos..pos + value_size)
                .ok_or(Error::Malformed("truncated record value"))?;
            pos += value_size;
            let key = C::decode_key(key_bytes)?;
            let value = C::decode_value(value_bytes)?;
            self.set(&key, value)?;
        }
        Ok(())
    }
}

impl<C: Codec> Default for Index<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Hex keys, hex values.
pub struct HexCodec;

impl Codec for HexCodec {
    type Value = String;

    fn encode_key(key: &str) -> Result<Vec<u8>> {
        Ok(hex::decode(key)?)
    }
    fn decode_key(bytes: &[u8]) -> Result<String> {
        Ok(hex::encode(bytes))
    }
    fn encode_value(value: &String) -> Result<Vec<u8>> {
        Ok(hex::decode(value)?)
    }
    fn decode_value(bytes: &[u8]) -> Result<String> {
        Ok(hex::encode(bytes))
    }
}

/// Generic hex→hex mapping; the chain keys transaction ids to block hashes
/// with it.
pub type HexIndex = Index<HexCodec>;

/// 32-byte block hash keys, full block serializations as values.
pub struct BlockCodec;

impl Codec for BlockCodec {
    type Value = Block;

    fn encode_key(key: &str) -> Result<Vec<u8>> {
        Ok(hex::decode(key)?)
    }
    fn decode_key(bytes: &[u8]) -> Result<String> {
        Ok(hex::encode(bytes))
    }
    fn encode_value(value: &Block) -> Result<Vec<u8>> {
        Ok(value.serialize(true))
    }
    fn decode_value(bytes: &[u8]) -> Result<Block> {
        Block::deserialize(bytes)
    }
}

pub type BlockIndex = Index<BlockCodec>;

/// Decimal block-number keys stored as u32 little-endian, hash values.
pub struct BlockHashCodec;

impl Codec for BlockHashCodec {
    type Value = String;

    fn encode_key(key: &str) -> Result<Vec<u8>> {
        let number: u32 = key
            .parse()
            .map_err(|_| Error::Malformed("block number key"))?;
        Ok(number.to_le_bytes().to_vec())
    }
    fn decode_key(bytes: &[u8]) -> Result<String> {
        let bytes: [u8; 4] = bytes
            .try_into()
            .map_err(|_| Error::Malformed("block number key must be 4 bytes"))?;
        Ok(u32::from_le_bytes(bytes).to_string())
    }
    fn encode_value(value: &String) -> Result<Vec<u8>> {
        Ok(hex::decode(value)?)
    }
    fn decode_value(bytes: &[u8]) -> Result<String> {
        Ok(hex::encode(bytes))
    }
}

pub type BlockHashIndex = Index<BlockHashCodec>;

/// Balance and replay counter tracked per address. An absent address reads
/// as all zeros.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    pub balance: u64,
    pub nonce: u16,
}

/// Address keys, 10-byte `u16 nonce ‖ u64 balance` values. Keys are
/// validated as addresses on every `set`.
pub struct AccountCodec;

impl Codec for AccountCodec {
    type Value = Account;

    fn validate_key(key: &str) -> Result<()> {
        if !validate_address(key) {
            return Err(Error::InvalidAddress);
        }
        Ok(())
    }
    fn encode_key(key: &str) -> Result<Vec<u8>> {
        Ok(hex::decode(key)?)
    }
    fn decode_key(bytes: &[u8]) -> Result<String> {
        Ok(hex::encode(bytes))
    }
    fn encode_value(value: &Account) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(10);
        bytes.extend_from_slice(&value.nonce.to_le_bytes());
        bytes.extend_from_slice(&value.balance.to_le_bytes());
        Ok(bytes)
    }
    fn decode_value(bytes: &[u8]) -> Result<Account> {
        if bytes.len() != 10 {
            return Err(Error::Malformed("account record must be 10 bytes"));
        }
        Ok(Account {
            nonce: u16::from_le_bytes([bytes[0], bytes[1]]),
            balance: u64::from_le_bytes(bytes[2..10].try_into().expect("eight bytes")),
        })
    }
}

pub type StateIndex = Index<AccountCodec>;

impl StateIndex {
    pub fn get_balance(&self, address: &str) -> u64 {
        self.get(address).map(|account| account.balance).unwrap_or(0)
    }

    pub fn get_nonce(&self, address: &str) -> u16 {
        self.get(address).map(|account| account.nonce).unwrap_or(0)
    }

    /// Sets the balance, zero-initializing an absent account.
    pub fn set_balance(&mut self, address: &str, balance: u64) -> Result<()> {
        let mut account = self.get(address).cloned().unwrap_or_default();
        account.balance = balance;
        self.set(address, account)
    }

    /// Sets the nonce, zero-initializing an absent account.
    pub fn set_nonce(&mut self, address: &str, nonce: u16) -> Result<()> {
        let mut account = self.get(address).cloned().unwrap_or_default();
        account.nonce = nonce;
        self.set(address, account)
    }
}

/// Copy-on-write view over a parent state.
///
/// Reads fall through to the parent for unset keys; writes copy the parent
/// account into the local index first. The local writes are extracted with
/// [`into_writes`] and merged into the live state on commit, or simply
/// dropped to abandon the evaluation.
///
/// [`into_writes`]: StateOverlay::into_writes
pub struct StateOverlay<'a> {
    parent: &'a StateIndex,
    local: StateIndex,
}

impl<'a> StateOverlay<'a> {
    pub fn new(parent: &'a StateIndex) -> Self {
        Self {
            parent,
            local: StateIndex::new(),
        }
    }

    pub fn get(&self, address: &str) -> Option<&Account> {
        if self.local.is_set(address) {
            self.local.get(address)
        } else {
            self.parent.get(address)
        }
    }

    pub fn get_balance(&self, address: &str) -> u64 {
        self.get(address).map(|account| account.balance).unwrap_or(0)
    }

    pub fn get_nonce(&self, address: &str) -> u16 {
        self.get(address).map(|account| account.nonce).unwrap_or(0)
    }

    pub fn set_balance(&mut self, address: &str, balance: u64) -> Result<()> {
        let mut account = self.get(address).cloned().unwrap_or_default();
        account.balance = balance;
        self.local.set(address, account)
    }

    pub fn set_nonce(&mut self, address: &str, nonce: u16) -> Result<()> {
        let mut account = self.get(address).cloned().unwrap_or_default();
        account.nonce = nonce;
        self.local.set(address, account)
    }

    /// The locally written entries, ready to merge into the parent.
    pub fn into_writes(self) -> StateIndex {
        self.local
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS_A: &str = "c70f4891d2ce22b1f62492605c1d5c2fc1a8ef47";
    const ADDRESS_B: &str = "38fb65b08416b9870067b6cba63fa50a81bc78c8";

    #[test]
    fn set_and_get_preserve_insertion_order() {
        let mut index = HexIndex::new();
        index.set("bb", "02".to_string()).unwrap();
        index.set("aa", "01".to_string()).unwrap();
        index.set("bb", "03".to_string()).unwrap();
        assert_eq!(index.keys(), ["bb".to_string(), "aa".to_string()]);
        assert_eq!(index.get("bb"), Some(&"03".to_string()));
        assert!(index.is_set("aa"));
        assert!(!index.is_set("cc"));
    }

    #[test]
    fn hex_index_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("index.dat");
        let mut index = HexIndex::new();
        index.set("bb", "0202".to_string()).unwrap();
        index.set("aa", "01".to_string()).unwrap();
        index.save(&path).unwrap();

        let mut loaded = HexIndex::new();
        loaded.load(&path).unwrap();
        assert_eq!(loaded.keys(), ["bb".to_string(), "aa".to_string()]);
        assert_eq!(loaded.get("aa"), Some(&"01".to_string()));
        assert_eq!(loaded.get("bb"), Some(&"0202".to_string()));
    }

    #[test]
    fn truncated_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.dat");
        let mut index = HexIndex::new();
        index.set("aabb", "ccdd".to_string()).unwrap();
        index.save(&path).unwrap();
        let mut data = std::fs::read(&path).unwrap();
        data.truncate(data.len() - 1);
        std::fs::write(&path, data).unwrap();

        let mut loaded = HexIndex::new();
        assert!(matches!(loaded.load(&path), Err(Error::Malformed(_))));
    }

    #[test]
    fn block_hash_index_uses_decimal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hashes.dat");
        let mut index = BlockHashIndex::new();
        index.set("0", "aa".repeat(32)).unwrap();
        index.set("1", "bb".repeat(32)).unwrap();
        index.save(&path).unwrap();

        let mut loaded = BlockHashIndex::new();
        loaded.load(&path).unwrap();
        assert_eq!(loaded.get("1"), Some(&"bb".repeat(32)));
    }

    #[test]
    fn state_index_accessors_zero_initialize() {
        let mut state = StateIndex::new();
        assert_eq!(state.get_balance(ADDRESS_A), 0);
        assert_eq!(state.get_nonce(ADDRESS_A), 0);
        state.set_balance(ADDRESS_A, 7).unwrap();
        state.set_nonce(ADDRESS_A, 2).unwrap();
        assert_eq!(
            state.get(ADDRESS_A),
            Some(&Account {
                balance: 7,
                nonce: 2
            })
        );
    }

    #[test]
    fn state_index_rejects_bad_keys() {
        let mut state = StateIndex::new();
        assert!(matches!(
            state.set_balance("deadbeef", 1),
            Err(Error::InvalidAddress)
        ));
    }

    #[test]
    fn state_records_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.dat");
        let mut state = StateIndex::new();
        state.set_balance(ADDRESS_A, 1000).unwrap();
        state.set_nonce(ADDRESS_A, 3).unwrap();
        state.set_balance(ADDRESS_B, 5).unwrap();
        state.save(&path).unwrap();

        let mut loaded = StateIndex::new();
        loaded.load(&path).unwrap();
        assert_eq!(loaded.get_balance(ADDRESS_A), 1000);
        assert_eq!(loaded.get_nonce(ADDRESS_A), 3);
        assert_eq!(loaded.get_balance(ADDRESS_B), 5);
        assert_eq!(loaded.get_nonce(ADDRESS_B), 0);
    }

    #[test]
    fn overlay_reads_fall_through_and_writes_stay_local() {
        let mut live = StateIndex::new();
        live.set_balance(ADDRESS_A, 50).unwrap();

        let mut overlay = StateOverlay::new(&live);
        assert_eq!(overlay.get_balance(ADDRESS_A), 50);
        overlay.set_balance(ADDRESS_A, 40).unwrap();
        overlay.set_nonce(ADDRESS_A, 1).unwrap();
        overlay.set_balance(ADDRESS_B, 10).unwrap();
        assert_eq!(overlay.get_balance(ADDRESS_A), 40);
        assert_eq!(live.get_balance(ADDRESS_A), 50);

        let writes = overlay.into_writes();
        live.merge(writes).unwrap();
        assert_eq!(live.get_balance(ADDRESS_A), 40);
        assert_eq!(live.get_nonce(ADDRESS_A), 1);
        assert_eq!(live.get_balance(ADDRESS_B), 10);
    }

    #[test]
    fn overlay_write_copies_parent_account() {
        let mut live = StateIndex::new();
        live.set_balance(ADDRESS_A, 50).unwrap();
        live.set_nonce(ADDRESS_A, 4).unwrap();

        let mut overlay = StateOverlay::new(&live);
        overlay.set_balance(ADDRESS_A, 45).unwrap();
        // the nonce travels with the copied account
        assert_eq!(overlay.get_nonce(ADDRESS_A), 4);
    }
}
