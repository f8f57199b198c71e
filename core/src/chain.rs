//! The validating append-only chain store.
//!
//! The chain owns four indexes: blocks by hash, block hashes by number,
//! transaction ids to the containing block hash, and the account state.
//! Appending validates the header against the tip, evaluates every
//! transaction in order against a copy-on-write overlay of the live
//! state, and commits only when the whole block applies cleanly. A
//! rejected block leaves all four indexes exactly as they were.
//!
//! The chain is strictly linear: no forks, no reorganization, and blocks
//! arrive fully formed (mining and gossip live outside this crate).
//! Callers drive it from a single context; wrap the aggregate in a mutex
//! if a threaded driver is layered on top.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::block::Block;
use crate::error::{Error, Result};
use crate::index::{BlockHashIndex, BlockIndex, HexIndex, StateIndex, StateOverlay};
use crate::transaction::Transaction;

/// Flat reward credited to the block beneficiary on every append.
pub const BLOCK_REWARD: u64 = 10;

/// Relative location of the persisted block index inside the data
/// directory.
const BLOCKS_FILE: &str = "blocks.dat";

pub struct Blockchain {
    datadir: PathBuf,
    block_count: u32,
    block_index: BlockIndex,
    block_hash_index: BlockHashIndex,
    transaction_index: HexIndex,
    state_index: StateIndex,
}

impl Blockchain {
    pub fn new(datadir: impl Into<PathBuf>) -> Self {
        Self {
            datadir: datadir.into(),
            block_count: 0,
            block_index: BlockIndex::new(),
            block_hash_index: BlockHashIndex::new(),
            transaction_index: HexIndex::new(),
            state_index: StateIndex::new(),
        }
    }

    /// Number of blocks appended so far.
    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    pub fn get_latest_block(&self) -> Option<&Block> {
        if self.block_count == 0 {
            return None;
        }
        self.get_block_by_number(self.block_count - 1)
    }

    pub fn get_genesis_block(&self) -> Option<&Block> {
        self.get_block_by_number(0)
    }

    /// Validates and appends a fully-formed block.
    ///
    /// On success the block is committed to all indexes, the state overlay
    /// is merged into the live state (carrying the beneficiary reward),
    /// and the block count advances. On any validation error nothing is
    /// mutated.
    pub fn add_block(&mut self, block: Block) -> Result<()> {
        self.validate_block_header(&block)?;
        let next_state = self.calculate_next_state(&block)?;
        let hash = block.hash();
        let number = block.number;
        self.block_hash_index.set(&number.to_string(), hash.clone())?;
        for transaction in block.transactions() {
            self.transaction_index.set(&transaction.id(), hash.clone())?;
        }
        self.block_index.set(&hash, block)?;
        self.state_index.merge(next_state)?;
        self.block_count += 1;
        debug!(number, hash = %hash, "block appended");
        Ok(())
    }

    /// Checks a block header against the tip: the number must be one past
    /// the latest block and the parent hash must match its hash. An empty
    /// chain expects number 0 with an all-zero parent.
    pub fn validate_block_header(&self, block: &Block) -> Result<()> {
        let (next_number, parent_hash) = match self.get_latest_block() {
            Some(latest) => (latest.number + 1, latest.hash()),
            None => (0, "0".repeat(64)),
        };
        if block.number != next_number {
            return Err(Error::InvalidNumber);
        }
        if block.parent_hash != parent_hash {
            return Err(Error::InvalidParent);
        }
        Ok(())
    }

    /// Validates a single transaction against the live state.
    pub fn validate_transaction(&self, transaction: &Transaction) -> Result<()> {
        let state = StateOverlay::new(&self.state_index);
        Self::validate_transaction_with(transaction, &state)?;
        Ok(())
    }

    /// The per-transaction rules, evaluated against an overlay that already
    /// holds the effects of earlier transactions in the same block. Returns
    /// the recovered sender.
    fn validate_transaction_with(
        transaction: &Transaction,
        state: &StateOverlay<'_>,
    ) -> Result<String> {
        let sender = transaction.sender()?;
        for (address, _) in transaction.outputs() {
            if *address == sender {
                return Err(Error::SelfPayment);
            }
        }
        if transaction.value()? > state.get_balance(&sender) {
            return Err(Error::InsufficientBalance);
        }
        // equality is fine: the account nonce is the next expected nonce
        if transaction.nonce < state.get_nonce(&sender) {
            return Err(Error::StaleNonce);
        }
        Ok(sender)
    }

    /// Applies every transaction in block order against an overlay of the
    /// live state and credits the block reward, returning the overlay's
    /// writes. Live state is untouched; a validation failure discards the
    /// overlay wholesale.
    fn calculate_next_state(&self, block: &Block) -> Result<StateIndex> {
        let mut state = StateOverlay::new(&self.state_index);
        for transaction in block.transactions() {
            let sender = Self::validate_transaction_with(transaction, &state)?;
            let nonce = state.get_nonce(&sender);
            for (address, amount) in transaction.outputs() {
                let balance = state
                    .get_balance(address)
                    .checked_add(*amount)
                    .ok_or(Error::Overflow)?;
                state.set_balance(address, balance)?;
            }
            let remaining = state.get_balance(&sender) - transaction.value()?;
            state.set_balance(&sender, remaining)?;
            let nonce = nonce.checked_add(1).ok_or(Error::Overflow)?;
            state.set_nonce(&sender, nonce)?;
        }
        // the reward is written to the overlay so the merge carries it
        // into live state together with the transaction effects
        let reward = state
            .get_balance(&block.beneficiary)
            .checked_add(BLOCK_REWARD)
            .ok_or(Error::Overflow)?;
        state.set_balance(&block.beneficiary, reward)?;
        Ok(state.into_writes())
    }

    pub fn get_block(&self, hash: &str) -> Option<&Block> {
        self.block_index.get(hash)
    }

    pub fn get_block_hash(&self, number: u32) -> Option<&String> {
        self.block_hash_index.get(&number.to_string())
    }

    pub fn get_block_by_number(&self, number: u32) -> Option<&Block> {
        self.get_block(self.get_block_hash(number)?)
    }

    /// Looks up a transaction by id through the transaction index, then
    /// scans the containing block for the matching id.
    pub fn get_transaction(&self, id: &str) -> Option<&Transaction> {
        let hash = self.transaction_index.get(id)?;
        let block = self.get_block(hash)?;
        block
            .transactions()
            .iter()
            .find(|transaction| transaction.id() == id)
    }

    pub fn get_balance(&self, address: &str) -> u64 {
        self.state_index.get_balance(address)
    }

    pub fn get_nonce(&self, address: &str) -> u16 {
        self.state_index.get_nonce(address)
    }

    fn blocks_file(&self) -> PathBuf {
        self.datadir.join("data").join(BLOCKS_FILE)
    }

    /// Persists the block index. State and number indexes are rebuilt from
    /// the blocks on [`load`], so only the blocks hit the disk.
    ///
    /// [`load`]: Blockchain::load
    pub fn save(&self) -> Result<()> {
        self.block_index.save(&self.blocks_file())
    }

    /// Replays a previously saved block file, if any, through the normal
    /// append path. Replay depends on the file's insertion order keeping
    /// parent linkage intact.
    pub fn load(&mut self) -> Result<()> {
        let file = self.blocks_file();
        if !file.exists() {
            return Ok(());
        }
        let mut stored = BlockIndex::new();
        stored.load(&file)?;
        info!(blocks = stored.len(), "replaying stored chain");
        for (_, block) in stored.into_entries() {
            self.add_block(block)?;
        }
        Ok(())
    }

    /// Appends the operator-configured genesis block when the chain is
    /// empty: number 0, all-zero parent, maximum target, nonce 0, no
    /// transactions. Goes through the ordinary validation path.
    pub fn init_genesis(&mut self, beneficiary: &str, timestamp: u32) -> Result<()> {
        if self.block_count > 0 {
            return Ok(());
        }
        let genesis = Block::new(
            0,
            &"0".repeat(64),
            beneficiary,
            u32::MAX,
            timestamp,
            0,
            Vec::new(),
        )?;
        info!(beneficiary, timestamp, "initializing genesis block");
        self.add_block(genesis)
    }
}
