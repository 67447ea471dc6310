use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{block::Block, error::BlockchainError};

/// The append-only chain of [`Block`]s that forms the Forgechain ledger.
///
/// Invariants maintained by this type:
/// - Block indices are contiguous starting from 0.
/// - Every block's `prev_hash` matches the hash of the preceding block, and
///   the first block's `prev_hash` is all zero.
///
/// Unlike most ledgers the chain may be empty: a freshly started node has no
/// blocks until a peer sends it one.
///
/// Deserialising goes through [`Blockchain::from_blocks`], so stored or
/// received data that breaks these invariants is refused.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredChain")]
pub struct Blockchain {
    blocks: Vec<Block>,
}

/// Serialised shape of a [`Blockchain`], before linkage is checked.
#[derive(Deserialize)]
struct StoredChain {
    blocks: Vec<Block>,
}

impl TryFrom<StoredChain> for Blockchain {
    type Error = BlockchainError;

    fn try_from(stored: StoredChain) -> Result<Self, Self::Error> {
        Self::from_blocks(stored.blocks)
    }
}

impl Blockchain {
    /// An empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a chain from blocks in canonical order, checking that each one
    /// extends the previous.
    pub fn from_blocks(blocks: Vec<Block>) -> Result<Self, BlockchainError> {
        let mut chain = Self::new();
        for block in blocks {
            let index = block.index;
            if !chain.add_block(block) {
                return Err(BlockchainError::InvalidChain(format!(
                    "block {index} does not extend a chain of length {}",
                    chain.len()
                )));
            }
        }
        Ok(chain)
    }

    /// Load a chain from a JSON file written by [`Blockchain::save_json`].
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, BlockchainError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), BlockchainError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Number of blocks in the chain.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The most recent block, if any.
    pub fn tip(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// Whether `block` would be accepted by [`Blockchain::add_block`].
    pub fn extends_tip(&self, block: &Block) -> bool {
        match self.tip() {
            None => block.index == 0 && block.prev_hash == [0u8; 32],
            Some(tip) => block.index == tip.index + 1 && block.prev_hash == tip.hash(),
        }
    }

    /// Append `block` if it extends the current tip.  Returns `false` and
    /// leaves the chain untouched otherwise.
    pub fn add_block(&mut self, block: Block) -> bool {
        if !self.extends_tip(&block) {
            return false;
        }
        self.blocks.push(block);
        true
    }

    /// An unsigned block carrying `payload` that extends the current tip.
    pub fn next_block(&self, payload: Vec<u8>) -> Block {
        match self.tip() {
            None => Block::genesis(payload),
            Some(tip) => Block::new(tip.index + 1, tip.hash(), payload),
        }
    }

    /// Return a reference to a block by its index.
    pub fn get_block(&self, index: u64) -> Option<&Block> {
        self.blocks.get(index as usize)
    }

    /// All blocks, oldest first.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Iterate blocks oldest first.  Each call starts a fresh pass.
    pub fn iter(&self) -> std::slice::Iter<'_, Block> {
        self.blocks.iter()
    }

    /// Validate the full chain structure.  An empty chain is valid.
    pub fn is_valid(&self) -> bool {
        if let Some(first) = self.blocks.first() {
            if first.index != 0 || first.prev_hash != [0u8; 32] {
                return false;
            }
        }

        self.blocks.windows(2).all(|window| {
            let (prev, next) = (&window[0], &window[1]);
            next.prev_hash == prev.hash() && next.index == prev.index + 1
        })
    }
}

impl<'a> IntoIterator for &'a Blockchain {
    type Item = &'a Block;
    type IntoIter = std::slice::Iter<'a, Block>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_of(count: usize) -> Blockchain {
        let mut chain = Blockchain::new();
        for i in 0..count {
            let block = chain.next_block(vec![i as u8]);
            assert!(chain.add_block(block));
        }
        chain
    }

    #[test]
    fn new_chain_is_empty_and_valid() {
        let chain = Blockchain::new();
        assert!(chain.is_empty());
        assert!(chain.tip().is_none());
        assert!(chain.is_valid());
    }

    #[test]
    fn add_block_extends_chain() {
        let chain = chain_of(3);
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.tip().unwrap().index, 2);
        assert!(chain.is_valid());
    }

    #[test]
    fn wrong_parent_is_refused() {
        let mut chain = chain_of(2);
        let block = Block::new(2, [9u8; 32], vec![]);
        assert!(!chain.add_block(block));
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn wrong_height_is_refused() {
        let mut chain = chain_of(2);
        let tip_hash = chain.tip().unwrap().hash();
        assert!(!chain.add_block(Block::new(5, tip_hash, vec![])));
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn empty_chain_only_takes_genesis() {
        let mut chain = Blockchain::new();
        assert!(!chain.add_block(Block::new(1, [0u8; 32], vec![])));
        assert!(chain.add_block(Block::genesis(vec![])));
    }

    #[test]
    fn from_blocks_rejects_gaps() {
        let full = chain_of(3);
        let mut blocks = full.blocks().to_vec();
        blocks.remove(1);
        assert!(Blockchain::from_blocks(blocks).is_err());
    }

    #[test]
    fn traversal_restarts_from_the_oldest_block() {
        let chain = chain_of(3);
        let first: Vec<u64> = chain.iter().map(|b| b.index).collect();
        let second: Vec<u64> = (&chain).into_iter().map(|b| b.index).collect();
        assert_eq!(first, vec![0, 1, 2]);
        assert_eq!(first, second);
    }

    #[test]
    fn json_file_round_trip_rechecks_linkage() {
        let chain = chain_of(2);
        let path = std::env::temp_dir().join(format!("fc-chain-{}.json", std::process::id()));
        chain.save_json(&path).unwrap();
        let loaded = Blockchain::load_json(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, chain);
    }

    #[test]
    fn deserialising_an_unlinked_chain_fails() {
        let full = chain_of(3);
        let mut blocks = full.blocks().to_vec();
        blocks.swap(1, 2);
        let json = serde_json::json!({ "blocks": blocks }).to_string();

        let err = serde_json::from_str::<Blockchain>(&json).unwrap_err();
        assert!(err.to_string().contains("does not extend"), "{err}");

        let linked = serde_json::to_string(&full).unwrap();
        assert_eq!(serde_json::from_str::<Blockchain>(&linked).unwrap(), full);
    }
}
