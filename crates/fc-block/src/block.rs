use chrono::Utc;
use fc_operation::Operation;
use libp2p_identity::ed25519;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{BlockSignature, BlockchainError, PublicKey};

/// A single block of the Forgechain ledger.
///
/// The payload is an encoded [`Operation`] but the block itself treats it as
/// opaque bytes.  A block is accepted from the network only when it is signed
/// by at least one known producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Sequential block height (genesis = 0).
    pub index: u64,

    /// SHA-256 hash of the previous block.  All-zero for the genesis block.
    pub prev_hash: [u8; 32],

    /// Encoded operation.
    pub payload: Vec<u8>,

    /// Unix timestamp (seconds) when this block was forged.
    pub timestamp: i64,

    /// Producer signatures over [`Block::hash`].
    pub signatures: Vec<BlockSignature>,
}

impl Block {
    /// Build an unsigned block on top of a known previous hash.
    pub fn new(index: u64, prev_hash: [u8; 32], payload: Vec<u8>) -> Self {
        Self {
            index,
            prev_hash,
            payload,
            timestamp: Utc::now().timestamp(),
            signatures: Vec::new(),
        }
    }

    /// Build an unsigned block whose payload is `op`.
    pub fn with_operation(
        index: u64,
        prev_hash: [u8; 32],
        op: &Operation,
    ) -> Result<Self, BlockchainError> {
        Ok(Self::new(index, prev_hash, fc_operation::encode(op)?))
    }

    /// Genesis block with a fixed timestamp, so that every node building
    /// genesis from the same payload gets the same hash.
    pub fn genesis(payload: Vec<u8>) -> Self {
        Self {
            index: 0,
            prev_hash: [0u8; 32],
            payload,
            timestamp: 0,
            signatures: Vec::new(),
        }
    }

    /// SHA-256 over the header fields and payload.  Signatures are excluded
    /// so that signing does not change the hash being signed.
    pub fn hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.index.to_le_bytes());
        hasher.update(self.prev_hash);
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update((self.payload.len() as u64).to_le_bytes());
        hasher.update(&self.payload);
        hasher.finalize().into()
    }

    /// Hex-encoded block hash.
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash())
    }

    /// Add `keypair`'s signature to the signer set.
    pub fn sign(&mut self, keypair: &ed25519::Keypair) {
        let sig = BlockSignature::create(keypair, &self.hash());
        self.signatures.push(sig);
    }

    /// Public keys of everyone who signed this block, in signing order.
    pub fn signers(&self) -> impl Iterator<Item = &PublicKey> {
        self.signatures.iter().map(|s| &s.public_key)
    }

    /// Check the signer set against the given producer keys.
    ///
    /// Holds when the block carries at least one signature, every signature
    /// is valid for this block's hash, and at least one signer is in
    /// `producers`.  Signers outside `producers` are tolerated.
    pub fn verify_signers(&self, producers: &[PublicKey]) -> bool {
        if self.signatures.is_empty() {
            return false;
        }

        let hash = self.hash();
        let mut has_producer = false;
        for sig in &self.signatures {
            if !sig.verify(&hash) {
                return false;
            }
            has_producer |= producers.contains(&sig.public_key);
        }
        has_producer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn producer() -> (ed25519::Keypair, PublicKey) {
        let keypair = ed25519::Keypair::generate();
        let key = PublicKey::from(keypair.public());
        (keypair, key)
    }

    #[test]
    fn hash_ignores_signatures() {
        let (keypair, _) = producer();
        let mut block = Block::genesis(b"payload".to_vec());
        let before = block.hash();
        block.sign(&keypair);
        assert_eq!(block.hash(), before);
    }

    #[test]
    fn hash_covers_payload() {
        let a = Block::genesis(b"a".to_vec());
        let b = Block::genesis(b"b".to_vec());
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn unsigned_block_never_verifies() {
        let (_, key) = producer();
        assert!(!Block::genesis(vec![]).verify_signers(&[key]));
    }

    #[test]
    fn producer_signature_verifies() {
        let (keypair, key) = producer();
        let mut block = Block::new(1, [7u8; 32], b"op".to_vec());
        block.sign(&keypair);
        assert!(block.verify_signers(&[key]));
    }

    #[test]
    fn outsider_signature_is_rejected() {
        let (keypair, _) = producer();
        let (_, other_key) = producer();
        let mut block = Block::new(1, [7u8; 32], b"op".to_vec());
        block.sign(&keypair);
        assert!(!block.verify_signers(&[other_key]));
    }

    #[test]
    fn tampered_block_is_rejected() {
        let (keypair, key) = producer();
        let mut block = Block::new(1, [7u8; 32], b"op".to_vec());
        block.sign(&keypair);
        block.payload = b"changed".to_vec();
        assert!(!block.verify_signers(&[key]));
    }

    #[test]
    fn extra_outsider_signer_is_tolerated() {
        let (producer_pair, producer_key) = producer();
        let (outsider_pair, _) = producer();
        let mut block = Block::new(3, [1u8; 32], vec![]);
        block.sign(&outsider_pair);
        block.sign(&producer_pair);
        assert!(block.verify_signers(&[producer_key]));
        assert_eq!(block.signers().count(), 2);
    }
}
