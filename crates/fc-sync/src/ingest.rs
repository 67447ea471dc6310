use std::net::SocketAddr;

use fc_block::{Block, Blockchain};
use tracing::{info, warn};

use crate::ProducerRoster;

/// What happened to a forged block offered to [`validate_and_append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The block is now the chain tip.
    Appended,
    /// No known producer signed the block, or a signature was invalid.
    SignersRejected,
    /// Correctly signed but does not extend the current tip.
    AppendRejected,
}

/// Verify a forged block's signers against `roster` and append it to
/// `chain`.
///
/// Nothing is mutated unless both checks pass.  The first valid block seen
/// for a height wins; competing blocks for the same height fail the append
/// check.  An appended block that changes the producer set is applied to
/// `roster` immediately so the roster stays a replay of the chain.
pub fn validate_and_append(
    chain: &mut Blockchain,
    roster: &mut ProducerRoster,
    sender: SocketAddr,
    block: Block,
) -> IngestOutcome {
    let hash = block.hash_hex();

    if !block.verify_signers(&roster.public_keys()) {
        warn!(
            "Discarding block #{} ({hash}) from {sender}: no valid producer signature",
            block.index
        );
        return IngestOutcome::SignersRejected;
    }

    let index = block.index;
    if !chain.add_block(block) {
        warn!(
            "Discarding block #{index} ({hash}) from {sender}: does not extend chain of length {}",
            chain.len()
        );
        return IngestOutcome::AppendRejected;
    }

    if let Some(tip) = chain.tip() {
        roster.apply_block(tip);
    }
    info!("Appended block #{index} ({hash}) from {sender}");
    IngestOutcome::Appended
}

#[cfg(test)]
mod tests {
    use fc_block::{Keypair, PublicKey};
    use fc_operation::{Operation, ProducerRow};

    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    /// A one-block chain whose genesis names `keypair` as the only producer.
    fn genesis_for(keypair: &Keypair) -> (Blockchain, ProducerRoster) {
        let op = Operation::ProducersChanged(vec![ProducerRow::new(
            addr(1),
            keypair.public().to_bytes().to_vec(),
            100,
        )]);
        let mut chain = Blockchain::new();
        assert!(chain.add_block(Block::genesis(fc_operation::encode(&op).unwrap())));
        let roster = ProducerRoster::from_chain(&chain);
        (chain, roster)
    }

    #[test]
    fn producer_signed_block_becomes_tip() {
        let keypair = Keypair::generate();
        let (mut chain, mut roster) = genesis_for(&keypair);

        let mut block = chain.next_block(b"data".to_vec());
        block.sign(&keypair);
        let expected = block.clone();

        let outcome = validate_and_append(&mut chain, &mut roster, addr(2), block);
        assert_eq!(outcome, IngestOutcome::Appended);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.tip(), Some(&expected));
    }

    #[test]
    fn outsider_block_leaves_chain_unchanged() {
        let producer = Keypair::generate();
        let outsider = Keypair::generate();
        let (mut chain, mut roster) = genesis_for(&producer);

        let mut block = chain.next_block(b"data".to_vec());
        block.sign(&outsider);

        let outcome = validate_and_append(&mut chain, &mut roster, addr(2), block);
        assert_eq!(outcome, IngestOutcome::SignersRejected);
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn stale_block_is_rejected_after_signer_check() {
        let keypair = Keypair::generate();
        let (mut chain, mut roster) = genesis_for(&keypair);

        let mut first = chain.next_block(b"first".to_vec());
        first.sign(&keypair);
        let mut rival = chain.next_block(b"rival".to_vec());
        rival.sign(&keypair);

        assert_eq!(
            validate_and_append(&mut chain, &mut roster, addr(2), first.clone()),
            IngestOutcome::Appended
        );
        assert_eq!(
            validate_and_append(&mut chain, &mut roster, addr(3), rival),
            IngestOutcome::AppendRejected
        );
        assert_eq!(chain.tip(), Some(&first));
    }

    #[test]
    fn appended_producer_change_extends_roster() {
        let keypair = Keypair::generate();
        let newcomer = Keypair::generate();
        let (mut chain, mut roster) = genesis_for(&keypair);

        let op = Operation::ProducersChanged(vec![ProducerRow::new(
            addr(9),
            newcomer.public().to_bytes().to_vec(),
            5,
        )]);
        let mut block = chain.next_block(fc_operation::encode(&op).unwrap());
        block.sign(&keypair);

        assert_eq!(
            validate_and_append(&mut chain, &mut roster, addr(2), block),
            IngestOutcome::Appended
        );
        assert!(roster.contains_key(&PublicKey::from(newcomer.public())));
        assert_eq!(roster, ProducerRoster::from_chain(&chain));
    }
}
