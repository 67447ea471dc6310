use std::net::SocketAddr;

use fc_block::{Block, Blockchain, PublicKey};
use fc_operation::Operation;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A peer authorised to sign new blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Producer {
    pub address: SocketAddr,
    pub public_key: PublicKey,
}

/// The known producers, derived from the chain.
///
/// The roster is a replay of every [`Operation::ProducersChanged`] found in
/// chain order.  Rows are appended as they appear: a producer listed by two
/// different changes shows up twice, and nothing is ever removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProducerRoster {
    producers: Vec<Producer>,
}

impl ProducerRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive the roster from scratch by traversing `chain` once.
    pub fn from_chain(chain: &Blockchain) -> Self {
        let mut roster = Self::new();
        roster.rebuild(chain);
        roster
    }

    /// Clear the roster and replay `chain` from its first block.
    pub fn rebuild(&mut self, chain: &Blockchain) {
        self.producers.clear();
        for block in chain {
            self.apply_block(block);
        }
        debug!(
            "Producer roster rebuilt from {} blocks: {} entries",
            chain.len(),
            self.producers.len()
        );
    }

    /// Apply one block's operation.  Blocks whose payload does not decode
    /// are logged and skipped.  Returns the number of producers added.
    pub fn apply_block(&mut self, block: &Block) -> usize {
        let op = match fc_operation::try_decode(&block.payload) {
            Ok(op) => op,
            Err(e) => {
                warn!(
                    "Skipping block #{} ({}): undecodable payload: {e}",
                    block.index,
                    block.hash_hex()
                );
                return 0;
            }
        };

        match op {
            Operation::ProducersChanged(rows) => {
                let added = rows.len();
                // Balance is informational and deliberately dropped.
                self.producers.extend(rows.into_iter().map(|row| Producer {
                    address: row.address,
                    public_key: PublicKey::from_bytes(row.public_key),
                }));
                added
            }
            Operation::AppDefined { .. } => 0,
        }
    }

    pub fn producers(&self) -> &[Producer] {
        &self.producers
    }

    /// Producer keys in roster order, as passed to
    /// [`Block::verify_signers`].
    pub fn public_keys(&self) -> Vec<PublicKey> {
        self.producers.iter().map(|p| p.public_key.clone()).collect()
    }

    pub fn contains_key(&self, key: &PublicKey) -> bool {
        self.producers.iter().any(|p| &p.public_key == key)
    }

    pub fn len(&self) -> usize {
        self.producers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }

    pub fn clear(&mut self) {
        self.producers.clear();
    }
}

#[cfg(test)]
mod tests {
    use fc_operation::ProducerRow;

    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 1], port))
    }

    fn push_op(chain: &mut Blockchain, op: &Operation) {
        let payload = fc_operation::encode(op).unwrap();
        let block = chain.next_block(payload);
        assert!(chain.add_block(block));
    }

    fn push_raw(chain: &mut Blockchain, payload: Vec<u8>) {
        let block = chain.next_block(payload);
        assert!(chain.add_block(block));
    }

    #[test]
    fn single_change_yields_single_producer() {
        let mut chain = Blockchain::new();
        push_op(
            &mut chain,
            &Operation::ProducersChanged(vec![ProducerRow::new(addr(1), b"pub1".to_vec(), 100)]),
        );

        let roster = ProducerRoster::from_chain(&chain);
        assert_eq!(
            roster.producers(),
            &[Producer {
                address: addr(1),
                public_key: PublicKey::from_bytes(b"pub1".to_vec()),
            }]
        );
    }

    #[test]
    fn later_changes_append_without_deduplication() {
        let mut chain = Blockchain::new();
        let row = ProducerRow::new(addr(1), b"pub1".to_vec(), 100);
        push_op(&mut chain, &Operation::ProducersChanged(vec![row.clone()]));
        push_op(
            &mut chain,
            &Operation::ProducersChanged(vec![row, ProducerRow::new(addr(2), b"pub2".to_vec(), 0)]),
        );

        let roster = ProducerRoster::from_chain(&chain);
        let addrs: Vec<SocketAddr> = roster.producers().iter().map(|p| p.address).collect();
        assert_eq!(addrs, vec![addr(1), addr(1), addr(2)]);
    }

    #[test]
    fn undecodable_block_is_skipped() {
        let mut chain = Blockchain::new();
        push_raw(&mut chain, vec![0xff; 8]);
        push_op(
            &mut chain,
            &Operation::ProducersChanged(vec![ProducerRow::new(addr(3), b"pub3".to_vec(), 1)]),
        );

        let roster = ProducerRoster::from_chain(&chain);
        assert_eq!(roster.len(), 1);
        assert!(roster.contains_key(&PublicKey::from_bytes(b"pub3".to_vec())));
    }

    #[test]
    fn app_defined_operations_do_not_touch_roster() {
        let mut chain = Blockchain::new();
        push_op(
            &mut chain,
            &Operation::AppDefined {
                opcode: 9,
                data: b"memo".to_vec(),
            },
        );
        assert!(ProducerRoster::from_chain(&chain).is_empty());
    }

    #[test]
    fn rebuild_discards_previous_entries() {
        let mut chain = Blockchain::new();
        push_op(
            &mut chain,
            &Operation::ProducersChanged(vec![ProducerRow::new(addr(1), b"pub1".to_vec(), 100)]),
        );
        let mut roster = ProducerRoster::from_chain(&chain);
        roster.rebuild(&Blockchain::new());
        assert!(roster.is_empty());
    }
}
