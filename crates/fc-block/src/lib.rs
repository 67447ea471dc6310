pub mod block;
pub mod blockchain;
pub mod error;
pub mod key;

pub use block::Block;
pub use blockchain::Blockchain;
pub use error::BlockchainError;
pub use key::{BlockSignature, PublicKey};

/// Re-exported so callers can sign blocks without naming the identity crate.
pub use libp2p_identity::ed25519::Keypair;
