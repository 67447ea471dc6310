use std::fmt;

use libp2p_identity::ed25519;
use serde::{Deserialize, Serialize};

/// A wallet public key in its raw byte form.
///
/// The node never interprets the bytes beyond comparing them and handing them
/// to the signature check, so any key exported by a wallet can be stored here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl From<ed25519::PublicKey> for PublicKey {
    fn from(key: ed25519::PublicKey) -> Self {
        Self(key.to_bytes().to_vec())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A producer's signature over a block hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSignature {
    pub public_key: PublicKey,
    pub signature: Vec<u8>,
}

impl BlockSignature {
    /// Sign `message` with `keypair`.
    pub fn create(keypair: &ed25519::Keypair, message: &[u8]) -> Self {
        Self {
            public_key: keypair.public().into(),
            signature: keypair.sign(message),
        }
    }

    /// `false` when the key bytes are not a valid ed25519 key or the
    /// signature does not match `message`.
    pub fn verify(&self, message: &[u8]) -> bool {
        ed25519::PublicKey::try_from_bytes(self.public_key.as_bytes())
            .map(|key| key.verify(message, &self.signature))
            .unwrap_or(false)
    }
}
