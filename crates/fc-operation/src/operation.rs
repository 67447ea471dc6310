use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::OperationError;

/// One entry of a producer-set change: the producer's network address, its
/// raw wallet public key and its balance at the time of the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerRow {
    pub address: SocketAddr,

    /// Raw public key bytes, exactly as the wallet exported them.
    pub public_key: Vec<u8>,

    /// Informational only; the node does not track balances.
    pub balance: u64,
}

impl ProducerRow {
    pub fn new(address: SocketAddr, public_key: Vec<u8>, balance: u64) -> Self {
        Self {
            address,
            public_key,
            balance,
        }
    }

    /// Hex-encoded public key, useful for logging.
    pub fn public_key_hex(&self) -> String {
        hex::encode(&self.public_key)
    }
}

/// An operation carried in a block payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// The set of authorised block producers changed.  Rows are listed in the
    /// order they take effect.
    ProducersChanged(Vec<ProducerRow>),

    /// Application data the node stores but does not interpret.
    AppDefined { opcode: u16, data: Vec<u8> },
}

impl Operation {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::ProducersChanged(_) => "producers_changed",
            Operation::AppDefined { .. } => "app_defined",
        }
    }
}

/// Encode an [`Operation`] into a block payload.
pub fn encode(op: &Operation) -> Result<Vec<u8>, OperationError> {
    Ok(bincode::serialize(op)?)
}

/// Decode a block payload, returning the reason on failure.
pub fn try_decode(payload: &[u8]) -> Result<Operation, OperationError> {
    if payload.is_empty() {
        return Err(OperationError::Empty);
    }
    Ok(bincode::deserialize(payload)?)
}

/// Decode a block payload.  Returns `None` for anything that is not a
/// well-formed [`Operation`].
pub fn decode(payload: &[u8]) -> Option<Operation> {
    try_decode(payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn producers_changed_survives_encoding() {
        let op = Operation::ProducersChanged(vec![
            ProducerRow::new(addr(4000), vec![1; 32], 100),
            ProducerRow::new(addr(4001), vec![2; 32], 0),
        ]);
        let bytes = encode(&op).unwrap();
        assert_eq!(decode(&bytes), Some(op));
    }

    #[test]
    fn garbage_payload_decodes_to_none() {
        assert_eq!(decode(&[0xff, 0xff, 0xff, 0xff, 0x01]), None);
    }

    #[test]
    fn empty_payload_is_an_error() {
        assert!(matches!(try_decode(&[]), Err(OperationError::Empty)));
    }

    #[test]
    fn public_key_hex_is_lowercase() {
        let row = ProducerRow::new(addr(1), vec![0xab, 0x01], 5);
        assert_eq!(row.public_key_hex(), "ab01");
    }
}
