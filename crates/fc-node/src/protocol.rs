use fc_block::Block;
use serde::{Deserialize, Serialize};

use crate::{error::ProtocolError, peers::PeerAddress};

/// Correlation token echoed from a request to its reply.  Pings carry the
/// sender's clock in milliseconds.
pub type Token = i64;

/// Wire tag of each message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageTag {
    AppDefined = 0,
    Ping = 1,
    Pong = 2,
    RequestPeerList = 3,
    PeerList = 4,
    RequestBlockchain = 5,
    Blockchain = 6,
    BlockForged = 7,
}

impl TryFrom<u8> for MessageTag {
    type Error = u8;

    fn try_from(tag: u8) -> Result<Self, u8> {
        Ok(match tag {
            0 => Self::AppDefined,
            1 => Self::Ping,
            2 => Self::Pong,
            3 => Self::RequestPeerList,
            4 => Self::PeerList,
            5 => Self::RequestBlockchain,
            6 => Self::Blockchain,
            7 => Self::BlockForged,
            other => return Err(other),
        })
    }
}

/// Messages exchanged between nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Opaque application traffic, handed to the node's
    /// [`crate::AppHandler`].
    AppDefined { token: Option<Token>, payload: Vec<u8> },

    Ping { token: Option<Token> },

    Pong { token: Option<Token> },

    RequestPeerList { token: Option<Token> },

    /// Known peers in ascending address order.
    PeerList { token: Option<Token>, peers: Vec<PeerAddress> },

    RequestBlockchain { token: Option<Token> },

    /// The sender's whole chain, oldest block first.
    Blockchain { token: Option<Token>, blocks: Vec<Block> },

    /// A newly forged, signed block.
    BlockForged { token: Option<Token>, block: Block },

    /// A well-formed frame with a tag this node does not know.
    Unknown { tag: u8, token: Option<Token> },
}

/// Outer envelope of every datagram.  The body encoding depends on `tag`, so
/// that an unknown tag can still be recognised as such.
#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    tag: u8,
    token: Option<Token>,
    body: Vec<u8>,
}

impl Message {
    pub fn ping(token: Option<Token>) -> Self {
        Self::Ping { token }
    }

    pub fn pong(token: Option<Token>) -> Self {
        Self::Pong { token }
    }

    pub fn request_peer_list(token: Option<Token>) -> Self {
        Self::RequestPeerList { token }
    }

    pub fn peer_list(token: Option<Token>, peers: Vec<PeerAddress>) -> Self {
        Self::PeerList { token, peers }
    }

    pub fn request_blockchain(token: Option<Token>) -> Self {
        Self::RequestBlockchain { token }
    }

    pub fn blockchain(token: Option<Token>, blocks: Vec<Block>) -> Self {
        Self::Blockchain { token, blocks }
    }

    pub fn block_forged(token: Option<Token>, block: Block) -> Self {
        Self::BlockForged { token, block }
    }

    pub fn app_defined(token: Option<Token>, payload: Vec<u8>) -> Self {
        Self::AppDefined { token, payload }
    }

    /// Raw wire tag.
    pub fn tag(&self) -> u8 {
        let tag = match self {
            Self::AppDefined { .. } => MessageTag::AppDefined,
            Self::Ping { .. } => MessageTag::Ping,
            Self::Pong { .. } => MessageTag::Pong,
            Self::RequestPeerList { .. } => MessageTag::RequestPeerList,
            Self::PeerList { .. } => MessageTag::PeerList,
            Self::RequestBlockchain { .. } => MessageTag::RequestBlockchain,
            Self::Blockchain { .. } => MessageTag::Blockchain,
            Self::BlockForged { .. } => MessageTag::BlockForged,
            Self::Unknown { tag, .. } => return *tag,
        };
        tag as u8
    }

    pub fn token(&self) -> Option<Token> {
        match self {
            Self::AppDefined { token, .. }
            | Self::Ping { token }
            | Self::Pong { token }
            | Self::RequestPeerList { token }
            | Self::PeerList { token, .. }
            | Self::RequestBlockchain { token }
            | Self::Blockchain { token, .. }
            | Self::BlockForged { token, .. }
            | Self::Unknown { token, .. } => *token,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AppDefined { .. } => "APP_DEFINED",
            Self::Ping { .. } => "PING",
            Self::Pong { .. } => "PONG",
            Self::RequestPeerList { .. } => "REQUEST_PEER_LIST",
            Self::PeerList { .. } => "PEER_LIST",
            Self::RequestBlockchain { .. } => "REQUEST_BLOCKCHAIN",
            Self::Blockchain { .. } => "BLOCKCHAIN",
            Self::BlockForged { .. } => "BLOCK_FORGED",
            Self::Unknown { .. } => "UNKNOWN",
        }
    }

    /// Encode to a single datagram.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let body = match self {
            Self::AppDefined { payload, .. } => payload.clone(),
            Self::PeerList { peers, .. } => bincode::serialize(peers)?,
            Self::Blockchain { blocks, .. } => bincode::serialize(blocks)?,
            Self::BlockForged { block, .. } => bincode::serialize(block)?,
            Self::Ping { .. }
            | Self::Pong { .. }
            | Self::RequestPeerList { .. }
            | Self::RequestBlockchain { .. }
            | Self::Unknown { .. } => Vec::new(),
        };

        let frame = Frame {
            tag: self.tag(),
            token: self.token(),
            body,
        };
        Ok(bincode::serialize(&frame)?)
    }

    /// Decode a datagram.  Frames with an unrecognised tag decode to
    /// [`Message::Unknown`]; only malformed bytes are an error.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let Frame { tag, token, body } = bincode::deserialize(bytes)?;

        let tag = match MessageTag::try_from(tag) {
            Ok(tag) => tag,
            Err(tag) => return Ok(Self::Unknown { tag, token }),
        };

        Ok(match tag {
            MessageTag::AppDefined => Self::AppDefined {
                token,
                payload: body,
            },
            MessageTag::Ping => Self::Ping { token },
            MessageTag::Pong => Self::Pong { token },
            MessageTag::RequestPeerList => Self::RequestPeerList { token },
            MessageTag::PeerList => Self::PeerList {
                token,
                peers: bincode::deserialize(&body)?,
            },
            MessageTag::RequestBlockchain => Self::RequestBlockchain { token },
            MessageTag::Blockchain => Self::Blockchain {
                token,
                blocks: bincode::deserialize(&body)?,
            },
            MessageTag::BlockForged => Self::BlockForged {
                token,
                block: bincode::deserialize(&body)?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use fc_block::Blockchain;

    use super::*;

    fn decode_encoded(msg: &Message) -> Message {
        Message::decode(&msg.encode().unwrap()).unwrap()
    }

    #[test]
    fn peer_list_keeps_order_and_token() {
        let peers = vec![
            SocketAddr::from(([10, 0, 0, 1], 1)),
            SocketAddr::from(([10, 0, 0, 2], 1)),
        ];
        let msg = Message::peer_list(Some(17), peers);
        assert_eq!(decode_encoded(&msg), msg);
    }

    #[test]
    fn blockchain_message_carries_blocks_in_order() {
        let mut chain = Blockchain::new();
        for i in 0..3u8 {
            let block = chain.next_block(vec![i]);
            assert!(chain.add_block(block));
        }
        let msg = Message::blockchain(None, chain.blocks().to_vec());
        match decode_encoded(&msg) {
            Message::Blockchain { blocks, token } => {
                assert_eq!(token, None);
                assert_eq!(blocks.as_slice(), chain.blocks());
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn unknown_tag_is_not_an_error() {
        let bytes = Message::Unknown {
            tag: 42,
            token: Some(5),
        }
        .encode()
        .unwrap();
        assert_eq!(
            Message::decode(&bytes).unwrap(),
            Message::Unknown {
                tag: 42,
                token: Some(5)
            }
        );
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let bytes = Message::ping(Some(1)).encode().unwrap();
        assert!(Message::decode(&bytes[..bytes.len() - 3]).is_err());
    }

    #[test]
    fn known_tag_with_bad_body_is_an_error() {
        let bytes = Message::app_defined(None, vec![0xff; 4]).encode().unwrap();
        let mut frame: Frame = bincode::deserialize(&bytes).unwrap();
        frame.tag = MessageTag::BlockForged as u8;
        let bytes = bincode::serialize(&frame).unwrap();
        assert!(Message::decode(&bytes).is_err());
    }

    #[test]
    fn every_known_tag_maps_back() {
        for tag in 0u8..=7 {
            assert_eq!(MessageTag::try_from(tag).map(|t| t as u8), Ok(tag));
        }
        assert_eq!(MessageTag::try_from(8), Err(8));
    }
}
