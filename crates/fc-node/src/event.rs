use fc_sync::IngestOutcome;

use crate::peers::PeerAddress;

/// Why an inbound message was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The bytes did not decode to a message.
    Malformed,
    /// A well-formed frame with an unrecognised tag.
    UnknownTag(u8),
    /// A full chain arrived but the local chain is not empty.
    ChainNotEmpty,
    /// A full chain arrived whose blocks do not link up.
    InvalidChain,
}

/// High-level events emitted by a running [`crate::Node`] that callers can
/// subscribe to via a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// A peer went silent past the ping timeout and was removed.
    PeerEvicted(PeerAddress),

    /// A peer list from `from` introduced `added` new peers.
    PeersMerged { from: PeerAddress, added: usize },

    /// The (previously empty) local chain was replaced by one from `from`.
    ChainReplaced {
        from: PeerAddress,
        length: usize,
        producers: usize,
    },

    /// A forged block became the new tip.
    BlockAppended {
        from: PeerAddress,
        index: u64,
        hash: String,
    },

    /// A forged block was discarded.
    BlockRejected {
        from: PeerAddress,
        index: u64,
        outcome: IngestOutcome,
    },

    /// An inbound message was discarded without effect.
    MessageDropped { from: PeerAddress, reason: DropReason },
}
