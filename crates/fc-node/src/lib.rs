pub mod app;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod network;
pub mod node;
pub mod peers;
pub mod protocol;

pub use app::{AppHandler, IgnoreAppMessages};
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use config::NodeConfig;
pub use error::{NodeError, ProtocolError};
pub use event::{DropReason, NodeEvent};
pub use network::{MemoryNetwork, MemoryNetworker, Networker, UdpNetworker};
pub use node::Node;
pub use peers::{PeerAddress, PeerSet, Sweep};
pub use protocol::{Message, MessageTag, Token};
