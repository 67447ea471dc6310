use std::{
    collections::HashMap,
    io,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{
    net::{ToSocketAddrs, UdpSocket},
    sync::mpsc,
    time::Instant,
};
use tracing::{debug, warn};

use crate::{error::NodeError, peers::PeerAddress};

/// Largest payload a single UDP datagram can carry.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Largest message the UDP transport will split and reassemble.  Larger
/// messages are dropped with a warning.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Message bytes carried by one fragment; leaves room for the envelope.
const FRAGMENT_SIZE: usize = 60_000;

const MAX_FRAGMENTS: usize = (MAX_MESSAGE_SIZE + FRAGMENT_SIZE - 1) / FRAGMENT_SIZE;

/// Partially received messages kept per transport.
const MAX_PENDING_MESSAGES: usize = 64;

/// A partial message whose fragments stop arriving is forgotten after this.
const REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Message transport used by a [`crate::Node`].
///
/// Delivery is best effort: a message to an unreachable peer may vanish
/// silently.  Any error returned here is treated as fatal by the node.
#[async_trait]
pub trait Networker: Send {
    /// Wait for the next message.  Must be cancel-safe: the node races this
    /// future against its ping timer and drops it when the timer wins.
    async fn recv(&mut self) -> Result<(PeerAddress, Vec<u8>), NodeError>;

    /// Send one message.  Failures that only concern `to` (an address the
    /// socket cannot reach) are logged and swallowed.
    async fn send(&mut self, to: PeerAddress, bytes: &[u8]) -> Result<(), NodeError>;

    /// The address peers should use to reach this node.
    fn local_addr(&self) -> PeerAddress;
}

/// What actually travels in one UDP datagram.
#[derive(Debug, Serialize, Deserialize)]
enum Datagram {
    Whole(Vec<u8>),
    Fragment {
        id: u32,
        index: u16,
        count: u16,
        data: Vec<u8>,
    },
}

/// Messages up to [`MAX_MESSAGE_SIZE`] over UDP.  Anything that does not fit
/// one datagram is split into fragments and reassembled by the receiver; a
/// lost fragment loses the whole message.
pub struct UdpNetworker {
    socket: UdpSocket,
    local_addr: PeerAddress,
    buf: Vec<u8>,
    next_id: u32,
    reassembly: Reassembly,
}

impl UdpNetworker {
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, NodeError> {
        let socket = UdpSocket::bind(addr).await?;
        let local_addr = socket.local_addr()?;
        debug!("UDP transport bound to {local_addr}");
        Ok(Self {
            socket,
            local_addr,
            buf: vec![0u8; MAX_DATAGRAM_SIZE],
            next_id: 0,
            reassembly: Reassembly::default(),
        })
    }

    fn datagrams(&mut self, bytes: &[u8]) -> Result<Vec<Vec<u8>>, NodeError> {
        let datagrams = if bytes.len() <= FRAGMENT_SIZE {
            vec![Datagram::Whole(bytes.to_vec())]
        } else {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            let chunks = bytes.chunks(FRAGMENT_SIZE);
            let count = chunks.len() as u16;
            chunks
                .enumerate()
                .map(|(index, chunk)| Datagram::Fragment {
                    id,
                    index: index as u16,
                    count,
                    data: chunk.to_vec(),
                })
                .collect()
        };

        datagrams
            .iter()
            .map(|datagram| {
                bincode::serialize(datagram)
                    .map_err(|e| NodeError::Transport(format!("datagram encoding failed: {e}")))
            })
            .collect()
    }

    /// Returns `false` when `to` cannot be reached from this socket.
    async fn send_datagram(&self, to: PeerAddress, datagram: &[u8]) -> Result<bool, NodeError> {
        match self.socket.send_to(datagram, to).await {
            Ok(_) => Ok(true),
            Err(e) if is_unreachable_destination(&e) => {
                warn!("Dropping message to {to}: {e}");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Send errors caused by the destination address rather than the socket.
fn is_unreachable_destination(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::PermissionDenied
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::Unsupported
            | io::ErrorKind::ConnectionRefused
    )
}

#[async_trait]
impl Networker for UdpNetworker {
    async fn recv(&mut self) -> Result<(PeerAddress, Vec<u8>), NodeError> {
        loop {
            let (len, from) = self.socket.recv_from(&mut self.buf).await?;
            match bincode::deserialize::<Datagram>(&self.buf[..len]) {
                Ok(Datagram::Whole(bytes)) => return Ok((from, bytes)),
                Ok(Datagram::Fragment {
                    id,
                    index,
                    count,
                    data,
                }) => {
                    let complete = self.reassembly.accept(from, id, index, count, data);
                    if let Some(bytes) = complete {
                        return Ok((from, bytes));
                    }
                }
                // Hand the raw bytes up so the node reports them as malformed.
                Err(_) => return Ok((from, self.buf[..len].to_vec())),
            }
        }
    }

    async fn send(&mut self, to: PeerAddress, bytes: &[u8]) -> Result<(), NodeError> {
        if bytes.len() > MAX_MESSAGE_SIZE {
            // A local size limit, not a broken transport.
            warn!(
                "Dropping {}-byte message to {to}: exceeds message limit",
                bytes.len()
            );
            return Ok(());
        }
        if to.is_ipv4() != self.local_addr.is_ipv4() {
            warn!("Dropping message to {to}: address family differs from {}", self.local_addr);
            return Ok(());
        }

        for datagram in self.datagrams(bytes)? {
            if !self.send_datagram(to, &datagram).await? {
                break;
            }
        }
        Ok(())
    }

    fn local_addr(&self) -> PeerAddress {
        self.local_addr
    }
}

struct Partial {
    parts: Vec<Option<Vec<u8>>>,
    received: usize,
    started: Instant,
}

/// Fragments waiting for the rest of their message, keyed by sender and
/// message id.
#[derive(Default)]
struct Reassembly {
    pending: HashMap<(PeerAddress, u32), Partial>,
}

impl Reassembly {
    /// Store one fragment.  Returns the message once its last fragment is in.
    fn accept(
        &mut self,
        from: PeerAddress,
        id: u32,
        index: u16,
        count: u16,
        data: Vec<u8>,
    ) -> Option<Vec<u8>> {
        let (index, count) = (usize::from(index), usize::from(count));
        if count == 0 || count > MAX_FRAGMENTS || index >= count || data.len() > FRAGMENT_SIZE {
            warn!("Dropping bad fragment {index}/{count} of message {id} from {from}");
            return None;
        }

        self.pending
            .retain(|_, partial| partial.started.elapsed() < REASSEMBLY_TIMEOUT);

        let key = (from, id);
        if !self.pending.contains_key(&key) && self.pending.len() >= MAX_PENDING_MESSAGES {
            let oldest = self
                .pending
                .iter()
                .min_by_key(|(_, partial)| partial.started)
                .map(|(key, _)| *key);
            if let Some(oldest) = oldest {
                debug!("Forgetting partial message {} from {}", oldest.1, oldest.0);
                self.pending.remove(&oldest);
            }
        }

        let partial = self.pending.entry(key).or_insert_with(|| Partial {
            parts: vec![None; count],
            received: 0,
            started: Instant::now(),
        });
        if partial.parts.len() != count {
            warn!("Dropping fragment of message {id} from {from}: fragment count changed");
            return None;
        }
        if partial.parts[index].is_none() {
            partial.parts[index] = Some(data);
            partial.received += 1;
        }
        if partial.received < count {
            return None;
        }

        self.pending
            .remove(&key)
            .map(|partial| partial.parts.into_iter().flatten().flatten().collect())
    }
}

type Inbox = mpsc::UnboundedSender<(PeerAddress, Vec<u8>)>;

/// An in-process network: every endpoint created from the same
/// `MemoryNetwork` can reach every other by address.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inboxes: Arc<Mutex<HashMap<PeerAddress, Inbox>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an endpoint at `addr`, replacing any previous endpoint there.
    pub fn endpoint(&self, addr: PeerAddress) -> MemoryNetworker {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(addr, tx.clone());
        MemoryNetworker {
            addr,
            network: self.clone(),
            registered: tx,
            inbox: rx,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PeerAddress, Inbox>> {
        self.inboxes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One endpoint of a [`MemoryNetwork`].
pub struct MemoryNetworker {
    addr: PeerAddress,
    network: MemoryNetwork,
    /// Our own inbox sender, to tell whether the registry still points at us.
    registered: Inbox,
    inbox: mpsc::UnboundedReceiver<(PeerAddress, Vec<u8>)>,
}

impl MemoryNetworker {
    /// A message if one is already waiting.
    pub fn try_recv(&mut self) -> Option<(PeerAddress, Vec<u8>)> {
        self.inbox.try_recv().ok()
    }
}

#[async_trait]
impl Networker for MemoryNetworker {
    async fn recv(&mut self) -> Result<(PeerAddress, Vec<u8>), NodeError> {
        self.inbox
            .recv()
            .await
            .ok_or_else(|| NodeError::Transport(format!("endpoint {} detached", self.addr)))
    }

    async fn send(&mut self, to: PeerAddress, bytes: &[u8]) -> Result<(), NodeError> {
        let inbox = self.network.lock().get(&to).cloned();
        match inbox {
            Some(inbox) if inbox.send((self.addr, bytes.to_vec())).is_ok() => {}
            _ => debug!("No endpoint at {to}; dropping message"),
        }
        Ok(())
    }

    fn local_addr(&self) -> PeerAddress {
        self.addr
    }
}

impl Drop for MemoryNetworker {
    fn drop(&mut self) {
        let mut inboxes = self.network.lock();
        if inboxes.get(&self.addr).is_some_and(|tx| tx.same_channel(&self.registered)) {
            inboxes.remove(&self.addr);
        }
    }
}
