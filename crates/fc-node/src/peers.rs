use std::{
    collections::BTreeMap,
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use crate::clock::{Clock, Timestamp};

/// Network address identifying a peer.
pub type PeerAddress = SocketAddr;

/// Whether `peer` names a single host we could send to: no port 0, and no
/// unspecified, multicast or broadcast address.
pub fn is_dialable(peer: &PeerAddress) -> bool {
    if peer.port() == 0 || peer.ip().is_unspecified() || peer.ip().is_multicast() {
        return false;
    }
    match peer.ip() {
        IpAddr::V4(ip) => !ip.is_broadcast(),
        IpAddr::V6(_) => true,
    }
}

/// Result of a liveness sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sweep {
    /// Peers still within the timeout, ascending.
    pub to_ping: Vec<PeerAddress>,
    /// Peers removed by this sweep, ascending.
    pub evicted: Vec<PeerAddress>,
}

/// Known peers and when each was last heard from.
///
/// Keyed by address, so iteration (and therefore [`PeerSet::list`]) is always
/// in ascending address order.
#[derive(Debug, Clone, Default)]
pub struct PeerSet {
    peers: BTreeMap<PeerAddress, Timestamp>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Peer set containing `peers`, all last seen at `time`.
    pub fn seeded(peers: impl IntoIterator<Item = PeerAddress>, time: Timestamp) -> Self {
        Self {
            peers: peers.into_iter().map(|peer| (peer, time)).collect(),
        }
    }

    /// Record that `peer` was heard from at `time`, adding it if new.
    pub fn touch(&mut self, peer: PeerAddress, time: Timestamp) {
        self.peers.insert(peer, time);
    }

    /// All known peers in ascending address order.
    pub fn list(&self) -> Vec<PeerAddress> {
        self.peers.keys().copied().collect()
    }

    pub fn last_seen(&self, peer: &PeerAddress) -> Option<Timestamp> {
        self.peers.get(peer).copied()
    }

    pub fn contains(&self, peer: &PeerAddress) -> bool {
        self.peers.contains_key(peer)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Evict every peer silent for at least `timeout` as of `now`; return the
    /// survivors (to be pinged) and the evicted.
    pub fn sweep<C: Clock + ?Sized>(
        &mut self,
        clock: &C,
        now: Timestamp,
        timeout: Duration,
    ) -> Sweep {
        let timeout = i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX);
        let mut sweep = Sweep::default();

        self.peers.retain(|peer, last_seen| {
            if clock.diff_seconds(now, *last_seen) >= timeout {
                sweep.evicted.push(*peer);
                false
            } else {
                sweep.to_ping.push(*peer);
                true
            }
        });

        sweep
    }

    /// Add every address in `incoming` that is not already known, last seen
    /// at `default_time`.  Existing entries are left alone.  Returns the
    /// number of peers added.
    pub fn merge(
        &mut self,
        incoming: impl IntoIterator<Item = PeerAddress>,
        default_time: Timestamp,
    ) -> usize {
        let before = self.peers.len();
        for peer in incoming {
            self.peers.entry(peer).or_insert(default_time);
        }
        self.peers.len() - before
    }
}
