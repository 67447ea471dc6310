use std::{net::SocketAddr, time::Duration};

use rand::Rng;

use crate::peers::PeerAddress;

/// Shortest wait between two liveness sweeps.
pub const PEER_PING_MIN_INTERVAL: Duration = Duration::from_secs(50);

/// Upper bound (exclusive) of the random delay added to
/// [`PEER_PING_MIN_INTERVAL`].
pub const PEER_PING_MAX_JITTER: Duration = Duration::from_secs(20);

/// A peer silent for at least this long is evicted on the next sweep.
pub const PEER_PING_TIMEOUT: Duration = Duration::from_secs(120);

pub const DEFAULT_PORT: u16 = 51025;

/// Full configuration for a [`crate::Node`].
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Address the UDP transport binds to.  Defaults to `0.0.0.0:51025`.
    pub listen_addr: SocketAddr,

    /// Address other peers know this node by, when it differs from
    /// `listen_addr` (for example behind NAT or when bound to `0.0.0.0`).
    /// Never merged into our own peer set.
    pub public_addr: Option<SocketAddr>,

    /// Peers known at start-up.  They are added to the peer set and asked
    /// for their peer list (and chain, if ours is empty) when the node runs.
    pub initial_peers: Vec<PeerAddress>,

    pub ping_min_interval: Duration,
    pub ping_max_jitter: Duration,
    pub ping_timeout: Duration,

    /// Seed for the ping-jitter RNG.  `None` seeds from the OS.
    pub rng_seed: Option<u64>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            public_addr: None,
            initial_peers: Vec::new(),
            ping_min_interval: PEER_PING_MIN_INTERVAL,
            ping_max_jitter: PEER_PING_MAX_JITTER,
            ping_timeout: PEER_PING_TIMEOUT,
            rng_seed: None,
        }
    }
}

impl NodeConfig {
    /// Config listening on all interfaces at `port`.
    pub fn on_port(port: u16) -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            ..Self::default()
        }
    }

    pub fn with_peers(mut self, peers: impl IntoIterator<Item = PeerAddress>) -> Self {
        self.initial_peers.extend(peers);
        self
    }

    pub fn with_public_addr(mut self, addr: SocketAddr) -> Self {
        self.public_addr = Some(addr);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Delay until the next sweep, drawn uniformly from
    /// `[ping_min_interval, ping_min_interval + ping_max_jitter)`.
    pub fn ping_delay(&self, rng: &mut impl Rng) -> Duration {
        let jitter_ms = self.ping_max_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.ping_min_interval;
        }
        self.ping_min_interval + Duration::from_millis(rng.gen_range(0..jitter_ms))
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let config = NodeConfig::default();
        assert_eq!(config.ping_min_interval, Duration::from_secs(50));
        assert_eq!(config.ping_max_jitter, Duration::from_secs(20));
        assert_eq!(config.ping_timeout, Duration::from_secs(120));
        assert_eq!(config.listen_addr.port(), DEFAULT_PORT);
    }

    #[test]
    fn ping_delay_stays_in_window() {
        let config = NodeConfig::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let delay = config.ping_delay(&mut rng);
            assert!(delay >= Duration::from_secs(50));
            assert!(delay < Duration::from_secs(70));
        }
    }

    #[test]
    fn same_seed_gives_same_delays() {
        let config = NodeConfig::default();
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        let first: Vec<Duration> = (0..5).map(|_| config.ping_delay(&mut a)).collect();
        let second: Vec<Duration> = (0..5).map(|_| config.ping_delay(&mut b)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn zero_jitter_is_the_minimum_interval() {
        let config = NodeConfig {
            ping_max_jitter: Duration::ZERO,
            ..NodeConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(config.ping_delay(&mut rng), PEER_PING_MIN_INTERVAL);
    }
}
