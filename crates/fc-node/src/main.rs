use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;
use fc_block::Blockchain;
use fc_node::{config, Node, NodeConfig, SystemClock, UdpNetworker};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Forgechain node daemon.
#[derive(Parser, Debug)]
#[command(
    name = "fc-node",
    version,
    about = "Forgechain P2P node",
    long_about = "Runs a Forgechain P2P node that tracks peer liveness, replicates \
                  the block chain and appends blocks signed by known producers."
)]
struct Cli {
    /// UDP address to listen on.
    #[arg(short, long, default_value = "0.0.0.0:51025", env = "FC_LISTEN")]
    listen: SocketAddr,

    /// Address peers reach this node at, if different from --listen.
    #[arg(long, env = "FC_PUBLIC_ADDR")]
    public_addr: Option<SocketAddr>,

    /// Seed peer address.  Repeat the flag (or comma-separate) for several.
    #[arg(short, long = "peer", env = "FC_PEERS", value_delimiter = ',')]
    peers: Vec<SocketAddr>,

    /// JSON chain file to start from.  Omit to start empty and fetch the
    /// chain from the first peer that has one.
    #[arg(short, long, env = "FC_CHAIN")]
    chain: Option<PathBuf>,

    /// Minimum seconds between liveness sweeps.
    #[arg(long, default_value_t = config::PEER_PING_MIN_INTERVAL.as_secs(), env = "FC_PING_MIN_INTERVAL")]
    ping_min_interval: u64,

    /// Maximum random seconds added to the sweep interval.
    #[arg(long, default_value_t = config::PEER_PING_MAX_JITTER.as_secs(), env = "FC_PING_MAX_JITTER")]
    ping_max_jitter: u64,

    /// Seconds of silence after which a peer is evicted.
    #[arg(long, default_value_t = config::PEER_PING_TIMEOUT.as_secs(), env = "FC_PING_TIMEOUT")]
    ping_timeout: u64,

    /// Seed for the ping-jitter RNG, for reproducible runs.
    #[arg(long, env = "FC_SEED")]
    seed: Option<u64>,

    /// Suppress log output to stderr (run silently).
    #[arg(short, long, default_value_t = false, env = "FC_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_filter = if cli.quiet {
        EnvFilter::new("off")
    } else {
        EnvFilter::from_default_env()
            .add_directive("fc_node=info".parse()?)
            .add_directive("fc_sync=info".parse()?)
    };
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    let blockchain = match &cli.chain {
        Some(path) => Blockchain::load_json(path)?,
        None => Blockchain::new(),
    };

    let config = NodeConfig {
        listen_addr: cli.listen,
        public_addr: cli.public_addr,
        initial_peers: cli.peers,
        ping_min_interval: Duration::from_secs(cli.ping_min_interval),
        ping_max_jitter: Duration::from_secs(cli.ping_max_jitter),
        ping_timeout: Duration::from_secs(cli.ping_timeout),
        rng_seed: cli.seed,
    };

    info!(
        listen = %config.listen_addr,
        peers = config.initial_peers.len(),
        blocks = blockchain.len(),
        ping_timeout_secs = cli.ping_timeout,
        "Starting Forgechain node"
    );

    let networker = UdpNetworker::bind(config.listen_addr).await?;
    let (mut node, mut events) = Node::new(networker, SystemClock, config, blockchain);

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!("NodeEvent: {event:?}");
        }
    });

    node.run().await?;

    Ok(())
}
