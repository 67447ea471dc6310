use std::collections::VecDeque;

use fc_block::{Block, Blockchain};
use fc_sync::{validate_and_append, IngestOutcome, ProducerRoster};
use rand::{rngs::StdRng, SeedableRng};
use tokio::{
    sync::mpsc,
    task,
    time::{self, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    app::{AppHandler, IgnoreAppMessages},
    clock::{Clock, SystemClock},
    config::NodeConfig,
    error::NodeError,
    event::{DropReason, NodeEvent},
    network::Networker,
    peers::{self, PeerAddress, PeerSet},
    protocol::Message,
};

/// A Forgechain peer.
///
/// Owns the peer set, the local chain and the producer roster derived from
/// it, and drives two cooperative tasks from a single loop:
/// - receiving and dispatching one inbound message at a time
/// - periodically sweeping the peer set and pinging the survivors
///
/// Every state change happens between `.await` points, so the two tasks never
/// observe a half-applied update.
pub struct Node<N, C = SystemClock> {
    networker: N,
    clock: C,
    config: NodeConfig,
    peers: PeerSet,
    blockchain: Blockchain,
    producers: ProducerRoster,
    app_handler: Box<dyn AppHandler>,
    rng: StdRng,
    /// Peers still to be pinged in the current sweep.
    pending_pings: VecDeque<PeerAddress>,
    event_tx: mpsc::UnboundedSender<NodeEvent>,
}

impl<N: Networker, C: Clock> Node<N, C> {
    /// Create a node on top of `networker` starting from `blockchain` (which
    /// may be empty).
    ///
    /// Returns the node together with a receiver for [`NodeEvent`]s that the
    /// calling application can process independently.
    pub fn new(
        networker: N,
        clock: C,
        config: NodeConfig,
        blockchain: Blockchain,
    ) -> (Self, mpsc::UnboundedReceiver<NodeEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let peers = PeerSet::seeded(config.initial_peers.iter().copied(), clock.now());
        let producers = ProducerRoster::from_chain(&blockchain);
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        info!(
            "Node at {} starting with {} peers, {} blocks, {} producers",
            networker.local_addr(),
            peers.len(),
            blockchain.len(),
            producers.len()
        );

        let node = Self {
            networker,
            clock,
            config,
            peers,
            blockchain,
            producers,
            app_handler: Box::new(IgnoreAppMessages),
            rng,
            pending_pings: VecDeque::new(),
            event_tx,
        };

        (node, event_rx)
    }

    /// Replace the default `APP_DEFINED` handler.
    pub fn with_app_handler(mut self, handler: impl AppHandler + 'static) -> Self {
        self.app_handler = Box::new(handler);
        self
    }

    pub fn local_addr(&self) -> PeerAddress {
        self.networker.local_addr()
    }

    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    /// Provide read access to the local blockchain.
    pub fn blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    pub fn producers(&self) -> &ProducerRoster {
        &self.producers
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Run the node until the transport fails.
    ///
    /// Sends the start-up requests from [`Node::bootstrap`], then alternates
    /// between inbound messages and ping sweeps, yielding after each step.
    pub async fn run(&mut self) -> Result<(), NodeError> {
        self.bootstrap().await?;

        let mut next_sweep = Instant::now() + self.config.ping_delay(&mut self.rng);

        loop {
            let sweeping = !self.pending_pings.is_empty();

            tokio::select! {
                received = self.networker.recv() => {
                    let (from, bytes) = received?;
                    self.handle_inbound(from, &bytes).await?;
                }
                _ = time::sleep_until(next_sweep), if !sweeping => {
                    self.begin_sweep();
                    next_sweep = Instant::now() + self.config.ping_delay(&mut self.rng);
                }
                _ = std::future::ready(()), if sweeping => {
                    self.ping_next().await?;
                }
            }

            task::yield_now().await;
        }
    }

    /// Ask every configured seed peer for its peer list and, while the local
    /// chain is empty, for its chain.
    pub async fn bootstrap(&mut self) -> Result<(), NodeError> {
        let want_chain = self.blockchain.is_empty();
        for peer in self.config.initial_peers.clone() {
            self.send_message(peer, &Message::request_peer_list(None)).await?;
            if want_chain {
                self.send_message(peer, &Message::request_blockchain(None)).await?;
            }
        }
        Ok(())
    }

    /// One receive step without the receive: record the sender as alive,
    /// decode and dispatch.
    pub async fn handle_inbound(
        &mut self,
        from: PeerAddress,
        bytes: &[u8],
    ) -> Result<(), NodeError> {
        self.peers.touch(from, self.clock.now());

        match Message::decode(bytes) {
            Ok(message) => self.dispatch(from, message).await,
            Err(e) => {
                warn!("Dropping malformed message from {from}: {e}");
                self.emit(NodeEvent::MessageDropped {
                    from,
                    reason: DropReason::Malformed,
                });
                Ok(())
            }
        }
    }

    /// Act on one decoded message.  Only transport failures are returned.
    pub async fn dispatch(
        &mut self,
        from: PeerAddress,
        message: Message,
    ) -> Result<(), NodeError> {
        debug!("{} from {from}", message.name());

        match message {
            Message::Ping { token } => self.send_message(from, &Message::pong(token)).await,

            // The sender's last-seen time was already refreshed on receipt.
            Message::Pong { .. } => Ok(()),

            Message::RequestPeerList { token } => {
                let reply = Message::peer_list(token, self.peers.list());
                self.send_message(from, &reply).await
            }

            Message::PeerList { peers, .. } => {
                let offered = peers.len();
                let usable: Vec<PeerAddress> = peers
                    .into_iter()
                    .filter(|peer| self.can_dial(peer) && !self.is_own_address(peer))
                    .collect();
                if usable.len() < offered {
                    debug!(
                        "Skipped {} unusable addresses in peer list from {from}",
                        offered - usable.len()
                    );
                }
                let added = self.peers.merge(usable, self.clock.now());
                if added > 0 {
                    debug!("Learned {added} new peers from {from}");
                    self.emit(NodeEvent::PeersMerged { from, added });
                }
                Ok(())
            }

            Message::RequestBlockchain { token } => {
                if self.blockchain.is_empty() {
                    debug!("No chain to send to {from}");
                    return Ok(());
                }
                let reply = Message::blockchain(token, self.blockchain.blocks().to_vec());
                self.send_message(from, &reply).await
            }

            Message::Blockchain { blocks, .. } => {
                self.replace_chain(from, blocks);
                Ok(())
            }

            Message::BlockForged { block, .. } => {
                self.ingest(from, block);
                Ok(())
            }

            Message::AppDefined { token, payload } => {
                match self.app_handler.handle(from, token, &payload) {
                    Some(reply) => {
                        self.send_message(from, &Message::app_defined(token, reply))
                            .await
                    }
                    None => Ok(()),
                }
            }

            Message::Unknown { tag, .. } => {
                warn!("Dropping message with unknown tag {tag} from {from}");
                self.emit(NodeEvent::MessageDropped {
                    from,
                    reason: DropReason::UnknownTag(tag),
                });
                Ok(())
            }
        }
    }

    /// Validate a block forged by the embedding application, append it and
    /// announce it to every known peer.
    pub async fn announce_block(&mut self, block: Block) -> Result<IngestOutcome, NodeError> {
        let local = self.local_addr();
        let outcome = self.ingest(local, block.clone());
        if outcome != IngestOutcome::Appended {
            return Ok(outcome);
        }

        let message = Message::block_forged(None, block);
        for peer in self.peers.list() {
            self.send_message(peer, &message).await?;
        }
        Ok(outcome)
    }

    /// A complete sweep: evict stale peers, then ping the rest one by one.
    pub async fn ping_round(&mut self) -> Result<(), NodeError> {
        self.begin_sweep();
        while self.ping_next().await? {
            task::yield_now().await;
        }
        Ok(())
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    /// Evict silent peers and queue pings for the rest.
    fn begin_sweep(&mut self) {
        let now = self.clock.now();
        let sweep = self.peers.sweep(&self.clock, now, self.config.ping_timeout);

        for peer in sweep.evicted {
            info!(
                "Evicting {peer}: silent for at least {:?}",
                self.config.ping_timeout
            );
            self.emit(NodeEvent::PeerEvicted(peer));
        }
        self.pending_pings = sweep.to_ping.into();
    }

    /// Ping the next queued peer.  Returns `false` once the queue is empty.
    async fn ping_next(&mut self) -> Result<bool, NodeError> {
        let Some(peer) = self.pending_pings.pop_front() else {
            return Ok(false);
        };
        let token = self.clock.now().timestamp_millis();
        self.send_message(peer, &Message::ping(Some(token))).await?;
        Ok(true)
    }

    /// Adopt `blocks` as the local chain, but only while ours is empty.
    fn replace_chain(&mut self, from: PeerAddress, blocks: Vec<Block>) {
        if !self.blockchain.is_empty() {
            warn!(
                "Ignoring chain of {} blocks from {from}: local chain already has {}",
                blocks.len(),
                self.blockchain.len()
            );
            self.emit(NodeEvent::MessageDropped {
                from,
                reason: DropReason::ChainNotEmpty,
            });
            return;
        }

        let chain = match Blockchain::from_blocks(blocks) {
            Ok(chain) => chain,
            Err(e) => {
                warn!("Ignoring chain from {from}: {e}");
                self.emit(NodeEvent::MessageDropped {
                    from,
                    reason: DropReason::InvalidChain,
                });
                return;
            }
        };

        self.blockchain = chain;
        self.producers.rebuild(&self.blockchain);

        let length = self.blockchain.len();
        let producers = self.producers.len();
        info!("Adopted chain of {length} blocks from {from} ({producers} producers)");
        self.emit(NodeEvent::ChainReplaced {
            from,
            length,
            producers,
        });
    }

    /// Whether the transport could reach `peer` at all.
    fn can_dial(&self, peer: &PeerAddress) -> bool {
        peers::is_dialable(peer) && peer.is_ipv4() == self.local_addr().is_ipv4()
    }

    /// Whether `peer` is one of the addresses this node is known by.  A node
    /// bound to the unspecified address also answers on loopback.
    fn is_own_address(&self, peer: &PeerAddress) -> bool {
        let local = self.local_addr();
        if *peer == local || self.config.public_addr == Some(*peer) {
            return true;
        }
        local.ip().is_unspecified() && peer.port() == local.port() && peer.ip().is_loopback()
    }

    fn ingest(&mut self, from: PeerAddress, block: Block) -> IngestOutcome {
        let index = block.index;
        let hash = block.hash_hex();
        let outcome = validate_and_append(&mut self.blockchain, &mut self.producers, from, block);

        let event = match outcome {
            IngestOutcome::Appended => NodeEvent::BlockAppended { from, index, hash },
            rejected => NodeEvent::BlockRejected {
                from,
                index,
                outcome: rejected,
            },
        };
        self.emit(event);
        outcome
    }

    async fn send_message(
        &mut self,
        to: PeerAddress,
        message: &Message,
    ) -> Result<(), NodeError> {
        match message.encode() {
            Ok(bytes) => self.networker.send(to, &bytes).await,
            Err(e) => {
                warn!("Failed to encode {} for {to}: {e}", message.name());
                Ok(())
            }
        }
    }

    fn emit(&self, event: NodeEvent) {
        let _ = self.event_tx.send(event);
    }
}
