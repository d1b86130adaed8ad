use crate::{config::NodeConfig, transport::HttpTransport};
use std::sync::Arc;
use tracing::{info, warn};
use wincoin_core::{
    sync::{self, BroadcastReport},
    Block, Chain, ChainDocument, Error, Miner, Peer, PeerSet, SyncProtocol, UpdateOutcome,
};

/// Shared handles behind every route.
#[derive(Clone)]
pub struct AppState {
    pub chain: Chain,
    pub miner: Arc<Miner>,
    pub sync: Arc<SyncProtocol<HttpTransport>>,
    pub advertise: Peer,
}

impl AppState {
    pub fn new(config: &NodeConfig, peers: Vec<Peer>) -> anyhow::Result<Self> {
        let transport =
            HttpTransport::new(config.http_timeout, Some(config.advertise.host.clone()))?;
        Ok(Self {
            chain: Chain::with_min_difficulty(config.min_difficulty),
            miner: Arc::new(Miner::new(config.search, config.mining_deadline)),
            sync: Arc::new(SyncProtocol::new(transport, PeerSet::from_peers(peers))),
            advertise: config.advertise.clone(),
        })
    }

    pub fn peers(&self) -> &PeerSet {
        self.sync.peers()
    }

    /// Mines one block on a blocking worker, then pushes the chain to peers.
    pub async fn mine_and_broadcast(
        &self,
        transactions: Vec<String>,
    ) -> Result<(Block, BroadcastReport), Error> {
        let chain = self.chain.clone();
        let miner = self.miner.clone();
        let block = tokio::task::spawn_blocking(move || miner.mine_next(&chain, transactions))
            .await
            .unwrap_or_else(|e| std::panic::resume_unwind(e.into_panic()))?;
        info!("mined block {} ({})", block.index(), block.hash());
        let report = self.sync.broadcast(&self.chain).await;
        Ok((block, report))
    }

    /// Merges a peer push; a changed tip pre-empts local mining.
    pub fn apply_update(&self, pushed: ChainDocument) -> Result<UpdateOutcome, Error> {
        match sync::apply_update(&self.chain, pushed) {
            Ok(outcome) => {
                if outcome.changed_tip() {
                    self.miner.preempt();
                }
                Ok(outcome)
            }
            Err(e) => {
                warn!("rejected ledger update: {e}");
                Err(e)
            }
        }
    }
}
