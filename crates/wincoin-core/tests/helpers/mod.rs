#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use wincoin_core::{
    Block, Chain, ChainDocument, Error, Hash, Miner, Peer, PeerTransport, SearchSpace,
};

/// Miner that walks nonces upward from zero without a deadline.
pub fn fast_miner() -> Miner {
    Miner::new(SearchSpace::ascending(0, u64::MAX), None).with_max_retries(64)
}

/// A chain with genesis at `difficulty` and `extra` mined blocks on top.
pub fn mined_chain(difficulty: u32, extra: usize) -> Chain {
    let chain = Chain::new();
    let miner = fast_miner();
    chain.genesis(difficulty, &miner).expect("genesis");
    for i in 0..extra {
        miner
            .mine_next(&chain, vec![format!("payment-{i}")])
            .expect("mine");
    }
    chain
}

/// A chain holding only a difficulty 6 genesis block, so that mining on
/// top of it takes long enough to be interrupted.
pub fn hard_chain() -> Chain {
    let chain = Chain::new();
    chain
        .add_block(Block::new(
            0,
            Hash::genesis_sentinel(),
            6,
            vec!["Genesis".into()],
            1_633_004,
            Hash::from("0000009d6a54335d9ba35a013d854dbaa1470361dc1b09bbca9b69196c5d5f27"),
            "2026-01-01 | 00:00:00".into(),
        ))
        .expect("difficulty 6 genesis");
    chain
}

/// In-memory peers: each endpoint either serves a chain document or is
/// unreachable. Announces and pushes are recorded.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    chains: Arc<Mutex<HashMap<Peer, ChainDocument>>>,
    pub announced: Arc<Mutex<Vec<(Peer, u16)>>>,
    pub pushed: Arc<Mutex<Vec<(Peer, u64)>>>,
}

impl MemoryTransport {
    pub fn serve(&self, peer: Peer, chain: ChainDocument) {
        self.chains.lock().unwrap().insert(peer, chain);
    }

    fn reachable(&self, peer: &Peer) -> Result<(), Error> {
        if self.chains.lock().unwrap().contains_key(peer) {
            Ok(())
        } else {
            Err(Error::PeerUnreachable {
                peer: peer.clone(),
                reason: "connection refused".into(),
            })
        }
    }
}

impl PeerTransport for MemoryTransport {
    async fn announce(&self, peer: &Peer, own_port: u16) -> Result<(), Error> {
        self.reachable(peer)?;
        self.announced.lock().unwrap().push((peer.clone(), own_port));
        Ok(())
    }

    async fn fetch_chain(&self, peer: &Peer) -> Result<ChainDocument, Error> {
        self.reachable(peer)?;
        Ok(self.chains.lock().unwrap()[peer].clone())
    }

    async fn push_chain(&self, peer: &Peer, chain: &ChainDocument) -> Result<(), Error> {
        self.reachable(peer)?;
        self.pushed.lock().unwrap().push((peer.clone(), chain.length));
        Ok(())
    }
}

/// Same chain with one transaction swapped, keeping the stored hash.
pub fn tamper(blocks: &[Block], index: usize) -> Vec<Block> {
    let mut out = blocks.to_vec();
    let b = &blocks[index];
    out[index] = Block::new(
        b.index(),
        b.previous_hash().clone(),
        b.difficulty(),
        vec!["forged".into()],
        b.nonce(),
        b.hash().clone(),
        b.timestamp().to_owned(),
    );
    out
}
