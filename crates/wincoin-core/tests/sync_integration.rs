mod helpers;

use helpers::{hard_chain, mined_chain, tamper, MemoryTransport};
use std::{sync::Arc, thread, time::Duration};
use wincoin_core::{
    sync::apply_update, Chain, ChainDocument, Error, GenesisOutcome, Peer, PeerSet, PeerTransport,
    Stage, SyncProtocol, UpdateOutcome,
};

fn peer(port: u16) -> Peer {
    Peer::new("localhost", port)
}

#[tokio::test]
async fn join_selects_longest_chain() {
    let short = mined_chain(1, 2);
    let long = mined_chain(1, 6);
    let transport = MemoryTransport::default();
    transport.serve(peer(1), short.serialize());
    transport.serve(peer(2), long.serialize());

    let sync = SyncProtocol::new(transport.clone(), PeerSet::from_peers([peer(1), peer(2)]));
    let chain = Chain::new();
    let outcome = sync.join(&chain, 9000).await.unwrap();

    assert_eq!(outcome.source, Some(peer(2)));
    assert_eq!(outcome.height, 7);
    assert_eq!(chain.height(), 7);
    assert_eq!(chain.blocks(), long.blocks());
    assert_eq!(chain.stage(), Stage::Joined);
    assert_eq!(transport.announced.lock().unwrap().len(), 2);
    assert!(transport
        .announced
        .lock()
        .unwrap()
        .iter()
        .all(|(_, port)| *port == 9000));
}

#[tokio::test]
async fn join_falls_back_when_longest_is_invalid() {
    let good = mined_chain(1, 2);
    let long = mined_chain(1, 6);
    let transport = MemoryTransport::default();
    transport.serve(peer(1), good.serialize());
    transport.serve(peer(2), ChainDocument::from_blocks(&tamper(&long.blocks(), 4)));

    let sync = SyncProtocol::new(transport, PeerSet::from_peers([peer(1), peer(2)]));
    let chain = Chain::new();
    let outcome = sync.join(&chain, 9000).await.unwrap();
    assert_eq!(outcome.source, Some(peer(1)));
    assert_eq!(outcome.rejected, 1);
    assert_eq!(chain.height(), 3);
}

#[tokio::test]
async fn join_ties_go_to_first_seen() {
    let a = mined_chain(1, 2);
    let b = Chain::new();
    b.replace(a.blocks()).unwrap();
    let transport = MemoryTransport::default();
    transport.serve(peer(7), a.serialize());
    transport.serve(peer(3), b.serialize());

    let sync = SyncProtocol::new(transport, PeerSet::from_peers([peer(7), peer(3)]));
    let outcome = sync.join(&Chain::new(), 1).await.unwrap();
    assert_eq!(outcome.source, Some(peer(7)));
}

#[tokio::test]
async fn join_skips_unreachable_peers() {
    let chain_src = mined_chain(1, 1);
    let transport = MemoryTransport::default();
    transport.serve(peer(2), chain_src.serialize());

    let sync = SyncProtocol::new(transport, PeerSet::from_peers([peer(1), peer(2)]));
    let chain = Chain::new();
    let outcome = sync.join(&chain, 5).await.unwrap();
    assert_eq!(outcome.candidates, 1);
    assert_eq!(chain.height(), 2);
    // unreachable peers stay known for later rounds
    assert_eq!(sync.peers().len(), 2);
}

#[tokio::test]
async fn join_without_valid_chain_leaves_node_empty() {
    let long = mined_chain(1, 3);
    let transport = MemoryTransport::default();
    transport.serve(peer(1), ChainDocument::from_blocks(&tamper(&long.blocks(), 1)));

    let sync = SyncProtocol::new(transport, PeerSet::from_peers([peer(1), peer(2)]));
    let chain = Chain::new();
    let err = sync.join(&chain, 5).await.unwrap_err();
    assert!(matches!(err, Error::NoValidPeerChain { candidates: 1 }));
    assert_eq!(chain.height(), 0);
    assert_eq!(chain.stage(), Stage::Uninitialized);
}

#[tokio::test]
async fn join_refused_after_genesis() {
    let chain = mined_chain(1, 0);
    let sync = SyncProtocol::new(MemoryTransport::default(), PeerSet::new());
    let err = sync.join(&chain, 5).await.unwrap_err();
    assert_eq!(err.kind(), wincoin_core::ErrorKind::Chain);
    assert_eq!(chain.stage(), Stage::Genesis);
}

#[tokio::test]
async fn broadcast_reports_delivery() {
    let chain = mined_chain(1, 2);
    let transport = MemoryTransport::default();
    transport.serve(peer(1), ChainDocument::from_blocks(&[]));
    let sync = SyncProtocol::new(transport.clone(), PeerSet::from_peers([peer(1), peer(2)]));
    let report = sync.broadcast(&chain).await;
    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(*transport.pushed.lock().unwrap(), vec![(peer(1), 3)]);
}

#[test]
fn update_extends_by_one_block() {
    let local = mined_chain(1, 2);
    let remote = Chain::new();
    remote.replace(local.blocks()).unwrap();
    helpers::fast_miner()
        .mine_next(&remote, vec!["next".into()])
        .unwrap();

    let outcome = apply_update(&local, remote.serialize()).unwrap();
    assert_eq!(outcome, UpdateOutcome::Extended);
    assert_eq!(local.blocks(), remote.blocks());
}

#[test]
fn update_replaces_when_diverged_and_longer() {
    let local = mined_chain(1, 1);
    let remote = mined_chain(2, 3);
    let outcome = apply_update(&local, remote.serialize()).unwrap();
    assert_eq!(outcome, UpdateOutcome::Replaced);
    assert_eq!(local.blocks(), remote.blocks());
}

#[test]
fn update_ignores_stale_push() {
    let local = mined_chain(1, 3);
    let before = local.blocks();
    let remote = mined_chain(1, 1);
    assert_eq!(
        apply_update(&local, remote.serialize()).unwrap(),
        UpdateOutcome::Stale
    );
    assert_eq!(
        apply_update(&local, local.serialize()).unwrap(),
        UpdateOutcome::Stale
    );
    assert_eq!(local.blocks(), before);
}

#[test]
fn update_rejects_invalid_push_without_damage() {
    let local = mined_chain(1, 1);
    let before = local.blocks();
    let remote = mined_chain(1, 4);
    let forged = ChainDocument::from_blocks(&tamper(&remote.blocks(), 2));
    let err = apply_update(&local, forged).unwrap_err();
    assert_eq!(err.kind(), wincoin_core::ErrorKind::Chain);
    assert_eq!(local.blocks(), before);
}

#[test]
fn update_populates_empty_node() {
    let local = Chain::new();
    let remote = mined_chain(1, 2);
    let outcome = apply_update(&local, remote.serialize()).unwrap();
    assert_eq!(outcome, UpdateOutcome::Replaced);
    assert_eq!(local.stage(), Stage::Joined);
}

/// Delivers a peer push to `chain` while the join is fetching.
struct PushDuringFetch {
    inner: MemoryTransport,
    chain: Chain,
    pushed: ChainDocument,
}

impl PeerTransport for PushDuringFetch {
    async fn announce(&self, peer: &Peer, own_port: u16) -> Result<(), Error> {
        self.inner.announce(peer, own_port).await
    }

    async fn fetch_chain(&self, peer: &Peer) -> Result<ChainDocument, Error> {
        apply_update(&self.chain, self.pushed.clone())?;
        self.inner.fetch_chain(peer).await
    }

    async fn push_chain(&self, peer: &Peer, chain: &ChainDocument) -> Result<(), Error> {
        self.inner.push_chain(peer, chain).await
    }
}

#[tokio::test]
async fn join_keeps_longer_chain_pushed_meanwhile() {
    let local = Chain::new();
    let offered = mined_chain(1, 1);
    let pushed = mined_chain(2, 3);

    let inner = MemoryTransport::default();
    inner.serve(peer(1), offered.serialize());
    let transport = PushDuringFetch {
        inner,
        chain: local.clone(),
        pushed: pushed.serialize(),
    };
    let sync = SyncProtocol::new(transport, PeerSet::from_peers([peer(1)]));

    let outcome = sync.join(&local, 9000).await.unwrap();
    assert_eq!(outcome.source, None);
    assert_eq!(outcome.height, 4);
    assert_eq!(local.blocks(), pushed.blocks());
    assert_eq!(local.stage(), Stage::Joined);
}

#[test]
fn push_during_genesis_is_kept() {
    let local = Chain::new();
    let miner = Arc::new(helpers::fast_miner());
    let handle = {
        let (local, miner) = (local.clone(), miner.clone());
        thread::spawn(move || local.genesis(12, &miner))
    };
    while local.stage() != Stage::Initializing {
        thread::sleep(Duration::from_millis(1));
    }

    let remote = mined_chain(1, 1);
    assert_eq!(
        apply_update(&local, remote.serialize()).unwrap(),
        UpdateOutcome::Replaced
    );
    while !handle.is_finished() {
        miner.preempt();
        thread::sleep(Duration::from_millis(10));
    }

    let outcome = handle.join().unwrap().unwrap();
    assert_eq!(outcome, GenesisOutcome::Adopted { height: 2 });
    assert_eq!(local.stage(), Stage::Joined);
    assert_eq!(local.blocks(), remote.blocks());
}

#[test]
fn push_restarts_search_on_new_tip() {
    let local = hard_chain();
    let miner = Arc::new(helpers::fast_miner());
    let handle = {
        let (local, miner) = (local.clone(), miner.clone());
        thread::spawn(move || miner.mine_next(&local, vec!["pay".into()]))
    };
    thread::sleep(Duration::from_millis(50));

    let remote = mined_chain(1, 1);
    assert_eq!(
        apply_update(&local, remote.serialize()).unwrap(),
        UpdateOutcome::Replaced
    );
    while !handle.is_finished() {
        miner.preempt();
        thread::sleep(Duration::from_millis(10));
    }

    let block = handle.join().unwrap().unwrap();
    assert_eq!(block.index(), 2);
    assert_eq!(block.difficulty(), 1);
    assert_eq!(block.previous_hash(), &remote.latest_hash());
    assert_eq!(local.height(), 3);
    assert_eq!(local.blocks()[..2], remote.blocks()[..]);
}
