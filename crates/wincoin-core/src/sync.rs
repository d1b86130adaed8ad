//! Peer bookkeeping and chain reconciliation.
//!
//! Fork choice is by block count only: the longest chain that validates
//! wins, ties go to the peer seen first. Accumulated work is not compared.

use crate::{wire::ChainDocument, Block, Chain, ChainError, Error, Stage};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    future::Future,
    str::FromStr,
    sync::{Arc, Mutex, PoisonError},
};
use tracing::{debug, info, warn};

/// A peer endpoint. Identity is the literal `(host, port)` pair.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Peer {
    pub host: String,
    pub port: u16,
}

impl Peer {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Peer {
    type Err = String;

    /// Parses `host:port`; a bare port means `localhost`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => (host, port),
            None => ("localhost", s),
        };
        if host.is_empty() {
            return Err(format!("missing host in {s:?}"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| format!("bad port in {s:?}: {e}"))?;
        Ok(Self::new(host, port))
    }
}

/// Known peers in first-seen order.
#[derive(Clone, Debug, Default)]
pub struct PeerSet {
    inner: Arc<Mutex<Vec<Peer>>>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_peers(peers: impl IntoIterator<Item = Peer>) -> Self {
        let set = Self::new();
        for peer in peers {
            set.add(peer);
        }
        set
    }

    /// Returns false if the endpoint was already known.
    pub fn add(&self, peer: Peer) -> bool {
        let mut peers = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if peers.contains(&peer) {
            return false;
        }
        peers.push(peer);
        true
    }

    pub fn contains(&self, peer: &Peer) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(peer)
    }

    pub fn snapshot(&self) -> Vec<Peer> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Calls a node makes on its peers. Implementations own timeouts.
pub trait PeerTransport: Send + Sync {
    /// Registers `own_port` with `peer`.
    fn announce(
        &self,
        peer: &Peer,
        own_port: u16,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Fetches `peer`'s full chain.
    fn fetch_chain(&self, peer: &Peer) -> impl Future<Output = Result<ChainDocument, Error>> + Send;

    /// Pushes a chain to `peer`'s ledger update endpoint.
    fn push_chain(
        &self,
        peer: &Peer,
        chain: &ChainDocument,
    ) -> impl Future<Output = Result<(), Error>> + Send;
}

/// One peer's chain as fetched during a join.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub peer: Peer,
    pub blocks: Vec<Block>,
}

/// Orders candidates longest first; the sort is stable so ties keep
/// first-seen order.
pub fn rank_candidates(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.blocks.len().cmp(&a.blocks.len()));
    candidates
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Peer whose chain was adopted; `None` when a longer chain was pushed
    /// to us while the join was in flight and kept instead.
    pub source: Option<Peer>,
    pub height: u64,
    pub candidates: usize,
    pub rejected: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// Not longer than the local chain; ignored.
    Stale,
    /// One block appended on top of the local tip.
    Extended,
    /// Local chain swapped for the pushed one.
    Replaced,
}

impl UpdateOutcome {
    pub fn changed_tip(self) -> bool {
        !matches!(self, UpdateOutcome::Stale)
    }
}

/// Merges a pushed chain into `chain`.
///
/// A push that is exactly one block ahead of our tip goes through
/// `add_block`; anything else longer goes through a full validated
/// replacement. Invalid pushes leave `chain` untouched.
pub fn apply_update(chain: &Chain, pushed: ChainDocument) -> Result<UpdateOutcome, Error> {
    let mut blocks = pushed.into_blocks();
    let (height, tip) = chain.tip();
    let incoming = blocks.len() as u64;
    if incoming <= height {
        debug!("ignoring stale push of height {incoming} (local {height})");
        return Ok(UpdateOutcome::Stale);
    }

    let extends_tip = incoming == height + 1
        && blocks.last().is_some_and(|b| b.previous_hash() == &tip);
    let outcome = if extends_tip {
        let block = blocks.pop().ok_or(ChainError::EmptyChain)?;
        match chain.add_block(block) {
            Ok(()) => UpdateOutcome::Extended,
            Err(e) if e.is_stale_tip() => {
                debug!("tip moved under a peer push: {e}");
                UpdateOutcome::Stale
            }
            Err(e) => return Err(e.into()),
        }
    } else if chain.replace_if_longer(blocks)? {
        UpdateOutcome::Replaced
    } else {
        UpdateOutcome::Stale
    };

    if outcome.changed_tip() {
        info!("ledger {outcome:?} to height {incoming} by peer push");
        if chain.stage() == Stage::Uninitialized {
            chain.set_stage(Stage::Joined);
        }
    }
    Ok(outcome)
}

/// Join and broadcast flows over a [`PeerTransport`].
pub struct SyncProtocol<T> {
    transport: T,
    peers: PeerSet,
}

impl<T: PeerTransport> SyncProtocol<T> {
    pub fn new(transport: T, peers: PeerSet) -> Self {
        Self { transport, peers }
    }

    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    /// Announces `own_port` to every known peer. Returns the peers that
    /// answered; the rest are logged and skipped for this round.
    pub async fn announce(&self, own_port: u16) -> Vec<Peer> {
        let mut reachable = Vec::new();
        for peer in self.peers.snapshot() {
            match self.transport.announce(&peer, own_port).await {
                Ok(()) => reachable.push(peer),
                Err(e) => warn!("skipping {peer}: {e}"),
            }
        }
        reachable
    }

    /// Fetches and decodes the chains of `peers`, in order.
    pub async fn fetch_candidates(&self, peers: &[Peer]) -> Vec<Candidate> {
        let mut candidates = Vec::with_capacity(peers.len());
        for peer in peers {
            match self.transport.fetch_chain(peer).await {
                Ok(doc) => {
                    debug!("{peer} offered a chain of length {}", doc.length);
                    candidates.push(Candidate {
                        peer: peer.clone(),
                        blocks: doc.into_blocks(),
                    });
                }
                Err(e) => warn!("could not fetch chain from {peer}: {e}"),
            }
        }
        candidates
    }

    /// Adopts the longest valid chain among the peers.
    ///
    /// Only valid on an uninitialized chain. Candidates are tried longest
    /// first and only swapped in while longer than the local chain, so a
    /// push accepted during the network round trips is not overwritten. If
    /// the chain is still empty once every candidate was tried it is left
    /// as it was and [`Error::NoValidPeerChain`] is returned.
    pub async fn join(&self, chain: &Chain, own_port: u16) -> Result<JoinOutcome, Error> {
        chain.transition(Stage::Uninitialized, Stage::Initializing)?;
        let reachable = self.announce(own_port).await;
        let candidates = rank_candidates(self.fetch_candidates(&reachable).await);
        let total = candidates.len();

        let mut rejected = 0;
        for candidate in candidates {
            let height = candidate.blocks.len() as u64;
            match chain.replace_if_longer(candidate.blocks) {
                Ok(true) => {
                    chain.set_stage(Stage::Joined);
                    info!("joined via {} at height {height}", candidate.peer);
                    return Ok(JoinOutcome {
                        source: Some(candidate.peer),
                        height,
                        candidates: total,
                        rejected,
                    });
                }
                Ok(false) => {
                    debug!("chain from {} is not longer than ours", candidate.peer);
                    break;
                }
                Err(e) => {
                    warn!("chain from {} rejected: {e}", candidate.peer);
                    rejected += 1;
                }
            }
        }

        let height = chain.height();
        if height > 0 {
            chain.set_stage(Stage::Joined);
            info!("kept chain of height {height} pushed during the join");
            return Ok(JoinOutcome {
                source: None,
                height,
                candidates: total,
                rejected,
            });
        }
        chain.set_stage(Stage::Uninitialized);
        Err(Error::NoValidPeerChain { candidates: total })
    }

    /// Pushes the current chain to every known peer. The chain is
    /// serialized once, before any network call.
    pub async fn broadcast(&self, chain: &Chain) -> BroadcastReport {
        let doc = chain.serialize();
        let mut report = BroadcastReport::default();
        for peer in self.peers.snapshot() {
            match self.transport.push_chain(&peer, &doc).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("broadcast to {peer} failed: {e}");
                    report.failed += 1;
                }
            }
        }
        info!(
            "broadcast height {}: {} delivered, {} failed",
            doc.length, report.delivered, report.failed
        );
        report
    }
}
