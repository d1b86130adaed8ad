use crate::{
    constants::{
        DEFAULT_ADVERTISE_HOST, DEFAULT_HTTP_TIMEOUT_MS, DEFAULT_LISTEN,
        DEFAULT_MINING_DEADLINE_SECS,
    },
    peers_file,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use wincoin_core::{
    constants::{DEFAULT_DIFFICULTY, DEFAULT_NONCE_START},
    Peer, SearchSpace,
};

/// How the node obtains its first chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Bootstrap {
    /// Mine a new genesis block.
    Genesis,
    /// Adopt the longest valid chain offered by known peers.
    Join,
    /// Start empty and wait for a peer to push a chain.
    Idle,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "wincoin-node")]
#[command(about = "Proof-of-work ledger node")]
pub struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, default_value = DEFAULT_LISTEN)]
    pub listen: String,

    /// Host peers should use to reach this node
    #[arg(long, default_value = DEFAULT_ADVERTISE_HOST)]
    pub advertise_host: String,

    /// Port announced to peers (defaults to the listen port)
    #[arg(long)]
    pub advertise_port: Option<u16>,

    /// Start a new chain, join peers, or wait idle
    #[arg(long, value_enum, default_value_t = Bootstrap::Genesis)]
    pub mode: Bootstrap,

    /// Known peer as host:port (repeatable)
    #[arg(long = "peer")]
    pub peers: Vec<Peer>,

    /// Shared peer list; read on start, then this node appends itself
    #[arg(long)]
    pub peers_file: Option<PathBuf>,

    /// Leading zero hex digits required of the genesis block
    #[arg(long, default_value_t = DEFAULT_DIFFICULTY)]
    pub difficulty: u32,

    /// Reject blocks declaring fewer leading zeros than this
    #[arg(long, default_value_t = 0)]
    pub min_difficulty: u32,

    /// Timeout for each peer request, in milliseconds
    #[arg(long, default_value_t = DEFAULT_HTTP_TIMEOUT_MS)]
    pub http_timeout_ms: u64,

    /// Abandon a nonce search after this many seconds (0 disables)
    #[arg(long, default_value_t = DEFAULT_MINING_DEADLINE_SECS)]
    pub mining_deadline_secs: u64,

    /// First nonce of the descending search
    #[arg(long, default_value_t = DEFAULT_NONCE_START)]
    pub nonce_start: u64,
}

#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub listen: SocketAddr,
    pub advertise: Peer,
    pub mode: Bootstrap,
    pub peers: Vec<Peer>,
    pub peers_file: Option<PathBuf>,
    pub difficulty: u32,
    pub min_difficulty: u32,
    pub http_timeout: Duration,
    pub mining_deadline: Option<Duration>,
    pub search: SearchSpace,
}

impl TryFrom<Args> for NodeConfig {
    type Error = anyhow::Error;

    fn try_from(args: Args) -> Result<Self> {
        let listen: SocketAddr = args
            .listen
            .parse()
            .with_context(|| format!("invalid listen address {:?}", args.listen))?;
        let advertise = Peer::new(
            args.advertise_host,
            args.advertise_port.unwrap_or(listen.port()),
        );
        Ok(Self {
            listen,
            advertise,
            mode: args.mode,
            peers: args.peers,
            peers_file: args.peers_file,
            difficulty: args.difficulty,
            min_difficulty: args.min_difficulty,
            http_timeout: Duration::from_millis(args.http_timeout_ms),
            mining_deadline: (args.mining_deadline_secs > 0)
                .then(|| Duration::from_secs(args.mining_deadline_secs)),
            search: SearchSpace::descending_from(args.nonce_start),
        })
    }
}

impl NodeConfig {
    /// Command line peers plus the peers file, without this node itself.
    /// Registers this node in the peers file as a side effect.
    pub async fn resolve_peers(&self) -> Result<Vec<Peer>> {
        let mut peers = self.peers.clone();
        if let Some(path) = &self.peers_file {
            peers.extend(peers_file::load(path).await?);
            peers_file::register(path, &self.advertise).await?;
        }
        peers.retain(|p| p != &self.advertise);
        Ok(peers)
    }
}
