#![allow(dead_code)]

use clap::Parser;
use std::net::SocketAddr;
use tokio::{net::TcpListener, task::JoinHandle};
use wincoin_core::{Chain, ChainDocument, Miner, Peer, SearchSpace};
use wincoin_node::{bootstrap, serve, AppState, Args, Bootstrap, NodeConfig};

pub const DIFFICULTY: u32 = 1;

/// A node served on an ephemeral loopback port. The server task is
/// aborted on drop.
pub struct TestNode {
    pub addr: SocketAddr,
    pub state: AppState,
    server: JoinHandle<std::io::Result<()>>,
}

impl TestNode {
    pub fn url(&self, route: &str) -> String {
        format!("http://{}{route}", self.addr)
    }

    pub fn peer(&self) -> Peer {
        Peer::new("127.0.0.1", self.addr.port())
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.server.abort();
    }
}

pub async fn start_node(mode: Bootstrap, peers: &[Peer]) -> TestNode {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let mut argv = vec![
        "wincoin-node".to_owned(),
        "--listen".to_owned(),
        addr.to_string(),
        "--http-timeout-ms".to_owned(),
        "2000".to_owned(),
        "--mining-deadline-secs".to_owned(),
        "0".to_owned(),
        "--difficulty".to_owned(),
        DIFFICULTY.to_string(),
    ];
    for peer in peers {
        argv.push("--peer".to_owned());
        argv.push(peer.to_string());
    }
    let mut config = NodeConfig::try_from(Args::parse_from(argv)).expect("config");
    config.search = SearchSpace::ascending(0, u64::MAX);

    let state = AppState::new(&config, config.resolve_peers().await.expect("peers"))
        .expect("state");
    let server = tokio::spawn(serve(listener, state.clone(), std::future::pending()));
    bootstrap::run(&state, mode, config.difficulty)
        .await
        .expect("bootstrap");
    TestNode {
        addr,
        state,
        server,
    }
}

/// A chain mined off-node: genesis plus `extra` blocks.
pub fn local_chain(extra: usize) -> Chain {
    let chain = Chain::new();
    let miner = Miner::new(SearchSpace::ascending(0, u64::MAX), None);
    chain.genesis(DIFFICULTY, &miner).expect("genesis");
    for i in 0..extra {
        miner
            .mine_next(&chain, vec![format!("offline-{i}")])
            .expect("mine");
    }
    chain
}

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

pub async fn post_chain(node: &TestNode, doc: &ChainDocument) -> reqwest::Response {
    client()
        .post(node.url("/updateLedger"))
        .header("content-type", "application/json")
        .body(doc.to_json().expect("encode"))
        .send()
        .await
        .expect("send")
}
