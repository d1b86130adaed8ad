use crate::{
    constants::{
        ROUTE_CURRENT, ROUTE_HEAD, ROUTE_HEALTH, ROUTE_MINE, ROUTE_PEERS, ROUTE_PEER_PUSH,
        ROUTE_UPDATE_LEDGER,
    },
    state::AppState,
    transport::PeerPush,
};
use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::info;
use wincoin_core::{
    sync::BroadcastReport, BlockDocument, ChainDocument, Error, ErrorKind, Hash, Peer, Stage,
    UpdateOutcome,
};

#[derive(Serialize)]
struct Health {
    status: &'static str,
    stage: Stage,
}

#[derive(Serialize, Deserialize)]
pub struct Head {
    pub height: u64,
    pub hash: Hash,
}

#[derive(Serialize, Deserialize)]
pub struct PeerAck {
    pub acknowledged: bool,
    pub peers: usize,
}

#[derive(Serialize, Deserialize)]
pub struct UpdateReply {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<UpdateOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

#[derive(Serialize, Deserialize)]
pub struct MineRequest {
    #[serde(default)]
    pub transactions: Vec<String>,
}

#[derive(Serialize, Deserialize)]
pub struct MineReply {
    pub mined: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<BlockDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast: Option<BroadcastReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Chain => StatusCode::CONFLICT,
        ErrorKind::MiningExhausted => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Wire => StatusCode::BAD_REQUEST,
        ErrorKind::PeerUnreachable | ErrorKind::NoValidPeerChain => StatusCode::BAD_GATEWAY,
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(ROUTE_HEALTH, get(health))
        .route(ROUTE_HEAD, get(head))
        .route(ROUTE_CURRENT, get(current))
        .route(ROUTE_PEERS, get(peers))
        .route(ROUTE_PEER_PUSH, post(peer_push))
        .route(ROUTE_UPDATE_LEDGER, post(update_ledger))
        .route(ROUTE_MINE, post(mine))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        stage: state.chain.stage(),
    })
}

async fn head(State(state): State<AppState>) -> Json<Head> {
    let (height, hash) = state.chain.tip();
    Json(Head { height, hash })
}

async fn current(State(state): State<AppState>) -> Json<ChainDocument> {
    Json(state.chain.serialize())
}

async fn peers(State(state): State<AppState>) -> Json<Vec<Peer>> {
    Json(state.peers().snapshot())
}

async fn peer_push(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Json(push): Json<PeerPush>,
) -> Json<PeerAck> {
    let host = push.host.unwrap_or_else(|| remote.ip().to_string());
    let peer = Peer::new(host, push.port);
    if peer != state.advertise && state.peers().add(peer.clone()) {
        info!("registered peer {peer}");
    }
    Json(PeerAck {
        acknowledged: true,
        peers: state.peers().len(),
    })
}

async fn update_ledger(
    State(state): State<AppState>,
    body: String,
) -> (StatusCode, Json<UpdateReply>) {
    let rejected = |status: StatusCode, e: Error| {
        (
            status,
            Json(UpdateReply {
                accepted: false,
                outcome: None,
                error: Some(e.to_string()),
                kind: Some(e.kind()),
            }),
        )
    };

    let pushed = match ChainDocument::from_json(&body) {
        Ok(doc) => doc,
        Err(e) => return rejected(StatusCode::BAD_REQUEST, e.into()),
    };
    match state.apply_update(pushed) {
        Ok(outcome) => (
            StatusCode::OK,
            Json(UpdateReply {
                accepted: outcome.changed_tip(),
                outcome: Some(outcome),
                error: None,
                kind: None,
            }),
        ),
        Err(e) => rejected(StatusCode::UNPROCESSABLE_ENTITY, e),
    }
}

async fn mine(
    State(state): State<AppState>,
    request: Option<Json<MineRequest>>,
) -> (StatusCode, Json<MineReply>) {
    let transactions = request
        .map(|Json(r)| r.transactions)
        .unwrap_or_default();
    match state.mine_and_broadcast(transactions).await {
        Ok((block, report)) => (
            StatusCode::OK,
            Json(MineReply {
                mined: true,
                block: Some(block.to_document()),
                broadcast: Some(report),
                error: None,
                kind: None,
            }),
        ),
        Err(e) => (
            status_for(e.kind()),
            Json(MineReply {
                mined: false,
                block: None,
                broadcast: None,
                error: Some(e.to_string()),
                kind: Some(e.kind()),
            }),
        ),
    }
}
