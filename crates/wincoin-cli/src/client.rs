use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use wincoin_core::{
    sync::BroadcastReport, BlockDocument, ChainDocument, Error, ErrorKind, Peer,
};

/// A failure the node reported in its reply body.
#[derive(Debug)]
pub struct RemoteFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node refused ({:?}): {}", self.kind, self.message)
    }
}

impl std::error::Error for RemoteFailure {}

#[derive(Serialize)]
struct MineRequest<'a> {
    transactions: &'a [String],
}

#[derive(Deserialize)]
pub struct MineReply {
    pub mined: bool,
    pub block: Option<BlockDocument>,
    pub broadcast: Option<BroadcastReport>,
    pub error: Option<String>,
    pub kind: Option<ErrorKind>,
}

pub struct NodeClient {
    base: String,
    peer: Peer,
    http: reqwest::Client,
}

impl NodeClient {
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let url = reqwest::Url::parse(base).with_context(|| format!("invalid node url {base:?}"))?;
        let host = url
            .host_str()
            .ok_or_else(|| anyhow!("node url {base:?} has no host"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| anyhow!("node url {base:?} has no port"))?;
        Ok(Self {
            base: base.trim_end_matches('/').to_owned(),
            peer: Peer::new(host, port),
            http: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    fn unreachable(&self, e: reqwest::Error) -> Error {
        Error::PeerUnreachable {
            peer: self.peer.clone(),
            reason: e.to_string(),
        }
    }

    async fn get_text(&self, route: &str) -> Result<String> {
        let res = self
            .http
            .get(format!("{}{route}", self.base))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.unreachable(e))?;
        Ok(res.text().await.map_err(|e| self.unreachable(e))?)
    }

    pub async fn chain(&self) -> Result<ChainDocument> {
        let text = self.get_text("/current").await?;
        Ok(ChainDocument::from_json(&text).map_err(Error::from)?)
    }

    pub async fn peers(&self) -> Result<Vec<Peer>> {
        let text = self.get_text("/peers").await?;
        serde_json::from_str(&text).context("decoding peer list")
    }

    /// Asks the node to mine one block. Node-side failures come back as
    /// [`RemoteFailure`].
    pub async fn mine(&self, transactions: &[String]) -> Result<MineReply> {
        let res = self
            .http
            .post(format!("{}/mine", self.base))
            .json(&MineRequest { transactions })
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        let reply: MineReply = res.json().await.map_err(|e| self.unreachable(e))?;
        if !reply.mined {
            return Err(RemoteFailure {
                kind: reply.kind.unwrap_or(ErrorKind::Chain),
                message: reply.error.unwrap_or_default(),
            }
            .into());
        }
        Ok(reply)
    }
}

/// Exit status for a failed command.
pub fn exit_code(e: &anyhow::Error) -> i32 {
    if let Some(e) = e.downcast_ref::<Error>() {
        return e.exit_code();
    }
    if let Some(e) = e.downcast_ref::<RemoteFailure>() {
        return e.kind.exit_code();
    }
    1
}
