use crate::constants::{ROUTE_CURRENT, ROUTE_PEER_PUSH, ROUTE_UPDATE_LEDGER};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use wincoin_core::{ChainDocument, Error, Peer, PeerTransport};

/// Body of a `/peerpush` registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerPush {
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// [`PeerTransport`] over the node HTTP endpoints.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    advertise_host: Option<String>,
}

impl HttpTransport {
    pub fn new(timeout: Duration, advertise_host: Option<String>) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            advertise_host,
        })
    }

    fn url(peer: &Peer, route: &str) -> String {
        format!("http://{peer}{route}")
    }
}

fn unreachable(peer: &Peer, e: impl std::fmt::Display) -> Error {
    Error::PeerUnreachable {
        peer: peer.clone(),
        reason: e.to_string(),
    }
}

impl PeerTransport for HttpTransport {
    async fn announce(&self, peer: &Peer, own_port: u16) -> Result<(), Error> {
        let body = PeerPush {
            port: own_port,
            host: self.advertise_host.clone(),
        };
        self.client
            .post(Self::url(peer, ROUTE_PEER_PUSH))
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| unreachable(peer, e))?;
        debug!("announced port {own_port} to {peer}");
        Ok(())
    }

    async fn fetch_chain(&self, peer: &Peer) -> Result<ChainDocument, Error> {
        let text = self
            .client
            .get(Self::url(peer, ROUTE_CURRENT))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| unreachable(peer, e))?
            .text()
            .await
            .map_err(|e| unreachable(peer, e))?;
        Ok(ChainDocument::from_json(&text)?)
    }

    async fn push_chain(&self, peer: &Peer, chain: &ChainDocument) -> Result<(), Error> {
        let body = chain.to_json()?;
        let response = self
            .client
            .post(Self::url(peer, ROUTE_UPDATE_LEDGER))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| unreachable(peer, e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let reason = response.text().await.unwrap_or_default();
        Err(unreachable(peer, format!("{status}: {reason}")))
    }
}
