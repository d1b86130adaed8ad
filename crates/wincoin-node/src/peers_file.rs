//! Plain-text peer registry shared by nodes on one machine.
//!
//! One peer per line as `host:port` or a bare port. Blank lines and lines
//! starting with `#` are skipped.

use anyhow::{Context, Result};
use std::{io::ErrorKind, path::Path};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, warn};
use wincoin_core::Peer;

pub fn parse(text: &str) -> Vec<Peer> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match line.parse::<Peer>() {
            Ok(peer) => Some(peer),
            Err(e) => {
                warn!("ignoring peers file entry: {e}");
                None
            }
        })
        .collect()
}

/// Reads the registry. A missing file is an empty registry.
pub async fn load(path: &Path) -> Result<Vec<Peer>> {
    match fs::read_to_string(path).await {
        Ok(text) => {
            let peers = parse(&text);
            debug!("{} peers listed in {}", peers.len(), path.display());
            Ok(peers)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

/// Appends `me` unless it is already listed.
pub async fn register(path: &Path, me: &Peer) -> Result<()> {
    if load(path).await?.contains(me) {
        return Ok(());
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    file.write_all(format!("{me}\n").as_bytes()).await?;
    file.flush().await?;
    Ok(())
}
