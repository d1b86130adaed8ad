use crate::{config::Bootstrap, state::AppState};
use tracing::{info, warn};
use wincoin_core::{Error, ErrorKind, GenesisOutcome};

/// Brings the chain out of `Uninitialized` according to `mode`.
///
/// Only misuse (a chain already past `Uninitialized`) is returned. A
/// genesis search that runs out, or a failed join, is logged and the node
/// keeps serving its empty chain until a peer pushes one.
pub async fn run(state: &AppState, mode: Bootstrap, difficulty: u32) -> Result<(), Error> {
    match mode {
        Bootstrap::Genesis => {
            let chain = state.chain.clone();
            let miner = state.miner.clone();
            let mined = tokio::task::spawn_blocking(move || chain.genesis(difficulty, &miner))
                .await
                .unwrap_or_else(|e| std::panic::resume_unwind(e.into_panic()));
            match mined {
                Ok(GenesisOutcome::Mined(_)) => {
                    if !state.peers().is_empty() {
                        state.sync.broadcast(&state.chain).await;
                    }
                }
                Ok(GenesisOutcome::Adopted { height }) => {
                    info!("genesis abandoned, serving peer chain of height {height}");
                }
                Err(e) if e.kind() == ErrorKind::MiningExhausted => {
                    warn!("genesis not mined, waiting for a peer push: {e}");
                }
                Err(e) => return Err(e),
            }
        }
        Bootstrap::Join => match state.sync.join(&state.chain, state.advertise.port).await {
            Ok(joined) => {
                state.miner.preempt();
                let source = joined
                    .source
                    .map_or_else(|| "a peer push".to_owned(), |peer| peer.to_string());
                info!(
                    "joined from {source} at height {} ({} of {} candidates rejected)",
                    joined.height, joined.rejected, joined.candidates
                );
            }
            Err(e) => warn!("join failed, waiting for a peer push: {e}"),
        },
        Bootstrap::Idle => info!("idle start, waiting for a peer push"),
    }
    Ok(())
}
