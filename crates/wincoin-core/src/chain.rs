use crate::{error::ChainError, wire::ChainDocument, Block, Error, Hash, Miner, MiningJob};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Node lifecycle. Not part of the chain data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Uninitialized,
    Initializing,
    Genesis,
    Joined,
}

/// How [`Chain::genesis`] ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GenesisOutcome {
    /// Block 0 was mined here.
    Mined(Block),
    /// A peer chain arrived first and was kept.
    Adopted { height: u64 },
}

#[derive(Debug, Default)]
struct ChainState {
    blocks: Vec<Block>,
    stage: Stage,
}

impl ChainState {
    fn latest_hash(&self) -> Hash {
        self.blocks
            .last()
            .map(|b| b.hash().clone())
            .unwrap_or_else(Hash::genesis_sentinel)
    }
}

/// Checks `block` as the successor of `previous_hash` at `expected_index`.
fn check_successor(
    block: &Block,
    expected_index: u64,
    previous_hash: &Hash,
    min_difficulty: u32,
) -> Result<(), ChainError> {
    if block.index() != expected_index {
        return Err(ChainError::BadIndex {
            expected: expected_index,
            found: block.index(),
        });
    }
    if block.previous_hash() != previous_hash {
        return Err(ChainError::BadPreviousHash {
            index: block.index(),
            expected: previous_hash.clone(),
            found: block.previous_hash().clone(),
        });
    }
    let recomputed = block.recompute_hash();
    if &recomputed != block.hash() {
        return Err(ChainError::HashMismatch {
            index: block.index(),
            expected: recomputed,
            found: block.hash().clone(),
        });
    }
    if !block.meets_difficulty() {
        return Err(ChainError::ProofOfWorkInvalid {
            index: block.index(),
            difficulty: block.difficulty(),
        });
    }
    if block.difficulty() < min_difficulty {
        return Err(ChainError::DifficultyTooLow {
            index: block.index(),
            difficulty: block.difficulty(),
            minimum: min_difficulty,
        });
    }
    Ok(())
}

/// Validates a whole chain from the genesis sentinel.
pub fn validate_blocks(blocks: &[Block], min_difficulty: u32) -> Result<(), ChainError> {
    if blocks.is_empty() {
        return Err(ChainError::EmptyChain);
    }
    let mut previous = Hash::genesis_sentinel();
    for (i, block) in blocks.iter().enumerate() {
        check_successor(block, i as u64, &previous, min_difficulty)?;
        previous = block.hash().clone();
    }
    Ok(())
}

/// Cloneable handle to the node's single chain.
///
/// Every read and write goes through one mutex that is held only for the
/// in-memory work; mining and network I/O happen outside of it.
#[derive(Clone, Debug, Default)]
pub struct Chain {
    state: Arc<Mutex<ChainState>>,
    min_difficulty: u32,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse blocks that declare fewer than `min_difficulty` zero digits.
    pub fn with_min_difficulty(min_difficulty: u32) -> Self {
        Self {
            min_difficulty,
            ..Self::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stage(&self) -> Stage {
        self.lock().stage
    }

    pub(crate) fn transition(&self, from: Stage, to: Stage) -> Result<(), ChainError> {
        let mut state = self.lock();
        if state.stage != from {
            return Err(ChainError::WrongStage {
                expected: from,
                actual: state.stage,
            });
        }
        state.stage = to;
        Ok(())
    }

    pub(crate) fn set_stage(&self, stage: Stage) {
        self.lock().stage = stage;
    }

    /// Mines block 0 and starts a new chain.
    ///
    /// Only valid on an uninitialized chain. The search runs without the
    /// lock and the stage reads `Initializing` meanwhile. A peer chain that
    /// lands during the search wins: it is kept, the stage becomes `Joined`
    /// and [`GenesisOutcome::Adopted`] is returned, whether or not the
    /// search was pre-empted. A failed search on a still empty chain resets
    /// the stage to `Uninitialized`.
    pub fn genesis(&self, difficulty: u32, miner: &Miner) -> Result<GenesisOutcome, Error> {
        self.transition(Stage::Uninitialized, Stage::Initializing)?;
        let mined = miner.mine_genesis(difficulty);

        let mut state = self.lock();
        if !state.blocks.is_empty() {
            let height = state.blocks.len() as u64;
            state.stage = Stage::Joined;
            warn!("chain reached height {height} from a peer while mining genesis");
            return Ok(GenesisOutcome::Adopted { height });
        }
        let solution = match mined {
            Ok(solution) => solution,
            Err(e) => {
                state.stage = Stage::Uninitialized;
                return Err(e.into());
            }
        };
        let block = Block::genesis(difficulty, Hash::genesis_sentinel(), solution);
        state.blocks.push(block.clone());
        state.stage = Stage::Genesis;
        info!("blockchain created, genesis hash {}", block.hash());
        Ok(GenesisOutcome::Mined(block))
    }

    /// Validates `candidate` against the tip and appends it.
    ///
    /// Checks run in a fixed order: index, previous hash, recomputed hash,
    /// proof of work, then the minimum difficulty. On an empty chain the tip
    /// hash is the genesis sentinel.
    pub fn add_block(&self, candidate: Block) -> Result<(), ChainError> {
        let mut state = self.lock();
        let expected_index = state.blocks.len() as u64;
        let tip = state.latest_hash();
        if let Err(e) = check_successor(&candidate, expected_index, &tip, self.min_difficulty) {
            debug!("rejected block {}: {e}", candidate.index());
            return Err(e);
        }
        debug!(
            "appended block {} with hash {}",
            candidate.index(),
            candidate.hash()
        );
        state.blocks.push(candidate);
        Ok(())
    }

    pub fn latest_hash(&self) -> Hash {
        self.lock().latest_hash()
    }

    pub fn height(&self) -> u64 {
        self.lock().blocks.len() as u64
    }

    /// Height and latest hash read together.
    pub fn tip(&self) -> (u64, Hash) {
        let state = self.lock();
        (state.blocks.len() as u64, state.latest_hash())
    }

    /// Swaps in `new_chain` after validating every block from index 0.
    /// The current chain is left untouched on the first failure.
    pub fn replace(&self, new_chain: Vec<Block>) -> Result<(), ChainError> {
        validate_blocks(&new_chain, self.min_difficulty)?;
        let mut state = self.lock();
        info!(
            "replacing chain of height {} with height {}",
            state.blocks.len(),
            new_chain.len()
        );
        state.blocks = new_chain;
        Ok(())
    }

    /// Like [`Chain::replace`], but only when `new_chain` is strictly longer
    /// at the moment of the swap. Returns whether the swap happened.
    pub fn replace_if_longer(&self, new_chain: Vec<Block>) -> Result<bool, ChainError> {
        validate_blocks(&new_chain, self.min_difficulty)?;
        let mut state = self.lock();
        if new_chain.len() <= state.blocks.len() {
            return Ok(false);
        }
        info!(
            "adopting longer chain: {} -> {}",
            state.blocks.len(),
            new_chain.len()
        );
        state.blocks = new_chain;
        Ok(true)
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.lock().blocks.clone()
    }

    pub fn serialize(&self) -> ChainDocument {
        ChainDocument::from_blocks(&self.lock().blocks)
    }

    /// Job for the block after the current tip, at the tip's difficulty.
    pub fn next_job(&self, transactions: Vec<String>) -> Result<MiningJob, ChainError> {
        let state = self.lock();
        let tip = state.blocks.last().ok_or(ChainError::EmptyChain)?;
        Ok(MiningJob::new(
            state.blocks.len() as u64,
            tip.hash().clone(),
            tip.difficulty(),
            transactions,
        ))
    }
}
