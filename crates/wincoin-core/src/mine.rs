use crate::{
    constants::{DEFAULT_MAX_RETRIES, DEFAULT_NONCE_START, NONCE_BATCH},
    error::{ExhaustReason, MiningExhausted},
    pow::count_leading_zero_nibbles,
    Block, Chain, Error, Hash, MiningJob,
};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

/// Winning nonce and the header hash it produces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Solution {
    pub hash: Hash,
    pub nonce: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

/// Inclusive nonce range and the direction it is walked in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchSpace {
    pub low: u64,
    pub high: u64,
    pub order: Order,
}

impl SearchSpace {
    /// `start`, `start - 1`, ..., `0`.
    pub fn descending_from(start: u64) -> Self {
        Self {
            low: 0,
            high: start,
            order: Order::Descending,
        }
    }

    /// `low`, `low + 1`, ..., `high`.
    pub fn ascending(low: u64, high: u64) -> Self {
        Self {
            low,
            high,
            order: Order::Ascending,
        }
    }

    pub fn len(&self) -> u128 {
        if self.high < self.low {
            0
        } else {
            (self.high - self.low) as u128 + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self::descending_from(DEFAULT_NONCE_START)
    }
}

/// Shared stop signal for an in-flight search.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Searches `space` for a nonce whose header hash has `job.difficulty()`
/// leading zero digits.
///
/// The space is walked in batches of [`NONCE_BATCH`]; each batch is hashed
/// in parallel but resolved with `find_map_first`, so the winner is always
/// the first one in search order. Deadline and cancellation are checked
/// before every batch.
pub fn find_nonce(
    job: &MiningJob,
    space: SearchSpace,
    deadline: Option<Duration>,
    cancel: &CancelFlag,
) -> Result<Solution, MiningExhausted> {
    let started = Instant::now();
    let stop_at = deadline.map(|d| started + d);
    let target = job.difficulty();
    let base = Sha256::new_with_prefix(job.header_prefix());

    let mut remaining = space.len();
    let mut cursor = match space.order {
        Order::Ascending => space.low,
        Order::Descending => space.high,
    };
    let mut attempts = 0u64;

    while remaining > 0 {
        if cancel.is_cancelled() {
            return Err(MiningExhausted {
                reason: ExhaustReason::Cancelled,
                attempts,
            });
        }
        if stop_at.is_some_and(|t| Instant::now() >= t) {
            return Err(MiningExhausted {
                reason: ExhaustReason::DeadlineElapsed,
                attempts,
            });
        }

        let len = remaining.min(NONCE_BATCH as u128) as usize;
        let first = cursor;
        let order = space.order;
        let found = (0..len)
            .into_par_iter()
            .map(|offset| match order {
                Order::Ascending => first + offset as u64,
                Order::Descending => first - offset as u64,
            })
            .find_map_first(|nonce| {
                let mut hasher = base.clone();
                hasher.update(nonce.to_string());
                let raw = hasher.finalize();
                (count_leading_zero_nibbles(&raw) >= target).then(|| Solution {
                    hash: Hash::new(hex::encode(raw)),
                    nonce,
                })
            });

        if let Some(solution) = found {
            let tried = match order {
                Order::Ascending => solution.nonce - first,
                Order::Descending => first - solution.nonce,
            };
            info!(
                "mined block {} with nonce {} and hash {} in {:?}",
                job.index(),
                solution.nonce,
                solution.hash,
                started.elapsed()
            );
            debug!(attempts = attempts + tried + 1, "nonce search finished");
            return Ok(solution);
        }

        attempts += len as u64;
        remaining -= len as u128;
        if remaining > 0 {
            cursor = match order {
                Order::Ascending => first + len as u64,
                Order::Descending => first - len as u64,
            };
        }
    }

    warn!(
        "nonce space exhausted for block {} after {} attempts",
        job.index(),
        attempts
    );
    Err(MiningExhausted {
        reason: ExhaustReason::SpaceExhausted,
        attempts,
    })
}

/// Search settings plus the cancel flag shared by searches in flight.
#[derive(Debug)]
pub struct Miner {
    space: SearchSpace,
    deadline: Option<Duration>,
    max_retries: u32,
    current: Mutex<CancelFlag>,
}

impl Default for Miner {
    fn default() -> Self {
        Self::new(SearchSpace::default(), None)
    }
}

impl Miner {
    pub fn new(space: SearchSpace, deadline: Option<Duration>) -> Self {
        Self {
            space,
            deadline,
            max_retries: DEFAULT_MAX_RETRIES,
            current: Mutex::new(CancelFlag::new()),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Stops every search started before this call.
    pub fn preempt(&self) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        current.cancel();
        *current = CancelFlag::new();
        debug!("in-flight mining pre-empted");
    }

    fn flag(&self) -> CancelFlag {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Runs one search for `job` with this miner's settings.
    pub fn search(&self, job: &MiningJob) -> Result<Solution, MiningExhausted> {
        find_nonce(job, self.space, self.deadline, &self.flag())
    }

    /// Solves block 0 over the genesis sentinel.
    pub fn mine_genesis(&self, difficulty: u32) -> Result<Solution, MiningExhausted> {
        self.search(&MiningJob::genesis(difficulty))
    }

    /// Mines and appends the next block.
    ///
    /// The tip is read under the chain lock, the search runs without it. If
    /// the tip moved in the meantime (`BadIndex`/`BadPreviousHash`, or the
    /// search was pre-empted) the job is rebuilt against the new tip, up to
    /// `max_retries` times. Blocking; callers on an async runtime should run
    /// it on a blocking worker.
    pub fn mine_next(&self, chain: &Chain, transactions: Vec<String>) -> Result<Block, Error> {
        let mut retries = 0u32;
        loop {
            let job = chain.next_job(transactions.clone())?;
            let err: Error = match self.search(&job) {
                Ok(solution) => {
                    let block = Block::from_job(job, solution);
                    match chain.add_block(block.clone()) {
                        Ok(()) => return Ok(block),
                        Err(e) if e.is_stale_tip() => {
                            info!("tip moved while mining block {}: {e}", block.index());
                            e.into()
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(e) if e.reason == ExhaustReason::Cancelled => {
                    info!("mining of block {} pre-empted, restarting", job.index());
                    e.into()
                }
                Err(e) => return Err(e.into()),
            };
            retries += 1;
            if retries > self.max_retries {
                warn!("giving up after {} restarts", self.max_retries);
                return Err(err);
            }
        }
    }
}
