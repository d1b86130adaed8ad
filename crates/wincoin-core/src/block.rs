use crate::{
    constants::{GENESIS_PAYLOAD, TIMESTAMP_FORMAT},
    digest, transactions_root,
    wire::BlockDocument,
    Hash, Solution,
};
use serde::{Deserialize, Serialize};

/// Text that gets hashed for a header: decimal index, previous hash,
/// merkle root, decimal nonce, with no separators.
pub fn header_preimage(index: u64, previous_hash: &Hash, merkle_root: &Hash, nonce: u64) -> String {
    format!("{index}{previous_hash}{merkle_root}{nonce}")
}

pub fn header_hash(index: u64, previous_hash: &Hash, merkle_root: &Hash, nonce: u64) -> Hash {
    digest(header_preimage(index, previous_hash, merkle_root, nonce))
}

pub fn now_timestamp() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// A header waiting for a nonce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MiningJob {
    index: u64,
    previous_hash: Hash,
    difficulty: u32,
    transactions: Vec<String>,
    merkle_root: Hash,
}

impl MiningJob {
    pub fn new(
        index: u64,
        previous_hash: Hash,
        difficulty: u32,
        transactions: Vec<String>,
    ) -> Self {
        let merkle_root = transactions_root(&transactions);
        Self {
            index,
            previous_hash,
            difficulty,
            transactions,
            merkle_root,
        }
    }

    /// Block 0 over the sentinel with the fixed genesis payload.
    pub fn genesis(difficulty: u32) -> Self {
        Self::new(
            0,
            Hash::genesis_sentinel(),
            difficulty,
            vec![GENESIS_PAYLOAD.to_owned()],
        )
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn previous_hash(&self) -> &Hash {
        &self.previous_hash
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn transactions(&self) -> &[String] {
        &self.transactions
    }

    pub fn merkle_root(&self) -> &Hash {
        &self.merkle_root
    }

    /// Everything hashed before the nonce.
    pub fn header_prefix(&self) -> String {
        format!("{}{}{}", self.index, self.previous_hash, self.merkle_root)
    }

    pub fn header_hash(&self, nonce: u64) -> Hash {
        header_hash(self.index, &self.previous_hash, &self.merkle_root, nonce)
    }
}

/// One chain entry. Fields are fixed at construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "BlockDocument", from = "BlockDocument")]
pub struct Block {
    index: u64,
    timestamp: String,
    previous_hash: Hash,
    merkle_root: Hash,
    transactions: Vec<String>,
    difficulty: u32,
    nonce: u64,
    hash: Hash,
}

impl Block {
    /// Genesis block from a solved [`MiningJob::genesis`].
    pub fn genesis(difficulty: u32, sentinel_previous_hash: Hash, solution: Solution) -> Self {
        Self::new(
            0,
            sentinel_previous_hash,
            difficulty,
            vec![GENESIS_PAYLOAD.to_owned()],
            solution.nonce,
            solution.hash,
            now_timestamp(),
        )
    }

    /// The merkle root is always derived from `transactions`.
    pub fn new(
        index: u64,
        previous_hash: Hash,
        difficulty: u32,
        transactions: Vec<String>,
        nonce: u64,
        hash: Hash,
        timestamp: String,
    ) -> Self {
        let merkle_root = transactions_root(&transactions);
        Self {
            index,
            timestamp,
            previous_hash,
            merkle_root,
            transactions,
            difficulty,
            nonce,
            hash,
        }
    }

    pub fn from_job(job: MiningJob, solution: Solution) -> Self {
        Self {
            index: job.index,
            timestamp: now_timestamp(),
            previous_hash: job.previous_hash,
            merkle_root: job.merkle_root,
            transactions: job.transactions,
            difficulty: job.difficulty,
            nonce: solution.nonce,
            hash: solution.hash,
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn previous_hash(&self) -> &Hash {
        &self.previous_hash
    }

    pub fn merkle_root(&self) -> &Hash {
        &self.merkle_root
    }

    pub fn transactions(&self) -> &[String] {
        &self.transactions
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    /// Header hash computed from this block's own fields.
    pub fn recompute_hash(&self) -> Hash {
        header_hash(self.index, &self.previous_hash, &self.merkle_root, self.nonce)
    }

    pub fn meets_difficulty(&self) -> bool {
        self.hash.meets_difficulty(self.difficulty)
    }

    pub fn to_document(&self) -> BlockDocument {
        BlockDocument::from(self)
    }
}
