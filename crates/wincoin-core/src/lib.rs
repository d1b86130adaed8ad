use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub mod block;
pub mod chain;
pub mod constants;
pub mod error;
pub mod mine;
pub mod sync;
pub mod wire;

pub use block::{Block, MiningJob};
pub use chain::{Chain, GenesisOutcome, Stage};
pub use error::{ChainError, Error, ErrorKind, ExhaustReason, MiningExhausted, WireError};
pub use mine::{CancelFlag, Miner, SearchSpace, Solution};
pub use sync::{Peer, PeerSet, PeerTransport, SyncProtocol, UpdateOutcome};
pub use wire::{BlockDocument, ChainDocument};

use constants::{GENESIS_SENTINEL_LEN, HASH_HEX_SIZE};

/// Lowercase hex text of a digest, or the genesis sentinel.
///
/// Hashes travel as text on the wire and are hashed as text inside block
/// headers, so the string form is the canonical one.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hash(String);

impl Hash {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// 64 zero digits; the merkle root of a block without transactions.
    pub fn zero() -> Self {
        Self("0".repeat(HASH_HEX_SIZE))
    }

    /// Fixed previous-hash of every genesis block: `000...01`.
    pub fn genesis_sentinel() -> Self {
        let mut s = "0".repeat(GENESIS_SENTINEL_LEN - 1);
        s.push('1');
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn leading_zeros(&self) -> u32 {
        pow::count_leading_zero_digits(&self.0)
    }

    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        self.leading_zeros() >= difficulty
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Hash {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// SHA-256 of `bytes`, hex encoded.
pub fn digest(bytes: impl AsRef<[u8]>) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(bytes.as_ref());
    Hash(hex::encode(hasher.finalize()))
}

/// Reduces leaf hashes to a single root.
///
/// Levels are hashed pairwise as `digest(left ∥ right)` over the hex text,
/// an odd level pairs its last element with itself. A single leaf is hashed
/// once more rather than returned as is; peers rely on that to agree on
/// roots of one-transaction blocks. An empty slice yields [`Hash::zero`].
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    match leaves {
        [] => Hash::zero(),
        [only] => digest(only.as_str()),
        _ => {
            let mut level = leaves.to_vec();
            while level.len() > 1 {
                let mut next = Vec::with_capacity(level.len().div_ceil(2));
                for pair in level.chunks(2) {
                    let (a, b) = if pair.len() == 2 {
                        (&pair[0], &pair[1])
                    } else {
                        (&pair[0], &pair[0])
                    };
                    let mut hasher = Sha256::new();
                    hasher.update(a.as_str());
                    hasher.update(b.as_str());
                    next.push(Hash(hex::encode(hasher.finalize())));
                }
                level = next;
            }
            level.swap_remove(0)
        }
    }
}

/// Merkle root over the digests of the given transaction payloads.
pub fn transactions_root<S: AsRef<str>>(transactions: &[S]) -> Hash {
    let leaves: Vec<Hash> = transactions
        .iter()
        .map(|tx| digest(tx.as_ref()))
        .collect();
    merkle_root(&leaves)
}

pub mod pow {
    /// Number of leading `'0'` characters in a hex string.
    pub fn count_leading_zero_digits(hex: &str) -> u32 {
        hex.bytes().take_while(|b| *b == b'0').count() as u32
    }

    /// Number of leading zero nibbles in a raw digest, i.e. the leading
    /// zero digits its hex encoding will have.
    pub fn count_leading_zero_nibbles(bytes: &[u8]) -> u32 {
        let mut total = 0u32;
        for b in bytes {
            if *b == 0 {
                total += 2;
            } else {
                if *b < 0x10 {
                    total += 1;
                }
                break;
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_zero_nibbles_examples() {
        let mut h = [0u8; 32];
        assert_eq!(pow::count_leading_zero_nibbles(&h), 64);
        h[0] = 0x0F;
        assert_eq!(pow::count_leading_zero_nibbles(&h), 1);
        h = [0u8; 32];
        h[1] = 0x80;
        assert_eq!(pow::count_leading_zero_nibbles(&h), 2);
        h[1] = 0x04;
        assert_eq!(pow::count_leading_zero_nibbles(&h), 3);
    }

    #[test]
    fn nibble_and_digit_counts_agree() {
        for input in ["a", "b", "Genesis", "wincoin", "384992585"] {
            let mut hasher = Sha256::new();
            hasher.update(input);
            let raw = hasher.finalize();
            assert_eq!(
                pow::count_leading_zero_nibbles(&raw),
                pow::count_leading_zero_digits(&hex::encode(raw))
            );
        }
    }

    #[test]
    fn digest_is_sha256_hex() {
        assert_eq!(
            digest("abc").as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn sentinel_shape() {
        let s = Hash::genesis_sentinel();
        assert_eq!(s.as_str().len(), 44);
        assert!(s.as_str().ends_with('1'));
        assert_eq!(s.leading_zeros(), 43);
    }

    #[test]
    fn merkle_root_single_leaf_is_rehashed() {
        let leaf = digest("Genesis");
        let root = merkle_root(std::slice::from_ref(&leaf));
        assert_ne!(root, leaf);
        assert_eq!(root, digest(leaf.as_str()));
        assert_eq!(
            root.as_str(),
            "854b6903a2723b374db0b6281df6f5cdaeb96557d3503407cd5b74256599c8d7"
        );
    }

    #[test]
    fn merkle_root_two_leaves() {
        let root = transactions_root(&["a", "b"]);
        let expected = digest(format!("{}{}", digest("a"), digest("b")));
        assert_eq!(root, expected);
        assert_eq!(
            root.as_str(),
            "62af5c3cb8da3e4f25061e829ebeea5c7513c54949115b1acc225930a90154da"
        );
    }

    #[test]
    fn merkle_root_odd_level_duplicates_last() {
        let root = transactions_root(&["a", "b", "c"]);
        assert_eq!(root, transactions_root(&["a", "b", "c", "c"]));
        assert_eq!(
            root.as_str(),
            "0bdf27bf7ec894ca7cadfe491ec1a3ece840f117989e8c5e9bd7086467bf6c38"
        );
    }

    #[test]
    fn merkle_root_empty_is_zero() {
        let root = transactions_root::<&str>(&[]);
        assert_eq!(root, Hash::zero());
    }

    #[test]
    fn merkle_root_order_matters() {
        assert_ne!(transactions_root(&["a", "b"]), transactions_root(&["b", "a"]));
    }

    #[test]
    fn hash_meets_difficulty() {
        let h = Hash::from("00ab");
        assert!(h.meets_difficulty(0));
        assert!(h.meets_difficulty(2));
        assert!(!h.meets_difficulty(3));
    }
}
