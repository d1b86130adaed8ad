//! JSON documents exchanged between peers.
//!
//! Chains are emitted as `{length, blocks: [...]}`. Older nodes sent
//! `{length, data: {...}}` with blocks keyed by index and the block fields
//! `counter`, `minedtime` and `data`; both shapes are still accepted.

use crate::{error::WireError, Block, Hash};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDocument {
    pub difficulty: u32,
    #[serde(alias = "counter")]
    pub index: u64,
    #[serde(alias = "minedtime")]
    pub timestamp: String,
    pub previous_hash: Hash,
    pub hash: Hash,
    #[serde(with = "nonce_text")]
    pub nonce: u64,
    #[serde(alias = "data", default)]
    pub transactions: Vec<String>,
}

impl From<&Block> for BlockDocument {
    fn from(block: &Block) -> Self {
        Self {
            difficulty: block.difficulty(),
            index: block.index(),
            timestamp: block.timestamp().to_owned(),
            previous_hash: block.previous_hash().clone(),
            hash: block.hash().clone(),
            nonce: block.nonce(),
            transactions: block.transactions().to_vec(),
        }
    }
}

impl From<Block> for BlockDocument {
    fn from(block: Block) -> Self {
        Self::from(&block)
    }
}

impl From<BlockDocument> for Block {
    fn from(doc: BlockDocument) -> Self {
        Block::new(
            doc.index,
            doc.previous_hash,
            doc.difficulty,
            doc.transactions,
            doc.nonce,
            doc.hash,
            doc.timestamp,
        )
    }
}

/// Nonces are written as decimal strings and read from either form.
mod nonce_text {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(nonce: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(nonce)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(u64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Text(text) => text.trim().parse().map_err(D::Error::custom),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawChainDocument")]
pub struct ChainDocument {
    pub length: u64,
    pub blocks: Vec<BlockDocument>,
}

#[derive(Deserialize)]
struct RawChainDocument {
    length: u64,
    #[serde(default)]
    blocks: Option<Vec<BlockDocument>>,
    #[serde(default)]
    data: Option<BlockEntries>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BlockEntries {
    List(Vec<BlockDocument>),
    Keyed(BTreeMap<String, BlockDocument>),
}

impl TryFrom<RawChainDocument> for ChainDocument {
    type Error = WireError;

    fn try_from(raw: RawChainDocument) -> Result<Self, Self::Error> {
        let blocks = match (raw.blocks, raw.data) {
            (Some(blocks), _) => blocks,
            (None, Some(BlockEntries::List(blocks))) => blocks,
            (None, Some(BlockEntries::Keyed(entries))) => {
                let mut keyed = BTreeMap::new();
                for (key, block) in entries {
                    let index: u64 = key
                        .trim()
                        .parse()
                        .map_err(|_| WireError::BadIndexKey(key.clone()))?;
                    if keyed.insert(index, block).is_some() {
                        return Err(WireError::DuplicateIndex { index });
                    }
                }
                keyed.into_values().collect()
            }
            (None, None) => Vec::new(),
        };
        if blocks.len() as u64 != raw.length {
            return Err(WireError::LengthMismatch {
                declared: raw.length,
                actual: blocks.len(),
            });
        }
        Ok(Self {
            length: raw.length,
            blocks,
        })
    }
}

impl ChainDocument {
    pub fn from_blocks(blocks: &[Block]) -> Self {
        Self {
            length: blocks.len() as u64,
            blocks: blocks.iter().map(BlockDocument::from).collect(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks.into_iter().map(Block::from).collect()
    }
}
