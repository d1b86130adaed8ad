pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
pub const GENESIS_SENTINEL_LEN: usize = 44;
pub const GENESIS_PAYLOAD: &str = "Genesis";
pub const DEFAULT_DIFFICULTY: u32 = 2;
/// First nonce tried by the default descending search.
pub const DEFAULT_NONCE_START: u64 = 384_993_400;
/// Nonces hashed per parallel batch; cancellation is observed between batches.
pub const NONCE_BATCH: usize = 1 << 14;
pub const DEFAULT_MAX_RETRIES: u32 = 8;
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d | %H:%M:%S";
