pub(crate) const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
pub(crate) const DEFAULT_ADVERTISE_HOST: &str = "127.0.0.1";
pub(crate) const DEFAULT_HTTP_TIMEOUT_MS: u64 = 5_000;
pub(crate) const DEFAULT_MINING_DEADLINE_SECS: u64 = 120;

pub const ROUTE_CURRENT: &str = "/current";
pub const ROUTE_PEER_PUSH: &str = "/peerpush";
pub const ROUTE_UPDATE_LEDGER: &str = "/updateLedger";
pub const ROUTE_MINE: &str = "/mine";
pub const ROUTE_PEERS: &str = "/peers";
pub const ROUTE_HEAD: &str = "/chain/head";
pub const ROUTE_HEALTH: &str = "/health";
