pub const DEFAULT_IPFS_GATEWAY: &str = "https://ipfs.io/";

pub const DEFAULT_REMOTE_COMPILER_URL: &str = "http://localhost:8050/compile";

/// Remote compilation responses are streamed and capped at this size by the service.
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 6 * 1024 * 1024;

/// Declared source paths which may be retrieved from IPFS when missing.
pub const FETCHABLE_SOURCE_PREFIX: &str = "@openzeppelin/";

pub const IPFS_URL_PREFIX: &str = "dweb:/ipfs/";

pub const FULL_MATCH_DIR: &str = "full_match";
pub const PARTIAL_MATCH_DIR: &str = "partial_match";
