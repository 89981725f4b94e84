//! TigerStyle Constants
//!
//! Every limit and fixed parameter lives here, named with its unit and bound.

use std::time::Duration;

// =============================================================================
// Entity Limits
// =============================================================================

/// Maximum user display name length in bytes
pub const USER_NAME_BYTES_MAX: usize = 256;

/// Maximum email length in bytes
pub const USER_EMAIL_BYTES_MAX: usize = 254;

/// Maximum password length in bytes (before hashing)
pub const USER_PASSWORD_BYTES_MAX: usize = 1024;

/// Maximum product name length in bytes
pub const PRODUCT_NAME_BYTES_MAX: usize = 256;

/// Minimum initial product quantity
pub const PRODUCT_QUANTITY_MIN: i64 = 1;

// =============================================================================
// Authentication
// =============================================================================

/// Lifetime of claims issued by `authenticate`
pub const CLAIMS_TTL_SECS: i64 = 60 * 60;

// =============================================================================
// Backend Configuration
// =============================================================================

/// Default backend name when none is configured
pub const DB_TYPE_DEFAULT: &str = "sqlite";

/// Default SQLite database file
pub const DB_SQL_PATH_DEFAULT: &str = "~/.stockroom/stockroom.sqlite";

/// Default sled database directory
pub const DB_KV_PATH_DEFAULT: &str = "~/.stockroom/kv";

/// Default bound on opening a backend
pub const DB_OPEN_TIMEOUT_MS_DEFAULT: u64 = 1_000;

/// Upper bound on any configured open timeout
pub const DB_OPEN_TIMEOUT_MS_MAX: u64 = 60_000;

/// Interval between sled open attempts while another handle holds the lock
pub const KV_OPEN_RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Maximum pooled SQLite connections
pub const SQL_POOL_CONNECTIONS_MAX: u32 = 8;

// =============================================================================
// KV Layout
// =============================================================================

/// Users partition (data records and email index)
pub const KV_PARTITION_USERS: &str = "users";

/// Products partition
pub const KV_PARTITION_PRODUCTS: &str = "products";

/// Sales partition
pub const KV_PARTITION_SALES: &str = "sales";

/// Version byte prefixed to every encoded KV record
pub const KV_RECORD_FORMAT_VERSION: u8 = 1;

/// Key in the default partition recording the record format version
pub const KV_META_FORMAT_KEY: &[u8] = b"meta:format_version";
