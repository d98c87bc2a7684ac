use std::time::Duration;

// ======= Block fetching =======

/// Number of rounds fetched from algod concurrently when catching up.
pub const BLOCK_FETCH_CONCURRENCY: usize = 30;

/// Upper bound on a single `status_after_block` long-poll when following the tip.
pub const WAIT_FOR_BLOCK_TIMEOUT: Duration = Duration::from_secs(60);

// ======= Http clients =======

/// Retries applied on top of the initial attempt for each HTTP request.
pub const HTTP_MAX_RETRIES: u32 = 3;

pub const HTTP_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

pub const HTTP_RETRY_FACTOR: u32 = 2;

pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The indexer caps a single search page at this many transactions.
pub const INDEXER_MAX_PAGE_SIZE: u64 = 1000;

// ======= Subscriber loop =======

/// Delay before re-polling after a failed poll.
pub const ERROR_RETRY_DELAY: Duration = Duration::from_secs(5);

// ======= Settings environment variables =======

pub const SETTINGS_ENV_PREFIX: &str = "ALGORAND_SUBSCRIBER";

pub const SETTINGS_ENV_SEPARATOR: &str = "__";
