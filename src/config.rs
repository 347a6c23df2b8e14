//! Library configuration constants
//!
//! Central location for all configuration constants, tuning knobs,
//! and display thresholds used throughout the library.

// ===== Local Store =====

/// File name of the SQLite database inside the session data directory
pub const DB_FILE_NAME: &str = "packrat.db";

// ===== Outbox / Push =====

/// How often the flusher retries queued pushes when nothing wakes it
/// up sooner (milliseconds).
pub const OUTBOX_FLUSH_INTERVAL_MS: u64 = 3_000;

/// Maximum queued entries fetched per flush pass.
/// Keeps a single pass bounded; the flusher loops until the queue is empty.
pub const OUTBOX_FLUSH_BATCH: i64 = 64;

// ===== Change Feed / Pull =====

/// Buffered batches per change-feed subscription before backpressure
pub const CHANGE_FEED_CHANNEL_CAPACITY: usize = 16;

/// Broadcast ring size for the in-memory remote store.
/// Subscribers further behind than this are resynced from the change log.
pub const REMOTE_BROADCAST_CAPACITY: usize = 64;

/// How long the server may hold a long-poll request open before
/// answering with an empty batch (seconds).
pub const HTTP_LONG_POLL_WAIT_SECS: u64 = 25;

/// Delay before retrying a failed remote request (milliseconds)
pub const HTTP_RETRY_DELAY_MS: u64 = 2_000;

// ===== Geo Display =====

/// Mean earth radius in kilometres, used for great-circle distances
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Distances below this are shown in whole metres (e.g. "500 m")
pub const DISTANCE_METERS_BELOW_KM: f64 = 1.0;

/// Distances below this are shown with one decimal (e.g. "1.2 km");
/// everything above rounds to whole kilometres.
pub const DISTANCE_DECIMAL_BELOW_KM: f64 = 10.0;

/// Decimal places when falling back to raw coordinates for display
pub const COORDINATE_DISPLAY_DECIMALS: usize = 4;
