//! Stable exit codes for the `autoqa` binary.

/// Every executed scenario passed (or was skipped).
pub const OK: i32 = 0;
/// At least one scenario ended fail, error or timeout after retries.
pub const FAILURES: i32 = 1;
/// The run could not complete: bad config, unreadable catalog, driver unreachable.
pub const FATAL: i32 = 2;
