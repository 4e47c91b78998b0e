/// Single account ledger: balance plus append-only transaction history.
/// State is modified by applying transactions produced from validated commands.
pub mod account;

/// Validated account commands and credentials, built before [`account`] is touched.
pub mod command;

/// Account directory interface, plus the implementation that persists
/// through [`storage`]. Allocates account numbers, authenticates and
/// coordinates transfers between two accounts.
pub mod directory;

/// Persisted directory state and where it is kept.
pub mod storage;

/// Interactive session used by the binary. It lives in the library so
/// integration tests can drive it.
pub mod bin_utils;
