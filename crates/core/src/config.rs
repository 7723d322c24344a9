//! Engine-level constants.
//!
//! These are product rules, not tuning knobs: a level of adaptive practice is
//! six cycles, the session history keeps the ten most recent entries, and a
//! conflicting record write is retried once before giving up.

/// Number of breathing cycles that make up one adaptive level.
pub const CYCLES_PER_LEVEL: u32 = 6;

/// Maximum number of entries retained in a record's recent-session history.
pub const RECENT_SESSIONS_DEPTH: usize = 10;

/// How many times a read-modify-write is retried after a version conflict.
pub const CONFLICT_RETRY_LIMIT: u32 = 1;
