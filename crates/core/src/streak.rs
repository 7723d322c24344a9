//! Daily-practice streak derivation.
//!
//! A streak counts consecutive calendar days containing at least one
//! completed session, regardless of mode. The calculator is a pure function
//! of the previous last-session date and the incoming session date, so it
//! can be re-run safely on every recording.

use chrono::{DateTime, Utc};

/// Result of advancing a streak with one new session date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakUpdate {
    pub current: u32,
    pub longest: u32,
}

/// Advance `(current, longest)` given a newly recorded session date.
///
/// Day arithmetic is calendar-based (UTC dates), so two sessions late in the
/// evening and early the next morning still count as consecutive days.
///
/// - gap of exactly one day extends the streak
/// - gap of more than one day restarts it at 1
/// - a second session on the same day leaves it unchanged
/// - an out-of-order date (earlier than the previous one) is treated as
///   same-day so a late-arriving event cannot corrupt the streak
#[must_use]
pub fn advance(
    previous_last_session: Option<DateTime<Utc>>,
    new_session: DateTime<Utc>,
    current: u32,
    longest: u32,
) -> StreakUpdate {
    let Some(previous) = previous_last_session else {
        // First session ever starts the streak.
        return StreakUpdate {
            current: 1,
            longest: longest.max(1),
        };
    };

    let days_diff = new_session
        .date_naive()
        .signed_duration_since(previous.date_naive())
        .num_days();

    match days_diff {
        1 => {
            let current = current + 1;
            StreakUpdate {
                current,
                longest: longest.max(current),
            }
        }
        d if d > 1 => StreakUpdate {
            current: 1,
            longest: longest.max(1),
        },
        // Same day or out-of-order: no change.
        _ => StreakUpdate { current, longest },
    }
}
