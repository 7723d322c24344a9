use serde::{Deserialize, Serialize};

/// Inhale/hold/exhale durations for one breathing cycle, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreathTiming {
    pub inhale_secs: u32,
    pub hold_secs: u32,
    pub exhale_secs: u32,
}

impl BreathTiming {
    #[must_use]
    pub fn new(inhale_secs: u32, hold_secs: u32, exhale_secs: u32) -> Self {
        Self {
            inhale_secs,
            hold_secs,
            exhale_secs,
        }
    }

    /// Duration of one full cycle.
    #[must_use]
    pub fn cycle_secs(&self) -> u32 {
        self.inhale_secs + self.hold_secs + self.exhale_secs
    }
}

impl Default for BreathTiming {
    /// The starting box-breathing timing used before any practice is recorded.
    fn default() -> Self {
        Self::new(4, 4, 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_secs_sums_phases() {
        assert_eq!(BreathTiming::new(5, 5, 5).cycle_secs(), 15);
        assert_eq!(BreathTiming::default().cycle_secs(), 12);
    }
}
