//! Totally ordered priority levels with a bounded "boost" operation.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Five fixed priority levels. Smaller numeric value means more urgent;
/// `CRITICAL = 0` is the strongest level and `BACKLOG = 4` the weakest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    Critical = 0,
    High = 1,
    Medium = 2,
    Low = 3,
    Backlog = 4,
}

impl Priority {
    pub fn value(self) -> u8 {
        self as u8
    }

    fn from_value(value: u8) -> Priority {
        match value {
            0 => Priority::Critical,
            1 => Priority::High,
            2 => Priority::Medium,
            3 => Priority::Low,
            _ => Priority::Backlog,
        }
    }

    /// Boost this priority by `levels` steps towards `CRITICAL`, clamping there.
    pub fn boost(self, levels: u8) -> Priority {
        let boosted = self.value().saturating_sub(levels);
        Priority::from_value(boosted)
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value().cmp(&other.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_numeric_and_lower_is_more_urgent() {
        assert!(Priority::Critical < Priority::High);
        assert!(Priority::Backlog > Priority::Low);
    }

    #[test]
    fn boost_moves_towards_critical() {
        assert_eq!(Priority::Backlog.boost(2), Priority::Medium);
    }

    #[test]
    fn boost_clamps_at_critical() {
        assert_eq!(Priority::High.boost(5), Priority::Critical);
        assert_eq!(Priority::Critical.boost(1), Priority::Critical);
    }
}
