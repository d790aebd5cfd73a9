//! Bounded polling loops.
//!
//! Hardware quiescence is polled with a fixed iteration budget rather than a
//! wall-clock timeout: the waits cover microseconds of polling and always
//! succeed on healthy hardware. An exhausted budget means a hardware fault and
//! is reported to the caller, never retried.

/// Iteration budgets for every bounded wait in the transfer engine.
///
/// The defaults match the production driver. Tests shrink them to exercise
/// the failure paths quickly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusyWaitBudget {
    /// Polls of ENABLE after clearing it.
    pub disable: u32,
    /// Polls of ACTIVE while arming, and again for the post-start check.
    pub activate: u32,
    /// Polls of ACTIVE (1 µs apart) before a transmit length refresh.
    pub restart: u32,
}

impl BusyWaitBudget {
    /// Production budget.
    pub const DEFAULT: Self = Self {
        disable: 100_000,
        activate: 1_000_000,
        restart: 1_000,
    };

    /// Small budget for host tests.
    pub const FAST: Self = Self {
        disable: 16,
        activate: 16,
        restart: 4,
    };
}

impl Default for BusyWaitBudget {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Spin while `condition` holds, at most `budget` times.
///
/// Returns `true` if the condition cleared within the budget.
pub fn busy_wait_while(budget: u32, mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..budget {
        if !condition() {
            return true;
        }
        core::hint::spin_loop();
    }
    !condition()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_returns_immediately_when_condition_already_clear() {
        let mut polls = 0u32;
        assert!(busy_wait_while(10, || {
            polls += 1;
            false
        }));
        assert_eq!(polls, 1);
    }

    #[test]
    fn test_condition_clearing_within_budget_succeeds() {
        let mut remaining = 5u32;
        assert!(busy_wait_while(10, || {
            remaining = remaining.saturating_sub(1);
            remaining > 0
        }));
    }

    #[test]
    fn test_stuck_condition_exhausts_budget() {
        let mut polls = 0u32;
        assert!(!busy_wait_while(8, || {
            polls += 1;
            true
        }));
        // budget polls plus the final check
        assert_eq!(polls, 9);
    }

    #[test]
    fn test_zero_budget_still_checks_once() {
        assert!(busy_wait_while(0, || false));
        assert!(!busy_wait_while(0, || true));
    }
}
