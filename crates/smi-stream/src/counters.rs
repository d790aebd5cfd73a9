//! Transfer diagnostics.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Completed and dropped segment counts for the current transfer.
///
/// Written only by the completion handler (and reset by transfer start);
/// read by diagnostics from any context.
#[derive(Debug, Default)]
pub struct TransferCounters {
    completed: AtomicU32,
    missed: AtomicU32,
}

/// Point-in-time copy of [`TransferCounters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CounterSnapshot {
    /// Segments completed since the transfer started.
    pub completed: u32,
    /// Segments dropped on RX overrun or skipped on TX underrun.
    pub missed: u32,
}

impl TransferCounters {
    /// Zeroed counters.
    pub const fn new() -> Self {
        Self {
            completed: AtomicU32::new(0),
            missed: AtomicU32::new(0),
        }
    }

    /// Zero both counts. Called when a new transfer is armed.
    pub fn reset(&self) {
        self.completed.store(0, Ordering::Release);
        self.missed.store(0, Ordering::Release);
    }

    /// Completed segments so far.
    pub fn completed(&self) -> u32 {
        self.completed.load(Ordering::Acquire)
    }

    /// Advance the completion count; returns the new value.
    pub(crate) fn advance(&self) -> u32 {
        self.completed.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    /// Record a dropped segment.
    pub(crate) fn record_miss(&self) {
        self.missed.fetch_add(1, Ordering::AcqRel);
    }

    /// Copy both counts.
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            completed: self.completed.load(Ordering::Acquire),
            missed: self.missed.load(Ordering::Acquire),
        }
    }
}

/// Edge flags set by the completion handler and cleared by `poll`, so a
/// poller can tell whether anything happened since it last looked.
#[derive(Debug, Default)]
pub struct Readiness {
    readable: AtomicBool,
    writeable: AtomicBool,
}

impl Readiness {
    /// Both flags clear.
    pub const fn new() -> Self {
        Self {
            readable: AtomicBool::new(false),
            writeable: AtomicBool::new(false),
        }
    }

    pub(crate) fn mark_readable(&self) {
        self.readable.store(true, Ordering::Release);
    }

    pub(crate) fn mark_writeable(&self) {
        self.writeable.store(true, Ordering::Release);
    }

    pub(crate) fn clear_readable(&self) {
        self.readable.store(false, Ordering::Release);
    }

    pub(crate) fn clear_writeable(&self) {
        self.writeable.store(false, Ordering::Release);
    }

    /// `true` if RX data arrived since the last readable poll.
    pub fn readable(&self) -> bool {
        self.readable.load(Ordering::Acquire)
    }

    /// `true` if TX space appeared since the last writable poll.
    pub fn writeable(&self) -> bool {
        self.writeable.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_advance_and_reset() {
        let c = TransferCounters::new();
        assert_eq!(c.advance(), 1);
        assert_eq!(c.advance(), 2);
        c.record_miss();
        assert_eq!(c.snapshot(), CounterSnapshot { completed: 2, missed: 1 });
        c.reset();
        assert_eq!(c.snapshot(), CounterSnapshot::default());
    }

    #[test]
    fn test_readiness_flags_independent() {
        let r = Readiness::new();
        r.mark_readable();
        assert!(r.readable());
        assert!(!r.writeable());
        r.mark_writeable();
        r.clear_readable();
        assert!(!r.readable());
        assert!(r.writeable());
    }
}
