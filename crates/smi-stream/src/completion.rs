//! Per-segment DMA completion paths.
//!
//! Runs in the DMA callback context. Nothing here waits on a user call or
//! allocates: each queue is touched inside one short critical section, and a
//! short queue costs one missed segment. Work per completion is one segment
//! copy.

use smi_platform::{DmaChannel, DmaDirection, SmiPeripheral};

use crate::counters::{Readiness, TransferCounters};
use crate::notify::Notifier;
use crate::queue::SharedQueue;
use crate::transfer::CyclicTransfer;

/// Receive completions between periodic diagnostics.
pub const RX_LOG_INTERVAL: u32 = 100;
/// Transmit completions between periodic diagnostics.
pub const TX_LOG_INTERVAL: u32 = 111;

/// What one completion did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CompletionOutcome {
    /// No transfer was armed; nothing counted.
    Ignored,
    /// The segment moved between the ring and its queue.
    Transferred {
        /// Bounce segment index.
        segment: usize,
    },
    /// Overrun, underrun or contention: counted as missed.
    Missed {
        /// Bounce segment index, `None` when the ring itself was busy.
        segment: Option<usize>,
    },
}

/// Everything a completion touches apart from the transfer bundle.
pub(crate) struct CompletionContext<'a> {
    pub rx: &'a SharedQueue,
    pub tx: &'a SharedQueue,
    pub counters: &'a TransferCounters,
    pub readiness: &'a Readiness,
    pub notifier: &'a Notifier,
}

/// Segment the next completion in `direction` will touch, given `completed`
/// completions so far.
///
/// Receive uses the count before advancing; transmit advances first.
pub(crate) fn next_segment(direction: DmaDirection, completed: u32, segment_count: usize) -> usize {
    let n = match direction {
        DmaDirection::DeviceToMemory => completed,
        DmaDirection::MemoryToDevice => completed.wrapping_add(1),
    };
    usize::try_from(n)
        .ok()
        .and_then(|n| n.checked_rem(segment_count))
        .unwrap_or(0)
}

impl CompletionContext<'_> {
    pub(crate) fn dispatch<P, D>(&self, transfer: &mut CyclicTransfer<P, D>) -> CompletionOutcome
    where
        P: SmiPeripheral,
        D: DmaChannel,
    {
        match transfer.armed() {
            None => CompletionOutcome::Ignored,
            Some(DmaDirection::DeviceToMemory) => self.receive(transfer),
            Some(DmaDirection::MemoryToDevice) => self.transmit(transfer),
        }
    }

    /// Contended ring: the segment is lost either way.
    pub(crate) fn ring_busy(&self) -> CompletionOutcome {
        self.counters.record_miss();
        self.counters.advance();
        CompletionOutcome::Missed { segment: None }
    }

    fn receive<P, D>(&self, transfer: &mut CyclicTransfer<P, D>) -> CompletionOutcome
    where
        P: SmiPeripheral,
        D: DmaChannel,
    {
        transfer.refresh();

        let geometry = transfer.geometry();
        let unit = geometry.segment_size();
        let index = next_segment(
            DmaDirection::DeviceToMemory,
            self.counters.completed(),
            geometry.segment_count(),
        );

        let delivered = transfer
            .segment(index)
            .and_then(|segment| {
                self.rx.with(|rx| {
                    rx.available_space() >= unit && rx.push(segment) == unit
                })
            })
            .unwrap_or(false);
        if !delivered {
            self.counters.record_miss();
        }

        let completed = self.counters.advance();
        if completed.checked_rem(RX_LOG_INTERVAL) == Some(0) {
            let c = self.counters.snapshot();
            tracing::debug!(completed = c.completed, missed = c.missed, "rx progress");
        }
        self.readiness.mark_readable();
        self.notifier.notify_all();

        if delivered {
            CompletionOutcome::Transferred { segment: index }
        } else {
            CompletionOutcome::Missed { segment: Some(index) }
        }
    }

    fn transmit<P, D>(&self, transfer: &mut CyclicTransfer<P, D>) -> CompletionOutcome
    where
        P: SmiPeripheral,
        D: DmaChannel,
    {
        transfer.check_and_restart();

        let geometry = transfer.geometry();
        let unit = geometry.segment_size();
        let index = next_segment(
            DmaDirection::MemoryToDevice,
            self.counters.completed(),
            geometry.segment_count(),
        );
        let completed = self.counters.advance();

        // underrun leaves the previous segment contents in place
        let delivered = transfer
            .segment_mut(index)
            .and_then(|segment| {
                self.tx.with(|tx| {
                    tx.available_data() >= unit && tx.pop(segment) == unit
                })
            })
            .unwrap_or(false);
        if !delivered {
            self.counters.record_miss();
        }

        if completed.checked_rem(TX_LOG_INTERVAL) == Some(0) {
            let c = self.counters.snapshot();
            tracing::debug!(completed = c.completed, missed = c.missed, "tx progress");
        }
        self.readiness.mark_writeable();
        self.notifier.notify_all();

        if delivered {
            CompletionOutcome::Transferred { segment: index }
        } else {
            CompletionOutcome::Missed { segment: Some(index) }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use smi_platform::mocks::{MockDma, MockSmi};
    use smi_platform::{BounceGeometry, BounceRing, BusyWaitBudget};

    const UNIT: usize = 16;

    use crate::queue::StreamQueue;

    struct Fixture {
        rx: SharedQueue,
        tx: SharedQueue,
        counters: TransferCounters,
        readiness: Readiness,
        notifier: Notifier,
        transfer: CyclicTransfer<MockSmi, MockDma>,
    }

    impl Fixture {
        fn new(queue_units: usize) -> Self {
            let ring = BounceRing::allocate(BounceGeometry::new(UNIT, 4).unwrap(), 0).unwrap();
            Self {
                rx: SharedQueue::new(StreamQueue::with_capacity(queue_units * UNIT).unwrap()),
                tx: SharedQueue::new(StreamQueue::with_capacity(queue_units * UNIT).unwrap()),
                counters: TransferCounters::new(),
                readiness: Readiness::new(),
                notifier: Notifier::new(),
                transfer: CyclicTransfer::new(
                    MockSmi::new(),
                    MockDma::new(),
                    ring,
                    BusyWaitBudget::FAST,
                ),
            }
        }

        fn complete(&mut self) -> CompletionOutcome {
            let ctx = CompletionContext {
                rx: &self.rx,
                tx: &self.tx,
                counters: &self.counters,
                readiness: &self.readiness,
                notifier: &self.notifier,
            };
            ctx.dispatch(&mut self.transfer)
        }
    }

    #[test]
    fn test_segment_order_rx_and_tx() {
        assert_eq!(next_segment(DmaDirection::DeviceToMemory, 0, 4), 0);
        assert_eq!(next_segment(DmaDirection::DeviceToMemory, 5, 4), 1);
        assert_eq!(next_segment(DmaDirection::MemoryToDevice, 0, 4), 1);
        assert_eq!(next_segment(DmaDirection::MemoryToDevice, 3, 4), 0);
    }

    #[test]
    fn test_unarmed_completion_ignored() {
        let mut f = Fixture::new(2);
        assert_eq!(f.complete(), CompletionOutcome::Ignored);
        assert_eq!(f.counters.snapshot().completed, 0);
        assert!(!f.readiness.readable());
    }

    #[test]
    fn test_rx_copies_segment_in_order() {
        let mut f = Fixture::new(4);
        f.transfer.start(DmaDirection::DeviceToMemory).unwrap();
        for i in 0..4u8 {
            f.transfer.segment_mut(usize::from(i)).unwrap().fill(i + 1);
        }
        for i in 0..4 {
            assert_eq!(f.complete(), CompletionOutcome::Transferred { segment: i });
        }
        let mut out = [0u8; 4 * UNIT];
        let rx = f.rx.get_mut();
        assert_eq!(rx.pop(&mut out), 4 * UNIT);
        assert_eq!(out[0], 1);
        assert_eq!(out[3 * UNIT], 4);
        assert!(f.readiness.readable());
    }

    #[test]
    fn test_rx_overrun_drops_newest() {
        let mut f = Fixture::new(2);
        f.transfer.start(DmaDirection::DeviceToMemory).unwrap();
        f.complete();
        f.complete();
        assert_eq!(f.complete(), CompletionOutcome::Missed { segment: Some(2) });
        let c = f.counters.snapshot();
        assert_eq!((c.completed, c.missed), (3, 1));
        assert!(f.rx.get_mut().is_full());
    }

    #[test]
    fn test_rx_reentrant_queue_access_counts_miss() {
        let mut f = Fixture::new(2);
        f.transfer.start(DmaDirection::DeviceToMemory).unwrap();
        let ctx = CompletionContext {
            rx: &f.rx,
            tx: &f.tx,
            counters: &f.counters,
            readiness: &f.readiness,
            notifier: &f.notifier,
        };
        let transfer = &mut f.transfer;
        let outcome = f.rx.with(|_| ctx.dispatch(transfer)).unwrap();
        assert_eq!(outcome, CompletionOutcome::Missed { segment: Some(0) });
        assert_eq!(f.counters.snapshot().missed, 1);
    }

    #[test]
    fn test_rx_refreshes_length_every_completion() {
        let mut f = Fixture::new(2);
        f.transfer.start(DmaDirection::DeviceToMemory).unwrap();
        let smi = f.transfer.smi().clone();
        let before = smi.start_count();
        f.complete();
        f.complete();
        assert_eq!(smi.start_count(), before + 2);
    }

    #[test]
    fn test_tx_moves_one_unit_into_next_segment() {
        let mut f = Fixture::new(2);
        f.transfer.start(DmaDirection::MemoryToDevice).unwrap();
        f.tx.get_mut().push(&[0xA5; UNIT]);
        assert_eq!(f.complete(), CompletionOutcome::Transferred { segment: 1 });
        assert_eq!(f.transfer.segment(1).unwrap(), &[0xA5; UNIT]);
        assert!(f.tx.get_mut().is_empty());
        assert_eq!(f.counters.snapshot().missed, 0);
        assert!(f.readiness.writeable());
    }

    #[test]
    fn test_tx_underrun_keeps_previous_contents() {
        let mut f = Fixture::new(2);
        f.transfer.start(DmaDirection::MemoryToDevice).unwrap();
        f.transfer.segment_mut(1).unwrap().fill(0x3C);
        // half a unit is not enough
        f.tx.get_mut().push(&[0xFF; UNIT / 2]);
        assert_eq!(f.complete(), CompletionOutcome::Missed { segment: Some(1) });
        assert_eq!(f.transfer.segment(1).unwrap(), &[0x3C; UNIT]);
        assert_eq!(f.tx.get_mut().available_data(), UNIT / 2);
        assert_eq!(f.complete(), CompletionOutcome::Missed { segment: Some(2) });
        assert_eq!(f.counters.snapshot().missed, 2);
    }

    #[test]
    fn test_ring_busy_counts_and_advances() {
        let f = Fixture::new(2);
        let ctx = CompletionContext {
            rx: &f.rx,
            tx: &f.tx,
            counters: &f.counters,
            readiness: &f.readiness,
            notifier: &f.notifier,
        };
        assert_eq!(ctx.ring_busy(), CompletionOutcome::Missed { segment: None });
        assert_eq!(f.counters.snapshot().missed, 1);
    }
}
