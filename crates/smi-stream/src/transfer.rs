//! Cyclic DMA buffer manager.
//!
//! Owns the peripheral, the DMA channel and the bounce ring for as long as
//! the device is open. Arms a cyclic descriptor over the whole ring and keeps
//! the peripheral's transfer-length counter topped up so it never runs dry
//! while the DMA engine keeps cycling.
//!
//! The length register is programmed for [`TRANSFER_MULTIPLIER`] segments at a
//! time. Receive refreshes it on every completion; transmit is paced by
//! software and refreshes once per [`TRANSFER_MULTIPLIER`] completions, after
//! the watchdog in [`CyclicTransfer::check_and_restart`].

use smi_platform::{
    busy_wait_while, BounceGeometry, BounceRing, BusyWaitBudget, DmaChannel, DmaDirection,
    SmiPeripheral,
};

use crate::error::{Result, StreamError};

/// Segments' worth of transfers programmed per length refresh.
pub const TRANSFER_MULTIPLIER: u32 = 64;

/// The peripheral + DMA + bounce ring bundle.
pub struct CyclicTransfer<P, D> {
    smi: P,
    dma: D,
    ring: BounceRing,
    budget: BusyWaitBudget,
    armed: Option<DmaDirection>,
    count_since_refresh: u32,
}

impl<P: SmiPeripheral, D: DmaChannel> CyclicTransfer<P, D> {
    /// Bundle the hardware. Nothing is touched until [`start`](Self::start).
    pub fn new(smi: P, dma: D, ring: BounceRing, budget: BusyWaitBudget) -> Self {
        Self {
            smi,
            dma,
            ring,
            budget,
            armed: None,
            count_since_refresh: 0,
        }
    }

    /// Release the hardware.
    pub fn into_parts(self) -> (P, D, BounceRing) {
        (self.smi, self.dma, self.ring)
    }

    /// Direction of the armed transfer, if any.
    pub fn armed(&self) -> Option<DmaDirection> {
        self.armed
    }

    /// Ring layout.
    pub fn geometry(&self) -> BounceGeometry {
        self.ring.geometry()
    }

    /// Shared access to the peripheral.
    pub fn smi(&self) -> &P {
        &self.smi
    }

    /// Exclusive access to the peripheral.
    pub fn smi_mut(&mut self) -> &mut P {
        &mut self.smi
    }

    /// Bounce segment `index`.
    pub fn segment(&self, index: usize) -> Option<&[u8]> {
        self.ring.segment(index)
    }

    /// Bounce segment `index`, writable.
    pub fn segment_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        self.ring.segment_mut(index)
    }

    /// Completions since the last length refresh.
    pub fn count_since_refresh(&self) -> u32 {
        self.count_since_refresh
    }

    fn transfers_per_segment(&self) -> u32 {
        u32::try_from(self.ring.geometry().transfers_per_segment()).unwrap_or(u32::MAX)
    }

    /// Clear ENABLE and wait for it to read back low.
    fn disable_sync(&mut self) -> bool {
        self.smi.disable();
        let budget = self.budget.disable;
        busy_wait_while(budget, || self.smi.is_enabled())
    }

    /// Program one segment, enable in `direction` and wait for the peripheral
    /// to settle before clearing its FIFO.
    fn init_programmed_transfer(&mut self, direction: DmaDirection) -> Result<()> {
        tracing::trace!(regs = %self.smi.registers(), "init programmed transfer");
        self.smi.set_transfer_length(0);
        let transfers = self.transfers_per_segment();
        self.smi.set_transfer_length(transfers);
        self.smi.enable(direction);

        let budget = self.budget.activate;
        if !busy_wait_while(budget, || self.smi.is_active()) {
            tracing::warn!(
                enabled = self.smi.is_enabled(),
                regs = %self.smi.registers(),
                "programmed transfer did not settle"
            );
            return Err(StreamError::DeviceBusy);
        }
        self.smi.clear_fifo();
        Ok(())
    }

    /// Top up the transfer-length counter and (re)start the peripheral.
    #[allow(clippy::arithmetic_side_effects)] // Safety: saturating_mul below
    pub fn refresh(&mut self) {
        let transfers = TRANSFER_MULTIPLIER.saturating_mul(self.transfers_per_segment());
        self.smi.set_transfer_length(transfers);
        self.smi.start();
        self.count_since_refresh = 0;
    }

    /// Arm a cyclic transfer in `direction`.
    ///
    /// # Errors
    ///
    /// - [`StreamError::DeviceBusy`] if the peripheral would not disable or
    ///   settle within budget. Nothing is armed.
    /// - [`StreamError::TransferSetupFailed`] if the DMA channel refused the
    ///   descriptor. The peripheral is disabled again.
    pub fn start(&mut self, direction: DmaDirection) -> Result<()> {
        tracing::info!(%direction, "starting cyclic transfer");

        if !self.disable_sync() {
            tracing::warn!(regs = %self.smi.registers(), "peripheral would not disable");
            return Err(StreamError::DeviceBusy);
        }
        self.smi.set_transfer_length(0);

        if let Err(e) = self.init_programmed_transfer(direction) {
            let _ = self.disable_sync();
            return Err(e);
        }
        self.count_since_refresh = 0;

        let descriptor = self.ring.descriptor(direction);
        if let Err(e) = self.dma.prepare_cyclic(&descriptor) {
            tracing::error!(error = ?e, "cyclic descriptor preparation failed");
            self.stop();
            return Err(StreamError::TransferSetupFailed);
        }
        self.dma.issue_pending();
        self.armed = Some(direction);

        self.refresh();
        let budget = self.budget.activate;
        if !busy_wait_while(budget, || !self.smi.is_active()) {
            tracing::debug!(regs = %self.smi.registers(), "peripheral not yet active after start");
        }
        tracing::trace!(regs = %self.smi.registers(), "post init");
        Ok(())
    }

    /// Terminate the DMA transfer, disable the peripheral and restore its
    /// default configuration. Idempotent.
    pub fn stop(&mut self) {
        tracing::trace!(regs = %self.smi.registers(), "transfer stop");
        self.dma.terminate_sync();
        if !self.disable_sync() {
            tracing::warn!(regs = %self.smi.registers(), "disable timed out during stop");
        }
        self.smi.restore_settings();
        self.armed = None;
        self.count_since_refresh = 0;
    }

    /// Transmit-side watchdog, run once per completion.
    ///
    /// Every [`TRANSFER_MULTIPLIER`] completions the programmed length is
    /// about to run out: wait (1 µs per poll, bounded) for the current run to
    /// drain, then refresh. An exhausted budget is logged and the refresh
    /// happens anyway; the cost is a gap in the stream, not a stall.
    pub fn check_and_restart(&mut self) {
        self.count_since_refresh = self.count_since_refresh.saturating_add(1);
        if self.count_since_refresh < TRANSFER_MULTIPLIER {
            return;
        }
        let mut drained = false;
        for _ in 0..self.budget.restart {
            if !self.smi.is_active() {
                drained = true;
                break;
            }
            self.smi.delay_us(1);
        }
        if !drained {
            tracing::warn!(
                budget = self.budget.restart,
                regs = %self.smi.registers(),
                "transmit watchdog budget exhausted"
            );
        }
        self.refresh();
    }
}
