//! SMI peripheral abstraction
//!
//! The streaming engine never touches registers directly. It drives the
//! peripheral through the operations below, each of which corresponds to one
//! read-modify-write of the control/status (CS), length (L) or address
//! registers on the real part. The bit layout stays on the implementor's side
//! of this trait.
//!
//! Implementors must follow every register write with a memory barrier, so a
//! later poll of [`SmiPeripheral::is_active`] observes the effect of the write.

use core::fmt;

use embedded_hal::delay::DelayNs;

use crate::dma::DmaDirection;

/// Raw register values captured for diagnostics.
///
/// Emitted at trace level when a transfer starts or stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegisterSnapshot {
    /// Control/status register.
    pub control_status: u32,
    /// Programmed transfer length.
    pub length: u32,
    /// DMA control register.
    pub dma_control: u32,
    /// Direct-mode write settings register 0.
    pub direct_write0: u32,
}

impl fmt::Display for RegisterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cs {:08X} l {:08X} dc {:08X} dsw0 {:08X}",
            self.control_status, self.length, self.dma_control, self.direct_write0
        )
    }
}

/// Secondary Memory Interface peripheral.
///
/// The [`DelayNs`] supertrait provides the short waits used by the transmit
/// restart watchdog; everything else is polled with an iteration budget
/// (see [`crate::busy_wait`]).
pub trait SmiPeripheral: DelayNs {
    /// Opaque timing/width settings, read and written by the control plane.
    type Settings: Clone;

    /// `true` while the ENABLE bit reads back as set.
    fn is_enabled(&self) -> bool;

    /// `true` while a programmed transfer is in progress (ACTIVE flag).
    fn is_active(&self) -> bool;

    /// Clear ENABLE and WRITE. Completion is observed through
    /// [`is_enabled`](Self::is_enabled).
    fn disable(&mut self);

    /// Set CLEAR and ENABLE, plus WRITE when `direction` is
    /// [`DmaDirection::MemoryToDevice`].
    fn enable(&mut self, direction: DmaDirection);

    /// Re-write the current control word, discarding any FIFO contents.
    fn clear_fifo(&mut self);

    /// Program the transfer length register, in 32-bit transfers.
    fn set_transfer_length(&mut self, transfers: u32);

    /// Set START, beginning the programmed transfer.
    fn start(&mut self);

    /// Drive the external address lines.
    fn set_address(&mut self, address: u8);

    /// Restore the register configuration from the stored settings.
    fn restore_settings(&mut self);

    /// Current settings, as last applied.
    fn settings(&self) -> Self::Settings;

    /// Store and apply new settings.
    fn apply_settings(&mut self, settings: Self::Settings);

    /// Capture the diagnostic registers.
    fn registers(&self) -> RegisterSnapshot;
}
