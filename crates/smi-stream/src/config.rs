//! Stream configuration.
//!
//! Every value is validated when it is built, so a `StreamConfig` in hand is
//! always usable. Defaults match the shipped driver parameters
//! (`fifo_mtu_multiplier=6 addr_dir_offset=2 addr_ch_offset=3`).

use smi_platform::{BounceGeometry, BusyWaitBudget};

use crate::error::{Result, StreamError};
use crate::mode::AddressOffsets;

/// Queue depth as a multiple of the native transfer unit.
///
/// Wraps a `u8` with the invariant `2 <= value <= 32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct QueueMultiplier(u8);

impl QueueMultiplier {
    /// Inclusive minimum.
    pub const MIN: i32 = 2;
    /// Inclusive maximum.
    pub const MAX: i32 = 32;
    /// Shipped default.
    pub const DEFAULT: Self = Self(6);

    /// Validate a raw multiplier.
    ///
    /// # Errors
    ///
    /// [`StreamError::InvalidParameter`] outside `[2, 32]`.
    pub fn new(raw: i32) -> Result<Self> {
        let invalid = StreamError::InvalidParameter {
            name: "queue_multiplier",
            value: raw,
            min: Self::MIN,
            max: Self::MAX,
        };
        if !(Self::MIN..=Self::MAX).contains(&raw) {
            return Err(invalid);
        }
        u8::try_from(raw).map(Self).map_err(|_| invalid)
    }

    /// Raw multiplier.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for QueueMultiplier {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Everything fixed at open time, plus the address offsets that the control
/// plane may change afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StreamConfig {
    /// RX/TX queue depth in transfer units.
    pub queue_multiplier: QueueMultiplier,
    /// Selector bit positions.
    pub offsets: AddressOffsets,
    /// Bounce ring layout.
    pub geometry: BounceGeometry,
    /// Busy-wait iteration budgets.
    pub busy_wait: BusyWaitBudget,
}

impl StreamConfig {
    /// Build from raw driver parameters with the default ring and budgets.
    ///
    /// # Errors
    ///
    /// Range or disjointness violations, see [`QueueMultiplier::new`] and
    /// [`AddressOffsets::new`].
    pub fn from_params(queue_multiplier: i32, addr_dir_offset: i32, addr_ch_offset: i32) -> Result<Self> {
        Ok(Self {
            queue_multiplier: QueueMultiplier::new(queue_multiplier)?,
            offsets: AddressOffsets::new(addr_dir_offset, addr_ch_offset)?,
            ..Self::default()
        })
    }

    /// Replace the ring geometry.
    ///
    /// # Errors
    ///
    /// [`StreamError::InvalidGeometry`] for a zero, unaligned or
    /// single-segment ring.
    pub fn with_geometry(mut self, segment_size: usize, segment_count: usize) -> Result<Self> {
        self.geometry = BounceGeometry::new(segment_size, segment_count)
            .map_err(|_| StreamError::InvalidGeometry)?;
        Ok(self)
    }

    /// Replace the busy-wait budgets.
    #[must_use]
    pub fn with_busy_wait(mut self, busy_wait: BusyWaitBudget) -> Self {
        self.busy_wait = busy_wait;
        self
    }

    /// Re-run the probe-time checks on every field. `StreamDevice::open`
    /// calls this before allocating.
    ///
    /// # Errors
    ///
    /// The first violated constraint.
    pub fn validate(&self) -> Result<()> {
        QueueMultiplier::new(i32::from(self.queue_multiplier.get()))?;
        AddressOffsets::new(self.offsets.direction().get(), self.offsets.channel().get())?;
        BounceGeometry::new(self.geometry.segment_size(), self.geometry.segment_count())
            .map_err(|_| StreamError::InvalidGeometry)?;
        Ok(())
    }

    /// Native transfer unit: bytes moved per DMA completion.
    pub fn transfer_unit(&self) -> usize {
        self.geometry.segment_size()
    }

    /// Capacity of each stream queue in bytes, or `None` on overflow.
    pub fn queue_capacity(&self) -> Option<usize> {
        self.transfer_unit()
            .checked_mul(usize::from(self.queue_multiplier.get()))
    }
}
