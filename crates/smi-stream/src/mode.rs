//! Operating modes and the external address selector.
//!
//! The SMI address lines double as a direction/channel selector for the
//! attached front end: one bit tells the device which way the bus is driven,
//! another picks one of two receive channels. Which bits those are is
//! configurable; either may be unused.

use core::fmt;

use smi_platform::DmaDirection;

use crate::error::{Result, StreamError};

/// One of the two receive channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxChannel {
    /// Channel 0 (selector bit low).
    Channel0,
    /// Channel 1 (selector bit high).
    Channel1,
}

impl RxChannel {
    fn select_bit(self) -> u8 {
        match self {
            Self::Channel0 => 0,
            Self::Channel1 => 1,
        }
    }
}

/// The single operating mode of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OperatingMode {
    /// No transfer; address lines in the quiescent (bus-released) state.
    #[default]
    Idle,
    /// Streaming device → memory on the given channel.
    Receive(RxChannel),
    /// Streaming memory → device.
    Transmit,
}

impl OperatingMode {
    /// Receive on channel 0.
    pub const RX0: Self = Self::Receive(RxChannel::Channel0);
    /// Receive on channel 1.
    pub const RX1: Self = Self::Receive(RxChannel::Channel1);

    /// DMA direction implied by the mode.
    pub fn direction(self) -> TransferDirection {
        match self {
            Self::Idle => TransferDirection::None,
            Self::Receive(_) => TransferDirection::DeviceToMemory,
            Self::Transmit => TransferDirection::MemoryToDevice,
        }
    }

    /// Control-plane encoding.
    pub fn as_raw(self) -> u32 {
        match self {
            Self::Idle => 0,
            Self::Receive(RxChannel::Channel0) => 1,
            Self::Receive(RxChannel::Channel1) => 2,
            Self::Transmit => 3,
        }
    }
}

impl TryFrom<u32> for OperatingMode {
    type Error = StreamError;

    fn try_from(raw: u32) -> Result<Self> {
        match raw {
            0 => Ok(Self::Idle),
            1 => Ok(Self::RX0),
            2 => Ok(Self::RX1),
            3 => Ok(Self::Transmit),
            other => Err(StreamError::InvalidParameter {
                name: "stream_state",
                value: i32::try_from(other).unwrap_or(i32::MAX),
                min: 0,
                max: 3,
            }),
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Receive(RxChannel::Channel0) => "rx0",
            Self::Receive(RxChannel::Channel1) => "rx1",
            Self::Transmit => "tx",
        })
    }
}

/// Direction derived from an [`OperatingMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferDirection {
    /// Receive.
    DeviceToMemory,
    /// Transmit.
    MemoryToDevice,
    /// Idle.
    None,
}

impl TransferDirection {
    /// DMA direction, or `None` when idle.
    pub fn dma(self) -> Option<DmaDirection> {
        match self {
            Self::DeviceToMemory => Some(DmaDirection::DeviceToMemory),
            Self::MemoryToDevice => Some(DmaDirection::MemoryToDevice),
            Self::None => None,
        }
    }
}

// ── Address offsets ──────────────────────────────────────────────────────────

/// Bit position of a selector signal on the 5-bit address bus, or unused.
///
/// Wraps an `i8` with the invariant `-1 <= value <= 4`; `-1` means the
/// signal is not wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct AddressOffset(i8);

impl AddressOffset {
    /// Sentinel for an unwired signal.
    pub const UNUSED: Self = Self(-1);
    /// Inclusive minimum raw value.
    pub const MIN: i32 = -1;
    /// Inclusive maximum raw value (highest address bit).
    pub const MAX: i32 = 4;

    /// Validate a raw offset.
    ///
    /// # Errors
    ///
    /// [`StreamError::InvalidParameter`] outside `[-1, 4]`.
    pub fn new(name: &'static str, raw: i32) -> Result<Self> {
        if !(Self::MIN..=Self::MAX).contains(&raw) {
            return Err(StreamError::InvalidParameter {
                name,
                value: raw,
                min: Self::MIN,
                max: Self::MAX,
            });
        }
        i8::try_from(raw)
            .map(Self)
            .map_err(|_| StreamError::InvalidParameter {
                name,
                value: raw,
                min: Self::MIN,
                max: Self::MAX,
            })
    }

    /// Raw value, `-1` when unused.
    pub fn get(self) -> i32 {
        i32::from(self.0)
    }

    /// Bit position, or `None` when unused.
    pub fn bit(self) -> Option<u8> {
        u8::try_from(self.0).ok()
    }

    fn place(self, value: u8) -> u8 {
        match self.bit() {
            Some(bit) => value.checked_shl(u32::from(bit)).unwrap_or(0),
            None => 0,
        }
    }
}

/// Direction and channel selector positions.
///
/// Invariant: the two offsets differ unless both are unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AddressOffsets {
    direction: AddressOffset,
    channel: AddressOffset,
}

impl AddressOffsets {
    /// Direction level driven while receiving.
    const DIR_DEVICE_TO_SMI: u8 = 1;
    /// Direction level driven while transmitting or idle (bus released).
    const DIR_SMI_TO_DEVICE: u8 = 0;

    /// Build from raw offsets, checking ranges and disjointness.
    ///
    /// # Errors
    ///
    /// [`StreamError::InvalidParameter`] for an out-of-range value,
    /// [`StreamError::OffsetConflict`] when both name the same bit.
    pub fn new(direction: i32, channel: i32) -> Result<Self> {
        let direction = AddressOffset::new("addr_dir_offset", direction)?;
        let channel = AddressOffset::new("addr_ch_offset", channel)?;
        Self::from_parts(direction, channel)
    }

    fn from_parts(direction: AddressOffset, channel: AddressOffset) -> Result<Self> {
        if direction == channel && direction != AddressOffset::UNUSED {
            return Err(StreamError::OffsetConflict {
                offset: direction.get(),
            });
        }
        Ok(Self { direction, channel })
    }

    /// Direction offset.
    pub fn direction(&self) -> AddressOffset {
        self.direction
    }

    /// Channel offset.
    pub fn channel(&self) -> AddressOffset {
        self.channel
    }

    /// Copy with a new direction offset.
    ///
    /// # Errors
    ///
    /// As [`AddressOffsets::new`].
    pub fn with_direction(self, raw: i32) -> Result<Self> {
        Self::from_parts(AddressOffset::new("addr_dir_offset", raw)?, self.channel)
    }

    /// Copy with a new channel offset.
    ///
    /// # Errors
    ///
    /// As [`AddressOffsets::new`].
    pub fn with_channel(self, raw: i32) -> Result<Self> {
        Self::from_parts(self.direction, AddressOffset::new("addr_ch_offset", raw)?)
    }

    /// Address-line value for `mode`.
    ///
    /// Idle drives the transmit direction level so the front end never
    /// drives the bus while the engine is reconfiguring.
    pub fn address_for(&self, mode: OperatingMode) -> u8 {
        match mode {
            OperatingMode::Receive(ch) => {
                self.direction.place(Self::DIR_DEVICE_TO_SMI) | self.channel.place(ch.select_bit())
            }
            OperatingMode::Transmit | OperatingMode::Idle => {
                self.direction.place(Self::DIR_SMI_TO_DEVICE)
            }
        }
    }
}

impl Default for AddressOffsets {
    fn default() -> Self {
        Self {
            direction: AddressOffset(2),
            channel: AddressOffset(3),
        }
    }
}
