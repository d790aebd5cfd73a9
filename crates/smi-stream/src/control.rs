//! Control-plane command set.
//!
//! A typed stand-in for the character device's ioctl table. Every setter
//! validates before it touches any state; a rejected command changes
//! nothing.

use smi_platform::{DmaChannel, SmiPeripheral};

use crate::config::QueueMultiplier;
use crate::device::StreamDevice;
use crate::error::Result;
use crate::mode::OperatingMode;

/// Commands accepted by [`StreamDevice::control`]. `S` is the peripheral's
/// opaque settings type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand<S> {
    /// Read the peripheral settings.
    GetSettings,
    /// Store and apply new peripheral settings.
    WriteSettings(S),
    /// Legacy address request. Logged and otherwise ignored: the address
    /// lines follow the operating mode.
    Address(u32),
    /// Bytes moved per DMA completion.
    GetNativeBufSize,
    /// Toggle non-blocking reads.
    SetNonBlockRead(bool),
    /// Switch operating mode (raw encoding: 0 idle, 1 rx0, 2 rx1, 3 tx).
    SetStreamState(u32),
    /// Queue depth multiplier for the next open.
    SetFifoMultiplier(i32),
    /// Current queue depth multiplier setting.
    GetFifoMultiplier,
    /// Direction selector bit, used from the next mode change.
    SetAddrDirOffset(i32),
    /// Current direction selector bit.
    GetAddrDirOffset,
    /// Channel selector bit, used from the next mode change.
    SetAddrChOffset(i32),
    /// Current channel selector bit.
    GetAddrChOffset,
    /// Discard buffered RX data.
    FlushFifo,
}

/// Reply to a [`ControlCommand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlReply<S> {
    /// The command had no result value.
    Done,
    /// Peripheral settings.
    Settings(S),
    /// Native transfer unit in bytes.
    NativeBufSize(usize),
    /// An integer parameter.
    Value(i32),
}

impl<P: SmiPeripheral, D: DmaChannel> StreamDevice<P, D> {
    /// Execute one control command.
    ///
    /// # Errors
    ///
    /// Validation errors for setters, and whatever
    /// [`set_mode`](Self::set_mode) or [`flush`](Self::flush) return.
    pub async fn control(
        &self,
        command: ControlCommand<P::Settings>,
    ) -> Result<ControlReply<P::Settings>> {
        match command {
            ControlCommand::GetSettings => {
                let settings = self.with_transfer(|t| t.smi().settings())?;
                Ok(ControlReply::Settings(settings))
            }
            ControlCommand::WriteSettings(settings) => {
                self.with_transfer(|t| t.smi_mut().apply_settings(settings))?;
                tracing::debug!("peripheral settings written");
                Ok(ControlReply::Done)
            }
            ControlCommand::Address(address) => {
                tracing::info!(address, "address request ignored");
                Ok(ControlReply::Done)
            }
            ControlCommand::GetNativeBufSize => {
                Ok(ControlReply::NativeBufSize(self.native_transfer_unit()))
            }
            ControlCommand::SetNonBlockRead(nonblocking) => {
                self.set_nonblocking_read(nonblocking);
                Ok(ControlReply::Done)
            }
            ControlCommand::SetStreamState(raw) => {
                let mode = OperatingMode::try_from(raw)?;
                self.set_mode(mode).await?;
                Ok(ControlReply::Done)
            }
            ControlCommand::SetFifoMultiplier(raw) => {
                let multiplier = QueueMultiplier::new(raw)?;
                self.update_config(|c| c.queue_multiplier = multiplier);
                tracing::info!(multiplier = multiplier.get(), "queue multiplier set, applies at next open");
                Ok(ControlReply::Done)
            }
            ControlCommand::GetFifoMultiplier => Ok(ControlReply::Value(i32::from(
                self.config().queue_multiplier.get(),
            ))),
            ControlCommand::SetAddrDirOffset(raw) => {
                let offsets = self.config().offsets.with_direction(raw)?;
                self.update_config(|c| c.offsets = offsets);
                Ok(ControlReply::Done)
            }
            ControlCommand::GetAddrDirOffset => {
                Ok(ControlReply::Value(self.config().offsets.direction().get()))
            }
            ControlCommand::SetAddrChOffset(raw) => {
                let offsets = self.config().offsets.with_channel(raw)?;
                self.update_config(|c| c.offsets = offsets);
                Ok(ControlReply::Done)
            }
            ControlCommand::GetAddrChOffset => {
                Ok(ControlReply::Value(self.config().offsets.channel().get()))
            }
            ControlCommand::FlushFifo => {
                self.flush().await?;
                Ok(ControlReply::Done)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;
    use crate::device::Hardware;
    use crate::error::StreamError;
    use embassy_futures::block_on;
    use smi_platform::mocks::{MockDma, MockSettings, MockSmi};
    use smi_platform::BusyWaitBudget;

    type Cmd = ControlCommand<MockSettings>;

    fn device() -> (StreamDevice<MockSmi, MockDma>, MockSmi) {
        let smi = MockSmi::new();
        let config = StreamConfig::default()
            .with_geometry(64, 4)
            .unwrap()
            .with_busy_wait(BusyWaitBudget::FAST);
        let hw = Hardware {
            smi: smi.clone(),
            dma: MockDma::new(),
            bounce_phys: 0,
        };
        (StreamDevice::open(config, hw).unwrap(), smi)
    }

    #[test]
    fn test_native_buf_size_is_one_segment() {
        let (dev, _) = device();
        assert_eq!(
            block_on(dev.control(Cmd::GetNativeBufSize)),
            Ok(ControlReply::NativeBufSize(64))
        );
    }

    #[test]
    fn test_settings_round_trip_through_peripheral() {
        let (dev, smi) = device();
        let s = MockSettings { width: 2, strobe: 7 };
        block_on(dev.control(Cmd::WriteSettings(s))).unwrap();
        assert_eq!(smi.settings(), s);
        assert_eq!(
            block_on(dev.control(Cmd::GetSettings)),
            Ok(ControlReply::Settings(s))
        );
    }

    #[test]
    fn test_stream_state_validated() {
        let (dev, _) = device();
        assert!(matches!(
            block_on(dev.control(Cmd::SetStreamState(7))),
            Err(StreamError::InvalidParameter { .. })
        ));
        block_on(dev.control(Cmd::SetStreamState(2))).unwrap();
        assert_eq!(dev.mode(), OperatingMode::RX1);
    }

    #[test]
    fn test_rejected_setters_change_nothing() {
        let (dev, _) = device();
        assert!(block_on(dev.control(Cmd::SetFifoMultiplier(1))).is_err());
        assert!(block_on(dev.control(Cmd::SetAddrDirOffset(3))).is_err());
        assert!(block_on(dev.control(Cmd::SetAddrChOffset(9))).is_err());
        assert_eq!(dev.config().queue_multiplier.get(), 6);
        assert_eq!(
            block_on(dev.control(Cmd::GetAddrDirOffset)),
            Ok(ControlReply::Value(2))
        );
        assert_eq!(
            block_on(dev.control(Cmd::GetAddrChOffset)),
            Ok(ControlReply::Value(3))
        );
    }

    #[test]
    fn test_offset_change_applies_at_next_mode_change() {
        let (dev, smi) = device();
        block_on(dev.control(Cmd::SetStreamState(1))).unwrap();
        assert_eq!(smi.address(), 0b0100);
        block_on(dev.control(Cmd::SetAddrDirOffset(0))).unwrap();
        assert_eq!(smi.address(), 0b0100);
        block_on(dev.control(Cmd::SetStreamState(2))).unwrap();
        assert_eq!(smi.address(), 0b1001);
    }

    #[test]
    fn test_unused_direction_allows_equal_offsets() {
        let (dev, _) = device();
        block_on(dev.control(Cmd::SetAddrDirOffset(-1))).unwrap();
        block_on(dev.control(Cmd::SetAddrChOffset(-1))).unwrap();
        assert_eq!(
            block_on(dev.control(Cmd::GetAddrChOffset)),
            Ok(ControlReply::Value(-1))
        );
    }

    #[test]
    fn test_address_command_has_no_effect() {
        let (dev, smi) = device();
        let before = smi.address_history();
        assert_eq!(
            block_on(dev.control(Cmd::Address(0x1F))),
            Ok(ControlReply::Done)
        );
        assert_eq!(smi.address_history(), before);
    }

    #[test]
    fn test_nonblock_and_flush_commands() {
        let (dev, _) = device();
        block_on(dev.control(Cmd::SetNonBlockRead(true))).unwrap();
        assert!(dev.nonblocking_read());
        block_on(dev.control(Cmd::FlushFifo)).unwrap();
    }
}
