//! Error type shared by every fallible engine entry point.
//!
//! Queue overrun and underrun are not errors: they are counted in
//! [`TransferCounters`](crate::counters::TransferCounters) and otherwise
//! silent.

use thiserror_no_std::Error;

/// Errors returned by the streaming engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamError {
    /// The peripheral did not quiesce within its busy-wait budget.
    ///
    /// The mode change was aborted; the engine is left idle or in its prior
    /// mode, never half-transitioned.
    #[error("peripheral did not quiesce within the busy-wait budget")]
    DeviceBusy,

    /// The DMA engine refused to arm the cyclic descriptor.
    ///
    /// The engine falls back to idle.
    #[error("cyclic DMA transfer could not be armed")]
    TransferSetupFailed,

    /// A blocking call was cancelled by [`StreamDevice::interrupt`].
    ///
    /// [`StreamDevice::interrupt`]: crate::device::StreamDevice::interrupt
    #[error("interrupted")]
    Interrupted,

    /// A control-plane value was outside its legal range. Nothing was
    /// changed.
    #[error("{name} = {value} outside [{min}, {max}]")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Rejected value.
        value: i32,
        /// Inclusive minimum.
        min: i32,
        /// Inclusive maximum.
        max: i32,
    },

    /// Direction and channel address offsets would drive the same line.
    #[error("address offsets collide at bit {offset}")]
    OffsetConflict {
        /// The shared bit offset.
        offset: i32,
    },

    /// The bounce ring geometry is unusable.
    #[error("invalid bounce ring geometry")]
    InvalidGeometry,

    /// Queue or bounce ring allocation failed at open time.
    #[error("could not allocate {bytes} bytes of stream buffers")]
    ResourceExhausted {
        /// Size of the failed allocation.
        bytes: usize,
    },
}

/// Result alias for engine operations.
pub type Result<T, E = StreamError> = core::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_parameter_message_names_range() {
        let e = StreamError::InvalidParameter {
            name: "queue_multiplier",
            value: 40,
            min: 2,
            max: 32,
        };
        assert_eq!(e.to_string(), "queue_multiplier = 40 outside [2, 32]");
    }

    #[test]
    fn test_errors_are_copy_and_comparable() {
        let a = StreamError::DeviceBusy;
        let b = a;
        assert_eq!(a, b);
        assert_ne!(a, StreamError::Interrupted);
    }
}
