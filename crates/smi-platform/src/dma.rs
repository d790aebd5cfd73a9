//! DMA abstraction layer
//!
//! Cyclic DMA between the SMI FIFO and a ring of bounce segments. The channel
//! walks segments `0..N-1` in order, wraps, and raises one completion per
//! segment until it is terminated.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

/// Direction of a DMA transfer relative to system memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaDirection {
    /// Peripheral FIFO → bounce ring (receive).
    DeviceToMemory,
    /// Bounce ring → peripheral FIFO (transmit).
    MemoryToDevice,
}

impl fmt::Display for DmaDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DeviceToMemory => "dev-to-mem",
            Self::MemoryToDevice => "mem-to-dev",
        })
    }
}

/// A cyclic descriptor spanning the whole bounce ring.
///
/// `period_len` bytes are moved between consecutive completion interrupts;
/// `buf_len` is always a whole multiple of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CyclicDescriptor {
    /// Bus address of segment 0.
    pub buf_phys: u64,
    /// Total ring length in bytes.
    pub buf_len: usize,
    /// Bytes per segment (one interrupt per period).
    pub period_len: usize,
    /// Transfer direction.
    pub direction: DmaDirection,
}

/// DMA channel abstraction
///
/// Completions are delivered by the platform glue calling the engine's
/// completion entry point once per period; this trait only arms and tears
/// down the transfer.
pub trait DmaChannel {
    /// Error type
    type Error: fmt::Debug;

    /// Prepare and submit a cyclic descriptor with a per-period interrupt.
    fn prepare_cyclic(&mut self, descriptor: &CyclicDescriptor) -> Result<(), Self::Error>;

    /// Start processing submitted descriptors.
    fn issue_pending(&mut self);

    /// Terminate the transfer and wait until no completion callback can run.
    ///
    /// Must be a no-op when nothing is armed.
    fn terminate_sync(&mut self);
}

/// Error returned for an unusable bounce ring geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GeometryError {
    /// Segment size is zero or not a multiple of the 32-bit transfer width.
    SegmentSize(usize),
    /// Fewer than two segments leaves no room for double buffering.
    SegmentCount(usize),
    /// `segment_size * segment_count` does not fit in `usize`.
    Overflow,
}

/// Size and count of the bounce segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BounceGeometry {
    segment_size: usize,
    segment_count: usize,
}

impl BounceGeometry {
    /// Bytes moved per SMI transfer.
    pub const TRANSFER_WIDTH: usize = 4;

    /// Default segment count (four-way cyclic ring).
    pub const DEFAULT_SEGMENT_COUNT: usize = 4;

    /// Default segment size: a 64 KiB ring split in four.
    pub const DEFAULT_SEGMENT_SIZE: usize = 16 * 1024;

    /// Validate and build a geometry.
    ///
    /// # Errors
    ///
    /// See [`GeometryError`].
    pub fn new(segment_size: usize, segment_count: usize) -> Result<Self, GeometryError> {
        if segment_size == 0 || segment_size % Self::TRANSFER_WIDTH != 0 {
            return Err(GeometryError::SegmentSize(segment_size));
        }
        if segment_count < 2 {
            return Err(GeometryError::SegmentCount(segment_count));
        }
        if segment_size.checked_mul(segment_count).is_none() {
            return Err(GeometryError::Overflow);
        }
        Ok(Self {
            segment_size,
            segment_count,
        })
    }

    /// Bytes per segment: the native transfer unit.
    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    /// Number of segments in the ring.
    pub fn segment_count(&self) -> usize {
        self.segment_count
    }

    /// Whole ring length in bytes.
    #[allow(clippy::arithmetic_side_effects)] // Safety: product checked in new()
    pub fn ring_len(&self) -> usize {
        self.segment_size * self.segment_count
    }

    /// 32-bit SMI transfers per segment.
    #[allow(clippy::arithmetic_side_effects)] // Safety: TRANSFER_WIDTH is a non-zero constant
    pub fn transfers_per_segment(&self) -> usize {
        self.segment_size / Self::TRANSFER_WIDTH
    }
}

impl Default for BounceGeometry {
    fn default() -> Self {
        Self {
            segment_size: Self::DEFAULT_SEGMENT_SIZE,
            segment_count: Self::DEFAULT_SEGMENT_COUNT,
        }
    }
}

/// The bounce ring: `segment_count` equally sized segments in one contiguous
/// allocation, consumed by the DMA engine in index order.
///
/// Allocated once per device open and freed on close. While a transfer is
/// armed the DMA engine owns the memory; the CPU touches exactly one segment
/// per completion.
pub struct BounceRing {
    buffer: Box<[u8]>,
    phys_base: u64,
    geometry: BounceGeometry,
}

impl BounceRing {
    /// Allocate a zeroed ring whose segment 0 sits at bus address `phys_base`.
    ///
    /// Returns `None` when the allocation cannot be satisfied.
    pub fn allocate(geometry: BounceGeometry, phys_base: u64) -> Option<Self> {
        let len = geometry.ring_len();
        let mut storage = Vec::new();
        storage.try_reserve_exact(len).ok()?;
        storage.resize(len, 0u8);
        Some(Self {
            buffer: storage.into_boxed_slice(),
            phys_base,
            geometry,
        })
    }

    /// Geometry this ring was allocated with.
    pub fn geometry(&self) -> BounceGeometry {
        self.geometry
    }

    /// Bus address of segment `index`, or `None` if out of range.
    pub fn phys_addr(&self, index: usize) -> Option<u64> {
        if index >= self.geometry.segment_count {
            return None;
        }
        let offset = index.checked_mul(self.geometry.segment_size)?;
        self.phys_base.checked_add(u64::try_from(offset).ok()?)
    }

    /// Descriptor covering the whole ring, one period per segment.
    pub fn descriptor(&self, direction: DmaDirection) -> CyclicDescriptor {
        CyclicDescriptor {
            buf_phys: self.phys_base,
            buf_len: self.geometry.ring_len(),
            period_len: self.geometry.segment_size,
            direction,
        }
    }

    /// Segment `index` (read-only).
    pub fn segment(&self, index: usize) -> Option<&[u8]> {
        let start = index.checked_mul(self.geometry.segment_size)?;
        let end = start.checked_add(self.geometry.segment_size)?;
        self.buffer.get(start..end)
    }

    /// Segment `index` (read-write).
    pub fn segment_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        let start = index.checked_mul(self.geometry.segment_size)?;
        let end = start.checked_add(self.geometry.segment_size)?;
        self.buffer.get_mut(start..end)
    }
}

impl fmt::Debug for BounceRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BounceRing")
            .field("phys_base", &self.phys_base)
            .field("geometry", &self.geometry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_rejects_unaligned_segment() {
        assert_eq!(
            BounceGeometry::new(6, 4),
            Err(GeometryError::SegmentSize(6))
        );
        assert_eq!(
            BounceGeometry::new(0, 4),
            Err(GeometryError::SegmentSize(0))
        );
    }

    #[test]
    fn test_geometry_rejects_single_segment() {
        assert_eq!(
            BounceGeometry::new(64, 1),
            Err(GeometryError::SegmentCount(1))
        );
    }

    #[test]
    fn test_geometry_rejects_overflowing_ring() {
        assert_eq!(
            BounceGeometry::new(usize::MAX - 3, 4),
            Err(GeometryError::Overflow)
        );
    }

    #[test]
    fn test_default_geometry_is_four_16k_segments() {
        let g = BounceGeometry::default();
        assert_eq!(g.segment_count(), 4);
        assert_eq!(g.segment_size(), 16 * 1024);
        assert_eq!(g.ring_len(), 64 * 1024);
        assert_eq!(g.transfers_per_segment(), 4096);
    }

    #[test]
    fn test_phys_addr_steps_by_segment_size() {
        let ring = BounceRing::allocate(BounceGeometry::new(256, 4).unwrap(), 0x1000).unwrap();
        assert_eq!(ring.phys_addr(0), Some(0x1000));
        assert_eq!(ring.phys_addr(3), Some(0x1000 + 3 * 256));
        assert_eq!(ring.phys_addr(4), None);
    }

    #[test]
    fn test_segments_are_disjoint() {
        let mut ring = BounceRing::allocate(BounceGeometry::new(8, 4).unwrap(), 0).unwrap();
        ring.segment_mut(1).unwrap().fill(0xAA);
        assert!(ring.segment(0).unwrap().iter().all(|&b| b == 0));
        assert!(ring.segment(1).unwrap().iter().all(|&b| b == 0xAA));
        assert!(ring.segment(2).unwrap().iter().all(|&b| b == 0));
        assert!(ring.segment(4).is_none());
    }

    #[test]
    fn test_descriptor_spans_whole_ring() {
        let ring = BounceRing::allocate(BounceGeometry::new(128, 4).unwrap(), 0x8000).unwrap();
        let d = ring.descriptor(DmaDirection::DeviceToMemory);
        assert_eq!(d.buf_phys, 0x8000);
        assert_eq!(d.buf_len, 512);
        assert_eq!(d.period_len, 128);
        assert_eq!(d.buf_len % d.period_len, 0);
    }
}
