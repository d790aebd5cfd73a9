//! Mock implementations for testing
//!
//! `MockSmi` and `MockDma` share their state behind an `Arc`, so a test can
//! keep a clone for inspection and fault injection after handing the other
//! clone to the engine.

extern crate std;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::vec::Vec;

use embedded_hal::delay::DelayNs;

use crate::dma::{CyclicDescriptor, DmaChannel, DmaDirection};
use crate::peripheral::{RegisterSnapshot, SmiPeripheral};

/// Maximum number of events kept in the mock peripheral log.
pub const EVENT_LOG_DEPTH: usize = 512;

/// One operation performed on the mock peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmiEvent {
    /// `enable(direction)`
    Enable(DmaDirection),
    /// `disable()`
    Disable,
    /// `clear_fifo()`
    ClearFifo,
    /// `set_transfer_length(n)`
    Length(u32),
    /// `start()`
    Start,
    /// `set_address(a)`
    Address(u8),
    /// `restore_settings()`
    RestoreSettings,
    /// `apply_settings(..)`
    ApplySettings,
}

/// Opaque settings value for the mock: a width/timing word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MockSettings {
    /// Data width code.
    pub width: u8,
    /// Strobe timing in cycles.
    pub strobe: u8,
}

#[derive(Debug, Default)]
struct SmiState {
    enabled: bool,
    started: bool,
    write: bool,
    length: u32,
    address: u8,
    settings: MockSettings,
    stuck_active: bool,
    stuck_enabled: bool,
    delay_ns: u64,
    events: heapless::Vec<SmiEvent, EVENT_LOG_DEPTH>,
}

impl SmiState {
    fn record(&mut self, event: SmiEvent) {
        // Store events for verification
        if self.events.len() < self.events.capacity() {
            let _ = self.events.push(event);
        }
    }
}

/// Mock SMI peripheral.
///
/// ACTIVE reads as set between `start()` and the next `disable()`,
/// `enable()` or [`finish_transfer`](Self::finish_transfer), unless forced
/// with [`set_stuck_active`](Self::set_stuck_active).
#[derive(Debug, Clone, Default)]
pub struct MockSmi {
    state: Arc<Mutex<SmiState>>,
}

impl MockSmi {
    /// Create new mock peripheral
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SmiState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Force the ACTIVE flag on, simulating a peripheral that never quiesces.
    pub fn set_stuck_active(&self, stuck: bool) {
        self.state().stuck_active = stuck;
    }

    /// Force the ENABLE bit on, simulating a failed disable.
    pub fn set_stuck_enabled(&self, stuck: bool) {
        self.state().stuck_enabled = stuck;
    }

    /// Simulate the programmed length running out: ACTIVE drops.
    pub fn finish_transfer(&self) {
        self.state().started = false;
    }

    /// Current external address.
    pub fn address(&self) -> u8 {
        self.state().address
    }

    /// Last programmed transfer length.
    pub fn transfer_length(&self) -> u32 {
        self.state().length
    }

    /// `true` if WRITE is set (transmit direction).
    pub fn write_enabled(&self) -> bool {
        self.state().write
    }

    /// Total time spent in `DelayNs` calls.
    pub fn delayed_ns(&self) -> u64 {
        self.state().delay_ns
    }

    /// Snapshot of the event log.
    pub fn events(&self) -> Vec<SmiEvent> {
        self.state().events.iter().copied().collect()
    }

    /// Addresses driven so far, in order.
    pub fn address_history(&self) -> Vec<u8> {
        self.state()
            .events
            .iter()
            .filter_map(|e| match e {
                SmiEvent::Address(a) => Some(*a),
                _ => None,
            })
            .collect()
    }

    /// Number of `start()` calls (length refreshes).
    pub fn start_count(&self) -> usize {
        self.state()
            .events
            .iter()
            .filter(|e| matches!(e, SmiEvent::Start))
            .count()
    }

    /// Clear the event log.
    pub fn clear_events(&self) {
        self.state().events.clear();
    }
}

impl DelayNs for MockSmi {
    fn delay_ns(&mut self, ns: u32) {
        let mut s = self.state();
        s.delay_ns = s.delay_ns.saturating_add(u64::from(ns));
    }
}

impl SmiPeripheral for MockSmi {
    type Settings = MockSettings;

    fn is_enabled(&self) -> bool {
        let s = self.state();
        s.enabled || s.stuck_enabled
    }

    fn is_active(&self) -> bool {
        let s = self.state();
        s.stuck_active || (s.enabled && s.started)
    }

    fn disable(&mut self) {
        let mut s = self.state();
        s.enabled = false;
        s.started = false;
        s.write = false;
        s.record(SmiEvent::Disable);
    }

    fn enable(&mut self, direction: DmaDirection) {
        let mut s = self.state();
        s.enabled = true;
        s.started = false;
        s.write = direction == DmaDirection::MemoryToDevice;
        s.record(SmiEvent::Enable(direction));
    }

    fn clear_fifo(&mut self) {
        self.state().record(SmiEvent::ClearFifo);
    }

    fn set_transfer_length(&mut self, transfers: u32) {
        let mut s = self.state();
        s.length = transfers;
        s.record(SmiEvent::Length(transfers));
    }

    fn start(&mut self) {
        let mut s = self.state();
        if s.enabled {
            s.started = true;
        }
        s.record(SmiEvent::Start);
    }

    fn set_address(&mut self, address: u8) {
        let mut s = self.state();
        s.address = address;
        s.record(SmiEvent::Address(address));
    }

    fn restore_settings(&mut self) {
        self.state().record(SmiEvent::RestoreSettings);
    }

    fn settings(&self) -> MockSettings {
        self.state().settings
    }

    fn apply_settings(&mut self, settings: MockSettings) {
        let mut s = self.state();
        s.settings = settings;
        s.record(SmiEvent::ApplySettings);
    }

    fn registers(&self) -> RegisterSnapshot {
        let s = self.state();
        RegisterSnapshot {
            control_status: u32::from(s.enabled)
                | (u32::from(s.started) << 1)
                | (u32::from(s.write) << 5),
            length: s.length,
            dma_control: 0,
            direct_write0: 0,
        }
    }
}

/// Error returned by [`MockDma`] when arming is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockDmaError;

#[derive(Debug, Default)]
struct DmaState {
    prepared: Vec<CyclicDescriptor>,
    issued: usize,
    terminated: usize,
    armed: bool,
    fail_prepare: bool,
}

/// Mock cyclic DMA channel.
#[derive(Debug, Clone, Default)]
pub struct MockDma {
    state: Arc<Mutex<DmaState>>,
}

impl MockDma {
    /// Create new mock DMA channel
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, DmaState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `prepare_cyclic` calls fail.
    pub fn set_fail_prepare(&self, fail: bool) {
        self.state().fail_prepare = fail;
    }

    /// Descriptors submitted so far.
    pub fn prepared(&self) -> Vec<CyclicDescriptor> {
        self.state().prepared.clone()
    }

    /// Number of `issue_pending` calls.
    pub fn issued(&self) -> usize {
        self.state().issued
    }

    /// Number of `terminate_sync` calls.
    pub fn terminated(&self) -> usize {
        self.state().terminated
    }

    /// `true` between `issue_pending` and `terminate_sync`.
    pub fn is_armed(&self) -> bool {
        self.state().armed
    }
}

impl DmaChannel for MockDma {
    type Error = MockDmaError;

    fn prepare_cyclic(&mut self, descriptor: &CyclicDescriptor) -> Result<(), MockDmaError> {
        let mut s = self.state();
        if s.fail_prepare {
            return Err(MockDmaError);
        }
        s.prepared.push(*descriptor);
        Ok(())
    }

    fn issue_pending(&mut self) {
        let mut s = self.state();
        s.issued = s.issued.saturating_add(1);
        s.armed = true;
    }

    fn terminate_sync(&mut self) {
        let mut s = self.state();
        s.terminated = s.terminated.saturating_add(1);
        s.armed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_smi_active_only_after_start() {
        let mut smi = MockSmi::new();
        assert!(!smi.is_active());
        smi.enable(DmaDirection::DeviceToMemory);
        assert!(!smi.is_active());
        smi.start();
        assert!(smi.is_active());
        smi.disable();
        assert!(!smi.is_active());
        assert!(!smi.is_enabled());
    }

    #[test]
    fn test_mock_smi_start_while_disabled_stays_idle() {
        let mut smi = MockSmi::new();
        smi.start();
        assert!(!smi.is_active());
    }

    #[test]
    fn test_mock_smi_clones_share_state() {
        let mut smi = MockSmi::new();
        let probe = smi.clone();
        smi.set_address(0b0100);
        assert_eq!(probe.address(), 0b0100);
        assert_eq!(probe.address_history(), [0b0100]);
    }

    #[test]
    fn test_mock_smi_fault_injection() {
        let mut smi = MockSmi::new();
        smi.set_stuck_active(true);
        smi.set_stuck_enabled(true);
        smi.disable();
        assert!(smi.is_active());
        assert!(smi.is_enabled());
    }

    #[test]
    fn test_mock_smi_write_flag_follows_direction() {
        let mut smi = MockSmi::new();
        smi.enable(DmaDirection::MemoryToDevice);
        assert!(smi.write_enabled());
        smi.enable(DmaDirection::DeviceToMemory);
        assert!(!smi.write_enabled());
    }

    #[test]
    fn test_mock_dma_refuses_when_told() {
        let mut dma = MockDma::new();
        let d = CyclicDescriptor {
            buf_phys: 0,
            buf_len: 64,
            period_len: 16,
            direction: DmaDirection::DeviceToMemory,
        };
        assert_eq!(dma.prepare_cyclic(&d), Ok(()));
        dma.set_fail_prepare(true);
        assert_eq!(dma.prepare_cyclic(&d), Err(MockDmaError));
        assert_eq!(dma.prepared().len(), 1);
    }

    #[test]
    fn test_mock_dma_armed_between_issue_and_terminate() {
        let mut dma = MockDma::new();
        dma.issue_pending();
        assert!(dma.is_armed());
        dma.terminate_sync();
        assert!(!dma.is_armed());
        dma.terminate_sync();
        assert_eq!(dma.terminated(), 2);
    }
}
