//! The stream device: one explicit engine value per open.
//!
//! `StreamDevice` owns every piece of engine state (current mode, both
//! queues, counters, readiness flags, the transfer bundle) and is passed by
//! reference to every entry point. Share it across threads with `Arc`.
//!
//! # Locks
//!
//! | lock         | held by                              | completion side |
//! |--------------|--------------------------------------|-----------------|
//! | `state`      | `set_mode`, lazy TX arming           | never           |
//! | `read_lock`  | `read`, `flush`                      | never           |
//! | `write_lock` | `write`, `set_mode(Transmit)`        | never           |
//! | `rx`, `tx`   | one queue operation, critical section| same            |
//! | `transfer`   | short critical sections              | `try_borrow_mut`|
//!
//! Order: `state` before `write_lock`. `write` releases `write_lock` before
//! it takes `state` to arm the transmit DMA. The queue and transfer critical
//! sections never span an await, so a caller waiting on any lock never
//! holds a queue the completion context needs.
//!
//! Blocking calls capture the interrupt epoch on entry; [`StreamDevice::interrupt`]
//! bumps it and wakes everyone, and every wait started before the bump then
//! returns [`StreamError::Interrupted`].

use core::cell::{Cell, RefCell};
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use smi_platform::{BounceRing, DmaChannel, DmaDirection, SmiPeripheral};

use crate::completion::{next_segment, CompletionContext, CompletionOutcome};
use crate::config::StreamConfig;
use crate::counters::{CounterSnapshot, Readiness, TransferCounters};
use crate::error::{Result, StreamError};
use crate::mode::{AddressOffsets, OperatingMode};
use crate::notify::Notifier;
use crate::queue::{SharedQueue, StreamQueue};
use crate::transfer::CyclicTransfer;

type Cs = CriticalSectionRawMutex;

/// The hardware handed to [`StreamDevice::open`] and returned by
/// [`StreamDevice::close`].
#[derive(Debug)]
pub struct Hardware<P, D> {
    /// SMI peripheral.
    pub smi: P,
    /// DMA channel wired to the SMI FIFO.
    pub dma: D,
    /// Bus address of the bounce ring's first byte.
    pub bounce_phys: u64,
}

/// Readiness reported by [`StreamDevice::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PollReady {
    /// RX queue holds data.
    pub readable: bool,
    /// RX queue is not full. Keyed off the RX queue, not TX.
    pub writable: bool,
}

impl PollReady {
    /// At least one bit set.
    pub fn any(self) -> bool {
        self.readable || self.writable
    }
}

/// Streaming transfer engine over an SMI peripheral `P` and DMA channel `D`.
pub struct StreamDevice<P, D> {
    config: BlockingMutex<Cs, Cell<StreamConfig>>,
    state: Mutex<Cs, OperatingMode>,
    /// Mirror of `state` for lock-free reads.
    mode: AtomicU32,
    read_lock: Mutex<Cs, ()>,
    write_lock: Mutex<Cs, ()>,
    rx: SharedQueue,
    tx: SharedQueue,
    transfer: BlockingMutex<Cs, RefCell<CyclicTransfer<P, D>>>,
    counters: TransferCounters,
    readiness: Readiness,
    notifier: Notifier,
    interrupts: AtomicU32,
    nonblocking_read: AtomicBool,
    bounce_phys: u64,
}

impl<P: SmiPeripheral, D: DmaChannel> StreamDevice<P, D> {
    /// Validate `config`, allocate both queues and the bounce ring, and park
    /// the address lines in the idle configuration.
    ///
    /// # Errors
    ///
    /// Validation errors from [`StreamConfig::validate`], or
    /// [`StreamError::ResourceExhausted`] if an allocation fails. Nothing is
    /// retained on failure.
    pub fn open(config: StreamConfig, hardware: Hardware<P, D>) -> Result<Self> {
        config.validate()?;
        let capacity = config
            .queue_capacity()
            .ok_or(StreamError::ResourceExhausted { bytes: usize::MAX })?;
        let exhausted = StreamError::ResourceExhausted { bytes: capacity };
        let rx = StreamQueue::with_capacity(capacity).ok_or(exhausted)?;
        let tx = StreamQueue::with_capacity(capacity).ok_or(exhausted)?;
        let ring = BounceRing::allocate(config.geometry, hardware.bounce_phys).ok_or(
            StreamError::ResourceExhausted {
                bytes: config.geometry.ring_len(),
            },
        )?;

        let mut transfer = CyclicTransfer::new(hardware.smi, hardware.dma, ring, config.busy_wait);
        transfer
            .smi_mut()
            .set_address(config.offsets.address_for(OperatingMode::Idle));

        tracing::info!(
            unit = config.transfer_unit(),
            segments = config.geometry.segment_count(),
            queue = capacity,
            "stream device opened"
        );

        Ok(Self {
            config: BlockingMutex::new(Cell::new(config)),
            state: Mutex::new(OperatingMode::Idle),
            mode: AtomicU32::new(OperatingMode::Idle.as_raw()),
            read_lock: Mutex::new(()),
            write_lock: Mutex::new(()),
            rx: SharedQueue::new(rx),
            tx: SharedQueue::new(tx),
            transfer: BlockingMutex::new(RefCell::new(transfer)),
            counters: TransferCounters::new(),
            readiness: Readiness::new(),
            notifier: Notifier::new(),
            interrupts: AtomicU32::new(0),
            nonblocking_read: AtomicBool::new(false),
            bounce_phys: hardware.bounce_phys,
        })
    }

    /// Stop any transfer, free the buffers and hand the hardware back along
    /// with the current configuration (including control-plane changes).
    pub fn close(self) -> (Hardware<P, D>, StreamConfig) {
        let config = self.config.into_inner().into_inner();
        let mut transfer = self.transfer.into_inner().into_inner();
        transfer.stop();
        transfer
            .smi_mut()
            .set_address(config.offsets.address_for(OperatingMode::Idle));
        let (smi, dma, _ring) = transfer.into_parts();
        tracing::info!("stream device closed");
        (
            Hardware {
                smi,
                dma,
                bounce_phys: self.bounce_phys,
            },
            config,
        )
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    /// Current configuration.
    pub fn config(&self) -> StreamConfig {
        self.config.lock(Cell::get)
    }

    pub(crate) fn update_config(&self, f: impl FnOnce(&mut StreamConfig)) {
        self.config.lock(|cell| {
            let mut config = cell.get();
            f(&mut config);
            cell.set(config);
        });
    }

    /// Current operating mode.
    pub fn mode(&self) -> OperatingMode {
        OperatingMode::try_from(self.mode.load(Ordering::Acquire)).unwrap_or_default()
    }

    /// Bytes moved per DMA completion.
    pub fn native_transfer_unit(&self) -> usize {
        self.config().transfer_unit()
    }

    /// Completed and missed segment counts.
    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    /// Edge flags set by completions and cleared by [`poll`](Self::poll).
    pub fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    /// Make reads on an empty queue return 0 instead of waiting.
    pub fn set_nonblocking_read(&self, nonblocking: bool) {
        self.nonblocking_read.store(nonblocking, Ordering::Release);
    }

    /// `true` if empty-queue reads return immediately.
    pub fn nonblocking_read(&self) -> bool {
        self.nonblocking_read.load(Ordering::Acquire)
    }

    /// Direction of the armed DMA transfer, if any.
    pub fn armed(&self) -> Option<DmaDirection> {
        self.with_transfer(|t| t.armed()).ok().flatten()
    }

    /// Run `f` with exclusive access to the transfer bundle.
    ///
    /// Fails with [`StreamError::DeviceBusy`] when called re-entrantly from
    /// inside another transfer access.
    pub(crate) fn with_transfer<R>(&self, f: impl FnOnce(&mut CyclicTransfer<P, D>) -> R) -> Result<R> {
        self.transfer.lock(|cell| {
            cell.try_borrow_mut()
                .map(|mut t| f(&mut *t))
                .map_err(|_| StreamError::DeviceBusy)
        })
    }

    fn commit(&self, state: &mut OperatingMode, mode: OperatingMode) {
        *state = mode;
        self.mode.store(mode.as_raw(), Ordering::Release);
    }

    /// User-side queue access. The only failure is re-entrant use from
    /// inside another queue access.
    fn with_queue<R>(queue: &SharedQueue, f: impl FnOnce(&mut StreamQueue) -> R) -> Result<R> {
        queue.with(f).ok_or(StreamError::DeviceBusy)
    }

    fn park_address(&self, offsets: AddressOffsets) {
        let idle = offsets.address_for(OperatingMode::Idle);
        if self.with_transfer(|t| t.smi_mut().set_address(idle)).is_err() {
            tracing::warn!("could not park address lines");
        }
    }

    // ── Interruption ─────────────────────────────────────────────────────────

    /// Cancel every blocking call currently waiting. Calls made afterwards
    /// are unaffected.
    pub fn interrupt(&self) {
        self.interrupts.fetch_add(1, Ordering::AcqRel);
        self.notifier.notify_all();
    }

    fn epoch(&self) -> u32 {
        self.interrupts.load(Ordering::Acquire)
    }

    fn interrupted_since(&self, epoch: u32) -> bool {
        self.epoch() != epoch
    }

    async fn interrupted(&self, epoch: u32) {
        loop {
            let seen = self.notifier.generation();
            if self.interrupted_since(epoch) {
                return;
            }
            self.notifier.changed_since(seen).await;
        }
    }

    async fn acquire<'a, T>(
        &'a self,
        lock: &'a Mutex<Cs, T>,
        epoch: u32,
    ) -> Result<MutexGuard<'a, Cs, T>> {
        match select(lock.lock(), self.interrupted(epoch)).await {
            Either::First(guard) => Ok(guard),
            Either::Second(()) => Err(StreamError::Interrupted),
        }
    }

    async fn wait_for_change(&self, seen: u32, epoch: u32) -> Result<()> {
        self.notifier.changed_since(seen).await;
        if self.interrupted_since(epoch) {
            return Err(StreamError::Interrupted);
        }
        Ok(())
    }

    // ── Mode state machine ───────────────────────────────────────────────────

    /// Switch operating mode.
    ///
    /// Same mode: no-op. Otherwise stop any transfer, pass through idle, then
    /// enter `new`. Receive starts the cyclic DMA transfer at once. Transmit
    /// clears the TX queue and waits for the first write to start DMA.
    ///
    /// # Errors
    ///
    /// - [`StreamError::DeviceBusy`]: the peripheral stayed active after the
    ///   stop. The DMA transfer is already terminated, so the engine reports
    ///   idle and the address lines are left untouched until the next mode
    ///   change. Also returned if the new receive transfer could not settle.
    /// - [`StreamError::TransferSetupFailed`]: DMA arm refused; engine idle.
    /// - [`StreamError::Interrupted`]: cancelled while waiting for the state
    ///   lock (nothing changed) or, entering transmit, for the write lock
    ///   (engine idle).
    pub async fn set_mode(&self, new: OperatingMode) -> Result<()> {
        let epoch = self.epoch();
        let mut state = self.acquire(&self.state, epoch).await?;
        if *state == new {
            return Ok(());
        }
        let from = *state;
        let offsets = self.config().offsets;
        tracing::info!(%from, to = %new, "mode change");

        let quiesced = self.with_transfer(|t| {
            t.stop();
            !t.smi().is_active()
        })?;
        // the stop ran: nothing is armed any more, whatever the peripheral says
        self.commit(&mut state, OperatingMode::Idle);
        if !quiesced {
            tracing::warn!(%from, to = %new, "peripheral still active after stop");
            return Err(StreamError::DeviceBusy);
        }
        self.park_address(offsets);

        match new {
            OperatingMode::Idle => {}
            OperatingMode::Transmit => {
                let address = offsets.address_for(new);
                self.with_transfer(|t| t.smi_mut().set_address(address))?;
                {
                    let _serial = self.acquire(&self.write_lock, epoch).await?;
                    Self::with_queue(&self.tx, StreamQueue::reset)?;
                }
                self.readiness.mark_writeable();
                self.notifier.notify_all();
                self.commit(&mut state, new);
            }
            OperatingMode::Receive(_) => {
                let address = offsets.address_for(new);
                let started = self
                    .with_transfer(|t| {
                        t.smi_mut().set_address(address);
                        self.counters.reset();
                        t.start(DmaDirection::DeviceToMemory)
                    })
                    .and_then(|r| r);
                if let Err(e) = started {
                    tracing::warn!(error = %e, to = %new, "receive start failed, staying idle");
                    self.park_address(offsets);
                    return Err(e);
                }
                self.commit(&mut state, new);
            }
        }
        Ok(())
    }

    /// Arm the cyclic transmit transfer if the engine is in transmit mode
    /// and nothing is armed yet.
    async fn arm_transmit(&self, epoch: u32) -> Result<()> {
        let mut state = self.acquire(&self.state, epoch).await?;
        if *state != OperatingMode::Transmit {
            return Ok(());
        }
        let started = self
            .with_transfer(|t| {
                if t.armed().is_some() {
                    return Ok(());
                }
                self.counters.reset();
                t.start(DmaDirection::MemoryToDevice)
            })
            .and_then(|r| r);
        if let Err(e) = started {
            tracing::warn!(error = %e, "transmit start failed, falling back to idle");
            self.park_address(self.config().offsets);
            self.commit(&mut state, OperatingMode::Idle);
            return Err(e);
        }
        Ok(())
    }

    // ── User I/O ─────────────────────────────────────────────────────────────

    /// Copy up to `buf.len()` buffered RX bytes into `buf`.
    ///
    /// With an empty queue: returns 0 in non-blocking mode, otherwise waits
    /// for data.
    ///
    /// # Errors
    ///
    /// [`StreamError::Interrupted`] if [`interrupt`](Self::interrupt) lands
    /// while waiting.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let epoch = self.epoch();
        let _serial = self.acquire(&self.read_lock, epoch).await?;
        loop {
            let seen = self.notifier.generation();
            let n = Self::with_queue(&self.rx, |rx| rx.pop(buf))?;
            if n > 0 || buf.is_empty() || self.nonblocking_read() {
                return Ok(n);
            }
            self.wait_for_change(seen, epoch).await?;
        }
    }

    /// Queue up to `data.len()` bytes for transmission; returns the count
    /// accepted. Never waits for space: a full queue truncates.
    ///
    /// The first accepted bytes in transmit mode arm the DMA transfer.
    ///
    /// # Errors
    ///
    /// [`StreamError::Interrupted`] while waiting for a lock, or the start
    /// error if arming the transmit transfer failed (the engine is then idle).
    pub async fn write(&self, data: &[u8]) -> Result<usize> {
        let epoch = self.epoch();
        let accepted = {
            let _serial = self.acquire(&self.write_lock, epoch).await?;
            Self::with_queue(&self.tx, |tx| tx.push(data))?
        };
        if accepted > 0 && self.mode() == OperatingMode::Transmit && self.armed().is_none() {
            self.arm_transmit(epoch).await?;
        }
        Ok(accepted)
    }

    /// Discard everything buffered in the RX queue.
    ///
    /// # Errors
    ///
    /// [`StreamError::Interrupted`] while waiting for a lock.
    pub async fn flush(&self) -> Result<()> {
        let epoch = self.epoch();
        let _serial = self.acquire(&self.read_lock, epoch).await?;
        Self::with_queue(&self.rx, StreamQueue::discard_pending)?;
        tracing::debug!("rx queue flushed");
        Ok(())
    }

    /// Readiness of the stream. Clears the matching edge flags.
    ///
    /// `writable` reflects RX queue space, not TX. Takes no lock a completion
    /// could be left waiting on.
    pub async fn poll(&self) -> PollReady {
        let (empty, full) = self
            .rx
            .with(|rx| (rx.is_empty(), rx.is_full()))
            .unwrap_or((true, true));
        let mut ready = PollReady::default();
        if !empty {
            ready.readable = true;
            self.readiness.clear_readable();
        }
        if !full {
            ready.writable = true;
            self.readiness.clear_writeable();
        }
        ready
    }

    /// Wait until [`poll`](Self::poll) reports something.
    ///
    /// # Errors
    ///
    /// [`StreamError::Interrupted`].
    pub async fn wait_ready(&self) -> Result<PollReady> {
        let epoch = self.epoch();
        loop {
            let seen = self.notifier.generation();
            let ready = self.poll().await;
            if ready.any() {
                return Ok(ready);
            }
            self.wait_for_change(seen, epoch).await?;
        }
    }

    // ── DMA side ─────────────────────────────────────────────────────────────

    /// DMA completion entry point. Call once per finished bounce segment.
    ///
    /// Never blocks.
    pub fn on_segment_complete(&self) -> CompletionOutcome {
        let ctx = CompletionContext {
            rx: &self.rx,
            tx: &self.tx,
            counters: &self.counters,
            readiness: &self.readiness,
            notifier: &self.notifier,
        };
        self.transfer.lock(|cell| match cell.try_borrow_mut() {
            Ok(mut t) => ctx.dispatch(&mut *t),
            Err(_) => ctx.ring_busy(),
        })
    }

    /// Segment the next completion will touch, or `None` when nothing is
    /// armed.
    pub fn pending_segment(&self) -> Option<usize> {
        let (direction, count) = self
            .with_transfer(|t| t.armed().map(|d| (d, t.geometry().segment_count())))
            .ok()
            .flatten()?;
        Some(next_segment(direction, self.counters.completed(), count))
    }

    /// Run `f` on bounce segment `index`. Platform glue and simulations use
    /// this to stand in for the DMA engine.
    pub fn with_bounce_segment<R>(&self, index: usize, f: impl FnOnce(&mut [u8]) -> R) -> Option<R> {
        self.with_transfer(|t| t.segment_mut(index).map(f)).ok().flatten()
    }
}

impl<P, D> core::fmt::Debug for StreamDevice<P, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StreamDevice")
            .field(
                "mode",
                &OperatingMode::try_from(self.mode.load(Ordering::Relaxed)).unwrap_or_default(),
            )
            .field("counters", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}
