//! Streaming transfer engine for the SMI peripheral
//!
//! Moves a continuous byte stream between the SMI FIFO and user readers and
//! writers. A cyclic DMA transfer runs over a small ring of bounce segments;
//! a completion handler moves one segment per completion between the ring
//! and a byte queue; user I/O drains or fills those queues at its own pace.
//!
//! ```text
//! write ─▶ TX queue ─▶ completion ─▶ bounce segment ─▶ DMA ─▶ SMI
//! read  ◀─ RX queue ◀─ completion ◀─ bounce segment ◀─ DMA ◀─ SMI
//! ```
//!
//! # Modules
//!
//! - [`device`] - `StreamDevice`: open/close, mode changes, read/write/poll
//! - [`transfer`] - cyclic DMA buffer manager and length refresh
//! - [`completion`] - per-segment RX/TX completion paths
//! - [`queue`] - fixed-capacity byte queue
//! - [`mode`] - operating modes and the address selector
//! - [`config`] - validated open-time configuration
//! - [`control`] - control-plane command set
//!
//! # Features
//!
//! - `std`: host critical-section implementation and platform mocks
//! - `defmt`: Enable defmt derives

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

extern crate alloc;

pub mod completion;
pub mod config;
pub mod control;
pub mod counters;
pub mod device;
pub mod error;
pub mod mode;
pub mod notify;
pub mod queue;
pub mod transfer;

pub use completion::CompletionOutcome;
pub use config::{QueueMultiplier, StreamConfig};
pub use control::{ControlCommand, ControlReply};
pub use counters::{CounterSnapshot, Readiness, TransferCounters};
pub use device::{Hardware, PollReady, StreamDevice};
pub use error::{Result, StreamError};
pub use mode::{AddressOffset, AddressOffsets, OperatingMode, RxChannel, TransferDirection};
pub use queue::StreamQueue;
pub use transfer::{CyclicTransfer, TRANSFER_MULTIPLIER};
