//! Hardware Abstraction Layer (HAL) for the SMI streaming engine
//!
//! This crate provides the trait boundary between the streaming transfer
//! engine (`smi-stream`) and the Secondary Memory Interface peripheral plus
//! its DMA channel, enabling development and testing without physical
//! hardware.
//!
//! # Architecture Layers
//!
//! ```text
//! User I/O (read / write / poll / control)
//!         ↓
//! Streaming engine (smi-stream: state machine, queues, completions)
//!         ↓
//! Platform HAL (this crate - trait abstractions)
//!         ↓
//! Register access + DMA engine (platform glue, out of tree)
//! ```
//!
//! # Modules
//!
//! - [`peripheral`] - SMI control/status operations the engine relies on
//! - [`dma`] - cyclic DMA descriptors, the channel trait and the bounce ring
//! - [`busy_wait`] - bounded polling loops with explicit iteration budgets
//! - `mocks` - host mocks with fault injection (`std` feature)
//!
//! # Features
//!
//! - `std`: Enable standard library support and the host mocks
//! - `defmt`: Enable defmt derives

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
// Pedantic lints suppressed for this hardware HAL crate:
#![allow(clippy::doc_markdown)] // register names in doc comments
#![allow(clippy::must_use_candidate)] // hardware accessors, callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

extern crate alloc;

pub mod busy_wait;
pub mod dma;
pub mod peripheral;

#[cfg(any(test, feature = "std"))]
pub mod mocks;

pub use busy_wait::{busy_wait_while, BusyWaitBudget};
pub use dma::{
    BounceGeometry, BounceRing, CyclicDescriptor, DmaChannel, DmaDirection, GeometryError,
};
pub use peripheral::{RegisterSnapshot, SmiPeripheral};
