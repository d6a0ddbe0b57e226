//! Drive HUB75 LED matrix panels from the Pico with a falling-sand particle
//! engine.
//!
//! The crate splits the work across the RP2040's two cores:
//!
//! - A **producer context** steps the [simulation](sim) (or any other
//!   [content source](source)) once per tick and stages the result.
//! - A **display context** runs the [bit-plane scan loop](hub75)
//!   continuously, redrawing the back buffer opportunistically inside
//!   hardware wait slots.
//!
//! The two contexts communicate only through the single-slot
//! [frame link](link) and the staged frame data, so exactly one frame is in
//! flight at a time and the scan never reads pixels the producer is still
//! writing. If the display cannot keep up, the producer skips ticks instead
//! of queuing frames.
//!
//! See `demos/` for complete applications.
//!
//! # Glossary
//!
//! - **Bit-plane PWM**: perceived color depth from strobing each bit of a
//!   channel for a duration proportional to its binary weight.
//! - **Scan factor**: HUB75 panels light two rows per shift; a 32×32 panel
//!   is scanned as 16 row slots (1:16 scan).
//! - **Redraw slice**: one bounded unit of back-buffer redraw done during a
//!   single hardware wait window.
#![cfg_attr(not(feature = "host"), no_std)]
#![allow(async_fn_in_trait, reason = "single-threaded embedded")]

// Compile-time checks: exactly one board must be selected (unless testing with host feature)
#[cfg(all(not(any(feature = "pico1", feature = "pico2")), not(feature = "host")))]
compile_error!("Must enable exactly one board feature: 'pico1' or 'pico2'");

#[cfg(all(feature = "pico1", feature = "pico2"))]
compile_error!("Cannot enable both 'pico1' and 'pico2' features simultaneously");

// Compile-time checks: exactly one architecture must be selected (unless testing with host feature)
#[cfg(all(not(any(feature = "arm", feature = "riscv")), not(feature = "host")))]
compile_error!("Must enable exactly one architecture feature: 'arm' or 'riscv'");

#[cfg(all(feature = "arm", feature = "riscv"))]
compile_error!("Cannot enable both 'arm' and 'riscv' features simultaneously");

// Compile-time check: pico1 only supports ARM
#[cfg(all(feature = "pico1", feature = "riscv"))]
compile_error!("Pico 1 (RP2040) only supports ARM architecture, not RISC-V");

mod error;
pub mod hub75;
pub mod link;
#[cfg(not(feature = "host"))]
pub mod pio_irqs;
pub mod sim;
pub mod source;

// Re-export error types and result (used throughout)
pub use crate::error::{Error, Result};
