//! Shared PIO interrupt bindings.
//!
//! One binding struct per PIO block; devices that claim state machines on
//! the same block share the binding.
#![allow(missing_docs)]

use embassy_rp::peripherals::PIO0;
use embassy_rp::pio::InterruptHandler;

embassy_rp::bind_interrupts!(pub struct Pio0Irqs {
    PIO0_IRQ_0 => InterruptHandler<PIO0>;
});
