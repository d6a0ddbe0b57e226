//! Alternate content producers for the display pipeline.
//!
//! The display core only ever scans out whatever buffer is front; it does
//! not care who drew it. A [`ContentSource`] is anything that can reset
//! itself and render one frame into the staged [`Image`]. The sand
//! simulation's siblings (procedural animations, cellular automata, games)
//! all plug in through this capability instead of a dispatch table.

use smart_leds::RGB8;

use crate::hub75::{Image, SIZE, pack_color};

/// A producer of display frames.
pub trait ContentSource {
    /// Reset to the initial state. Called on every mode start or reset.
    fn start(&mut self);

    /// Render one frame into `image`. `frame` is the producer-side tick
    /// counter, usually advancing at the configured ticks-per-second.
    fn draw(&mut self, image: &mut Image, frame: u32);
}

/// Full-screen diagonal rainbow sweep.
pub struct ColorCycle {
    /// Hue steps advanced per frame; larger is faster.
    speed: u32,
    phase: u32,
}

impl ColorCycle {
    /// Create a cycle advancing `speed` hue steps per frame (256 steps per
    /// full revolution).
    #[must_use]
    pub const fn new(speed: u32) -> Self {
        Self { speed, phase: 0 }
    }
}

impl ContentSource for ColorCycle {
    fn start(&mut self) {
        self.phase = 0;
    }

    fn draw(&mut self, image: &mut Image, _frame: u32) {
        for y in 0..SIZE {
            for x in 0..SIZE {
                let position = (self.phase + (x as u32 + y as u32) * 4) % 256;
                image.set_pixel(x, y, pack_color(wheel(position as u8)));
            }
        }
        self.phase = (self.phase + self.speed) % 256;
    }
}

/// Map a position on the 256-step color wheel to an RGB color.
fn wheel(position: u8) -> RGB8 {
    match position {
        0..=84 => RGB8::new(255 - 3 * position, 3 * position, 0),
        85..=169 => {
            let position = position - 85;
            RGB8::new(0, 255 - 3 * position, 3 * position)
        }
        _ => {
            let position = position - 170;
            RGB8::new(3 * position, 0, 255 - 3 * position)
        }
    }
}
