//! Bit-plane display driver for square HUB75 LED matrix panels.
//!
//! HUB75 panels have no memory of their own: the driver must scan row pairs
//! continuously, and perceived color depth comes from strobing each bit of a
//! color channel for a duration proportional to its binary weight. The
//! driver here runs as the only task of its execution context and owns the
//! two framebuffers outright.
//!
//! # Architecture
//!
//! Nested loops: outer per frame (infinite), middle per scan row, inner per
//! color bit. For each (row, bit) slot the driver:
//!
//! 1. polls the [frame link](crate::link) for a staged frame (non-blocking),
//! 2. shifts the row's pixel words out through the [`ShiftEngine`]
//!    (bit-offset select, DMA, two dummy sync pixels),
//! 3. while the row hardware is still busy latching (and only on the
//!    higher-order bits, whose latch pulses are long enough to be worth it)
//!    advances the incremental redraw of the back buffer,
//! 4. waits for the hardware to go idle and queues the next binary-weighted
//!    latch/output-enable pulse.
//!
//! When the redraw state machine returns to idle the frame is marked for
//! flipping; at the end of the full scan the front and back buffers are
//! swapped and the consumed token is handed back to the producer. That frame
//! boundary is the only place buffer ownership changes, so the producer can
//! never overwrite pixels that are still being scanned out.
//!
//! # Framebuffer layout
//!
//! The panel scans two physical rows per shift (rows `y` and `y + SCAN`
//! share a slot), so framebuffers are row-interleaved: pixel `(x, y)` lives
//! at word `y*SIZE*2 + 2x` for `y < SCAN` and `(y-SCAN)*SIZE*2 + 2x + 1`
//! otherwise. [`Image`] is the plain row-major staging format producers draw
//! into; the interleave conversion happens during the redraw copy.

#[cfg(not(feature = "host"))]
pub mod pio_engine;

use core::cell::RefCell;
use core::convert::Infallible;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embedded_graphics::Pixel;
use embedded_graphics::draw_target::DrawTarget;
use embedded_graphics::geometry::{OriginDimensions, Size};
use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use heapless::Vec;
use smart_leds::RGB8;

use crate::Result;
use crate::link::DisplayLink;
use crate::sim::{MAX_PARTICLES, Simulation};

/// Edge length of the (square) panel in pixels.
pub const SIZE: usize = 32;

/// Scan factor: number of row slots per frame. Each slot drives two physical
/// rows, so this must be exactly half of [`SIZE`].
pub const SCAN: usize = SIZE / 2;

/// Significant bits per color channel. Between 1 and 8; the scan skips the
/// `8 - BITDEPTH` least significant bits, trading color resolution for less
/// time spent per frame.
pub const BITDEPTH: u8 = 8;

/// Words shifted out per row slot (two interleaved rows of pixels).
pub const ROW_WORDS: usize = SIZE * 2;

/// Pixels per frame.
pub const PIXEL_COUNT: usize = SIZE * SIZE;

// Redraw work is only attempted on bits above this one; the latch pulse for
// low-order bits is too short to fit a useful slice.
const REDRAW_MIN_BIT: u8 = 4;

// Grains drawn per redraw slice.
const GRAINS_PER_SLICE: usize = 32;

/// Pack an LED color into the `0x00BBGGRR` wire format.
#[must_use]
pub const fn pack_color(color: RGB8) -> u32 {
    (color.b as u32) << 16 | (color.g as u32) << 8 | color.r as u32
}

// ============================================================================
// Image - row-major staging pixels
// ============================================================================

/// A plain row-major `SIZE`×`SIZE` pixel image, `0x00BBGGRR` per pixel.
///
/// This is the format content producers draw into and backgrounds are stored
/// in. It implements [`DrawTarget`], so the full
/// [`embedded-graphics`](https://docs.rs/embedded-graphics) API (lines,
/// shapes, text) works on it.
#[derive(Clone, Copy, Debug)]
pub struct Image(pub [u32; PIXEL_COUNT]);

impl Image {
    /// Create an all-black image.
    #[must_use]
    pub const fn new() -> Self {
        Self([0; PIXEL_COUNT])
    }

    /// Set pixel `(x, y)` to a packed `0x00BBGGRR` color.
    #[inline]
    pub fn set_pixel(&mut self, x: usize, y: usize, color: u32) {
        debug_assert!(x < SIZE && y < SIZE);
        self.0[y * SIZE + x] = color;
    }

    /// Packed color of pixel `(x, y)`.
    #[inline]
    #[must_use]
    pub fn pixel(&self, x: usize, y: usize) -> u32 {
        debug_assert!(x < SIZE && y < SIZE);
        self.0[y * SIZE + x]
    }

    /// Fill the whole image with one packed color.
    pub fn fill(&mut self, color: u32) {
        self.0 = [color; PIXEL_COUNT];
    }
}

impl Default for Image {
    fn default() -> Self {
        Self::new()
    }
}

impl OriginDimensions for Image {
    fn size(&self) -> Size {
        Size::new(SIZE as u32, SIZE as u32)
    }
}

impl DrawTarget for Image {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> core::result::Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(coord, color) in pixels {
            if coord.x >= 0 && coord.x < SIZE as i32 && coord.y >= 0 && coord.y < SIZE as i32 {
                self.set_pixel(
                    coord.x as usize,
                    coord.y as usize,
                    pack_color(RGB8::new(color.r(), color.g(), color.b())),
                );
            }
        }
        Ok(())
    }
}

// ============================================================================
// Framebuffer - interleaved scan-out pixels
// ============================================================================

/// One scan-ready framebuffer in the row-interleaved hardware layout.
///
/// Each of the [`SCAN`] row slots holds [`ROW_WORDS`] words covering two
/// physical rows, ready to hand to the shift engine unmodified.
#[derive(Clone, Copy, Debug)]
pub struct Framebuffer {
    slots: [[u32; ROW_WORDS]; SCAN],
}

impl Framebuffer {
    /// Create an all-black framebuffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [[0; ROW_WORDS]; SCAN],
        }
    }

    /// Store pixel `(x, y)`, converting to the interleaved layout.
    #[inline]
    pub fn set_pixel(&mut self, x: usize, y: usize, color: u32) {
        debug_assert!(x < SIZE && y < SIZE);
        if y < SCAN {
            self.slots[y][2 * x] = color;
        } else {
            self.slots[y - SCAN][2 * x + 1] = color;
        }
    }

    /// Packed color of pixel `(x, y)`.
    #[inline]
    #[must_use]
    pub fn pixel(&self, x: usize, y: usize) -> u32 {
        debug_assert!(x < SIZE && y < SIZE);
        if y < SCAN {
            self.slots[y][2 * x]
        } else {
            self.slots[y - SCAN][2 * x + 1]
        }
    }

    /// The shift words for one row slot.
    #[must_use]
    pub fn row_words(&self, row: usize) -> &[u32; ROW_WORDS] {
        &self.slots[row]
    }
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// The front/back framebuffer pair.
///
/// Owned exclusively by the display context, which is the single arbiter of
/// which buffer is front. `swap` exchanges the roles; it is called only at a
/// frame boundary, so the producer-visible staging data and the scanned-out
/// pixels can never alias.
pub struct DoubleBuffer {
    buffers: [Framebuffer; 2],
    front: usize,
}

impl DoubleBuffer {
    /// Create a pair of black framebuffers.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffers: [Framebuffer::new(), Framebuffer::new()],
            front: 0,
        }
    }

    /// The buffer currently being scanned out.
    #[must_use]
    pub fn front(&self) -> &Framebuffer {
        &self.buffers[self.front]
    }

    /// The buffer currently being redrawn.
    pub fn back_mut(&mut self) -> &mut Framebuffer {
        &mut self.buffers[1 - self.front]
    }

    /// Exchange front and back.
    pub fn swap(&mut self) {
        self.front = 1 - self.front;
    }
}

impl Default for DoubleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// FrameStage - producer -> display staging area
// ============================================================================

/// A particle snapshot entry: display cell plus color.
#[derive(Clone, Copy, Debug)]
pub struct StagedGrain {
    /// Cell column.
    pub x: u8,
    /// Cell row.
    pub y: u8,
    /// Packed `0x00BBGGRR` color.
    pub color: u32,
}

/// The data the producer stages for the display: a background (or fully
/// producer-rendered) image plus the current particle overlay.
pub struct StageData {
    /// Background / animation pixels, row-major.
    pub image: Image,
    /// Particle overlay, drawn on top of the image.
    pub grains: Vec<StagedGrain, MAX_PARTICLES>,
}

/// Shared staging area between the producer and display contexts.
///
/// The handshake protocol keeps access disjoint in time: the producer
/// writes only while it holds the frame (after `Consumed`, before `Ready`)
/// and the display reads only after `Ready`. The short critical sections
/// here make each individual access atomic on top of that.
pub struct FrameStage {
    inner: Mutex<CriticalSectionRawMutex, RefCell<StageData>>,
}

impl FrameStage {
    /// Create an empty stage (black image, no grains).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(StageData {
                image: Image::new(),
                grains: Vec::new(),
            })),
        }
    }

    /// Mutate the staged data. Producer side only.
    pub fn publish<R>(&self, writer: impl FnOnce(&mut StageData) -> R) -> R {
        self.inner.lock(|cell| writer(&mut cell.borrow_mut()))
    }

    /// Read the staged data. Display side only.
    pub fn with<R>(&self, reader: impl FnOnce(&StageData) -> R) -> R {
        self.inner.lock(|cell| reader(&cell.borrow()))
    }

    /// Replace the staged background image. Called at stage load.
    pub fn set_background(&self, image: &[u32; PIXEL_COUNT]) {
        self.publish(|data| data.image.0 = *image);
    }

    /// Snapshot the simulation's particle cells into the grain overlay.
    pub fn stage_particles<const W: usize, const H: usize>(&self, sim: &Simulation<W, H>) {
        self.publish(|data| {
            data.grains.clear();
            for particle in sim.particles() {
                let (x, y) = particle.cell();
                data.grains
                    .push(StagedGrain {
                        x: x as u8,
                        y: y as u8,
                        color: particle.color,
                    })
                    .expect("grain overlay capacity matches simulation capacity");
            }
        });
    }
}

impl Default for FrameStage {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Redraw state machine
// ============================================================================

/// State of the incremental back-buffer redraw.
///
/// The redraw is restartable: each variant carries its own cursor, so a
/// partially completed pass resumes exactly where it stopped. Work happens
/// only while the shift hardware reports it would otherwise be waiting, in
/// bounded slices (one background row, or one bounded run of grains) so a
/// slice always fits a hardware wait window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RedrawState {
    /// No redraw in progress.
    Idle,
    /// Copying the staged image into the back buffer, one row per slice.
    Clear {
        /// Next image row to copy.
        row: usize,
    },
    /// Drawing the grain overlay, one bounded run per slice.
    Particles {
        /// Next grain index to draw.
        index: usize,
    },
}

/// Advance the redraw machine while the engine still reports hardware-wait
/// time. With zero available slices the state comes back untouched. The
/// second return value is true only when the redraw ran to completion during
/// this call; an untouched `Idle` is "not started", never "finished".
fn advance_redraw<E: ShiftEngine>(
    mut state: RedrawState,
    engine: &E,
    stage: &FrameStage,
    back: &mut Framebuffer,
) -> (RedrawState, bool) {
    while engine.row_active() {
        state = match state {
            // Starting a fresh pass consumes the first slice.
            RedrawState::Idle => RedrawState::Clear { row: 0 },
            RedrawState::Clear { row } => {
                stage.with(|data| {
                    for x in 0..SIZE {
                        back.set_pixel(x, row, data.image.pixel(x, row));
                    }
                });
                if row + 1 >= SIZE {
                    RedrawState::Particles { index: 0 }
                } else {
                    RedrawState::Clear { row: row + 1 }
                }
            }
            RedrawState::Particles { index } => {
                let (end, total) = stage.with(|data| {
                    let end = (index + GRAINS_PER_SLICE).min(data.grains.len());
                    for grain in &data.grains[index..end] {
                        back.set_pixel(grain.x as usize, grain.y as usize, grain.color);
                    }
                    (end, data.grains.len())
                });
                if end >= total {
                    return (RedrawState::Idle, true);
                }
                RedrawState::Particles { index: end }
            }
        };
    }
    (state, false)
}

// ============================================================================
// ShiftEngine - the hardware seam
// ============================================================================

/// Capability the display core drives the shift-out hardware through.
///
/// The embedded implementation is [`pio_engine::PioShiftEngine`]; host tests
/// substitute a mock. All timing is the engine's business; the core only
/// promises to call `shift_row`/`wait_idle`/`latch` in scan order and to do
/// redraw work exclusively while [`row_active`](Self::row_active) holds.
pub trait ShiftEngine {
    /// Shift one row slot's pixel words for the given bit plane: select the
    /// bit offset, stream the words, push the two timing-sync dummy pixels,
    /// and reset the stall flags.
    async fn shift_row(&mut self, bit: u8, words: &[u32; ROW_WORDS]);

    /// Whether the row unit is still busy with the previous latch pulse,
    /// i.e. whether there is wait time left to spend on redraw slices.
    fn row_active(&self) -> bool;

    /// Spin until both shift units have drained. Bounded by hardware timing.
    fn wait_idle(&mut self);

    /// Queue the latch/output-enable pulse for `row`, with duration
    /// proportional to `2^bit` (the binary weighting that implements PWM
    /// brightness).
    fn latch(&mut self, row: u8, bit: u8);
}

// ============================================================================
// DisplayCore - the per-frame scan loop
// ============================================================================

/// The display context's frame loop: owns the framebuffers, multiplexes the
/// panel, and interleaves back-buffer redraws into hardware wait slots.
pub struct DisplayCore<'a> {
    buffers: &'a mut DoubleBuffer,
    stage: &'a FrameStage,
    link: DisplayLink<'a>,
    state: RedrawState,
    redraw_pending: bool,
    flip_pending: bool,
    frame_count: u32,
}

impl<'a> DisplayCore<'a> {
    /// Create the display core. `buffers` moves under the core's exclusive
    /// control; nothing else may touch either framebuffer afterwards.
    pub fn new(buffers: &'a mut DoubleBuffer, stage: &'a FrameStage, link: DisplayLink<'a>) -> Self {
        Self {
            buffers,
            stage,
            link,
            state: RedrawState::Idle,
            redraw_pending: false,
            flip_pending: false,
            frame_count: 0,
        }
    }

    /// Frames scanned out so far (wraps).
    #[must_use]
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Current redraw progress.
    #[must_use]
    pub fn redraw_state(&self) -> RedrawState {
        self.state
    }

    /// The buffer currently being scanned out.
    #[must_use]
    pub fn front(&self) -> &Framebuffer {
        self.buffers.front()
    }

    /// Scan one full frame: all row slots, all bit planes, plus the buffer
    /// flip and consumed handshake if the redraw finished during this frame.
    ///
    /// # Errors
    ///
    /// [`crate::Error::LinkDesync`] if the consumed slot is unexpectedly
    /// full at flip time. Fatal; the contexts are out of step.
    pub async fn scan_frame<E: ShiftEngine>(&mut self, engine: &mut E) -> Result<()> {
        for row in 0..SCAN {
            for bit in (8 - BITDEPTH)..8 {
                // Pick up a staged frame, but only once the previous redraw
                // and flip have fully settled.
                if !self.redraw_pending && !self.flip_pending && self.link.poll_ready() {
                    self.redraw_pending = true;
                }

                engine.shift_row(bit, self.buffers.front().row_words(row)).await;

                if bit > REDRAW_MIN_BIT && self.redraw_pending {
                    let (state, completed) =
                        advance_redraw(self.state, engine, self.stage, self.buffers.back_mut());
                    self.state = state;
                    if completed {
                        self.redraw_pending = false;
                        self.flip_pending = true;
                    }
                }

                engine.wait_idle();
                engine.latch(row as u8, bit);
            }
        }

        if self.flip_pending {
            self.flip_pending = false;
            self.buffers.swap();
            self.frame_count = self.frame_count.wrapping_add(1);
            // The only place buffer ownership transfers; exactly once per
            // completed frame.
            self.link.publish_consumed()?;
        }
        Ok(())
    }

    /// Run the scan loop forever.
    ///
    /// # Errors
    ///
    /// Propagates the fatal handshake errors of
    /// [`scan_frame`](Self::scan_frame); never returns otherwise.
    pub async fn run<E: ShiftEngine>(&mut self, engine: &mut E) -> Result<Infallible> {
        loop {
            self.scan_frame(engine).await?;
        }
    }
}
