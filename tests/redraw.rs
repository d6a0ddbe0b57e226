#![allow(missing_docs)]
//! Host-level tests for the framebuffers, redraw state machine, and the
//! display core's scan/flip/handshake behavior, driven through a mock shift
//! engine.

use std::cell::Cell;

use embassy_futures::block_on;
use matrix_envoy::Error;
use matrix_envoy::hub75::{
    BITDEPTH, DisplayCore, DoubleBuffer, FrameStage, Framebuffer, PIXEL_COUNT, ROW_WORDS,
    RedrawState, SCAN, SIZE, ShiftEngine, StagedGrain,
};
use matrix_envoy::link::FrameLink;

/// Scriptable stand-in for the PIO engine. `slices` is the total number of
/// hardware wait slots the scan will report; each `row_active` query while
/// the budget lasts consumes one.
struct MockEngine {
    slices: Cell<usize>,
    rows_shifted: usize,
    latches: Vec<(u8, u8)>,
}

impl MockEngine {
    fn with_slices(slices: usize) -> Self {
        Self {
            slices: Cell::new(slices),
            rows_shifted: 0,
            latches: Vec::new(),
        }
    }
}

impl ShiftEngine for MockEngine {
    async fn shift_row(&mut self, _bit: u8, _words: &[u32; ROW_WORDS]) {
        self.rows_shifted += 1;
    }

    fn row_active(&self) -> bool {
        let remaining = self.slices.get();
        if remaining > 0 {
            self.slices.set(remaining - 1);
            true
        } else {
            false
        }
    }

    fn wait_idle(&mut self) {}

    fn latch(&mut self, row: u8, bit: u8) {
        self.latches.push((row, bit));
    }
}

fn graded_background() -> [u32; PIXEL_COUNT] {
    // Distinct non-zero value per pixel so misaddressing shows up.
    let mut image = [0u32; PIXEL_COUNT];
    for (index, pixel) in image.iter_mut().enumerate() {
        *pixel = index as u32 + 1;
    }
    image
}

#[test]
fn framebuffer_interleaves_row_pairs() {
    let mut framebuffer = Framebuffer::new();

    // Upper half: even word slots of the shared row.
    framebuffer.set_pixel(3, 2, 0xaa);
    assert_eq!(framebuffer.row_words(2)[6], 0xaa);

    // Lower half: odd word slots of the row SCAN slots earlier.
    framebuffer.set_pixel(3, 2 + SCAN, 0xbb);
    assert_eq!(framebuffer.row_words(2)[7], 0xbb);

    framebuffer.set_pixel(0, SCAN, 0xcc);
    assert_eq!(framebuffer.row_words(0)[1], 0xcc);

    assert_eq!(framebuffer.pixel(3, 2), 0xaa);
    assert_eq!(framebuffer.pixel(3, 2 + SCAN), 0xbb);
}

#[test]
fn scan_covers_every_row_and_bit_plane() {
    let link = FrameLink::new();
    let stage = FrameStage::new();
    let mut buffers = DoubleBuffer::new();
    let mut core = DisplayCore::new(&mut buffers, &stage, link.display_link());
    let mut engine = MockEngine::with_slices(0);

    block_on(core.scan_frame(&mut engine)).expect("no handshake activity");

    let slots = SCAN * BITDEPTH as usize;
    assert_eq!(engine.rows_shifted, slots);
    assert_eq!(engine.latches.len(), slots);
    assert_eq!(engine.latches[0], (0, 8 - BITDEPTH));
    assert_eq!(engine.latches[slots - 1], (SCAN as u8 - 1, 7));
}

#[test]
fn no_token_means_no_flip() {
    let link = FrameLink::new();
    let stage = FrameStage::new();
    let mut buffers = DoubleBuffer::new();
    let mut core = DisplayCore::new(&mut buffers, &stage, link.display_link());
    let mut engine = MockEngine::with_slices(10_000);

    block_on(core.scan_frame(&mut engine)).expect("nothing staged");

    assert_eq!(core.frame_count(), 0);
    assert_eq!(core.redraw_state(), RedrawState::Idle);
}

#[test]
fn zero_slices_leave_the_machine_untouched() {
    let link = FrameLink::new();
    let sim = link.sim_link();
    let stage = FrameStage::new();
    let mut buffers = DoubleBuffer::new();
    let mut core = DisplayCore::new(&mut buffers, &stage, link.display_link());

    assert!(sim.try_take_consumed(), "drain the boot seed");
    sim.publish_ready().expect("slot free");

    let mut engine = MockEngine::with_slices(0);
    block_on(core.scan_frame(&mut engine)).expect("no flip without slices");

    // Idle stays idle; no flip, no consumed token.
    assert_eq!(core.redraw_state(), RedrawState::Idle);
    assert_eq!(core.frame_count(), 0);
    assert!(!sim.try_take_consumed());
}

#[test]
fn partial_clear_progress_is_preserved_exactly() {
    let link = FrameLink::new();
    let sim = link.sim_link();
    let stage = FrameStage::new();
    stage.set_background(&graded_background());
    let mut buffers = DoubleBuffer::new();
    let mut core = DisplayCore::new(&mut buffers, &stage, link.display_link());

    assert!(sim.try_take_consumed());
    sim.publish_ready().expect("slot free");

    // One slice starts the pass, nine copy rows 0..=8.
    let mut engine = MockEngine::with_slices(10);
    block_on(core.scan_frame(&mut engine)).expect("partial redraw");
    assert_eq!(core.redraw_state(), RedrawState::Clear { row: 9 });
    assert_eq!(core.frame_count(), 0, "no flip until the redraw completes");
    assert!(!sim.try_take_consumed());

    // Refill the budget; the pass resumes at row 9, finishes, and flips.
    engine.slices.set(10_000);
    block_on(core.scan_frame(&mut engine)).expect("completing redraw");
    assert_eq!(core.redraw_state(), RedrawState::Idle);
    assert_eq!(core.frame_count(), 1);
    assert!(sim.try_take_consumed(), "flip hands the frame back");
}

#[test]
fn completed_redraw_flips_to_the_staged_pixels() {
    let link = FrameLink::new();
    let sim = link.sim_link();
    let stage = FrameStage::new();
    let background = graded_background();
    stage.set_background(&background);
    stage.publish(|data| {
        data.grains
            .push(StagedGrain {
                x: 3,
                y: 2,
                color: 0x00ab_cdef,
            })
            .expect("fits");
        data.grains
            .push(StagedGrain {
                x: 3,
                y: 18,
                color: 0x0012_3456,
            })
            .expect("fits");
    });

    let mut buffers = DoubleBuffer::new();
    let mut core = DisplayCore::new(&mut buffers, &stage, link.display_link());

    assert!(sim.try_take_consumed());
    sim.publish_ready().expect("slot free");

    let mut engine = MockEngine::with_slices(10_000);
    block_on(core.scan_frame(&mut engine)).expect("full redraw");
    assert_eq!(core.frame_count(), 1);

    // Background everywhere, grains drawn on top.
    let front = core.front();
    assert_eq!(front.pixel(0, 0), 1);
    assert_eq!(front.pixel(SIZE - 1, SIZE - 1), PIXEL_COUNT as u32);
    assert_eq!(front.pixel(3, 2), 0x00ab_cdef);
    assert_eq!(front.pixel(3, 18), 0x0012_3456);
    assert_eq!(front.pixel(4, 2), background[2 * SIZE + 4]);
}

#[test]
fn consumed_token_is_emitted_exactly_once_per_flip() {
    let link = FrameLink::new();
    let sim = link.sim_link();
    let stage = FrameStage::new();
    stage.set_background(&graded_background());
    let mut buffers = DoubleBuffer::new();
    let mut core = DisplayCore::new(&mut buffers, &stage, link.display_link());

    assert!(sim.try_take_consumed());
    sim.publish_ready().expect("slot free");

    let mut engine = MockEngine::with_slices(10_000);
    block_on(core.scan_frame(&mut engine)).expect("full redraw");
    assert!(sim.try_take_consumed(), "one token per flip");
    assert!(!sim.try_take_consumed(), "never a second token");

    // Another frame with nothing staged: no flip, no token.
    engine.slices.set(10_000);
    block_on(core.scan_frame(&mut engine)).expect("idle frame");
    assert_eq!(core.frame_count(), 1);
    assert!(!sim.try_take_consumed());
}

#[test]
fn flipping_into_a_full_consumed_slot_is_fatal() {
    let link = FrameLink::new();
    let stage = FrameStage::new();
    stage.set_background(&graded_background());
    let mut buffers = DoubleBuffer::new();
    let mut core = DisplayCore::new(&mut buffers, &stage, link.display_link());

    // The boot seed is never drained, so the consumed slot is still full
    // when the flip tries to hand the frame back.
    link.sim_link().publish_ready().expect("slot free");

    let mut engine = MockEngine::with_slices(10_000);
    let result = block_on(core.scan_frame(&mut engine));
    assert!(matches!(result, Err(Error::LinkDesync)));
}
