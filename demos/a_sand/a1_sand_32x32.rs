//! Falling sand on a 32x32 HUB75 panel.
//!
//! Core 1 scans the panel; core 0 steps the simulation at 120 ticks per
//! second. The tilt vector sweeps through eight compass directions so the
//! sand slides around the ledges without an accelerometer attached.
#![no_std]
#![no_main]
#![cfg(not(feature = "host"))]

use core::convert::Infallible;

use defmt::{info, warn};
use embassy_executor::{Executor, Spawner};
use embassy_rp::multicore::{Stack, spawn_core1};
use embassy_rp::peripherals::DMA_CH0;
use embassy_rp::pio::Pio;
use embassy_time::{Duration, Instant, Ticker};
use matrix_envoy::Result;
use matrix_envoy::hub75::pio_engine::PioShiftEngine;
use matrix_envoy::hub75::{DisplayCore, DoubleBuffer, FrameStage, PIXEL_COUNT, SIZE, pack_color};
use matrix_envoy::link::FrameLink;
use matrix_envoy::pio_irqs::Pio0Irqs;
use matrix_envoy::sim::{SimTuning, Simulation};
use smart_leds::RGB8;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

/// Simulation ticks per second.
const TPS: u64 = 120;

/// Producer-side wait for the display to hand the frame back. Two frame
/// periods; anything longer means the display is overloaded and the tick is
/// skipped.
const FRAME_TIMEOUT: Duration = Duration::from_micros(2 * 1_000_000 / TPS);

const LEDGE_COLOR: u32 = pack_color(RGB8::new(64, 64, 64));

const GRAIN_PALETTE: [u32; 4] = [
    pack_color(RGB8::new(255, 176, 32)),
    pack_color(RGB8::new(255, 128, 16)),
    pack_color(RGB8::new(224, 200, 64)),
    pack_color(RGB8::new(255, 96, 32)),
];

/// Background obstacles: two offset ledges for the sand to pile on.
const BACKGROUND: [u32; PIXEL_COUNT] = build_background();

const fn build_background() -> [u32; PIXEL_COUNT] {
    let mut image = [0u32; PIXEL_COUNT];
    let mut upper = 4;
    while upper < 20 {
        image[12 * SIZE + upper] = LEDGE_COLOR;
        upper += 1;
    }
    let mut lower = 14;
    while lower < 28 {
        image[22 * SIZE + lower] = LEDGE_COLOR;
        lower += 1;
    }
    image
}

/// Initial pour: a 16x8 block of grains near the top of the field.
const GRAIN_COUNT: usize = 128;
const GRAINS: [(u16, u16, u32); GRAIN_COUNT] = build_grains();

const fn build_grains() -> [(u16, u16, u32); GRAIN_COUNT] {
    let mut table = [(0u16, 0u16, 0u32); GRAIN_COUNT];
    let mut index = 0;
    while index < GRAIN_COUNT {
        let x = index % 16 + 8;
        let y = index / 16;
        table[index] = (x as u16, y as u16, GRAIN_PALETTE[index % 4]);
        index += 1;
    }
    table
}

/// Synthetic tilt sweep standing in for the accelerometer: eight compass
/// directions, scaled the way a +/-1 g sensor reading would be.
const TILT_TABLE: [(i32, i32); 8] = [
    (48, 0),
    (34, 34),
    (0, 48),
    (-34, 34),
    (-48, 0),
    (-34, -34),
    (0, -48),
    (34, -34),
];

static LINK: FrameLink = FrameLink::new();
static STAGE: FrameStage = FrameStage::new();
static BUFFERS: StaticCell<DoubleBuffer> = StaticCell::new();
static CORE1_STACK: StaticCell<Stack<8192>> = StaticCell::new();
static EXECUTOR1: StaticCell<Executor> = StaticCell::new();

#[embassy_executor::task]
async fn display_task(
    mut engine: PioShiftEngine<'static, DMA_CH0>,
    buffers: &'static mut DoubleBuffer,
) {
    let mut core = DisplayCore::new(buffers, &STAGE, LINK.display_link());
    let err = core.run(&mut engine).await.unwrap_err();
    core::panic!("{err}");
}

#[embassy_executor::main]
async fn main(spawner: Spawner) -> ! {
    let err = inner_main(spawner).await.unwrap_err();
    core::panic!("{err}");
}

async fn inner_main(_spawner: Spawner) -> Result<Infallible> {
    let p = embassy_rp::init(Default::default());
    info!("sand demo: 32x32 HUB75 panel, 1:16 scan, {} tps", TPS);

    let engine = PioShiftEngine::new(
        Pio::new(p.PIO0, Pio0Irqs),
        p.DMA_CH0,
        (p.PIN_6, p.PIN_7, p.PIN_8),
        (p.PIN_9, p.PIN_10, p.PIN_11),
        p.PIN_16,
        (p.PIN_12, p.PIN_13, p.PIN_14, p.PIN_15),
        p.PIN_17,
        p.PIN_18,
    );
    let buffers = BUFFERS.init(DoubleBuffer::new());

    // The display loop gets core 1 to itself.
    spawn_core1(p.CORE1, CORE1_STACK.init(Stack::new()), move || {
        let executor = EXECUTOR1.init(Executor::new());
        executor.run(|spawner| {
            spawner
                .spawn(display_task(engine, buffers))
                .expect("display task spawns once");
        });
    });

    let mut sim: Simulation<SIZE, SIZE> = Simulation::new(SimTuning::default(), 0x5eed_cafe);
    sim.load_background(&BACKGROUND);
    sim.load_particles(&GRAINS)?;
    STAGE.set_background(&BACKGROUND);

    let sim_link = LINK.sim_link();
    let tick_period = Duration::from_micros(1_000_000 / TPS);
    let mut ticker = Ticker::every(tick_period);
    let mut frame: u32 = 0;
    let mut skipped: u32 = 0;
    let mut overruns: u32 = 0;
    let mut last_warn = Instant::now();

    loop {
        ticker.next().await;
        let tick_start = Instant::now();

        // Backpressure: if the display has not released the frame, skip this
        // tick rather than queue. Warnings are rate limited to one a second.
        if sim_link.wait_consumed(FRAME_TIMEOUT).await.is_err() {
            skipped = skipped.wrapping_add(1);
            if Instant::now() - last_warn >= Duration::from_secs(1) {
                warn!("display busy, {} simulation ticks skipped so far", skipped);
                last_warn = Instant::now();
            }
            continue;
        }

        let sweep = (frame / (TPS as u32 * 4)) as usize % TILT_TABLE.len();
        let (ax, ay) = TILT_TABLE[sweep];
        sim.iterate(ax, ay, 0);

        STAGE.stage_particles(&sim);
        sim_link.publish_ready()?;
        frame = frame.wrapping_add(1);

        // A tick that fills its whole period means the core is saturated.
        if Instant::now() - tick_start >= tick_period {
            overruns = overruns.wrapping_add(1);
            if Instant::now() - last_warn >= Duration::from_secs(1) {
                warn!("cpu near 100%, {} tick overruns so far", overruns);
                last_warn = Instant::now();
            }
        }
    }
}
