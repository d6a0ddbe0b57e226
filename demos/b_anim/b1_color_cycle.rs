//! Procedural color cycle on a 32x32 HUB75 panel.
//!
//! Same display pipeline as the sand demo, fed by a [`ColorCycle`] content
//! source instead of the particle simulation. The scan loop neither knows
//! nor cares which producer is active.
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
use matrix_envoy::hub75::{DisplayCore, DoubleBuffer, FrameStage};
use matrix_envoy::link::FrameLink;
use matrix_envoy::pio_irqs::Pio0Irqs;
use matrix_envoy::source::{ColorCycle, ContentSource};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

/// Animation frames per second.
const TPS: u64 = 60;

const FRAME_TIMEOUT: Duration = Duration::from_micros(2 * 1_000_000 / TPS);

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
    info!("color cycle demo: 32x32 HUB75 panel, {} fps", TPS);

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

    spawn_core1(p.CORE1, CORE1_STACK.init(Stack::new()), move || {
        let executor = EXECUTOR1.init(Executor::new());
        executor.run(|spawner| {
            spawner
                .spawn(display_task(engine, buffers))
                .expect("display task spawns once");
        });
    });

    let mut source = ColorCycle::new(2);
    source.start();

    let sim_link = LINK.sim_link();
    let mut ticker = Ticker::every(Duration::from_micros(1_000_000 / TPS));
    let mut frame: u32 = 0;
    let mut skipped: u32 = 0;
    let mut last_warn = Instant::now();

    loop {
        ticker.next().await;

        if sim_link.wait_consumed(FRAME_TIMEOUT).await.is_err() {
            skipped = skipped.wrapping_add(1);
            if Instant::now() - last_warn >= Duration::from_secs(1) {
                warn!("display busy, {} animation frames skipped so far", skipped);
                last_warn = Instant::now();
            }
            continue;
        }

        STAGE.publish(|data| {
            source.draw(&mut data.image, frame);
            // Animations own the whole image; no particle overlay.
            data.grains.clear();
        });
        sim_link.publish_ready()?;
        frame = frame.wrapping_add(1);
    }
}
