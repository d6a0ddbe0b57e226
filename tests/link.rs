#![allow(missing_docs)]
//! Host-level tests for the frame synchronization protocol.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread;

use matrix_envoy::Error;
use matrix_envoy::link::FrameLink;

#[test]
fn consumed_slot_starts_full() {
    let link = FrameLink::new();
    let sim = link.sim_link();
    // The back buffer is trivially reusable at boot, so the first wait
    // succeeds without a display-side handshake.
    assert!(sim.try_take_consumed());
    assert!(!sim.try_take_consumed(), "the seed token is single-shot");
}

#[test]
fn ready_slot_starts_empty() {
    let link = FrameLink::new();
    let display = link.display_link();
    assert!(!display.poll_ready());
}

#[test]
fn double_ready_without_consumption_is_desync() {
    let link = FrameLink::new();
    let sim = link.sim_link();
    sim.publish_ready().expect("first token fits");
    assert!(matches!(sim.publish_ready(), Err(Error::LinkDesync)));
}

#[test]
fn consumed_into_full_slot_is_desync() {
    let link = FrameLink::new();
    let display = link.display_link();
    // The seed token is still in the slot.
    assert!(matches!(display.publish_consumed(), Err(Error::LinkDesync)));
}

#[test]
fn tokens_alternate_over_many_rounds() {
    let link = FrameLink::new();
    let sim = link.sim_link();
    let display = link.display_link();

    for _ in 0..1000 {
        assert!(sim.try_take_consumed());
        sim.publish_ready().expect("slot free after display took it");
        assert!(display.poll_ready());
        display.publish_consumed().expect("slot free after sim took it");
    }
}

/// Drive producer and consumer on real threads with pseudo-random yield
/// schedules. The protocol must keep stage access mutually exclusive (the
/// display never reads while the producer writes and vice versa) and never
/// allow a second outstanding token of either kind.
#[test]
fn randomized_schedules_never_break_the_handshake() {
    const ROUNDS: u32 = 2000;

    for seed in [3u32, 0x1234_5678, 0xdead_beef, 0x0bad_cafe] {
        let link = FrameLink::new();
        let producer_writing = AtomicBool::new(false);
        let display_reading = AtomicBool::new(false);
        let frames_staged = AtomicU32::new(0);
        let frames_consumed = AtomicU32::new(0);

        thread::scope(|scope| {
            scope.spawn(|| {
                let sim = link.sim_link();
                let mut rng = seed;
                for _ in 0..ROUNDS {
                    while !sim.try_take_consumed() {
                        thread::yield_now();
                    }
                    assert!(
                        !display_reading.load(Ordering::SeqCst),
                        "producer granted the frame while the display reads it"
                    );
                    producer_writing.store(true, Ordering::SeqCst);
                    for _ in 0..xorshift(&mut rng) % 8 {
                        thread::yield_now();
                    }
                    producer_writing.store(false, Ordering::SeqCst);
                    frames_staged.fetch_add(1, Ordering::SeqCst);
                    sim.publish_ready()
                        .expect("a second outstanding ready token can never happen");
                }
            });

            scope.spawn(|| {
                let display = link.display_link();
                let mut rng = seed.rotate_left(7) | 1;
                for _ in 0..ROUNDS {
                    while !display.poll_ready() {
                        thread::yield_now();
                    }
                    assert!(
                        !producer_writing.load(Ordering::SeqCst),
                        "display observed a frame the producer is still writing"
                    );
                    display_reading.store(true, Ordering::SeqCst);
                    for _ in 0..xorshift(&mut rng) % 8 {
                        thread::yield_now();
                    }
                    display_reading.store(false, Ordering::SeqCst);
                    frames_consumed.fetch_add(1, Ordering::SeqCst);
                    display
                        .publish_consumed()
                        .expect("a second outstanding consumed token can never happen");
                }
            });
        });

        assert_eq!(frames_staged.load(Ordering::SeqCst), ROUNDS);
        assert_eq!(frames_consumed.load(Ordering::SeqCst), ROUNDS);
    }
}

fn xorshift(state: &mut u32) -> u32 {
    let mut value = *state;
    value ^= value << 13;
    value ^= value >> 17;
    value ^= value << 5;
    *state = value;
    value
}
