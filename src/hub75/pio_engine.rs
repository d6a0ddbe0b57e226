//! RP2040 PIO + DMA implementation of the [`ShiftEngine`] capability.
//!
//! Two state machines on PIO0 drive the panel. The data machine clocks the
//! six color lines (two rows' R/G/B) while discarding the low-order bits the
//! current bit plane does not use; a per-row control word selects how many
//! bits to drop, so the CPU streams raw framebuffer words and never touches
//! pixels on the hot path. The row machine sets the address lines, pulses
//! latch, and holds output-enable low for a count proportional to `2^bit`,
//! the binary weighting that turns bit planes into brightness.
//!
//! Pixel data reaches the data machine through a single DMA channel; the CPU
//! only pushes the two control words per row and the two dummy pixels that
//! keep the paired scan lanes aligned. Stall detection reads the PIO FDEBUG
//! TXSTALL flags, which is what gives the display core its "is there wait
//! time left" signal for redraw slicing.

use embassy_rp::Peri;
use embassy_rp::dma::Channel;
use embassy_rp::pac;
use embassy_rp::peripherals::PIO0;
use embassy_rp::pio::program::pio_asm;
use embassy_rp::pio::{Config, Direction, FifoJoin, Pio, PioPin, ShiftDirection, StateMachine};
use fixed::traits::ToFixed;

use super::{ROW_WORDS, ShiftEngine};

// State machine indices on PIO0.
const SM_DATA: usize = 0;
const SM_ROW: usize = 1;

const STALL_DATA: u32 = 1 << SM_DATA;
const STALL_ROW: u32 = 1 << SM_ROW;

// Row-select address lines (A..D for 1:16 scan).
const ROW_ADDR_BITS: u32 = 4;

// Base output-enable hold count; the pulse for bit `b` holds `PULSE_BASE <<
// b` cycles.
const PULSE_BASE: u32 = 100;

/// HUB75 shift-out engine on PIO0 with one DMA channel.
pub struct PioShiftEngine<'d, C: Channel> {
    data_sm: StateMachine<'d, PIO0, SM_DATA>,
    row_sm: StateMachine<'d, PIO0, SM_ROW>,
    dma: Peri<'d, C>,
}

impl<'d, C: Channel> PioShiftEngine<'d, C> {
    /// Claim PIO0 state machines 0 and 1 and configure the panel pins.
    ///
    /// `rgb0`/`rgb1` carry the upper and lower half's R, G, B data lines;
    /// `addr` are the row-select lines A..D; `lat` and `oe` must be
    /// consecutive GPIOs so they can share the row machine's side-set.
    #[expect(clippy::too_many_arguments, reason = "one parameter per panel wire")]
    pub fn new<R0, G0, B0, R1, G1, B1, CK, A0, A1, A2, A3, LA, OE>(
        pio: Pio<'d, PIO0>,
        dma: Peri<'d, C>,
        rgb0: (Peri<'d, R0>, Peri<'d, G0>, Peri<'d, B0>),
        rgb1: (Peri<'d, R1>, Peri<'d, G1>, Peri<'d, B1>),
        clk: Peri<'d, CK>,
        addr: (Peri<'d, A0>, Peri<'d, A1>, Peri<'d, A2>, Peri<'d, A3>),
        lat: Peri<'d, LA>,
        oe: Peri<'d, OE>,
    ) -> Self
    where
        R0: PioPin,
        G0: PioPin,
        B0: PioPin,
        R1: PioPin,
        G1: PioPin,
        B1: PioPin,
        CK: PioPin,
        A0: PioPin,
        A1: PioPin,
        A2: PioPin,
        A3: PioPin,
        LA: PioPin,
        OE: PioPin,
    {
        let Pio {
            mut common,
            mut sm0,
            mut sm1,
            ..
        } = pio;

        let r0 = common.make_pio_pin(rgb0.0);
        let g0 = common.make_pio_pin(rgb0.1);
        let b0 = common.make_pio_pin(rgb0.2);
        let r1 = common.make_pio_pin(rgb1.0);
        let g1 = common.make_pio_pin(rgb1.1);
        let b1 = common.make_pio_pin(rgb1.2);
        let clk = common.make_pio_pin(clk);
        let addr_a = common.make_pio_pin(addr.0);
        let addr_b = common.make_pio_pin(addr.1);
        let addr_c = common.make_pio_pin(addr.2);
        let addr_d = common.make_pio_pin(addr.3);
        let lat = common.make_pio_pin(lat);
        let oe = common.make_pio_pin(oe);

        // Data machine: two control words per row (bit-plane discard count,
        // pixel count minus one), then raw pixel words from DMA. Each pixel
        // drops the unused low bits, then clocks six color lines.
        let data_program = pio_asm!(
            ".side_set 1 opt",
            ".wrap_target",
            "    pull",
            "    mov x, osr",
            "    pull",
            "    mov y, osr",
            "    mov isr, x",
            "pixel:",
            "    pull",
            "    mov x, isr",
            "drop:",
            "    jmp !x emit",
            "    out null, 1",
            "    jmp x-- drop",
            "emit:",
            "    out pins, 6  side 1",
            "    jmp y-- pixel side 0",
            ".wrap",
        );
        let data_loaded = common.load_program(&data_program.program);
        let mut data_cfg = Config::default();
        data_cfg.use_program(&data_loaded, &[&clk]);
        data_cfg.set_out_pins(&[&r0, &g0, &b0, &r1, &g1, &b1]);
        data_cfg.shift_out.direction = ShiftDirection::Right;
        data_cfg.fifo_join = FifoJoin::TxOnly;
        data_cfg.clock_divider = 1u8.to_fixed();
        sm0.set_config(&data_cfg);
        sm0.set_pin_dirs(Direction::Out, &[&r0, &g0, &b0, &r1, &g1, &b1, &clk]);
        sm0.set_enable(true);

        // Row machine: one word per latch; address in the low bits, pulse
        // width above. Side-set bit 0 is LAT, bit 1 is OE (active low).
        let row_program = pio_asm!(
            ".side_set 2",
            ".wrap_target",
            "    out pins, 4   side 2", // row address; OE high (panel blanked)
            "    out x, 28     side 3", // pulse width; latch the shifted row
            "pulse:",
            "    jmp x-- pulse side 0", // OE low for the binary-weighted count
            ".wrap",
        );
        let row_loaded = common.load_program(&row_program.program);
        let mut row_cfg = Config::default();
        row_cfg.use_program(&row_loaded, &[&lat, &oe]);
        row_cfg.set_out_pins(&[&addr_a, &addr_b, &addr_c, &addr_d]);
        row_cfg.shift_out.auto_fill = true;
        row_cfg.shift_out.threshold = 32;
        row_cfg.shift_out.direction = ShiftDirection::Right;
        row_cfg.clock_divider = 1u8.to_fixed();
        sm1.set_config(&row_cfg);
        sm1.set_pin_dirs(
            Direction::Out,
            &[&addr_a, &addr_b, &addr_c, &addr_d, &lat, &oe],
        );
        sm1.set_enable(true);

        Self {
            data_sm: sm0,
            row_sm: sm1,
            dma,
        }
    }

    fn push_data_blocking(&mut self, word: u32) {
        while !self.data_sm.tx().try_push(word) {}
    }
}

impl<C: Channel> ShiftEngine for PioShiftEngine<'_, C> {
    async fn shift_row(&mut self, bit: u8, words: &[u32; ROW_WORDS]) {
        // Control words: bits to discard for this plane, then the pixel
        // count including the two trailing dummies.
        self.push_data_blocking(u32::from(bit));
        self.push_data_blocking(ROW_WORDS as u32 + 2 - 1);

        self.data_sm.tx().dma_push(self.dma.reborrow(), words, false).await;

        // Two dummy pixels resynchronize the paired scan lanes and give the
        // data machine a clean stall point at end of row.
        self.push_data_blocking(0);
        self.push_data_blocking(0);

        // Reset stall flags so row_active reflects this row's pulse only.
        pac::PIO0
            .fdebug()
            .write(|fdebug| fdebug.set_txstall((STALL_DATA | STALL_ROW) as u8));
    }

    fn row_active(&self) -> bool {
        // The row machine sets TXSTALL once its pulse is done and the FIFO
        // runs dry; until then there is wait time to spend.
        u32::from(pac::PIO0.fdebug().read().txstall()) & STALL_ROW == 0
    }

    fn wait_idle(&mut self) {
        let both = STALL_DATA | STALL_ROW;
        while u32::from(pac::PIO0.fdebug().read().txstall()) & both != both {}
    }

    fn latch(&mut self, row: u8, bit: u8) {
        #[cfg(feature = "display-trace")]
        defmt::trace!("hub75 latch row={} bit={}", row, bit);
        let word = u32::from(row) | ((PULSE_BASE << bit) << ROW_ADDR_BITS);
        while !self.row_sm.tx().try_push(word) {}
    }
}
