//! Falling-sand particle simulation steered by an accelerometer tilt vector.
//!
//! The engine owns up to [`MAX_PARTICLES`] grains with fixed-point positions
//! (1/256-cell subpixel units) and resolves their motion against a packed
//! [occupancy bitmap](bitmap::Bitmap): every cell of the play field holds at
//! most one grain, collisions are O(1) bitmap lookups, and wall or grain
//! contact bounces the grain with configurable elasticity.
//!
//! One call to [`Simulation::iterate`] advances the world by exactly one
//! timestep. The caller (usually a device loop reading a tilt sensor) decides
//! the tick rate.

pub mod bitmap;

use heapless::Vec;

use crate::{Error, Result};
use bitmap::Bitmap;

/// Fixed number of subpixel units per cell.
pub const SUBPIXELS: i32 = 256;

/// Maximum number of particles a simulation can hold.
pub const MAX_PARTICLES: usize = 512;

/// Maximum speed in subpixel units per tick. Faster grains are rescaled to
/// this magnitude so they cannot tunnel through an occupied neighbor cell.
pub const MAX_SPEED: i32 = 256;

// tan(22.5 deg) in 8.8 fixed point, for octant classification.
const OCTANT_SLOPE: i32 = 106;

/// One grain of sand.
///
/// Positions are subpixel coordinates in `[0, W*256-1] x [0, H*256-1]`;
/// dividing by 256 yields the display cell. Velocities share the same scale.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Particle {
    /// Horizontal position in subpixel units.
    pub x: i32,
    /// Vertical position in subpixel units.
    pub y: i32,
    /// Horizontal velocity in subpixel units per tick.
    pub vx: i16,
    /// Vertical velocity in subpixel units per tick.
    pub vy: i16,
    /// Display color, packed `0x00BBGGRR`.
    pub color: u32,
}

impl Particle {
    /// The display cell currently containing this grain.
    #[must_use]
    pub const fn cell(&self) -> (usize, usize) {
        ((self.x / SUBPIXELS) as usize, (self.y / SUBPIXELS) as usize)
    }
}

/// Per-stage tuning values, copied into the simulation at stage load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimTuning {
    /// Acceleration scale applied to normalized tilt inputs.
    pub scale: u8,
    /// Bounce elasticity in 1/256 units (`256` = perfectly elastic).
    pub elasticity: u8,
    /// Sort grains along the acceleration direction each tick so downhill
    /// grains move first. Prevents overtaking artifacts under heavy uniform
    /// acceleration; costs one sort per tick.
    pub sort: bool,
}

impl Default for SimTuning {
    fn default() -> Self {
        Self {
            scale: 32,
            elasticity: 170,
            sort: true,
        }
    }
}

/// Particle simulation over a `W`×`H` cell play field (`W` at most 32).
///
/// The occupancy bitmap is kept exactly consistent with particle positions:
/// after every committed move, the set bits are the background obstacles plus
/// the current particle cells, and no two particles share a cell.
pub struct Simulation<const W: usize, const H: usize> {
    particles: Vec<Particle, MAX_PARTICLES>,
    bitmap: Bitmap<W, H>,
    tuning: SimTuning,
    rng: u32,
}

impl<const W: usize, const H: usize> Simulation<W, H> {
    /// Largest valid x position in subpixel units.
    pub const X_MAX: i32 = W as i32 * SUBPIXELS - 1;
    /// Largest valid y position in subpixel units.
    pub const Y_MAX: i32 = H as i32 * SUBPIXELS - 1;

    /// Create an empty simulation.
    ///
    /// The `seed` feeds the jitter generator; any non-zero value works and a
    /// fixed seed makes runs reproducible.
    #[must_use]
    pub fn new(tuning: SimTuning, seed: u32) -> Self {
        Self {
            particles: Vec::new(),
            bitmap: Bitmap::new(),
            tuning,
            rng: if seed == 0 { 0x9e37_79b9 } else { seed },
        }
    }

    /// Mark every non-zero pixel of a `W`×`H` row-major image as a static
    /// obstacle. Touches only the bitmap, never the particles.
    pub fn load_background(&mut self, image: &[u32]) {
        debug_assert_eq!(image.len(), W * H);
        for y in 0..H {
            for x in 0..W {
                if image[y * W + x] != 0 {
                    self.bitmap.set(x, y);
                }
            }
        }
    }

    /// Load the initial particle set from a table of `(x, y, color)` triples
    /// with cell-granularity positions.
    ///
    /// Positions are promoted to subpixel cell centers, velocities start at
    /// zero, and each grain's cell is marked occupied.
    ///
    /// # Errors
    ///
    /// [`Error::TooManyParticles`] if the table exceeds [`MAX_PARTICLES`].
    /// This is a configuration error with no partial-load recovery.
    pub fn load_particles(&mut self, table: &[(u16, u16, u32)]) -> Result<()> {
        if table.len() > MAX_PARTICLES {
            return Err(Error::TooManyParticles {
                requested: table.len(),
                capacity: MAX_PARTICLES,
            });
        }
        self.particles.clear();
        for &(x, y, color) in table {
            let particle = Particle {
                x: i32::from(x) * SUBPIXELS + SUBPIXELS / 2,
                y: i32::from(y) * SUBPIXELS + SUBPIXELS / 2,
                vx: 0,
                vy: 0,
                color,
            };
            let (cell_x, cell_y) = particle.cell();
            self.bitmap.set(cell_x, cell_y);
            self.particles
                .push(particle)
                .expect("capacity checked above");
        }
        Ok(())
    }

    /// Zero the occupancy bitmap. Used on stage reset, independent of
    /// particle reload.
    pub fn clear_all(&mut self) {
        self.bitmap.clear_all();
    }

    /// Current particle states.
    #[must_use]
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// The occupancy bitmap.
    #[must_use]
    pub fn bitmap(&self) -> &Bitmap<W, H> {
        &self.bitmap
    }

    /// Replace the tuning values (stage switches reuse one simulation).
    pub fn set_tuning(&mut self, tuning: SimTuning) {
        self.tuning = tuning;
    }

    #[doc(hidden)]
    /// Direct particle access for tests and tooling. Callers that change a
    /// particle's cell are responsible for keeping the bitmap consistent.
    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    /// Advance the simulation by one timestep.
    ///
    /// `ax`, `ay`, `az` are signed tilt inputs: normalized gravity components
    /// scaled and quantized by the caller (a sensor reading of ±1 g maps to
    /// roughly ±48). `az` near zero means the device is lying flat; it is
    /// turned into a small random jitter so stacked grains topple instead of
    /// freezing in place.
    pub fn iterate(&mut self, ax: i32, ay: i32, az: i32) {
        let scale = i32::from(self.tuning.scale);
        let mut ax = ax * scale / 256;
        let mut ay = ay * scale / 256;
        let az = (az * scale / 2048).abs();

        // Limit and invert: flat device (az ~ 0) shakes hardest.
        let az = if az >= 4 { 1 } else { 5 - az };
        // Subtract the jitter midpoint here; it is added back per grain with
        // randomness in [0, 2*az].
        ax -= az;
        ay -= az;
        let jitter_span = (az * 2 + 1) as u32;

        if self.tuning.sort {
            // Process downhill grains first so grains behind them cannot
            // overtake within the same step. An 8-way octant approximation of
            // the acceleration direction is good enough and avoids atan2.
            let octant = octant_of(ax, ay);
            self.particles
                .sort_unstable_by_key(|particle| sort_key(octant, particle));
        }

        let mut rng = self.rng;
        for particle in self.particles.iter_mut() {
            let jitter_x = (xorshift(&mut rng) % jitter_span) as i32;
            let jitter_y = (xorshift(&mut rng) % jitter_span) as i32;
            let mut vx = i32::from(particle.vx) + ax + jitter_x;
            let mut vy = i32::from(particle.vy) + ay + jitter_y;

            // Rescale to MAX_SPEED while preserving direction, so one tick
            // can never cross an occupied cell undetected.
            let v2 = i64::from(vx) * i64::from(vx) + i64::from(vy) * i64::from(vy);
            if v2 > i64::from(MAX_SPEED) * i64::from(MAX_SPEED) {
                let v = ((v2 as u64).isqrt() as i32).max(1);
                vx = vx * MAX_SPEED / v;
                vy = vy * MAX_SPEED / v;
            }
            particle.vx = vx as i16;
            particle.vy = vy as i16;
        }
        self.rng = rng;

        let elasticity = i32::from(self.tuning.elasticity);
        let bounce = |velocity: i16| -> i16 { ((-i32::from(velocity)) * elasticity / 256) as i16 };

        for index in 0..self.particles.len() {
            let mut particle = self.particles[index];
            let mut new_x = particle.x + i32::from(particle.vx);
            let mut new_y = particle.y + i32::from(particle.vy);

            // Wall clamp with elastic bounce, each axis independent.
            if new_x < 0 {
                new_x = 0;
                particle.vx = bounce(particle.vx);
            } else if new_x > Self::X_MAX {
                new_x = Self::X_MAX;
                particle.vx = bounce(particle.vx);
            }
            if new_y < 0 {
                new_y = 0;
                particle.vy = bounce(particle.vy);
            } else if new_y > Self::Y_MAX {
                new_y = Self::Y_MAX;
                particle.vy = bounce(particle.vy);
            }

            // Linear cell indices; one comparison tells whether the grain
            // changed cell and, via the delta, along which axis.
            let old_index = (particle.y / SUBPIXELS) * W as i32 + particle.x / SUBPIXELS;
            let new_index = (new_y / SUBPIXELS) * W as i32 + new_x / SUBPIXELS;

            if old_index != new_index
                && self
                    .bitmap
                    .get((new_x / SUBPIXELS) as usize, (new_y / SUBPIXELS) as usize)
            {
                let delta = (new_index - old_index).abs();
                if delta == 1 {
                    // Collision left or right: cancel and bounce x only.
                    new_x = particle.x;
                    particle.vx = bounce(particle.vx);
                } else if delta == W as i32 {
                    // Collision up or down: cancel and bounce y only.
                    new_y = particle.y;
                    particle.vy = bounce(particle.vy);
                } else {
                    // Diagonal collision. Try to skid along the wall with the
                    // faster axis first; if both single-axis cells are taken,
                    // cancel both axes.
                    let x_first = i32::from(particle.vx).abs() >= i32::from(particle.vy).abs();
                    let x_cell = (new_x / SUBPIXELS) as usize;
                    let y_cell = (new_y / SUBPIXELS) as usize;
                    let old_x_cell = (particle.x / SUBPIXELS) as usize;
                    let old_y_cell = (particle.y / SUBPIXELS) as usize;
                    let x_free = !self.bitmap.get(x_cell, old_y_cell);
                    let y_free = !self.bitmap.get(old_x_cell, y_cell);
                    if x_first && x_free {
                        new_y = particle.y;
                        particle.vy = bounce(particle.vy);
                    } else if !x_first && y_free {
                        new_x = particle.x;
                        particle.vx = bounce(particle.vx);
                    } else if x_first && y_free {
                        new_x = particle.x;
                        particle.vx = bounce(particle.vx);
                    } else if !x_first && x_free {
                        new_y = particle.y;
                        particle.vy = bounce(particle.vy);
                    } else {
                        new_x = particle.x;
                        new_y = particle.y;
                        particle.vx = bounce(particle.vx);
                        particle.vy = bounce(particle.vy);
                    }
                }
            }

            // Commit: bitmap first, then the stored position.
            self.bitmap.clear(
                (particle.x / SUBPIXELS) as usize,
                (particle.y / SUBPIXELS) as usize,
            );
            self.bitmap
                .set((new_x / SUBPIXELS) as usize, (new_y / SUBPIXELS) as usize);
            particle.x = new_x;
            particle.y = new_y;
            self.particles[index] = particle;
        }
    }
}

/// Classify the acceleration direction into one of eight octants, boundaries
/// at odd multiples of 22.5 degrees. Octant 0 is +x, continuing clockwise in
/// screen coordinates (+y down): 1 = +x+y, 2 = +y, and so on.
fn octant_of(ax: i32, ay: i32) -> u8 {
    if ax == 0 && ay == 0 {
        return 0;
    }
    let x = ax.abs();
    let y = ay.abs();
    let shallow = y * 256 < x * OCTANT_SLOPE; // within 22.5 deg of the x axis
    let steep = x * 256 < y * OCTANT_SLOPE; // within 22.5 deg of the y axis
    match (ax >= 0, ay >= 0) {
        (true, true) => {
            if shallow {
                0
            } else if steep {
                2
            } else {
                1
            }
        }
        (false, true) => {
            if shallow {
                4
            } else if steep {
                2
            } else {
                3
            }
        }
        (false, false) => {
            if shallow {
                4
            } else if steep {
                6
            } else {
                5
            }
        }
        (true, false) => {
            if shallow {
                0
            } else if steep {
                6
            } else {
                7
            }
        }
    }
}

/// Ascending sort key that orders grains by descending projection onto the
/// given octant direction, i.e. downhill grains first.
fn sort_key(octant: u8, particle: &Particle) -> i32 {
    match octant {
        0 => -particle.x,
        1 => -(particle.x + particle.y),
        2 => -particle.y,
        3 => particle.x - particle.y,
        4 => particle.x,
        5 => particle.x + particle.y,
        6 => particle.y,
        _ => particle.y - particle.x,
    }
}

/// Small xorshift step for per-grain jitter. Not cryptographic; just has to
/// decorrelate neighboring grains.
fn xorshift(state: &mut u32) -> u32 {
    let mut value = *state;
    value ^= value << 13;
    value ^= value >> 17;
    value ^= value << 5;
    *state = value;
    value
}
