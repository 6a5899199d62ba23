// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Fish species and how they swim.

The tank holds five species.  [distribute_fish] splits a population across them and
[fish_motion] produces one fish's uniforms for a given clock.  Motion draws from
[PseudoRandom], which is reset every frame so each fish gets the same speed, scale and
radii on every frame.
*/

use crate::bindings::FishPer;
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FishSize {
    Big,
    Medium,
    Small,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Species {
    pub name: &'static str,
    pub size: FishSize,
    pub speed: f64,
    pub speed_range: f64,
    pub radius: f64,
    pub radius_range: f64,
    pub tail_speed: f64,
    pub height_offset: f64,
    pub height_range: f64,
}

pub const SPECIES_COUNT: usize = 5;

/// Species in draw order.  Instance slots are assigned in this order too.
pub static SPECIES: [Species; SPECIES_COUNT] = [
    Species {
        name: "SmallFishA",
        size: FishSize::Small,
        speed: 1.0,
        speed_range: 1.5,
        radius: 30.0,
        radius_range: 25.0,
        tail_speed: 10.0,
        height_offset: 0.0,
        height_range: 16.0,
    },
    Species {
        name: "MediumFishA",
        size: FishSize::Medium,
        speed: 1.0,
        speed_range: 2.0,
        radius: 10.0,
        radius_range: 20.0,
        tail_speed: 1.0,
        height_offset: 0.0,
        height_range: 16.0,
    },
    Species {
        name: "MediumFishB",
        size: FishSize::Medium,
        speed: 0.5,
        speed_range: 4.0,
        radius: 10.0,
        radius_range: 20.0,
        tail_speed: 3.0,
        height_offset: -8.0,
        height_range: 5.0,
    },
    Species {
        name: "BigFishA",
        size: FishSize::Big,
        speed: 0.5,
        speed_range: 0.5,
        radius: 50.0,
        radius_range: 3.0,
        tail_speed: 1.5,
        height_offset: 0.0,
        height_range: 16.0,
    },
    Species {
        name: "BigFishB",
        size: FishSize::Big,
        speed: 0.5,
        speed_range: 0.5,
        radius: 45.0,
        radius_range: 3.0,
        tail_speed: 1.0,
        height_offset: 0.0,
        height_range: 16.0,
    },
];

const FISH_SPEED: f64 = 0.124;
const FISH_OFFSET: f64 = 0.52;
const FISH_HEIGHT: f64 = 25.0;
const FISH_HEIGHT_RANGE: f64 = 1.0;
const FISH_TAIL_SPEED: f64 = 1.0;
const FISH_X_CLOCK: f64 = 1.0;
const FISH_Y_CLOCK: f64 = 0.556;
const FISH_Z_CLOCK: f64 = 1.0;
const TAIL_OFFSET_MULT: f64 = 1.0;

const NUM_FISH_SMALL: usize = 100;
const NUM_FISH_MEDIUM: usize = 1000;
const NUM_FISH_BIG: usize = 10_000;
const NUM_FISH_LEFT_SMALL: usize = 80;
const NUM_FISH_LEFT_BIG: usize = 160;

/**
Splits `total` fish across [SPECIES].

Big species are filled first, then medium, then small, each taking what is left.  The
result is indexed like [SPECIES] and always sums to `total`.
*/
pub fn distribute_fish(total: usize) -> [usize; SPECIES_COUNT] {
    let mut counts = [0; SPECIES_COUNT];
    let mut left = total;
    for size in [FishSize::Big, FishSize::Medium, FishSize::Small] {
        for (index, species) in SPECIES.iter().enumerate() {
            if species.size != size {
                continue;
            }
            let wanted = match size {
                FishSize::Big => {
                    if total < NUM_FISH_SMALL {
                        1
                    } else {
                        2
                    }
                }
                FishSize::Medium => {
                    if total < NUM_FISH_MEDIUM {
                        total / 10
                    } else if total < NUM_FISH_BIG {
                        NUM_FISH_LEFT_SMALL
                    } else {
                        NUM_FISH_LEFT_BIG
                    }
                }
                FishSize::Small => left,
            };
            let n = wanted.min(left);
            counts[index] = n;
            left -= n;
        }
    }
    counts
}

/// First instance slot of each species.
pub fn species_offsets(counts: &[usize; SPECIES_COUNT]) -> [usize; SPECIES_COUNT] {
    let mut offsets = [0; SPECIES_COUNT];
    let mut running = 0;
    for (offset, count) in offsets.iter_mut().zip(counts) {
        *offset = running;
        running += count;
    }
    offsets
}

/**
Linear congruential generator over `[0, 1)`.
*/
#[derive(Debug, Clone, Default)]
pub struct PseudoRandom {
    seed: u64,
}

impl PseudoRandom {
    const RANGE: u64 = 1 << 32;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.seed = 0;
    }

    pub fn next_value(&mut self) -> f64 {
        self.seed = (134_775_813 * self.seed + 1) % Self::RANGE;
        self.seed as f64 / Self::RANGE as f64
    }
}

/**
Uniforms for the `index`th fish of `species` at `clock` seconds.

Consumes five values from `rng`.
*/
pub fn fish_motion(species: &Species, clock: f64, index: usize, rng: &mut PseudoRandom) -> FishPer {
    let base_clock = clock * FISH_SPEED;
    let height = FISH_HEIGHT + species.height_offset;
    let height_range = FISH_HEIGHT_RANGE * species.height_range;
    let tail_speed = species.tail_speed * FISH_TAIL_SPEED;

    let fish_clock = base_clock + index as f64 * FISH_OFFSET;
    let speed = species.speed + rng.next_value() * species.speed_range;
    let scale = 1.0 + rng.next_value();
    let x_radius = species.radius + rng.next_value() * species.radius_range;
    let y_radius = 2.0 + rng.next_value() * height_range;
    let z_radius = species.radius + rng.next_value() * species.radius_range;
    let speed_clock = fish_clock * speed;
    let x_clock = speed_clock * FISH_X_CLOCK;
    let y_clock = speed_clock * FISH_Y_CLOCK;
    let z_clock = speed_clock * FISH_Z_CLOCK;

    let world_position = [
        (x_clock.sin() * x_radius) as f32,
        (y_clock.sin() * y_radius + height) as f32,
        (z_clock.cos() * z_radius) as f32,
    ];
    let next_position = [
        ((x_clock - 0.04).sin() * x_radius) as f32,
        ((y_clock - 0.01).sin() * y_radius + height) as f32,
        ((z_clock - 0.04).cos() * z_radius) as f32,
    ];
    let time = ((clock + index as f64 * TAIL_OFFSET_MULT) * tail_speed * speed) % (PI * 2.0);
    FishPer::new(world_position, scale as f32, next_position, time as f32)
}
