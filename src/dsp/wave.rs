// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::f32::consts::PI;

use rand::{rngs::StdRng, Rng, SeedableRng};

/// Points per wavetable. Must be a power of two.
pub const WAVE_TABLE_SIZE: usize = 2048;

/// Random tables are seeded so that a kit sounds the same every time it
/// loads.
const WAVE_SEED: u64 = 0x6b69_7473;

/// LFO wave shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveShape {
    Pulse,
    Saw,
    Sine,
    Random,
    Noise,
}

impl WaveShape {
    /// Maps the `LFO1_SHAPE` parameter onto a shape.
    pub fn from_param(value: f32) -> WaveShape {
        match value.round() as i32 {
            0 => WaveShape::Pulse,
            1 => WaveShape::Saw,
            2 => WaveShape::Sine,
            3 => WaveShape::Random,
            _ => WaveShape::Noise,
        }
    }
}

/// A single cycle of an LFO wave, regenerated in place when its shape or
/// width changes.
#[derive(Clone)]
pub struct Wavetable {
    shape: WaveShape,
    width: f32,
    table: Box<[f32]>,
}

impl Wavetable {
    pub fn new(shape: WaveShape, width: f32) -> Wavetable {
        let mut wave = Wavetable {
            shape,
            width,
            table: vec![0.0; WAVE_TABLE_SIZE].into_boxed_slice(),
        };
        wave.fill();
        wave
    }

    /// Regenerates the table. Does nothing when neither the shape nor the
    /// width changed.
    pub fn reset(&mut self, shape: WaveShape, width: f32) {
        if self.shape != shape || self.width != width {
            self.shape = shape;
            self.width = width;
            self.fill();
        }
    }

    pub fn shape(&self) -> WaveShape {
        self.shape
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    fn fill(&mut self) {
        let size = WAVE_TABLE_SIZE as f32;
        let width = self.width.clamp(0.0, 1.0);
        match self.shape {
            WaveShape::Pulse => {
                let duty = (0.5 * width * size).max(1.0);
                for (i, point) in self.table.iter_mut().enumerate() {
                    *point = if (i as f32) < duty { 1.0 } else { -1.0 };
                }
            }
            WaveShape::Saw => {
                // Rises up to the peak, then falls back. A full width is a
                // plain rising saw, half width a triangle.
                let peak = width * size;
                for (i, point) in self.table.iter_mut().enumerate() {
                    let x = i as f32;
                    *point = if x < peak {
                        2.0 * x / peak - 1.0
                    } else {
                        1.0 - 2.0 * (x - peak) / (size - peak).max(1.0)
                    };
                }
            }
            WaveShape::Sine => {
                // Narrower widths squeeze the positive half cycle.
                let half = (0.5 * width * size).max(1.0);
                for (i, point) in self.table.iter_mut().enumerate() {
                    let x = i as f32;
                    let angle = if x < half {
                        PI * x / half
                    } else {
                        PI + PI * (x - half) / (size - half).max(1.0)
                    };
                    *point = angle.sin();
                }
            }
            WaveShape::Random => {
                let mut rng = StdRng::seed_from_u64(WAVE_SEED);
                let hold = (0.125 * size * (1.0 - width)) as usize + 1;
                let mut value = 0.0;
                for (i, point) in self.table.iter_mut().enumerate() {
                    if i % hold == 0 {
                        value = rng.gen_range(-1.0..=1.0);
                    }
                    *point = value;
                }
            }
            WaveShape::Noise => {
                let mut rng = StdRng::seed_from_u64(WAVE_SEED);
                for point in self.table.iter_mut() {
                    *point = rng.gen_range(-1.0..=1.0);
                }
            }
        }
    }

    /// The linearly interpolated value at the given phase, in cycles.
    #[inline]
    pub fn value(&self, phase: f32) -> f32 {
        let x = phase.rem_euclid(1.0) * WAVE_TABLE_SIZE as f32;
        let i = (x as usize) & (WAVE_TABLE_SIZE - 1);
        let alpha = x - x.floor();
        let x0 = self.table[i];
        let x1 = self.table[(i + 1) & (WAVE_TABLE_SIZE - 1)];
        x0 + alpha * (x1 - x0)
    }
}

/// A running position in a [`Wavetable`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Oscillator {
    phase: f32,
}

impl Oscillator {
    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    /// Returns the current value, then advances by one frame at the given
    /// frequency.
    #[inline]
    pub fn sample(&mut self, wave: &Wavetable, freq: f32, sample_rate: f32) -> f32 {
        let value = wave.value(self.phase);
        self.phase += freq / sample_rate;
        self.phase -= self.phase.floor();
        value
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }
}
