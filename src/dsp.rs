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
//! Per-voice signal building blocks: envelopes, the sample read head,
//! wavetables for the LFO and the filter stage.

mod envelope;
mod filter;
mod generator;
mod wave;

pub use envelope::{EnvParams, EnvStage, EnvTimes, Envelope};
pub use filter::{Filter, FilterKind, FilterSlope};
pub use generator::Generator;
pub use wave::{Oscillator, WaveShape, Wavetable, WAVE_TABLE_SIZE};

use std::f32::consts::FRAC_PI_4;

/// Soft clip that is linear near zero and saturates at ±1.
#[inline]
pub fn sigmoid(x: f32) -> f32 {
    if x < -1.0 {
        -1.0
    } else if x > 1.0 {
        1.0
    } else {
        0.5 * x * (3.0 - x * x)
    }
}

/// [`sigmoid`] mapped onto `[0.01, 0.99]`, for normalized filter controls.
#[inline]
pub fn sigmoid_1(x: f32) -> f32 {
    0.01 + 0.98 * 0.5 * (1.0 + sigmoid(2.0 * x - 1.0))
}

/// Equal power pan gains, normalized so that the center is unity on both
/// sides.
#[inline]
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let angle = FRAC_PI_4 * (1.0 + pan.clamp(-1.0, 1.0));
    (
        std::f32::consts::SQRT_2 * angle.cos(),
        std::f32::consts::SQRT_2 * angle.sin(),
    )
}

/// The 12-TET frequency of a MIDI note, A4 = 440 Hz.
#[inline]
pub fn note_frequency(note: u8) -> f32 {
    440.0 * ((note as f32 - 69.0) / 12.0).exp2()
}
