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
//! The shared effects bus. Element sends are summed into a stereo pair that
//! runs through chorus, flanger, phaser, delay and reverb before being
//! folded back into the output, followed by the output dynamics.

mod chorus;
mod delay;
mod dynamics;
mod flanger;
mod phaser;
mod reverb;

use std::f32::consts::TAU;

pub use chorus::{Chorus, ChorusParams};
pub use delay::{Delay, DelayParams};
pub use dynamics::{limit, Compressor};
pub use flanger::{Flanger, FlangerParams};
pub use phaser::{Phaser, PhaserParams};
pub use reverb::{Reverb, ReverbParams};

use crate::params::ParamIndex;

/// A delay line with linearly interpolated fractional taps.
pub(crate) struct DelayLine {
    buffer: Vec<f32>,
    mask: usize,
    write_pos: usize,
}

impl DelayLine {
    pub fn new(max_frames: usize) -> DelayLine {
        let size = (max_frames + 2).next_power_of_two();
        DelayLine {
            buffer: vec![0.0; size],
            mask: size - 1,
            write_pos: 0,
        }
    }

    /// The longest tap, in frames.
    pub fn max_delay(&self) -> f32 {
        (self.buffer.len() - 2) as f32
    }

    /// The value written `delay` frames before the next write. Clamped to
    /// at least one frame.
    #[inline]
    pub fn output(&self, delay: f32) -> f32 {
        let delay = delay.clamp(1.0, self.max_delay());
        let whole = delay as usize;
        let alpha = delay - whole as f32;
        let x0 = self.buffer[self.write_pos.wrapping_sub(whole) & self.mask];
        let x1 = self.buffer[self.write_pos.wrapping_sub(whole + 1) & self.mask];
        x0 + alpha * (x1 - x0)
    }

    #[inline]
    pub fn push(&mut self, value: f32) {
        self.buffer[self.write_pos] = value;
        self.write_pos = (self.write_pos + 1) & self.mask;
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

/// A sine LFO for the modulated effects.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Lfo {
    phase: f32,
}

impl Lfo {
    /// Advances by one frame and returns the phase before the advance, in
    /// cycles.
    #[inline]
    pub fn next(&mut self, freq: f32, sample_rate: f32) -> f32 {
        let phase = self.phase;
        self.phase += freq / sample_rate;
        self.phase -= self.phase.floor();
        phase
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

/// The sine of a phase in cycles.
#[inline]
pub(crate) fn sine(phase: f32) -> f32 {
    (TAU * phase).sin()
}

/// Every effect's settings for one block.
#[derive(Debug, Clone, Copy, Default)]
pub struct FxParams {
    pub chorus: ChorusParams,
    pub flanger: FlangerParams,
    pub phaser: PhaserParams,
    pub delay: DelayParams,
    pub reverb: ReverbParams,
}

impl FxParams {
    /// Reads the effect parameters. A delay tempo of 0 follows the host.
    pub fn new(value: impl Fn(ParamIndex) -> f32, tempo: f32) -> FxParams {
        let bpm = value(ParamIndex::DEL1_BPM);
        FxParams {
            chorus: ChorusParams {
                wet: value(ParamIndex::CHO1_WET),
                delay: value(ParamIndex::CHO1_DELAY),
                feedb: value(ParamIndex::CHO1_FEEDB),
                rate: value(ParamIndex::CHO1_RATE),
                depth: value(ParamIndex::CHO1_MOD),
            },
            flanger: FlangerParams {
                wet: value(ParamIndex::FLA1_WET),
                delay: value(ParamIndex::FLA1_DELAY),
                feedb: value(ParamIndex::FLA1_FEEDB),
                daft: value(ParamIndex::FLA1_DAFT),
            },
            phaser: PhaserParams {
                wet: value(ParamIndex::PHA1_WET),
                rate: value(ParamIndex::PHA1_RATE),
                feedb: value(ParamIndex::PHA1_FEEDB),
                depth: value(ParamIndex::PHA1_DEPTH),
                daft: value(ParamIndex::PHA1_DAFT),
            },
            delay: DelayParams {
                wet: value(ParamIndex::DEL1_WET),
                delay: value(ParamIndex::DEL1_DELAY),
                feedb: value(ParamIndex::DEL1_FEEDB),
                bpm: if bpm > 0.0 { bpm } else { tempo },
            },
            reverb: ReverbParams {
                wet: value(ParamIndex::REV1_WET),
                room: value(ParamIndex::REV1_ROOM),
                damp: value(ParamIndex::REV1_DAMP),
                feedb: value(ParamIndex::REV1_FEEDB),
                width: value(ParamIndex::REV1_WIDTH),
            },
        }
    }
}

/// The effect chain and output dynamics of an engine.
pub struct EffectsBus {
    sample_rate: u32,
    chorus: Chorus,
    flanger: Flanger,
    phaser: Phaser,
    delay: Delay,
    reverb: Reverb,
    compressors: Vec<Compressor>,
}

impl EffectsBus {
    pub fn new(sample_rate: u32, channels: usize) -> EffectsBus {
        EffectsBus {
            sample_rate,
            chorus: Chorus::new(sample_rate),
            flanger: Flanger::new(sample_rate),
            phaser: Phaser::new(sample_rate),
            delay: Delay::new(sample_rate),
            reverb: Reverb::new(sample_rate),
            compressors: (0..channels).map(|_| Compressor::new(sample_rate)).collect(),
        }
    }

    /// Rebuilds every stage for the new rate. Not real-time safe.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        if sample_rate != self.sample_rate {
            *self = EffectsBus::new(sample_rate, self.compressors.len());
        }
    }

    /// Not real-time safe.
    pub fn set_channels(&mut self, channels: usize) {
        self.compressors
            .resize_with(channels, || Compressor::new(self.sample_rate));
        self.compressors.iter_mut().for_each(Compressor::reset);
    }

    pub fn reset(&mut self) {
        self.chorus.reset();
        self.flanger.reset();
        self.phaser.reset();
        self.delay.reset();
        self.reverb.reset();
        self.compressors.iter_mut().for_each(Compressor::reset);
    }

    /// Runs the send chain in place.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32], params: &FxParams) {
        self.chorus.process(left, right, &params.chorus);
        self.flanger.process(left, right, &params.flanger);
        self.phaser.process(left, right, &params.phaser);
        self.delay.process(left, right, &params.delay);
        self.reverb.process(left, right, &params.reverb);
    }

    /// Compresses and limits a range of every output channel in place.
    pub fn dynamics(
        &mut self,
        outs: &mut [&mut [f32]],
        offset: usize,
        nframes: usize,
        compress: bool,
        limiter: bool,
    ) {
        for (k, out) in outs.iter_mut().enumerate() {
            let Some(buffer) = out.get_mut(offset..offset + nframes) else {
                continue;
            };
            if compress {
                if let Some(compressor) = self.compressors.get_mut(k) {
                    compressor.process(buffer);
                }
            }
            if limiter {
                buffer.iter_mut().for_each(|x| *x = limit(*x));
            }
        }
    }
}
