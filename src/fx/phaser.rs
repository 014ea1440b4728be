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
use super::{sine, Lfo};

/// All-pass stages per channel.
const PHASER_STAGES: usize = 6;

/// The sweep range, in Hz.
const PHASER_MIN_HZ: f32 = 440.0;
const PHASER_MAX_HZ: f32 = 4400.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct PhaserParams {
    pub wet: f32,
    pub rate: f32,
    pub feedb: f32,
    pub depth: f32,
    /// Phase offset of the right sweep, up to half a cycle.
    pub daft: f32,
}

/// A six stage phaser per channel, with feedback around the stages.
pub struct Phaser {
    sample_rate: f32,
    stages: [[f32; PHASER_STAGES]; 2],
    feedback: [f32; 2],
    lfo: Lfo,
}

impl Phaser {
    pub fn new(sample_rate: u32) -> Phaser {
        Phaser {
            sample_rate: sample_rate as f32,
            stages: [[0.0; PHASER_STAGES]; 2],
            feedback: [0.0; 2],
            lfo: Lfo::default(),
        }
    }

    pub fn reset(&mut self) {
        self.stages = [[0.0; PHASER_STAGES]; 2];
        self.feedback = [0.0; 2];
        self.lfo.reset();
    }

    pub fn process(&mut self, left: &mut [f32], right: &mut [f32], params: &PhaserParams) {
        let freq = 0.05 + 4.95 * params.rate * params.rate;
        let feedb = 0.95 * params.feedb;
        let offset = 0.5 * params.daft;
        let nyquist = 0.5 * self.sample_rate;
        let max_hz = (PHASER_MIN_HZ + params.depth * (PHASER_MAX_HZ - PHASER_MIN_HZ))
            .min(0.9 * nyquist);

        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let phase = self.lfo.next(freq, self.sample_rate);
            for (k, x) in [l, r].into_iter().enumerate() {
                let sweep = 0.5 * (1.0 + sine(phase + k as f32 * offset));
                let d = (PHASER_MIN_HZ + sweep * (max_hz - PHASER_MIN_HZ)) / nyquist;
                let a = (1.0 - d) / (1.0 + d);

                let mut y = *x + feedb * self.feedback[k];
                for zm1 in self.stages[k].iter_mut() {
                    let out = -a * y + *zm1;
                    *zm1 = a * out + y;
                    y = out;
                }
                self.feedback[k] = y;
                if params.wet > 0.0 {
                    *x += params.wet * y;
                }
            }
        }
    }
}
