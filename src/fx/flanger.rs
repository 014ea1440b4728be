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
use super::{sine, DelayLine, Lfo};

/// Longest flanger tap, in milliseconds.
const MAX_FLANGER_MSECS: f32 = 20.0;

/// The sweep rate.
const FLANGER_LFO_HZ: f32 = 0.25;

#[derive(Debug, Clone, Copy, Default)]
pub struct FlangerParams {
    pub wet: f32,
    pub delay: f32,
    pub feedb: f32,
    /// Phase offset of the right sweep, up to half a cycle.
    pub daft: f32,
}

pub struct Flanger {
    sample_rate: f32,
    lines: [DelayLine; 2],
    lfo: Lfo,
}

impl Flanger {
    pub fn new(sample_rate: u32) -> Flanger {
        let max_frames = (0.001 * MAX_FLANGER_MSECS * sample_rate as f32) as usize;
        Flanger {
            sample_rate: sample_rate as f32,
            lines: [DelayLine::new(max_frames), DelayLine::new(max_frames)],
            lfo: Lfo::default(),
        }
    }

    pub fn reset(&mut self) {
        self.lines.iter_mut().for_each(DelayLine::reset);
        self.lfo.reset();
    }

    pub fn process(&mut self, left: &mut [f32], right: &mut [f32], params: &FlangerParams) {
        let base = 0.001 * self.sample_rate * (0.1 + 9.9 * params.delay);
        let feedb = 0.95 * params.feedb;
        let offset = 0.5 * params.daft;

        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let phase = self.lfo.next(FLANGER_LFO_HZ, self.sample_rate);
            for (k, x) in [l, r].into_iter().enumerate() {
                let sweep = sine(phase + k as f32 * offset);
                let line = &mut self.lines[k];
                let y = line.output(base * (0.55 + 0.45 * sweep));
                line.push(*x + feedb * y);
                if params.wet > 0.0 {
                    *x += params.wet * y;
                }
            }
        }
    }
}
