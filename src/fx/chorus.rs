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

/// Longest chorus tap, in milliseconds.
const MAX_CHORUS_MSECS: f32 = 50.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct ChorusParams {
    pub wet: f32,
    pub delay: f32,
    pub feedb: f32,
    pub rate: f32,
    pub depth: f32,
}

/// A stereo chorus: two modulated taps in quadrature, each feeding back
/// into the other side.
pub struct Chorus {
    sample_rate: f32,
    lines: [DelayLine; 2],
    lfo: Lfo,
}

impl Chorus {
    pub fn new(sample_rate: u32) -> Chorus {
        let max_frames = (0.001 * MAX_CHORUS_MSECS * sample_rate as f32) as usize;
        Chorus {
            sample_rate: sample_rate as f32,
            lines: [DelayLine::new(max_frames), DelayLine::new(max_frames)],
            lfo: Lfo::default(),
        }
    }

    pub fn reset(&mut self) {
        self.lines.iter_mut().for_each(DelayLine::reset);
        self.lfo.reset();
    }

    pub fn process(&mut self, left: &mut [f32], right: &mut [f32], params: &ChorusParams) {
        let base = 0.001 * self.sample_rate * (1.0 + 24.0 * params.delay);
        let depth = 0.5 * base * params.depth;
        let freq = 0.05 + 4.95 * params.rate * params.rate;
        let feedb = 0.95 * params.feedb;

        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let phase = self.lfo.next(freq, self.sample_rate);
            let y_l = self.lines[0].output(base + depth * sine(phase));
            let y_r = self.lines[1].output(base + depth * sine(phase + 0.25));
            self.lines[0].push(*l + feedb * y_r);
            self.lines[1].push(*r + feedb * y_l);
            if params.wet > 0.0 {
                *l += params.wet * y_l;
                *r += params.wet * y_r;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impulse_arrives_after_base_delay() {
        let mut chorus = Chorus::new(1000);
        let params = ChorusParams {
            wet: 1.0,
            delay: 0.0,
            feedb: 0.0,
            rate: 0.0,
            depth: 0.0,
        };
        let mut left = vec![0.0; 8];
        let mut right = vec![0.0; 8];
        left[0] = 1.0;
        chorus.process(&mut left, &mut right, &params);

        // One millisecond at 1 kHz.
        assert_eq!(left[0], 1.0);
        assert_eq!(left[1], 1.0);
        assert_eq!(left[2], 0.0);
        assert!(right.iter().all(|x| *x == 0.0));
    }
}
