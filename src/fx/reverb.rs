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
//! A Freeverb style reverb: eight parallel damped combs followed by four
//! series all-passes per channel, with the right channel's lines slightly
//! longer for stereo spread.

/// Comb lengths at 44.1 kHz.
const COMB_TUNING: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];

/// All-pass lengths at 44.1 kHz.
const ALLPASS_TUNING: [usize; 4] = [556, 441, 341, 225];

const STEREO_SPREAD: usize = 23;
const TUNING_RATE: f32 = 44100.0;
const INPUT_GAIN: f32 = 0.015;
const WET_SCALE: f32 = 3.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReverbParams {
    pub wet: f32,
    pub room: f32,
    pub damp: f32,
    pub feedb: f32,
    /// Stereo width, from swapped (-1) through mono-ish (0) to wide (1).
    pub width: f32,
}

struct Comb {
    buffer: Vec<f32>,
    pos: usize,
    filter_store: f32,
}

impl Comb {
    fn new(len: usize) -> Comb {
        Comb {
            buffer: vec![0.0; len.max(1)],
            pos: 0,
            filter_store: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let output = self.buffer[self.pos];
        self.filter_store = output * (1.0 - damp) + self.filter_store * damp;
        self.buffer[self.pos] = input + self.filter_store * feedback;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
        self.filter_store = 0.0;
    }
}

struct Allpass {
    buffer: Vec<f32>,
    pos: usize,
}

impl Allpass {
    fn new(len: usize) -> Allpass {
        Allpass {
            buffer: vec![0.0; len.max(1)],
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32) -> f32 {
        let delayed = self.buffer[self.pos];
        self.buffer[self.pos] = input + delayed * feedback;
        self.pos = (self.pos + 1) % self.buffer.len();
        delayed - input
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
    }
}

struct Channel {
    combs: Vec<Comb>,
    allpasses: Vec<Allpass>,
}

impl Channel {
    fn new(scale: f32, spread: usize) -> Channel {
        let len = |tuning: usize| ((tuning + spread) as f32 * scale) as usize;
        Channel {
            combs: COMB_TUNING.iter().map(|t| Comb::new(len(*t))).collect(),
            allpasses: ALLPASS_TUNING.iter().map(|t| Allpass::new(len(*t))).collect(),
        }
    }

    #[inline]
    fn process(&mut self, input: f32, room: f32, damp: f32, feedb: f32) -> f32 {
        let mut output = 0.0;
        for comb in self.combs.iter_mut() {
            output += comb.process(input, room, damp);
        }
        for allpass in self.allpasses.iter_mut() {
            output = allpass.process(output, feedb);
        }
        output
    }

    fn reset(&mut self) {
        self.combs.iter_mut().for_each(Comb::reset);
        self.allpasses.iter_mut().for_each(Allpass::reset);
    }
}

pub struct Reverb {
    channels: [Channel; 2],
}

impl Reverb {
    pub fn new(sample_rate: u32) -> Reverb {
        let scale = sample_rate as f32 / TUNING_RATE;
        Reverb {
            channels: [Channel::new(scale, 0), Channel::new(scale, STEREO_SPREAD)],
        }
    }

    pub fn reset(&mut self) {
        self.channels.iter_mut().for_each(Channel::reset);
    }

    pub fn process(&mut self, left: &mut [f32], right: &mut [f32], params: &ReverbParams) {
        let room = 0.7 + 0.28 * params.room.clamp(0.0, 1.0);
        let damp = 0.4 * params.damp.clamp(0.0, 1.0);
        let feedb = params.feedb.clamp(0.0, 0.9);
        let width = 0.5 * (1.0 + params.width.clamp(-1.0, 1.0));
        let wet = WET_SCALE * params.wet;
        let wet1 = wet * (0.5 * width + 0.5);
        let wet2 = wet * (0.5 * (1.0 - width));

        let [left_channel, right_channel] = &mut self.channels;
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let input = (*l + *r) * INPUT_GAIN;
            let out_l = left_channel.process(input, room, damp, feedb);
            let out_r = right_channel.process(input, room, damp, feedb);
            if params.wet > 0.0 {
                *l += wet1 * out_l + wet2 * out_r;
                *r += wet1 * out_r + wet2 * out_l;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil::audio_test_utils::calculate_rms;

    use super::*;

    fn impulse_response(params: &ReverbParams) -> (Vec<f32>, Vec<f32>) {
        let mut reverb = Reverb::new(48000);
        let mut left = vec![0.0; 48000];
        let mut right = vec![0.0; 48000];
        left[0] = 1.0;
        right[0] = 1.0;
        reverb.process(&mut left, &mut right, params);
        (left, right)
    }

    #[test]
    fn test_tail() {
        let params = ReverbParams {
            wet: 1.0,
            room: 0.5,
            damp: 0.5,
            feedb: 0.5,
            width: 1.0,
        };
        let (left, right) = impulse_response(&params);
        // Nothing comes back before the shortest comb.
        assert!(left[1..1000].iter().all(|x| *x == 0.0));
        assert!(calculate_rms(&left[1000..]) > 0.0);
        assert_ne!(left[2000..], right[2000..]);

        let longer = ReverbParams { room: 1.0, ..params };
        let (long_left, _) = impulse_response(&longer);
        assert!(calculate_rms(&long_left[24000..]) > calculate_rms(&left[24000..]));
    }
}
