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
use crate::dsp::sigmoid;

/// Compression starts above this level (-12 dBFS).
const COMP_THRESHOLD: f32 = 0.25;
const COMP_RATIO: f32 = 4.0;
const COMP_ATTACK_MSECS: f32 = 5.0;
const COMP_RELEASE_MSECS: f32 = 80.0;

/// The soft limiter: unity gain around zero, saturating at ±1 from ±1.5.
#[inline]
pub fn limit(x: f32) -> f32 {
    sigmoid(x * (2.0 / 3.0))
}

/// A feed-forward peak compressor for one channel.
pub struct Compressor {
    attack: f32,
    release: f32,
    envelope: f32,
}

impl Compressor {
    pub fn new(sample_rate: u32) -> Compressor {
        let coef = |msecs: f32| (-1.0 / (0.001 * msecs * sample_rate.max(1) as f32)).exp();
        Compressor {
            attack: coef(COMP_ATTACK_MSECS),
            release: coef(COMP_RELEASE_MSECS),
            envelope: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }

    pub fn process(&mut self, buffer: &mut [f32]) {
        for x in buffer.iter_mut() {
            let level = x.abs();
            let coef = if level > self.envelope {
                self.attack
            } else {
                self.release
            };
            self.envelope = level + coef * (self.envelope - level);
            if self.envelope > COMP_THRESHOLD {
                let target = COMP_THRESHOLD + (self.envelope - COMP_THRESHOLD) / COMP_RATIO;
                *x *= target / self.envelope;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil::audio_test_utils::{calculate_rms, generate_sine};

    use super::*;

    #[test]
    fn test_limit() {
        assert_eq!(limit(0.0), 0.0);
        assert!((limit(0.01) - 0.01).abs() < 1e-5);
        assert!((limit(1.5) - 1.0).abs() < 1e-6);
        assert_eq!(limit(10.0), 1.0);
        assert_eq!(limit(-10.0), -1.0);

        let mut last = -1.0;
        for i in -300..=300 {
            let y = limit(i as f32 / 100.0);
            assert!(y >= last && y.abs() <= 1.0);
            last = y;
        }
    }

    #[test]
    fn test_compressor() {
        let mut compressor = Compressor::new(48000);
        let quiet: Vec<f32> = generate_sine(440.0, 48000, 0.5)
            .into_iter()
            .map(|x| x * 0.1)
            .collect();
        let mut buffer = quiet.clone();
        compressor.process(&mut buffer);
        assert_eq!(buffer, quiet);

        let loud = generate_sine(440.0, 48000, 0.5);
        let mut buffer = loud.clone();
        compressor.process(&mut buffer);
        let before = calculate_rms(&loud[4800..]);
        let after = calculate_rms(&buffer[4800..]);
        assert!(after < 0.6 * before, "{} {}", before, after);

        compressor.reset();
        let mut buffer = quiet.clone();
        compressor.process(&mut buffer);
        assert_eq!(buffer, quiet);
    }
}
