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
use super::DelayLine;

/// Longest delay, in seconds.
const MAX_DELAY_SECS: f32 = 4.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct DelayParams {
    pub wet: f32,
    /// The delay time as a fraction of a beat.
    pub delay: f32,
    pub feedb: f32,
    pub bpm: f32,
}

/// A tempo synced feedback delay per channel.
pub struct Delay {
    sample_rate: f32,
    lines: [DelayLine; 2],
}

impl Delay {
    pub fn new(sample_rate: u32) -> Delay {
        let max_frames = (MAX_DELAY_SECS * sample_rate as f32) as usize;
        Delay {
            sample_rate: sample_rate as f32,
            lines: [DelayLine::new(max_frames), DelayLine::new(max_frames)],
        }
    }

    pub fn reset(&mut self) {
        self.lines.iter_mut().for_each(DelayLine::reset);
    }

    pub fn process(&mut self, left: &mut [f32], right: &mut [f32], params: &DelayParams) {
        let beat = 60.0 * self.sample_rate / params.bpm.max(60.0 / MAX_DELAY_SECS);
        let frames = (params.delay * beat).max(1.0);
        let feedb = 0.95 * params.feedb;

        for (k, buffer) in [left, right].into_iter().enumerate() {
            let line = &mut self.lines[k];
            for x in buffer.iter_mut() {
                let y = line.output(frames);
                line.push(*x + feedb * y);
                if params.wet > 0.0 {
                    *x += params.wet * y;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_lands_on_beat_fraction() {
        let mut delay = Delay::new(1000);
        let params = DelayParams {
            wet: 0.5,
            delay: 0.5,
            feedb: 0.0,
            bpm: 120.0,
        };
        let mut left = vec![0.0; 600];
        let mut right = vec![0.0; 600];
        left[0] = 1.0;
        delay.process(&mut left, &mut right, &params);

        // Half a beat at 120 BPM is 250 ms.
        assert_eq!(left[0], 1.0);
        assert_eq!(left[250], 0.5);
        assert_eq!(left[500], 0.0);
        let echoes = left.iter().filter(|x| **x != 0.0).count();
        assert_eq!(echoes, 2);
        assert!(right.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_feedback_repeats() {
        let mut delay = Delay::new(1000);
        let params = DelayParams {
            wet: 1.0,
            delay: 0.1,
            feedb: 1.0,
            bpm: 60.0,
        };
        let mut left = vec![0.0; 350];
        let mut right = vec![0.0; 350];
        left[0] = 1.0;
        delay.process(&mut left, &mut right, &params);
        assert_eq!(left[100], 1.0);
        assert!((left[200] - 0.95).abs() < 1e-6);
        assert!((left[300] - 0.95 * 0.95).abs() < 1e-6);
    }
}
