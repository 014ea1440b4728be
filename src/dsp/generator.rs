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
use crate::sample::SampleData;

/// A voice's read head into its element's sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct Generator {
    phase: f64,
    index: usize,
    alpha: f32,
}

impl Generator {
    /// Rewinds to the start of the sample's playable region.
    pub fn start(&mut self, sample: &SampleData) {
        self.set_phase(sample.offset_phase0() as f64);
    }

    fn set_phase(&mut self, phase: f64) {
        self.phase = phase;
        self.index = phase as usize;
        self.alpha = (phase - phase.floor()) as f32;
    }

    /// Advances by one output frame played at the given frequency.
    #[inline]
    pub fn next(&mut self, sample: &SampleData, freq: f32) {
        let delta = (freq * sample.ratio()).max(0.0) as f64;
        self.set_phase(self.phase + delta);
    }

    /// The cubic interpolated value of channel `k` at the read head.
    #[inline]
    pub fn value(&self, sample: &SampleData, k: usize) -> f32 {
        if self.is_over(sample) {
            return 0.0;
        }

        // The guard frame ahead of the audio puts frame i at i + 1.
        let frames = sample.frames(k);
        let i = self.index;
        let (x0, x1, x2, x3) = (frames[i], frames[i + 1], frames[i + 2], frames[i + 3]);

        let c1 = 0.5 * (x2 - x0);
        let c2 = x0 - 2.5 * x1 + 2.0 * x2 - 0.5 * x3;
        let c3 = 0.5 * (x3 - x0) + 1.5 * (x1 - x2);
        ((c3 * self.alpha + c2) * self.alpha + c1) * self.alpha + x1
    }

    /// Whether playback reached the end of the playable region.
    #[inline]
    pub fn is_over(&self, sample: &SampleData) -> bool {
        self.index >= sample.offset_end2()
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }
}
