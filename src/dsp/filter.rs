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
use std::f32::consts::{FRAC_1_SQRT_2, PI};

/// Lowest cutoff frequency, in Hz.
const MIN_CUTOFF_HZ: f32 = 20.0;

/// Highest cutoff frequency as a fraction of the sample rate.
const MAX_CUTOFF_RATIO: f32 = 0.45;

/// Coefficients are only recomputed when a control moves by more than this.
const COEFF_EPSILON: f32 = 1e-4;

/// Filter response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    LowPass,
    BandPass,
    HighPass,
    Notch,
}

impl FilterKind {
    /// Maps the `DCF1_TYPE` parameter onto a kind.
    pub fn from_param(value: f32) -> FilterKind {
        match value.round() as i32 {
            0 => FilterKind::LowPass,
            1 => FilterKind::BandPass,
            2 => FilterKind::HighPass,
            _ => FilterKind::Notch,
        }
    }
}

/// Filter topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterSlope {
    /// 12 dB/octave state variable filter.
    Db12,
    /// Two cascaded state variable filters.
    Db24,
    /// RBJ biquad.
    Biquad,
    /// Vowel formant bank; the cutoff morphs through the vowels.
    Formant,
}

impl FilterSlope {
    /// Maps the `DCF1_SLOPE` parameter onto a slope.
    pub fn from_param(value: f32) -> FilterSlope {
        match value.round() as i32 {
            0 => FilterSlope::Db12,
            1 => FilterSlope::Db24,
            2 => FilterSlope::Biquad,
            _ => FilterSlope::Formant,
        }
    }
}

/// Maps a normalized cutoff onto Hz, exponentially from 20 Hz to just under
/// Nyquist.
fn cutoff_hz(cutoff: f32, sample_rate: f32) -> f32 {
    let max_hz = MAX_CUTOFF_RATIO * sample_rate;
    MIN_CUTOFF_HZ * (max_hz / MIN_CUTOFF_HZ).powf(cutoff.clamp(0.0, 1.0))
}

/// Topology preserving transform state variable filter.
#[derive(Debug, Clone, Copy, Default)]
struct Svf {
    ic1eq: f32,
    ic2eq: f32,
}

struct SvfOutputs {
    low: f32,
    band: f32,
    high: f32,
    notch: f32,
}

impl Svf {
    #[inline]
    fn process(&mut self, x: f32, g: f32, k: f32) -> SvfOutputs {
        let h = 1.0 / (1.0 + g * (g + k));
        let v3 = x - self.ic2eq;
        let v1 = h * (self.ic1eq + g * v3);
        let v2 = self.ic2eq + g * v1;

        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;

        SvfOutputs {
            low: v2,
            band: v1,
            high: x - k * v1 - v2,
            notch: x - k * v1,
        }
    }

    #[inline]
    fn output(&mut self, x: f32, g: f32, k: f32, kind: FilterKind) -> f32 {
        let outputs = self.process(x, g, k);
        match kind {
            FilterKind::LowPass => outputs.low,
            FilterKind::BandPass => outputs.band,
            FilterKind::HighPass => outputs.high,
            FilterKind::Notch => outputs.notch,
        }
    }
}

/// RBJ cookbook biquad, transposed direct form II.
#[derive(Debug, Clone, Copy, Default)]
struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1: f32,
    z2: f32,
}

impl Biquad {
    fn set(&mut self, kind: FilterKind, hz: f32, reso: f32, sample_rate: f32) {
        let w0 = 2.0 * PI * hz / sample_rate;
        let (sin, cos) = w0.sin_cos();
        let q = FRAC_1_SQRT_2 + 12.0 * reso * reso;
        let alpha = sin / (2.0 * q);

        let (b0, b1, b2) = match kind {
            FilterKind::LowPass => (0.5 * (1.0 - cos), 1.0 - cos, 0.5 * (1.0 - cos)),
            FilterKind::HighPass => (0.5 * (1.0 + cos), -(1.0 + cos), 0.5 * (1.0 + cos)),
            FilterKind::BandPass => (alpha, 0.0, -alpha),
            FilterKind::Notch => (1.0, -2.0 * cos, 1.0),
        };
        let a0 = 1.0 + alpha;
        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = -2.0 * cos / a0;
        self.a2 = (1.0 - alpha) / a0;
    }

    #[inline]
    fn process(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }
}

/// Formant frequencies (Hz), gains (dB) and bandwidths (Hz) for the vowels
/// A, E, I, O and U.
const VOWELS: [[(f32, f32, f32); 5]; 5] = [
    [
        (650.0, 0.0, 80.0),
        (1080.0, -6.0, 90.0),
        (2650.0, -7.0, 120.0),
        (2900.0, -8.0, 130.0),
        (3250.0, -22.0, 140.0),
    ],
    [
        (400.0, 0.0, 70.0),
        (1700.0, -14.0, 80.0),
        (2600.0, -12.0, 100.0),
        (3200.0, -14.0, 120.0),
        (3580.0, -20.0, 120.0),
    ],
    [
        (290.0, 0.0, 40.0),
        (1870.0, -15.0, 90.0),
        (2800.0, -18.0, 100.0),
        (3250.0, -20.0, 120.0),
        (3540.0, -30.0, 120.0),
    ],
    [
        (400.0, 0.0, 40.0),
        (800.0, -10.0, 80.0),
        (2600.0, -12.0, 100.0),
        (2800.0, -12.0, 120.0),
        (3000.0, -26.0, 120.0),
    ],
    [
        (350.0, 0.0, 40.0),
        (600.0, -20.0, 60.0),
        (2700.0, -17.0, 100.0),
        (2900.0, -14.0, 120.0),
        (3300.0, -26.0, 120.0),
    ],
];

#[derive(Debug, Clone, Copy, Default)]
struct FormantBand {
    svf: Svf,
    g: f32,
    k: f32,
    gain: f32,
}

/// Five parallel band-pass resonators.
#[derive(Debug, Clone, Copy, Default)]
struct Formant {
    bands: [FormantBand; 5],
}

impl Formant {
    fn set(&mut self, cutoff: f32, reso: f32, sample_rate: f32) {
        let position = cutoff.clamp(0.0, 1.0) * (VOWELS.len() - 1) as f32;
        let v0 = (position as usize).min(VOWELS.len() - 1);
        let v1 = (v0 + 1).min(VOWELS.len() - 1);
        let frac = position - v0 as f32;
        let narrow = 1.0 - 0.9 * reso.clamp(0.0, 1.0);
        let nyquist = 0.5 * sample_rate;

        for (i, band) in self.bands.iter_mut().enumerate() {
            let (f0, db0, bw0) = VOWELS[v0][i];
            let (f1, db1, bw1) = VOWELS[v1][i];
            let freq = (f0 + frac * (f1 - f0)).min(0.9 * nyquist);
            let db = db0 + frac * (db1 - db0);
            let bandwidth = (bw0 + frac * (bw1 - bw0)) * narrow;

            band.g = (PI * freq / sample_rate).tan();
            band.k = (bandwidth / freq).max(0.01);
            band.gain = 10f32.powf(db / 20.0);
        }
    }

    #[inline]
    fn process(&mut self, x: f32) -> f32 {
        self.bands
            .iter_mut()
            .map(|band| band.gain * band.k * band.svf.process(x, band.g, band.k).band)
            .sum()
    }
}

/// One filter of a voice. Changing the slope or kind goes through
/// [`Filter::reset`], which clears the filter state.
#[derive(Debug, Clone, Copy)]
pub struct Filter {
    slope: FilterSlope,
    kind: FilterKind,
    sample_rate: f32,
    svf: [Svf; 2],
    biquad: Biquad,
    formant: Formant,
    cutoff: f32,
    reso: f32,
    g: f32,
    k: f32,
}

impl Filter {
    pub fn new(sample_rate: u32) -> Filter {
        let mut filter = Filter {
            slope: FilterSlope::Db12,
            kind: FilterKind::LowPass,
            sample_rate: sample_rate.max(1) as f32,
            svf: [Svf::default(); 2],
            biquad: Biquad::default(),
            formant: Formant::default(),
            cutoff: -1.0,
            reso: -1.0,
            g: 0.0,
            k: 2.0,
        };
        filter.reset(FilterSlope::Db12, FilterKind::LowPass);
        filter
    }

    /// Switches topology and response, clearing all state.
    pub fn reset(&mut self, slope: FilterSlope, kind: FilterKind) {
        self.slope = slope;
        self.kind = kind;
        self.svf = [Svf::default(); 2];
        self.biquad = Biquad::default();
        self.formant = Formant::default();
        // Forces the coefficients to be computed on the next sample.
        self.cutoff = -1.0;
        self.reso = -1.0;
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate.max(1) as f32;
        self.reset(self.slope, self.kind);
    }

    pub fn slope(&self) -> FilterSlope {
        self.slope
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    fn update(&mut self, cutoff: f32, reso: f32) {
        if (cutoff - self.cutoff).abs() < COEFF_EPSILON && (reso - self.reso).abs() < COEFF_EPSILON
        {
            return;
        }
        self.cutoff = cutoff;
        self.reso = reso;

        let hz = cutoff_hz(cutoff, self.sample_rate);
        match self.slope {
            FilterSlope::Db12 | FilterSlope::Db24 => {
                self.g = (PI * hz / self.sample_rate).tan();
                self.k = 2.0 - 1.95 * reso.clamp(0.0, 1.0);
            }
            FilterSlope::Biquad => self.biquad.set(self.kind, hz, reso, self.sample_rate),
            FilterSlope::Formant => self.formant.set(cutoff, reso, self.sample_rate),
        }
    }

    /// Filters one sample. Cutoff and resonance are normalized to `[0, 1]`.
    #[inline]
    pub fn output(&mut self, x: f32, cutoff: f32, reso: f32) -> f32 {
        self.update(cutoff, reso);
        match self.slope {
            FilterSlope::Db12 => self.svf[0].output(x, self.g, self.k, self.kind),
            FilterSlope::Db24 => {
                let y = self.svf[0].output(x, self.g, self.k, self.kind);
                self.svf[1].output(y, self.g, self.k, self.kind)
            }
            FilterSlope::Biquad => self.biquad.process(x),
            FilterSlope::Formant => self.formant.process(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::audio_test_utils::{calculate_rms, generate_sine};

    const RATE: u32 = 48000;

    fn filtered_rms(slope: FilterSlope, kind: FilterKind, freq: f32, cutoff: f32) -> f32 {
        let mut filter = Filter::new(RATE);
        filter.reset(slope, kind);
        let output: Vec<f32> = generate_sine(freq, RATE, 0.2)
            .into_iter()
            .map(|x| filter.output(x, cutoff, 0.0))
            .collect();
        calculate_rms(&output[RATE as usize / 20..])
    }

    /// Normalized cutoff for 1 kHz at 48 kHz.
    fn cutoff_1k() -> f32 {
        (1000.0f32 / MIN_CUTOFF_HZ).ln() / (MAX_CUTOFF_RATIO * RATE as f32 / MIN_CUTOFF_HZ).ln()
    }

    #[test]
    fn test_param_mapping() {
        assert_eq!(FilterKind::from_param(0.0), FilterKind::LowPass);
        assert_eq!(FilterKind::from_param(1.0), FilterKind::BandPass);
        assert_eq!(FilterKind::from_param(2.0), FilterKind::HighPass);
        assert_eq!(FilterKind::from_param(3.0), FilterKind::Notch);
        assert_eq!(FilterSlope::from_param(0.0), FilterSlope::Db12);
        assert_eq!(FilterSlope::from_param(1.0), FilterSlope::Db24);
        assert_eq!(FilterSlope::from_param(2.0), FilterSlope::Biquad);
        assert_eq!(FilterSlope::from_param(3.0), FilterSlope::Formant);
    }

    #[test]
    fn test_cutoff_hz() {
        assert!((cutoff_hz(0.0, 48000.0) - 20.0).abs() < 1e-3);
        assert!((cutoff_hz(1.0, 48000.0) - 21600.0).abs() < 1.0);
        assert!((cutoff_hz(cutoff_1k(), 48000.0) - 1000.0).abs() < 1.0);
    }

    #[test]
    fn test_lowpass_slopes() {
        let cutoff = cutoff_1k();
        for slope in [FilterSlope::Db12, FilterSlope::Db24, FilterSlope::Biquad] {
            let pass = filtered_rms(slope, FilterKind::LowPass, 100.0, cutoff);
            let stop = filtered_rms(slope, FilterKind::LowPass, 10000.0, cutoff);
            assert!(pass > 0.6, "{:?} {}", slope, pass);
            assert!(stop < 0.1, "{:?} {}", slope, stop);
        }

        // The steeper slope rejects more.
        let db12 = filtered_rms(FilterSlope::Db12, FilterKind::LowPass, 4000.0, cutoff);
        let db24 = filtered_rms(FilterSlope::Db24, FilterKind::LowPass, 4000.0, cutoff);
        assert!(db24 < db12);
    }

    #[test]
    fn test_highpass() {
        let cutoff = cutoff_1k();
        for slope in [FilterSlope::Db12, FilterSlope::Biquad] {
            let pass = filtered_rms(slope, FilterKind::HighPass, 10000.0, cutoff);
            let stop = filtered_rms(slope, FilterKind::HighPass, 50.0, cutoff);
            assert!(pass > 0.6, "{:?} {}", slope, pass);
            assert!(stop < 0.05, "{:?} {}", slope, stop);
        }
    }

    #[test]
    fn test_notch() {
        let notched = filtered_rms(FilterSlope::Biquad, FilterKind::Notch, 1000.0, cutoff_1k());
        assert!(notched < 0.05, "{}", notched);
    }

    #[test]
    fn test_formant_is_stable() {
        let mut filter = Filter::new(RATE);
        filter.reset(FilterSlope::Formant, FilterKind::LowPass);
        for (i, x) in generate_sine(650.0, RATE, 0.2).into_iter().enumerate() {
            let cutoff = i as f32 / 9600.0;
            let y = filter.output(x, cutoff.min(1.0), 0.5);
            assert!(y.is_finite() && y.abs() < 10.0);
        }
    }

    #[test]
    fn test_reset_clears_state() {
        let mut filter = Filter::new(RATE);
        for _ in 0..100 {
            filter.output(1.0, 0.5, 0.5);
        }
        filter.reset(FilterSlope::Db24, FilterKind::HighPass);
        assert_eq!(filter.slope(), FilterSlope::Db24);
        assert_eq!(filter.kind(), FilterKind::HighPass);
        // No state means no output from silence.
        assert_eq!(filter.output(0.0, 0.5, 0.5), 0.0);
    }
}
