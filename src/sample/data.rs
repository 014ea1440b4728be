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
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::decode::{decode_file, DecodedAudio};
use super::error::SampleError;
use super::resample::resample;

/// Guard frames stored ahead of the audio so cubic interpolation can look one
/// frame back.
pub const GUARD_FRAMES_PRE: usize = 1;

/// Guard frames stored after the audio so cubic interpolation can look two
/// frames ahead of the last one.
pub const GUARD_FRAMES_POST: usize = 3;

/// The audio of one element, resampled to the engine's rate.
///
/// Frames are stored per channel as `[pre guard][audio][post guard]`. The
/// playable region can be narrowed with an offset range; when offset mode is
/// on, its endpoints are snapped to zero crossings.
#[derive(Clone, Default)]
pub struct SampleData {
    path: Option<PathBuf>,
    sample_rate: u32,
    nframes: usize,
    frames: Vec<Vec<f32>>,
    freq0: f32,
    ratio: f32,
    reverse: bool,
    offset: bool,
    offset_start: usize,
    offset_end: usize,
    offset_phase0: usize,
    offset_end2: usize,
}

impl SampleData {
    /// Creates an empty, silent sample.
    pub fn new() -> SampleData {
        SampleData::default()
    }

    /// Decodes the given file and resamples it to the engine's rate. On
    /// failure the sample is left empty.
    pub fn open(&mut self, path: &Path, freq0: f32, engine_rate: u32) -> Result<(), SampleError> {
        self.close();
        let decoded = decode_file(path).inspect_err(|e| {
            warn!(path = ?path, err = %e, "Unable to decode sample");
        })?;
        self.load(decoded, freq0, engine_rate)?;
        self.path = Some(path.to_path_buf());

        info!(
            path = ?path,
            channels = self.channels(),
            sample_rate = self.sample_rate,
            frames = self.nframes,
            memory_kb = (self.nframes * self.channels() * std::mem::size_of::<f32>()) / 1024,
            "Sample loaded"
        );
        Ok(())
    }

    /// Loads interleaved PCM supplied by the caller. On failure the sample is
    /// left empty.
    pub fn open_pcm(
        &mut self,
        interleaved: &[f32],
        channels: usize,
        sample_rate: u32,
        freq0: f32,
        engine_rate: u32,
    ) -> Result<(), SampleError> {
        self.close();
        let decoded = DecodedAudio::from_interleaved(interleaved, channels, sample_rate)?;
        self.load(decoded, freq0, engine_rate)
    }

    fn load(
        &mut self,
        decoded: DecodedAudio,
        freq0: f32,
        engine_rate: u32,
    ) -> Result<(), SampleError> {
        if decoded.nframes() == 0 {
            return Err(SampleError::Empty);
        }
        let decoded = resample(decoded, engine_rate)?;
        let nframes = decoded.nframes();

        self.frames = decoded
            .channels
            .into_iter()
            .map(|channel| {
                let mut frames = Vec::with_capacity(nframes + GUARD_FRAMES_PRE + GUARD_FRAMES_POST);
                frames.resize(GUARD_FRAMES_PRE, 0.0);
                frames.extend_from_slice(&channel[..nframes.min(channel.len())]);
                frames.resize(nframes + GUARD_FRAMES_PRE + GUARD_FRAMES_POST, 0.0);
                frames
            })
            .collect();
        self.sample_rate = decoded.sample_rate;
        self.nframes = nframes;
        self.freq0 = freq0.max(f32::EPSILON);
        self.ratio = self.sample_rate as f32 / (self.freq0 * engine_rate.max(1) as f32);

        if self.reverse {
            self.mirror();
        }
        self.offset_start = 0;
        self.offset_end = nframes;
        self.update_offset();
        Ok(())
    }

    /// Releases the audio. The reverse and offset flags are kept.
    pub fn close(&mut self) {
        self.path = None;
        self.frames = Vec::new();
        self.sample_rate = 0;
        self.nframes = 0;
        self.ratio = 0.0;
        self.offset_start = 0;
        self.offset_end = 0;
        self.offset_phase0 = 0;
        self.offset_end2 = 0;
    }

    /// Plays the audio backwards. The buffers are mirrored in place when the
    /// flag changes.
    pub fn set_reverse(&mut self, reverse: bool) {
        if self.reverse != reverse {
            self.reverse = reverse;
            self.mirror();
            self.update_offset();
        }
    }

    pub fn is_reverse(&self) -> bool {
        self.reverse
    }

    /// Restricts playback to the offset range, snapped to zero crossings.
    pub fn set_offset(&mut self, offset: bool) {
        self.offset = offset;
        self.update_offset();
    }

    pub fn is_offset(&self) -> bool {
        self.offset
    }

    /// Sets the offset range in frames. Both ends are clamped to the audio;
    /// an empty or inverted range is widened.
    pub fn set_offset_range(&mut self, start: usize, end: usize) {
        let nframes = self.nframes;
        let mut start = start.min(nframes);
        let mut end = end.min(nframes);
        if start >= end {
            end = nframes;
            if start >= end {
                start = end.saturating_sub(1);
            }
        }
        self.offset_start = start;
        self.offset_end = end;
        self.update_offset();
    }

    fn update_offset(&mut self) {
        if self.offset && self.nframes > 0 {
            let mut slope = 0;
            self.offset_phase0 = self.zero_crossing(self.offset_start, &mut slope);
            self.offset_end2 = self.zero_crossing(self.offset_end, &mut slope);
        } else {
            self.offset_phase0 = 0;
            self.offset_end2 = self.nframes;
        }
    }

    /// Finds the first zero crossing of the mean of all channels at or after
    /// `i`. A zero `slope` accepts either direction and is set to the
    /// direction found; otherwise only crossings in that direction match.
    /// Returns the frame count when there is none.
    pub fn zero_crossing(&self, i: usize, slope: &mut i32) -> usize {
        let nframes = self.nframes;
        if nframes == 0 {
            return 0;
        }

        let mut i = i.min(nframes);
        if i > 0 {
            i -= 1;
        }
        let mut v0 = self.mean(i);
        i += 1;
        while i < nframes {
            let v1 = self.mean(i);
            let s0 = *slope;
            if (s0 <= 0 && v0 >= 0.0 && 0.0 >= v1) || (s0 >= 0 && v1 >= 0.0 && 0.0 >= v0) {
                if s0 == 0 {
                    *slope = if v1 < v0 { -1 } else { 1 };
                }
                return i;
            }
            v0 = v1;
            i += 1;
        }

        nframes
    }

    fn mean(&self, i: usize) -> f32 {
        let sum: f32 = self
            .frames
            .iter()
            .map(|channel| channel[i + GUARD_FRAMES_PRE])
            .sum();
        sum / self.frames.len() as f32
    }

    fn mirror(&mut self) {
        let nframes = self.nframes;
        for channel in self.frames.iter_mut() {
            channel[GUARD_FRAMES_PRE..GUARD_FRAMES_PRE + nframes].reverse();
        }
    }

    /// The file the audio came from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.nframes == 0
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.frames.len()
    }

    pub fn nframes(&self) -> usize {
        self.nframes
    }

    /// The frequency the audio sounds at when played at its own rate.
    pub fn freq0(&self) -> f32 {
        self.freq0
    }

    /// Read head increment per hertz of playback frequency.
    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    pub fn offset_start(&self) -> usize {
        self.offset_start
    }

    pub fn offset_end(&self) -> usize {
        self.offset_end
    }

    /// Where playback starts.
    pub fn offset_phase0(&self) -> usize {
        self.offset_phase0
    }

    /// Where playback stops.
    pub fn offset_end2(&self) -> usize {
        self.offset_end2
    }

    /// The guarded frames of channel `k`; channels past the last repeat it.
    #[inline]
    pub fn frames(&self, k: usize) -> &[f32] {
        let k = k.min(self.frames.len().saturating_sub(1));
        self.frames.get(k).map(|frames| frames.as_slice()).unwrap_or(&[])
    }
}

impl fmt::Debug for SampleData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleData")
            .field("path", &self.path)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels())
            .field("nframes", &self.nframes)
            .field("reverse", &self.reverse)
            .field("offset", &self.offset)
            .field("offset_start", &self.offset_start)
            .field("offset_end", &self.offset_end)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{audio_test_utils::generate_sine, write_wav};

    fn pcm_sample(interleaved: &[f32], channels: usize) -> SampleData {
        let mut sample = SampleData::new();
        sample
            .open_pcm(interleaved, channels, 44100, 440.0, 44100)
            .expect("open pcm");
        sample
    }

    #[test]
    fn test_open_pcm_layout() {
        let sample = pcm_sample(&[0.1, -0.1, 0.2, -0.2, 0.3, -0.3], 2);
        assert_eq!(sample.channels(), 2);
        assert_eq!(sample.nframes(), 3);
        assert_eq!(sample.frames(0), &[0.0, 0.1, 0.2, 0.3, 0.0, 0.0, 0.0]);
        assert_eq!(sample.frames(1), &[0.0, -0.1, -0.2, -0.3, 0.0, 0.0, 0.0]);
        // Channels past the last reuse it.
        assert_eq!(sample.frames(5), sample.frames(1));
        assert!((sample.ratio() - 1.0 / 440.0).abs() < 1e-9);
        assert_eq!(sample.offset_phase0(), 0);
        assert_eq!(sample.offset_end2(), 3);
    }

    #[test]
    fn test_open_file() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("snare.wav");
        write_wav(&path, vec![generate_sine(200.0, 44100, 0.1)], 44100).expect("write wav");

        let mut sample = SampleData::new();
        sample.open(&path, 261.63, 44100).expect("open");
        assert_eq!(sample.path(), Some(path.as_path()));
        assert_eq!(sample.nframes(), 4410);
        assert_eq!(sample.channels(), 1);
    }

    #[test]
    fn test_open_failure_leaves_empty() {
        let mut sample = pcm_sample(&[0.5, 0.5], 1);
        assert!(!sample.is_empty());

        let result = sample.open(Path::new("/no/such/sample.wav"), 440.0, 44100);
        assert!(result.is_err());
        assert!(sample.is_empty());
        assert_eq!(sample.path(), None);
        assert_eq!(sample.frames(0), &[] as &[f32]);

        assert!(sample.open_pcm(&[], 1, 44100, 440.0, 44100).is_err());
        assert!(sample.is_empty());
    }

    #[test]
    fn test_reverse() {
        let mut sample = pcm_sample(&[1.0, 2.0, 3.0, 4.0], 1);
        sample.set_reverse(true);
        assert_eq!(&sample.frames(0)[1..5], &[4.0, 3.0, 2.0, 1.0]);
        // Setting the same flag again is a no-op.
        sample.set_reverse(true);
        assert_eq!(&sample.frames(0)[1..5], &[4.0, 3.0, 2.0, 1.0]);
        sample.set_reverse(false);
        assert_eq!(&sample.frames(0)[1..5], &[1.0, 2.0, 3.0, 4.0]);
        // Guards are untouched.
        assert_eq!(sample.frames(0)[0], 0.0);
        assert_eq!(sample.frames(0)[5], 0.0);
    }

    #[test]
    fn test_reverse_survives_reload() {
        let mut sample = SampleData::new();
        sample.set_reverse(true);
        sample
            .open_pcm(&[1.0, 2.0, 3.0], 1, 44100, 440.0, 44100)
            .expect("open pcm");
        assert_eq!(&sample.frames(0)[1..4], &[3.0, 2.0, 1.0]);
    }

    #[test]
    fn test_zero_crossing() {
        // Mean of both channels: 1, 1, -1, -1, 1, 1
        let sample = pcm_sample(
            &[1.0, 1.0, 2.0, 0.0, -1.0, -1.0, 0.0, -2.0, 1.0, 1.0, 1.0, 1.0],
            2,
        );

        let mut slope = 0;
        assert_eq!(sample.zero_crossing(1, &mut slope), 2);
        assert_eq!(slope, -1);

        // Only rising crossings from here on.
        let mut slope = 1;
        assert_eq!(sample.zero_crossing(1, &mut slope), 4);

        // No crossing left.
        let mut slope = 0;
        assert_eq!(sample.zero_crossing(5, &mut slope), 6);
        assert_eq!(sample.zero_crossing(100, &mut slope), 6);
    }

    #[test]
    fn test_zero_crossing_is_idempotent() {
        let sample = pcm_sample(&generate_sine(441.0, 44100, 0.05), 1);
        for i in (0..sample.nframes()).step_by(7) {
            let mut slope = 0;
            let snapped = sample.zero_crossing(i, &mut slope);
            let mut again = slope;
            assert_eq!(sample.zero_crossing(snapped, &mut again), snapped, "{}", i);
        }
    }

    #[test]
    fn test_offset_range() {
        let mut sample = pcm_sample(&generate_sine(441.0, 44100, 0.05), 1);
        let nframes = sample.nframes();

        // Without offset mode the whole sample plays.
        sample.set_offset_range(1000, 2000);
        assert_eq!(sample.offset_start(), 1000);
        assert_eq!(sample.offset_end(), 2000);
        assert_eq!(sample.offset_phase0(), 0);
        assert_eq!(sample.offset_end2(), nframes);

        sample.set_offset(true);
        let phase0 = sample.offset_phase0();
        let end2 = sample.offset_end2();
        assert!((1000..1100).contains(&phase0), "{}", phase0);
        assert!((2000..2100).contains(&end2), "{}", end2);

        // Clamped to the sample.
        sample.set_offset_range(0, nframes * 2);
        assert_eq!(sample.offset_end(), nframes);

        // An inverted range is widened to the end.
        sample.set_offset_range(1500, 500);
        assert_eq!(sample.offset_start(), 1500);
        assert_eq!(sample.offset_end(), nframes);

        sample.set_offset_range(nframes + 10, nframes + 20);
        assert_eq!(sample.offset_start(), nframes - 1);
        assert_eq!(sample.offset_end(), nframes);

        sample.set_offset(false);
        assert_eq!(sample.offset_phase0(), 0);
        assert_eq!(sample.offset_end2(), nframes);
    }
}
