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
//! Micro-tuning: the note to frequency table the engine plays from.

mod scala;

use std::{fs, path::Path, path::PathBuf};

use tracing::info;

use crate::dsp::note_frequency;
use crate::params::NUM_NOTES;
use scala::{KeyboardMap, Scale};

/// Error types for loading tunings.
#[derive(Debug, thiserror::Error)]
pub enum TuningError {
    #[error("Unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error on line {line}: {msg}")]
    Parse { line: usize, msg: String },

    #[error("Scale has no degrees")]
    EmptyScale,
}

/// A frequency for every MIDI note. Unmapped notes have a frequency of 0
/// and do not sound.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuning {
    description: String,
    freqs: [f32; NUM_NOTES],
}

impl Default for Tuning {
    /// 12-TET with A4 at 440 Hz.
    fn default() -> Self {
        let mut freqs = [0.0; NUM_NOTES];
        for (note, freq) in freqs.iter_mut().enumerate() {
            *freq = note_frequency(note as u8);
        }
        Tuning {
            description: String::from("12-TET"),
            freqs,
        }
    }
}

impl Tuning {
    /// Builds a tuning from the text of a Scala scale and an optional
    /// keyboard mapping. Without a mapping, middle C (60) is mapped linearly
    /// to the first degree at 261.6256 Hz.
    pub fn from_scala(scl: &str, kbm: Option<&str>) -> Result<Tuning, TuningError> {
        let scale = Scale::parse(scl)?;
        let map = match kbm {
            Some(kbm) => KeyboardMap::parse(kbm)?,
            None => KeyboardMap::default(),
        };
        Ok(Tuning::build(&scale, &map))
    }

    /// Reads and builds a tuning from Scala files.
    pub fn from_scala_files(scl: &Path, kbm: Option<&Path>) -> Result<Tuning, TuningError> {
        let scl_text = read(scl)?;
        let kbm_text = kbm.map(read).transpose()?;
        let tuning = Tuning::from_scala(&scl_text, kbm_text.as_deref())?;
        info!(
            scale = ?scl,
            keymap = ?kbm,
            description = tuning.description(),
            "Tuning loaded"
        );
        Ok(tuning)
    }

    fn build(scale: &Scale, map: &KeyboardMap) -> Tuning {
        let period_degree = scale.len() as i64;
        let reference_degree = map
            .degree(map.reference_note, period_degree)
            .unwrap_or(map.reference_note as i64 - map.middle as i64);
        let reference_ratio = scale.ratio(reference_degree);

        let mut freqs = [0.0; NUM_NOTES];
        for (note, freq) in freqs.iter_mut().enumerate() {
            let note = note as u8;
            if note < map.first || note > map.last {
                continue;
            }
            if let Some(degree) = map.degree(note, period_degree) {
                *freq = (map.reference_freq * scale.ratio(degree) / reference_ratio) as f32;
            }
        }

        Tuning {
            description: scale.description.clone(),
            freqs,
        }
    }

    /// The frequency of the given note, or 0 when it is unmapped.
    #[inline]
    pub fn note_to_pitch(&self, note: u8) -> f32 {
        self.freqs[note as usize & 0x7f]
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

fn read(path: &Path) -> Result<String, TuningError> {
    fs::read_to_string(path).map_err(|source| TuningError::Io {
        path: path.to_path_buf(),
        source,
    })
}
