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
//! Sample storage for kit elements.
//!
//! Samples are decoded with symphonia, resampled to the engine's rate with
//! rubato and kept fully in memory. The audio thread only ever reads them.

mod data;
mod decode;
mod error;
mod resample;

pub use data::{SampleData, GUARD_FRAMES_POST, GUARD_FRAMES_PRE};
pub use decode::{decode_file, DecodedAudio};
pub use error::SampleError;
pub use resample::resample;
