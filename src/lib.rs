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
//! A polyphonic, sample-based drum kit synthesizer.
//!
//! Each MIDI note can hold an [`engine::Element`]: a sample played back
//! through its own filter, LFO and amplifier envelopes. The
//! [`engine::Engine`] renders any number of voices of those elements into a
//! stereo mix with a shared effects bus, driven by raw MIDI bytes. Kits are
//! described by YAML documents ([`config::KitConfig`]).

pub mod config;
pub mod controls;
pub mod dsp;
pub mod engine;
pub mod fx;
#[cfg(feature = "host")]
pub mod host;
pub mod params;
pub mod programs;
pub mod render;
pub mod sample;
pub mod sched;
pub mod tuning;

#[cfg(test)]
mod testutil;
