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
//! Parameters for the kit engine.
//!
//! Every parameter is addressed by a stable [`ParamIndex`]. Values live in a
//! shared [`ParamTable`] of atomic slots that any thread may write; the audio
//! thread follows those slots through [`Port`]s, which absorb changes with a
//! short linear ramp.

mod index;
mod port;
mod table;

pub use index::{ParamIndex, ParamInfo, ParamType, ELEMENT_PARAMS, GLOBAL_PARAMS, NUM_PARAMS};
pub use port::{Port, Ramp, PORT_STEPS};
pub use table::{AtomicParam, Bank, ElementParams, ParamSlot, ParamTable, NUM_NOTES};
