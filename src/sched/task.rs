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
use std::sync::Arc;

use tracing::debug;

use super::SchedKind;
use crate::controls::ControlsTask;
use crate::engine::SampleTask;
use crate::programs::Programs;

/// The work behind a [`super::Sched`], run on the worker thread for every
/// reason code it receives.
pub enum Task {
    /// Rebuilds an element's sample from its parameters.
    Sample(SampleTask),
    /// Selects a program.
    Programs(Arc<Programs>),
    /// Learns or applies a controller mapping.
    Controls(ControlsTask),
    /// Notification only.
    Controller,
    /// Notification only.
    MidiIn,
}

impl Task {
    pub fn kind(&self) -> SchedKind {
        match self {
            Task::Sample(_) => SchedKind::Sample,
            Task::Programs(_) => SchedKind::Programs,
            Task::Controls(_) => SchedKind::Controls,
            Task::Controller => SchedKind::Controller,
            Task::MidiIn => SchedKind::MidiIn,
        }
    }

    pub fn process(&mut self, id: i32) {
        debug!(kind = ?self.kind(), id, "Processing scheduled task");
        match self {
            Task::Sample(task) => task.process(id),
            Task::Programs(programs) => programs.process(id),
            Task::Controls(task) => task.process(id),
            Task::Controller | Task::MidiIn => {}
        }
    }
}
