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
//! Deferred work. The audio thread hands reason codes to a [`Sched`], which
//! a worker thread owned by the [`SchedService`] drains, processes and
//! broadcasts to the engine's [`Notifier`]s.

mod service;
mod task;

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{unbounded, Receiver, Sender};

pub use service::{NotifierHandle, Sched, SchedService, SCHED_QUEUE_SIZE};
pub use task::Task;

/// The kinds of scheduled work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedKind {
    /// An element's sample was rebuilt. The reason is the note.
    Sample,
    /// A program was selected. The reason is `bank << 8 | program`.
    Programs,
    /// A mapped controller arrived. The reason is `channel << 16 | cc << 8 | value`.
    Controls,
    /// A parameter changed through a mapped controller. The reason is its index.
    Controller,
    /// A note was played. The reason is the note.
    MidiIn,
}

/// Identifies an engine instance, so that notifications reach only the
/// observers of the engine that scheduled them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    pub fn next() -> InstanceId {
        static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);
        InstanceId(NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed))
    }
}

/// Receives notifications after scheduled work was processed. Called on the
/// worker thread.
pub trait Notifier: Send + Sync {
    fn notify(&self, kind: SchedKind, id: i32);
}

/// Forwards notifications into a channel.
pub struct ChannelNotifier {
    sender: Sender<(SchedKind, i32)>,
}

impl ChannelNotifier {
    pub fn channel() -> (ChannelNotifier, Receiver<(SchedKind, i32)>) {
        let (sender, receiver) = unbounded();
        (ChannelNotifier { sender }, receiver)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, kind: SchedKind, id: i32) {
        // The receiving side may be gone, which is fine.
        let _ = self.sender.send((kind, id));
    }
}
