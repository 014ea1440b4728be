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
use crossbeam_channel::{Receiver, Sender};

/// The capacity of the direct note queue.
pub const DIRECT_NOTES_SIZE: usize = 16;

/// A handle for playing notes on an engine from any thread, for auditioning
/// elements outside of the MIDI stream. Notes are picked up at the start of
/// the next processed block.
#[derive(Clone)]
pub struct DirectNotes {
    tx: Sender<(u8, u8)>,
}

impl DirectNotes {
    pub(super) fn channel() -> (DirectNotes, Receiver<(u8, u8)>) {
        let (tx, rx) = crossbeam_channel::bounded(DIRECT_NOTES_SIZE);
        (DirectNotes { tx }, rx)
    }

    /// Queues a note on, or a note off for a zero velocity. Returns false
    /// when the queue is full and the note was dropped.
    pub fn note_on(&self, note: u8, velocity: u8) -> bool {
        self.tx.try_send((note & 0x7f, velocity & 0x7f)).is_ok()
    }

    pub fn note_off(&self, note: u8) -> bool {
        self.note_on(note, 0)
    }
}
