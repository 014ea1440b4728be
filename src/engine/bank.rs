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

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::params::{ElementParams, ParamIndex, ParamTable, NUM_NOTES};
use crate::sample::SampleData;

/// The unmodified samples of a kit, as loaded, indexed by note.
#[derive(Default)]
pub(super) struct SampleBank {
    slots: Mutex<Vec<BankSlot>>,
}

#[derive(Clone, Default)]
struct BankSlot {
    base: Option<Arc<SampleData>>,
    serial: u64,
}

impl SampleBank {
    pub fn new() -> SampleBank {
        SampleBank {
            slots: Mutex::new(vec![BankSlot::default(); NUM_NOTES]),
        }
    }

    /// Stores the base sample of a note. Returns its serial, which tells
    /// rebuilt samples of an older base apart.
    pub fn set(&self, note: u8, base: Option<Arc<SampleData>>) -> u64 {
        let mut slots = self.slots.lock();
        let slot = &mut slots[usize::from(note & 0x7f)];
        slot.base = base;
        slot.serial += 1;
        slot.serial
    }

    pub fn get(&self, note: u8) -> Option<(Arc<SampleData>, u64)> {
        let slots = self.slots.lock();
        let slot = &slots[usize::from(note & 0x7f)];
        slot.base.clone().map(|base| (base, slot.serial))
    }

    pub fn serial(&self, note: u8) -> u64 {
        self.slots.lock()[usize::from(note & 0x7f)].serial
    }
}

/// Applies an element's reverse and offset parameters to a copy of its base
/// sample.
pub(super) fn build_sample(base: &SampleData, params: &ElementParams) -> SampleData {
    let mut sample = base.clone();
    sample.set_reverse(params.live(ParamIndex::GEN1_REVERSE) > 0.5);

    let nframes = sample.nframes() as f32;
    let start = (params.live(ParamIndex::GEN1_OFFSET_1) * nframes).round() as usize;
    let end = (params.live(ParamIndex::GEN1_OFFSET_2) * nframes).round() as usize;
    sample.set_offset_range(start, end);
    sample.set_offset(params.live(ParamIndex::GEN1_OFFSET) > 0.5);
    sample
}

/// A rebuilt sample on its way to the audio thread.
pub(super) struct SampleUpdate {
    pub note: u8,
    pub serial: u64,
    pub sample: Arc<SampleData>,
}

/// Rebuilds element samples on the scheduler worker. Samples replaced on the
/// audio thread come back here to be freed.
pub struct SampleTask {
    bank: Arc<SampleBank>,
    params: Arc<ParamTable>,
    updates: Sender<SampleUpdate>,
    trash: Receiver<Arc<SampleData>>,
}

impl SampleTask {
    pub(super) fn new(
        bank: Arc<SampleBank>,
        params: Arc<ParamTable>,
        updates: Sender<SampleUpdate>,
        trash: Receiver<Arc<SampleData>>,
    ) -> SampleTask {
        SampleTask {
            bank,
            params,
            updates,
            trash,
        }
    }

    pub(crate) fn process(&mut self, id: i32) {
        let retired = self.trash.try_iter().count();
        if retired > 0 {
            debug!(retired, "Freed retired samples");
        }

        let Ok(note) = u8::try_from(id) else {
            return;
        };
        if usize::from(note) >= NUM_NOTES {
            return;
        }
        let Some((base, serial)) = self.bank.get(note) else {
            return;
        };

        let sample = build_sample(&base, self.params.element(note));
        debug!(
            note,
            reverse = sample.is_reverse(),
            offset = sample.is_offset(),
            start = sample.offset_phase0(),
            end = sample.offset_end2(),
            "Rebuilt sample"
        );
        let update = SampleUpdate {
            note,
            serial,
            sample: Arc::new(sample),
        };
        match self.updates.try_send(update) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!(note, "Sample update queue is full"),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
