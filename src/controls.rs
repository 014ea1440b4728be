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
//! MIDI learn: controller mappings onto parameters.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
};

use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::params::{ParamIndex, ParamSlot, ParamTable};
use crate::sched::Sched;

/// A controller on a channel. Channel 0 matches any channel, 1 to 16 a
/// specific one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ControlKey {
    pub channel: u8,
    pub cc: u8,
}

/// The parameter a controller drives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlMapping {
    pub param: ParamIndex,
    pub invert: bool,
}

impl ControlMapping {
    /// Scales a 7-bit controller value onto the parameter's range.
    pub fn scale(&self, value: u8) -> f32 {
        let normalized = (value & 0x7f) as f32 / 127.0;
        let normalized = if self.invert {
            1.0 - normalized
        } else {
            normalized
        };
        self.param.scale_normalized(normalized)
    }
}

/// The controller map of an engine.
#[derive(Default)]
pub struct Controls {
    map: RwLock<BTreeMap<ControlKey, ControlMapping>>,
    learn: Mutex<Option<ParamIndex>>,
}

impl Controls {
    pub fn new() -> Controls {
        Controls::default()
    }

    /// Packs a controller message into a scheduler reason code.
    pub fn encode(channel: u8, cc: u8, value: u8) -> i32 {
        ((channel as i32) << 16) | ((cc as i32 & 0x7f) << 8) | (value as i32 & 0x7f)
    }

    pub fn decode(id: i32) -> (u8, u8, u8) {
        (
            ((id >> 16) & 0xff) as u8,
            ((id >> 8) & 0x7f) as u8,
            (id & 0x7f) as u8,
        )
    }

    pub fn add(&self, key: ControlKey, mapping: ControlMapping) {
        self.map.write().insert(key, mapping);
    }

    pub fn remove(&self, key: ControlKey) -> bool {
        self.map.write().remove(&key).is_some()
    }

    pub fn clear(&self) {
        self.map.write().clear();
        *self.learn.lock() = None;
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// A snapshot of all mappings, ordered by key.
    pub fn mappings(&self) -> Vec<(ControlKey, ControlMapping)> {
        self.map
            .read()
            .iter()
            .map(|(key, mapping)| (*key, *mapping))
            .collect()
    }

    /// The mapping for a controller on the given channel, falling back to
    /// one for any channel.
    pub fn find(&self, channel: u8, cc: u8) -> Option<ControlMapping> {
        let map = self.map.read();
        map.get(&ControlKey { channel, cc })
            .or_else(|| map.get(&ControlKey { channel: 0, cc }))
            .copied()
    }

    /// Binds the next controller to arrive to the given parameter.
    pub fn learn(&self, param: ParamIndex) {
        *self.learn.lock() = Some(param);
    }

    pub fn cancel_learn(&self) {
        *self.learn.lock() = None;
    }

    pub fn learning(&self) -> Option<ParamIndex> {
        *self.learn.lock()
    }
}

/// Applies controllers to the parameter table on the scheduler worker.
pub struct ControlsTask {
    controls: Arc<Controls>,
    params: Arc<ParamTable>,
    current: Arc<AtomicI32>,
    controller: Arc<Sched>,
}

impl ControlsTask {
    /// `current` holds the note of the element that element parameters are
    /// written to, or -1 for none. `controller` is notified of every written
    /// parameter.
    pub fn new(
        controls: Arc<Controls>,
        params: Arc<ParamTable>,
        current: Arc<AtomicI32>,
        controller: Arc<Sched>,
    ) -> ControlsTask {
        ControlsTask {
            controls,
            params,
            current,
            controller,
        }
    }

    pub(crate) fn process(&mut self, id: i32) {
        let (channel, cc, value) = Controls::decode(id);

        if let Some(param) = self.controls.learn.lock().take() {
            info!(channel, cc, param = %param, "Learned controller");
            self.controls.add(
                ControlKey { channel, cc },
                ControlMapping {
                    param,
                    invert: false,
                },
            );
        }

        let Some(mapping) = self.controls.find(channel, cc) else {
            return;
        };
        let value = mapping.scale(value);
        if mapping.param.is_element() {
            let current = self.current.load(Ordering::Acquire);
            if !(0..128).contains(&current) {
                return;
            }
            self.params
                .element(current as u8)
                .set_value(mapping.param, value, ParamSlot::Live);
        } else {
            self.params.set_global(mapping.param, value);
        }
        self.controller.schedule(mapping.param.index() as i32);
    }
}
