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
use std::sync::atomic::{AtomicU32, Ordering};

use super::index::{ParamIndex, ELEMENT_PARAMS, GLOBAL_PARAMS};

/// The number of MIDI notes, and therefore of possible elements.
pub const NUM_NOTES: usize = 128;

/// An `f32` that can be shared between threads.
#[derive(Debug)]
pub struct AtomicParam(AtomicU32);

impl AtomicParam {
    pub fn new(value: f32) -> AtomicParam {
        AtomicParam(AtomicU32::new(value.to_bits()))
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Release)
    }
}

/// One of the two stored parameter banks used for A/B comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bank {
    A,
    B,
}

/// The slot of an element parameter being addressed. `Live` is what the
/// audio thread plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSlot {
    A,
    Live,
    B,
}

impl From<Bank> for ParamSlot {
    fn from(bank: Bank) -> Self {
        match bank {
            Bank::A => ParamSlot::A,
            Bank::B => ParamSlot::B,
        }
    }
}

/// The three parameter slots of a single element.
#[derive(Debug)]
pub struct ElementParams {
    slots: Box<[AtomicParam]>,
}

impl ElementParams {
    fn new(note: u8) -> ElementParams {
        let slots = (0..3 * ELEMENT_PARAMS)
            .map(|i| AtomicParam::new(Self::default_for(i % ELEMENT_PARAMS, note)))
            .collect();
        ElementParams { slots }
    }

    fn default_for(offset: usize, note: u8) -> f32 {
        match ParamIndex::ALL[offset] {
            ParamIndex::GEN1_SAMPLE => note as f32,
            param => param.default_value(),
        }
    }

    fn slot(&self, param: ParamIndex, slot: ParamSlot) -> Option<&AtomicParam> {
        if !param.is_element() {
            return None;
        }
        let base = match slot {
            ParamSlot::A => 0,
            ParamSlot::Live => ELEMENT_PARAMS,
            ParamSlot::B => 2 * ELEMENT_PARAMS,
        };
        self.slots.get(base + param.index())
    }

    /// Gets the value of the parameter in the given slot. Global parameters
    /// read as their default.
    pub fn value(&self, param: ParamIndex, slot: ParamSlot) -> f32 {
        self.slot(param, slot)
            .map(|slot| slot.load())
            .unwrap_or_else(|| param.default_value())
    }

    /// Gets the live value of the parameter.
    pub fn live(&self, param: ParamIndex) -> f32 {
        self.value(param, ParamSlot::Live)
    }

    /// Sets the value of the parameter in the given slot, clamped to its range.
    pub fn set_value(&self, param: ParamIndex, value: f32, slot: ParamSlot) {
        if let Some(slot) = self.slot(param, slot) {
            slot.store(param.safe_value(value));
        }
    }

    /// Resets every slot to its default.
    pub fn reset(&self, note: u8) {
        for (i, slot) in self.slots.iter().enumerate() {
            slot.store(Self::default_for(i % ELEMENT_PARAMS, note));
        }
    }

    /// Copies the live values into the bank.
    pub fn store_bank(&self, bank: Bank) {
        for param in &ParamIndex::ALL[..ELEMENT_PARAMS] {
            self.set_value(*param, self.live(*param), bank.into());
        }
    }

    /// Copies the bank into the live values.
    pub fn recall_bank(&self, bank: Bank) {
        for param in &ParamIndex::ALL[..ELEMENT_PARAMS] {
            self.set_value(*param, self.value(*param, bank.into()), ParamSlot::Live);
        }
    }

    /// Exchanges the A and B banks.
    pub fn swap_banks(&self) {
        for param in &ParamIndex::ALL[..ELEMENT_PARAMS] {
            let a = self.value(*param, ParamSlot::A);
            let b = self.value(*param, ParamSlot::B);
            self.set_value(*param, b, ParamSlot::A);
            self.set_value(*param, a, ParamSlot::B);
        }
    }
}

/// The shared table of every parameter value. The table is allocated once,
/// for all 128 notes, so writers never race an allocation.
#[derive(Debug)]
pub struct ParamTable {
    globals: Box<[AtomicParam]>,
    elements: Box<[ElementParams]>,
}

impl ParamTable {
    pub fn new() -> ParamTable {
        ParamTable {
            globals: ParamIndex::ALL[ELEMENT_PARAMS..]
                .iter()
                .map(|param| AtomicParam::new(param.default_value()))
                .collect(),
            elements: (0..NUM_NOTES as u8).map(ElementParams::new).collect(),
        }
    }

    /// Gets a global parameter. Element parameters read as their default.
    pub fn global(&self, param: ParamIndex) -> f32 {
        match self.global_slot(param) {
            Some(slot) => slot.load(),
            None => param.default_value(),
        }
    }

    /// Sets a global parameter, clamped to its range. Element parameters are
    /// ignored.
    pub fn set_global(&self, param: ParamIndex, value: f32) {
        if let Some(slot) = self.global_slot(param) {
            slot.store(param.safe_value(value));
        }
    }

    /// Gets the parameters of the element on the given note.
    pub fn element(&self, note: u8) -> &ElementParams {
        &self.elements[note as usize & 0x7f]
    }

    /// Resets every global parameter to its default.
    pub fn reset_globals(&self) {
        for (slot, param) in self.globals.iter().zip(&ParamIndex::ALL[ELEMENT_PARAMS..]) {
            slot.store(param.default_value());
        }
    }

    fn global_slot(&self, param: ParamIndex) -> Option<&AtomicParam> {
        if param.is_element() {
            return None;
        }
        let offset = param.index() - ELEMENT_PARAMS;
        debug_assert!(offset < GLOBAL_PARAMS);
        self.globals.get(offset)
    }
}

impl Default for ParamTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_globals_round_trip() {
        let table = ParamTable::new();
        for param in &ParamIndex::ALL[ELEMENT_PARAMS..] {
            assert_eq!(table.global(*param), param.default_value());
            for value in [f32::NAN, -3.0, 0.3, 0.8, 7.0, 500.0] {
                table.set_global(*param, value);
                assert_eq!(table.global(*param), param.safe_value(value));
            }
        }
    }

    #[test]
    fn test_element_params_default_to_note() {
        let table = ParamTable::new();
        assert_eq!(table.element(38).live(ParamIndex::GEN1_SAMPLE), 38.0);
        assert_eq!(table.element(38).value(ParamIndex::GEN1_SAMPLE, ParamSlot::B), 38.0);
        assert_eq!(
            table.element(38).live(ParamIndex::DCA1_VOLUME),
            ParamIndex::DCA1_VOLUME.default_value()
        );

        // Element slots ignore globals and vice versa.
        table.element(38).set_value(ParamIndex::REV1_WET, 1.0, ParamSlot::Live);
        assert_eq!(table.element(38).live(ParamIndex::REV1_WET), 0.0);
        table.set_global(ParamIndex::DCA1_VOLUME, 1.0);
        assert_eq!(table.global(ParamIndex::DCA1_VOLUME), 0.5);
    }

    #[test]
    fn test_banks() {
        let table = ParamTable::new();
        let element = table.element(40);

        element.set_value(ParamIndex::DCF1_CUTOFF, 0.25, ParamSlot::Live);
        element.store_bank(Bank::A);
        element.set_value(ParamIndex::DCF1_CUTOFF, 0.75, ParamSlot::Live);
        element.store_bank(Bank::B);

        element.recall_bank(Bank::A);
        assert_eq!(element.live(ParamIndex::DCF1_CUTOFF), 0.25);

        element.swap_banks();
        assert_eq!(element.value(ParamIndex::DCF1_CUTOFF, ParamSlot::A), 0.75);
        assert_eq!(element.value(ParamIndex::DCF1_CUTOFF, ParamSlot::B), 0.25);
        element.recall_bank(Bank::A);
        assert_eq!(element.live(ParamIndex::DCF1_CUTOFF), 0.75);

        element.reset(40);
        assert_eq!(element.live(ParamIndex::DCF1_CUTOFF), 1.0);
        assert_eq!(element.value(ParamIndex::DCF1_CUTOFF, ParamSlot::A), 1.0);
    }
}
