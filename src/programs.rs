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
//! Program banks: named kits selected with MIDI bank select and program
//! change.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use tracing::info;

/// A named kit document.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    id: u8,
    name: String,
    kit: Option<PathBuf>,
}

impl Program {
    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kit(&self) -> Option<&Path> {
        self.kit.as_deref()
    }
}

/// A named bank of up to 128 programs.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramBank {
    id: u16,
    name: String,
    programs: BTreeMap<u8, Program>,
}

impl ProgramBank {
    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self, id: u8) -> Option<&Program> {
        self.programs.get(&id)
    }

    pub fn programs(&self) -> impl Iterator<Item = &Program> {
        self.programs.values()
    }
}

#[derive(Default)]
struct ProgramsState {
    banks: BTreeMap<u16, ProgramBank>,
    current: Option<(u16, u8)>,
}

/// The program banks of an engine. Selection happens on the scheduler
/// worker; loading the selected kit is left to observers.
#[derive(Default)]
pub struct Programs {
    state: Mutex<ProgramsState>,
}

impl Programs {
    pub fn new() -> Programs {
        Programs::default()
    }

    /// Packs a selection into a scheduler reason code.
    pub fn encode(bank: u16, prog: u8) -> i32 {
        ((bank as i32) << 8) | prog as i32
    }

    pub fn decode(id: i32) -> (u16, u8) {
        (((id >> 8) & 0xffff) as u16, (id & 0xff) as u8)
    }

    /// Adds a bank, or renames it when it exists.
    pub fn add_bank(&self, id: u16, name: &str) {
        let mut state = self.state.lock();
        state
            .banks
            .entry(id)
            .and_modify(|bank| bank.name = name.to_string())
            .or_insert_with(|| ProgramBank {
                id,
                name: name.to_string(),
                programs: BTreeMap::new(),
            });
    }

    /// Adds or replaces a program, creating its bank when needed.
    pub fn add_program(&self, bank: u16, prog: u8, name: &str, kit: Option<PathBuf>) {
        let prog = prog & 0x7f;
        let mut state = self.state.lock();
        let bank = state.banks.entry(bank).or_insert_with(|| ProgramBank {
            id: bank,
            name: format!("Bank {}", bank),
            programs: BTreeMap::new(),
        });
        bank.programs.insert(
            prog,
            Program {
                id: prog,
                name: name.to_string(),
                kit,
            },
        );
    }

    pub fn remove_bank(&self, id: u16) -> bool {
        self.state.lock().banks.remove(&id).is_some()
    }

    pub fn remove_program(&self, bank: u16, prog: u8) -> bool {
        self.state
            .lock()
            .banks
            .get_mut(&bank)
            .map(|bank| bank.programs.remove(&prog).is_some())
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.banks.clear();
        state.current = None;
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().banks.is_empty()
    }

    /// A snapshot of all banks.
    pub fn banks(&self) -> Vec<ProgramBank> {
        self.state.lock().banks.values().cloned().collect()
    }

    /// Selects a program. An unknown selection is recorded but resolves to
    /// no program.
    pub fn select(&self, bank: u16, prog: u8) {
        let mut state = self.state.lock();
        state.current = Some((bank, prog));
        match state
            .banks
            .get(&bank)
            .and_then(|bank| bank.programs.get(&prog))
        {
            Some(program) => info!(bank, prog, name = %program.name, "Program selected"),
            None => info!(bank, prog, "Selected an empty program"),
        }
    }

    pub fn current(&self) -> Option<(u16, u8)> {
        self.state.lock().current
    }

    pub fn current_program(&self) -> Option<Program> {
        let state = self.state.lock();
        let (bank, prog) = state.current?;
        state.banks.get(&bank)?.programs.get(&prog).cloned()
    }

    pub(crate) fn process(&self, id: i32) {
        let (bank, prog) = Programs::decode(id);
        self.select(bank, prog);
    }
}
