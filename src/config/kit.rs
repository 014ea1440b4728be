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
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use config::{Config, File};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::error::ConfigError;
use crate::{
    controls::{ControlKey, ControlMapping},
    engine::Engine,
    params::{ParamIndex, ParamSlot, ELEMENT_PARAMS, NUM_NOTES},
    tuning::Tuning,
};

/// A YAML representation of a drum kit.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct KitConfig {
    /// The name of the kit.
    name: String,
    /// Global parameters by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    params: BTreeMap<String, f32>,
    /// An optional Scala tuning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tuning: Option<TuningConfig>,
    /// The elements of the kit.
    #[serde(default)]
    elements: Vec<ElementConfig>,
    /// The controller map.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    controls: Vec<ControlConfig>,
    /// Program banks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    programs: Vec<BankConfig>,
}

/// Scala files, relative to the kit document.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TuningConfig {
    pub scale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keymap: Option<String>,
}

/// A single element.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ElementConfig {
    /// The MIDI note that plays the element.
    pub note: u32,
    /// The sample file, relative to the kit document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<String>,
    /// The offset range in frames. Overrides the offset parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<OffsetConfig>,
    /// Element parameters by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct OffsetConfig {
    pub start: usize,
    pub end: usize,
}

/// A controller mapping. Channel 0 matches any channel.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ControlConfig {
    #[serde(default)]
    pub channel: u8,
    pub cc: u8,
    pub param: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub invert: bool,
}

/// A bank of programs.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BankConfig {
    pub bank: u16,
    pub name: String,
    #[serde(default)]
    pub programs: Vec<ProgramConfig>,
}

/// A program and the kit document it loads.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProgramConfig {
    pub prog: u8,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kit: Option<String>,
}

/// Looks up a parameter by name, requiring it to be an element parameter or
/// not.
fn parse_param(name: &str, element: bool) -> Result<ParamIndex, ConfigError> {
    ParamIndex::from_name(&name.to_ascii_uppercase())
        .filter(|param| param.is_element() == element)
        .ok_or_else(|| ConfigError::UnknownParam(name.to_string()))
}

fn parse_note(note: u32) -> Result<u8, ConfigError> {
    u8::try_from(note)
        .ok()
        .filter(|note| usize::from(*note) < NUM_NOTES)
        .ok_or(ConfigError::InvalidNote(note))
}

impl KitConfig {
    /// Creates a new, empty kit configuration.
    pub fn new(name: &str) -> KitConfig {
        KitConfig {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Deserializes a file from the path into a kit configuration struct.
    pub fn deserialize(path: &Path) -> Result<KitConfig, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<KitConfig>()?)
    }

    /// Serializes and saves the kit configuration to a file at the given path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let serialized = serde_yml::to_string(self)?;
        fs::write(path, serialized)?;
        info!(path = ?path, name = %self.name, "Saved kit");
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn elements(&self) -> &[ElementConfig] {
        &self.elements
    }

    pub fn params(&self) -> &BTreeMap<String, f32> {
        &self.params
    }

    pub fn tuning(&self) -> Option<&TuningConfig> {
        self.tuning.as_ref()
    }

    pub fn set_tuning(&mut self, tuning: Option<TuningConfig>) {
        self.tuning = tuning;
    }

    pub fn controls(&self) -> &[ControlConfig] {
        &self.controls
    }

    pub fn programs(&self) -> &[BankConfig] {
        &self.programs
    }

    /// Checks every name and note in the document.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for name in self.params.keys() {
            parse_param(name, false)?;
        }
        for element in self.elements.iter() {
            parse_note(element.note)?;
            for name in element.params.keys() {
                parse_param(name, true)?;
            }
        }
        for control in self.controls.iter() {
            ParamIndex::from_name(&control.param.to_ascii_uppercase())
                .ok_or_else(|| ConfigError::UnknownParam(control.param.clone()))?;
        }
        Ok(())
    }

    /// Replaces the engine's kit with this one. Relative file names are
    /// resolved against `base`. A sample that fails to load leaves its
    /// element silent. Returns the number of elements whose sample loaded.
    pub fn apply(&self, engine: &mut Engine, base: &Path) -> Result<usize, ConfigError> {
        self.validate()?;

        let tuning = match &self.tuning {
            Some(tuning) => Tuning::from_scala_files(
                &base.join(&tuning.scale),
                tuning.keymap.as_ref().map(|keymap| base.join(keymap)).as_deref(),
            )?,
            None => Tuning::default(),
        };

        engine.clear_elements();
        engine.params().reset_globals();
        for (name, value) in self.params.iter() {
            engine.set_param_value(parse_param(name, false)?, *value);
        }
        engine.set_tuning(tuning);

        let mut loaded = 0;
        for config in self.elements.iter() {
            let note = parse_note(config.note)?;
            let element = engine.add_element(note);
            for (name, value) in config.params.iter() {
                element.set_param_value(parse_param(name, true)?, *value, ParamSlot::Live);
            }
            if let Some(sample) = &config.sample {
                // Failures are logged by the engine.
                if engine.set_sample_file(note, &base.join(sample)).is_ok() {
                    loaded += 1;
                }
            }
            if let Some(offset) = config.offset {
                engine.set_offset_range(note, offset.start, offset.end);
            }
        }

        let controls = engine.controls();
        controls.clear();
        for control in self.controls.iter() {
            let param = ParamIndex::from_name(&control.param.to_ascii_uppercase())
                .ok_or_else(|| ConfigError::UnknownParam(control.param.clone()))?;
            controls.add(
                ControlKey {
                    channel: control.channel.min(16),
                    cc: control.cc & 0x7f,
                },
                ControlMapping {
                    param,
                    invert: control.invert,
                },
            );
        }

        // A kit without programs keeps the current program map, so that a
        // program's kit can be loaded without losing the others.
        let programs = engine.programs();
        if !self.programs.is_empty() {
            programs.clear();
        }
        for bank in self.programs.iter() {
            programs.add_bank(bank.bank, &bank.name);
            for program in bank.programs.iter() {
                let kit = program.kit.as_ref().map(|kit| base.join(kit));
                programs.add_program(bank.bank, program.prog, &program.name, kit);
            }
        }

        if loaded < self.elements.len() {
            warn!(
                name = %self.name,
                loaded,
                elements = self.elements.len(),
                "Some kit samples did not load"
            );
        }
        info!(name = %self.name, elements = self.elements.len(), "Applied kit");
        Ok(loaded)
    }

    /// Captures an engine's kit. Parameters at their defaults are left out.
    /// Sample paths are stored as the engine knows them and the tuning is not
    /// captured.
    pub fn from_engine(engine: &Engine, name: &str) -> KitConfig {
        let changed = |param: &ParamIndex, value: f32| value != param.default_value();

        let params = ParamIndex::ALL[ELEMENT_PARAMS..]
            .iter()
            .map(|param| (param, engine.params().global(*param)))
            .filter(|(param, value)| changed(param, *value))
            .map(|(param, value)| (param.name().to_string(), value))
            .collect();

        let elements = engine
            .element_notes()
            .filter_map(|note| engine.element(note))
            .map(|element| ElementConfig {
                note: u32::from(element.note()),
                sample: element
                    .sample_file()
                    .map(|path| path.to_string_lossy().into_owned()),
                offset: None,
                params: ParamIndex::ALL[..ELEMENT_PARAMS]
                    .iter()
                    // The sample parameter always follows the note.
                    .filter(|param| **param != ParamIndex::GEN1_SAMPLE)
                    .map(|param| (param, element.param_value(*param, ParamSlot::Live)))
                    .filter(|(param, value)| changed(param, *value))
                    .map(|(param, value)| (param.name().to_string(), value))
                    .collect(),
            })
            .collect();

        let controls = engine
            .controls()
            .mappings()
            .into_iter()
            .map(|(key, mapping)| ControlConfig {
                channel: key.channel,
                cc: key.cc,
                param: mapping.param.name().to_string(),
                invert: mapping.invert,
            })
            .collect();

        let programs = engine
            .programs()
            .banks()
            .into_iter()
            .map(|bank| BankConfig {
                bank: bank.id(),
                name: bank.name().to_string(),
                programs: bank
                    .programs()
                    .map(|program| ProgramConfig {
                        prog: program.id(),
                        name: program.name().to_string(),
                        kit: program.kit().map(|kit| kit.to_string_lossy().into_owned()),
                    })
                    .collect(),
            })
            .collect();

        KitConfig {
            name: name.to_string(),
            params,
            tuning: None,
            elements,
            controls,
            programs,
        }
    }

    /// Resolves the sample files of the kit against `base`.
    pub fn sample_paths(&self, base: &Path) -> Vec<(u32, PathBuf)> {
        self.elements
            .iter()
            .filter_map(|element| {
                element
                    .sample
                    .as_ref()
                    .map(|sample| (element.note, base.join(sample)))
            })
            .collect()
    }
}
