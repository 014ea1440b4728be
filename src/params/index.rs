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
use std::fmt;

/// The storage type of a parameter. Int and bool parameters are stored as
/// floats but always hold whole values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Float,
    Int,
    Bool,
}

/// Static description of a parameter.
#[derive(Debug, Clone, Copy)]
pub struct ParamInfo {
    /// The persisted name of the parameter.
    pub name: &'static str,
    pub kind: ParamType,
    pub default: f32,
    pub min: f32,
    pub max: f32,
}

macro_rules! params {
    ($($variant:ident => ($kind:ident, $default:expr, $min:expr, $max:expr)),* $(,)?) => {
        /// Stable index of every engine parameter. The first [`ELEMENT_PARAMS`]
        /// entries are per-element parameters, the rest are global.
        #[allow(non_camel_case_types)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u32)]
        pub enum ParamIndex {
            $($variant),*
        }

        static INFO: &[ParamInfo] = &[
            $(ParamInfo {
                name: stringify!($variant),
                kind: ParamType::$kind,
                default: $default,
                min: $min,
                max: $max,
            }),*
        ];

        impl ParamIndex {
            /// All parameters, in index order.
            pub const ALL: &'static [ParamIndex] = &[$(ParamIndex::$variant),*];
        }
    };
}

params! {
    // Generator.
    GEN1_SAMPLE => (Int, 36.0, 0.0, 127.0),
    GEN1_REVERSE => (Bool, 0.0, 0.0, 1.0),
    GEN1_OFFSET => (Bool, 0.0, 0.0, 1.0),
    GEN1_OFFSET_1 => (Float, 0.0, 0.0, 1.0),
    GEN1_OFFSET_2 => (Float, 1.0, 0.0, 1.0),
    GEN1_GROUP => (Int, 0.0, 0.0, 127.0),
    GEN1_COARSE => (Float, 0.0, -4.0, 4.0),
    GEN1_FINE => (Float, 0.0, -1.0, 1.0),
    GEN1_ENVTIME => (Float, 0.0, 0.0, 1.0),
    // Filter.
    DCF1_ENABLED => (Bool, 1.0, 0.0, 1.0),
    DCF1_CUTOFF => (Float, 1.0, 0.0, 1.0),
    DCF1_RESO => (Float, 0.0, 0.0, 1.0),
    DCF1_TYPE => (Int, 0.0, 0.0, 3.0),
    DCF1_SLOPE => (Int, 0.0, 0.0, 3.0),
    DCF1_ENVELOPE => (Float, 1.0, -1.0, 1.0),
    DCF1_ATTACK => (Float, 0.0, 0.0, 1.0),
    DCF1_DECAY1 => (Float, 0.2, 0.0, 1.0),
    DCF1_LEVEL2 => (Float, 0.5, 0.0, 1.0),
    DCF1_DECAY2 => (Float, 0.5, 0.0, 1.0),
    // LFO.
    LFO1_ENABLED => (Bool, 1.0, 0.0, 1.0),
    LFO1_SHAPE => (Int, 1.0, 0.0, 4.0),
    LFO1_WIDTH => (Float, 1.0, 0.0, 1.0),
    LFO1_BPM => (Float, 180.0, 0.0, 360.0),
    LFO1_RATE => (Float, 0.5, 0.0, 1.0),
    LFO1_SWEEP => (Float, 0.0, -1.0, 1.0),
    LFO1_PITCH => (Float, 0.0, -1.0, 1.0),
    LFO1_CUTOFF => (Float, 0.0, -1.0, 1.0),
    LFO1_RESO => (Float, 0.0, -1.0, 1.0),
    LFO1_PANNING => (Float, 0.0, -1.0, 1.0),
    LFO1_VOLUME => (Float, 0.0, -1.0, 1.0),
    LFO1_ATTACK => (Float, 0.0, 0.0, 1.0),
    LFO1_DECAY1 => (Float, 0.1, 0.0, 1.0),
    LFO1_LEVEL2 => (Float, 1.0, 0.0, 1.0),
    LFO1_DECAY2 => (Float, 0.5, 0.0, 1.0),
    // Amplifier.
    DCA1_ENABLED => (Bool, 1.0, 0.0, 1.0),
    DCA1_VOLUME => (Float, 0.5, 0.0, 1.0),
    DCA1_ATTACK => (Float, 0.0, 0.0, 1.0),
    DCA1_DECAY1 => (Float, 1.0, 0.0, 1.0),
    DCA1_LEVEL2 => (Float, 1.0, 0.0, 1.0),
    DCA1_DECAY2 => (Float, 1.0, 0.0, 1.0),
    // Output.
    OUT1_WIDTH => (Float, 0.0, -1.0, 1.0),
    OUT1_PANNING => (Float, 0.0, -1.0, 1.0),
    OUT1_FXSEND => (Float, 1.0, 0.0, 1.0),
    OUT1_VOLUME => (Float, 0.5, 0.0, 1.0),
    // Controller defaults.
    DEF1_PITCHBEND => (Float, 0.2, 0.0, 1.0),
    DEF1_MODWHEEL => (Float, 0.2, 0.0, 1.0),
    DEF1_PRESSURE => (Float, 0.2, 0.0, 1.0),
    DEF1_VELOCITY => (Float, 0.2, 0.0, 1.0),
    DEF1_CHANNEL => (Int, 0.0, 0.0, 16.0),
    DEF1_NOTEOFF => (Bool, 1.0, 0.0, 1.0),
    // Chorus.
    CHO1_WET => (Float, 0.0, 0.0, 1.0),
    CHO1_DELAY => (Float, 0.5, 0.0, 1.0),
    CHO1_FEEDB => (Float, 0.5, 0.0, 1.0),
    CHO1_RATE => (Float, 0.5, 0.0, 1.0),
    CHO1_MOD => (Float, 0.5, 0.0, 1.0),
    // Flanger.
    FLA1_WET => (Float, 0.0, 0.0, 1.0),
    FLA1_DELAY => (Float, 0.5, 0.0, 1.0),
    FLA1_FEEDB => (Float, 0.5, 0.0, 1.0),
    FLA1_DAFT => (Float, 0.0, 0.0, 1.0),
    // Phaser.
    PHA1_WET => (Float, 0.0, 0.0, 1.0),
    PHA1_RATE => (Float, 0.5, 0.0, 1.0),
    PHA1_FEEDB => (Float, 0.5, 0.0, 1.0),
    PHA1_DEPTH => (Float, 0.5, 0.0, 1.0),
    PHA1_DAFT => (Float, 0.0, 0.0, 1.0),
    // Delay.
    DEL1_WET => (Float, 0.0, 0.0, 1.0),
    DEL1_DELAY => (Float, 0.5, 0.0, 1.0),
    DEL1_FEEDB => (Float, 0.5, 0.0, 1.0),
    DEL1_BPM => (Float, 180.0, 0.0, 360.0),
    // Reverb.
    REV1_WET => (Float, 0.0, 0.0, 1.0),
    REV1_ROOM => (Float, 0.5, 0.0, 1.0),
    REV1_DAMP => (Float, 0.5, 0.0, 1.0),
    REV1_FEEDB => (Float, 0.5, 0.0, 1.0),
    REV1_WIDTH => (Float, 0.0, -1.0, 1.0),
    // Dynamics.
    DYN1_COMPRESS => (Bool, 0.0, 0.0, 1.0),
    DYN1_LIMITER => (Bool, 1.0, 0.0, 1.0),
    // Keyboard range.
    KEY1_LOW => (Int, 0.0, 0.0, 127.0),
    KEY1_HIGH => (Int, 127.0, 0.0, 127.0),
}

/// The number of per-element parameters.
pub const ELEMENT_PARAMS: usize = 44;

/// The total number of parameters.
pub const NUM_PARAMS: usize = 77;

/// The number of global parameters.
pub const GLOBAL_PARAMS: usize = NUM_PARAMS - ELEMENT_PARAMS;

impl ParamIndex {
    /// The stable integer index of the parameter.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Looks up a parameter by its stable integer index.
    pub fn from_index(index: usize) -> Option<ParamIndex> {
        Self::ALL.get(index).copied()
    }

    /// Looks up a parameter by its persisted name.
    pub fn from_name(name: &str) -> Option<ParamIndex> {
        Self::ALL.iter().copied().find(|param| param.name() == name)
    }

    pub fn info(self) -> &'static ParamInfo {
        &INFO[self.index()]
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn default_value(self) -> f32 {
        self.info().default
    }

    /// Whether this parameter belongs to an element rather than the engine.
    pub fn is_element(self) -> bool {
        self.index() < ELEMENT_PARAMS
    }

    /// Clamps the value to the parameter's range, snapping int and bool
    /// parameters to whole values. NaN maps to the default, infinities to the
    /// nearest bound.
    pub fn safe_value(self, value: f32) -> f32 {
        let info = self.info();
        if value.is_nan() {
            return info.default;
        }

        let value = match info.kind {
            ParamType::Bool => {
                if value > 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            ParamType::Int => value.round(),
            ParamType::Float => value,
        };

        value.clamp(info.min, info.max)
    }

    /// Scales a normalized `[0, 1]` value onto the parameter's range.
    pub fn scale_normalized(self, normalized: f32) -> f32 {
        let info = self.info();
        self.safe_value(info.min + normalized.clamp(0.0, 1.0) * (info.max - info.min))
    }
}

impl fmt::Display for ParamIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_layout() {
        assert_eq!(ParamIndex::ALL.len(), NUM_PARAMS);
        assert_eq!(INFO.len(), NUM_PARAMS);
        assert_eq!(ParamIndex::OUT1_VOLUME.index(), ELEMENT_PARAMS - 1);
        assert_eq!(ParamIndex::DEF1_PITCHBEND.index(), ELEMENT_PARAMS);
        assert_eq!(ParamIndex::KEY1_HIGH.index(), NUM_PARAMS - 1);

        for (i, param) in ParamIndex::ALL.iter().enumerate() {
            assert_eq!(param.index(), i);
            assert_eq!(ParamIndex::from_index(i), Some(*param));
            assert_eq!(ParamIndex::from_name(param.name()), Some(*param));
            assert_eq!(param.is_element(), i < ELEMENT_PARAMS);

            let info = param.info();
            assert!(info.min <= info.default && info.default <= info.max, "{}", param);
        }
        assert_eq!(ParamIndex::from_index(NUM_PARAMS), None);
        assert_eq!(ParamIndex::from_name("NOPE"), None);
    }

    #[test]
    fn test_safe_value() {
        assert_eq!(ParamIndex::DCF1_CUTOFF.safe_value(2.0), 1.0);
        assert_eq!(ParamIndex::DCF1_CUTOFF.safe_value(-2.0), 0.0);
        assert_eq!(ParamIndex::DCF1_CUTOFF.safe_value(0.25), 0.25);
        assert_eq!(ParamIndex::DCF1_TYPE.safe_value(1.6), 2.0);
        assert_eq!(ParamIndex::DCF1_TYPE.safe_value(9.0), 3.0);
        assert_eq!(ParamIndex::GEN1_REVERSE.safe_value(0.7), 1.0);
        assert_eq!(ParamIndex::GEN1_REVERSE.safe_value(0.2), 0.0);
        assert_eq!(ParamIndex::LFO1_BPM.safe_value(f32::NAN), 180.0);
        assert_eq!(ParamIndex::LFO1_BPM.safe_value(f32::INFINITY), 360.0);
        assert_eq!(ParamIndex::GEN1_COARSE.safe_value(f32::NEG_INFINITY), -4.0);
    }

    #[test]
    fn test_safe_value_is_idempotent() {
        let inputs = [
            f32::NAN,
            f32::INFINITY,
            f32::NEG_INFINITY,
            -1000.0,
            -1.0,
            -0.5,
            0.0,
            0.49,
            0.51,
            1.0,
            3.7,
            1000.0,
        ];
        for param in ParamIndex::ALL {
            for input in inputs {
                let once = param.safe_value(input);
                assert_eq!(param.safe_value(once), once, "{} {}", param, input);
            }
        }
    }

    #[test]
    fn test_scale_normalized() {
        assert_eq!(ParamIndex::LFO1_BPM.scale_normalized(0.5), 180.0);
        assert_eq!(ParamIndex::OUT1_PANNING.scale_normalized(0.0), -1.0);
        assert_eq!(ParamIndex::DCF1_SLOPE.scale_normalized(1.0), 3.0);
    }
}
