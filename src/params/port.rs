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
use super::{ParamIndex, ParamType};

/// The number of samples a [`Port`] takes to reach a new value.
pub const PORT_STEPS: u32 = 32;

/// The audio thread's view of a single parameter. A new value is reached
/// through a linear ramp of [`PORT_STEPS`] samples, advanced by [`Port::tick`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Port {
    value: f32,
    vtick: f32,
    vstep: f32,
    nstep: u32,
}

impl Port {
    pub fn new(value: f32) -> Port {
        Port {
            value,
            vtick: value,
            vstep: 0.0,
            nstep: 0,
        }
    }

    /// Starts a ramp from the current value toward the given value.
    pub fn set_value(&mut self, value: f32) {
        self.vtick = self.value();
        self.nstep = PORT_STEPS;
        self.vstep = (value - self.vtick) / PORT_STEPS as f32;
        self.value = value;
    }

    /// Jumps to the given value without a ramp.
    pub fn reset(&mut self, value: f32) {
        *self = Port::new(value);
    }

    /// Follows an externally written value, starting a ramp when it changed.
    /// Returns whether it did.
    pub fn sync(&mut self, value: f32) -> bool {
        if value.to_bits() == self.value.to_bits() {
            return false;
        }
        self.set_value(value);
        true
    }

    /// Like [`Port::sync`], but jumps to a changed value without a ramp.
    /// Int and bool parameters never pass through intermediate values.
    pub fn snap(&mut self, value: f32) -> bool {
        if value.to_bits() == self.value.to_bits() {
            return false;
        }
        self.reset(value);
        true
    }

    /// Follows the parameter's written value, ramping only float parameters.
    pub fn follow(&mut self, param: ParamIndex, value: f32) -> bool {
        if param.info().kind == ParamType::Float {
            self.sync(value)
        } else {
            self.snap(value)
        }
    }

    /// The current, possibly ramping, value.
    pub fn value(&self) -> f32 {
        if self.nstep == 0 {
            self.value
        } else {
            self.vtick
        }
    }

    /// The value being ramped toward.
    pub fn target(&self) -> f32 {
        self.value
    }

    /// Advances the ramp by the given number of samples.
    pub fn tick(&mut self, nstep: u32) -> f32 {
        if self.nstep >= nstep {
            self.vtick += self.vstep * nstep as f32;
            self.nstep -= nstep;
        } else {
            self.vtick += self.vstep * self.nstep as f32;
            self.nstep = 0;
        }
        self.value()
    }
}

/// Per-block linear interpolation of `N` derived values, so that output
/// gains never jump inside a block.
#[derive(Debug, Clone, Copy)]
pub struct Ramp<const N: usize> {
    value0: [f32; N],
    value1: [f32; N],
    delta: [f32; N],
}

impl<const N: usize> Ramp<N> {
    pub fn new(values: [f32; N]) -> Ramp<N> {
        Ramp {
            value0: values,
            value1: values,
            delta: [0.0; N],
        }
    }

    /// Jumps to the given values.
    pub fn reset(&mut self, values: [f32; N]) {
        *self = Ramp::new(values);
    }

    /// Starts a new block ending on the given values.
    pub fn process(&mut self, values: [f32; N], nframes: usize) {
        self.value0 = self.value1;
        self.value1 = values;
        let nframes = nframes.max(1) as f32;
        for i in 0..N {
            self.delta[i] = (self.value1[i] - self.value0[i]) / nframes;
        }
    }

    /// The `i`th value at frame `n` of the current block.
    #[inline]
    pub fn value(&self, i: usize, n: usize) -> f32 {
        self.value0[i] + self.delta[i] * n as f32
    }
}
