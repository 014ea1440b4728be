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
use std::{mem, path::Path, sync::Arc};

use crate::dsp::{
    pan_gains, EnvParams, EnvTimes, FilterKind, FilterSlope, WaveShape, Wavetable,
};
use crate::params::{
    Bank, ElementParams, ParamIndex, ParamSlot, ParamTable, Port, Ramp, ELEMENT_PARAMS,
};
use crate::sample::SampleData;

/// The parameters that shape an element's sample buffer. A change means the
/// sample has to be rebuilt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct SampleKey {
    reverse: bool,
    offset: bool,
    start: u32,
    end: u32,
}

impl SampleKey {
    pub fn read(params: &ElementParams) -> SampleKey {
        SampleKey {
            reverse: params.live(ParamIndex::GEN1_REVERSE) > 0.5,
            offset: params.live(ParamIndex::GEN1_OFFSET) > 0.5,
            start: params.live(ParamIndex::GEN1_OFFSET_1).to_bits(),
            end: params.live(ParamIndex::GEN1_OFFSET_2).to_bits(),
        }
    }
}

/// An element's settings for the current block.
#[derive(Debug, Clone, Copy)]
pub(super) struct ElementState {
    pub group: u8,
    pub coarse: f32,
    pub fine: f32,
    pub times: EnvTimes,

    pub dcf_enabled: bool,
    pub cutoff: f32,
    pub reso: f32,
    pub envelope: f32,
    pub kind: FilterKind,
    pub slope: FilterSlope,
    pub dcf_env: EnvParams,

    pub lfo_enabled: bool,
    pub lfo_freq: f32,
    pub sweep: f32,
    pub lfo_pitch: f32,
    pub lfo_cutoff: f32,
    pub lfo_reso: f32,
    pub lfo_panning: f32,
    pub lfo_volume: f32,
    pub lfo_env: EnvParams,

    pub dca_enabled: bool,
    pub dca_volume: f32,
    pub dca_env: EnvParams,

    /// The squared effect send.
    pub fxsend: f32,
}

impl ElementState {
    fn read(ports: &[Port], sample_rate: u32, tempo: f32, sample: &SampleData) -> ElementState {
        let value = |param: ParamIndex| ports[param.index()].value();
        let enabled = |param: ParamIndex| value(param) > 0.5;
        let env = |attack, decay1, level2, decay2| EnvParams {
            attack: value(attack),
            decay1: value(decay1),
            level2: value(level2),
            decay2: value(decay2),
        };

        let bpm = match value(ParamIndex::LFO1_BPM) {
            bpm if bpm > 0.0 => bpm,
            _ => tempo,
        };
        let region = sample.offset_end2().saturating_sub(sample.offset_phase0());
        let fxsend = value(ParamIndex::OUT1_FXSEND);

        ElementState {
            group: value(ParamIndex::GEN1_GROUP).round().clamp(0.0, 127.0) as u8,
            coarse: value(ParamIndex::GEN1_COARSE),
            fine: value(ParamIndex::GEN1_FINE),
            times: EnvTimes::new(sample_rate, value(ParamIndex::GEN1_ENVTIME), region),

            dcf_enabled: enabled(ParamIndex::DCF1_ENABLED),
            cutoff: value(ParamIndex::DCF1_CUTOFF),
            reso: value(ParamIndex::DCF1_RESO),
            envelope: value(ParamIndex::DCF1_ENVELOPE),
            kind: FilterKind::from_param(value(ParamIndex::DCF1_TYPE)),
            slope: FilterSlope::from_param(value(ParamIndex::DCF1_SLOPE)),
            dcf_env: env(
                ParamIndex::DCF1_ATTACK,
                ParamIndex::DCF1_DECAY1,
                ParamIndex::DCF1_LEVEL2,
                ParamIndex::DCF1_DECAY2,
            ),

            lfo_enabled: enabled(ParamIndex::LFO1_ENABLED),
            lfo_freq: bpm / (60.01 - 60.0 * value(ParamIndex::LFO1_RATE)),
            sweep: value(ParamIndex::LFO1_SWEEP),
            lfo_pitch: value(ParamIndex::LFO1_PITCH),
            lfo_cutoff: value(ParamIndex::LFO1_CUTOFF),
            lfo_reso: value(ParamIndex::LFO1_RESO),
            lfo_panning: value(ParamIndex::LFO1_PANNING),
            lfo_volume: value(ParamIndex::LFO1_VOLUME),
            lfo_env: env(
                ParamIndex::LFO1_ATTACK,
                ParamIndex::LFO1_DECAY1,
                ParamIndex::LFO1_LEVEL2,
                ParamIndex::LFO1_DECAY2,
            ),

            dca_enabled: enabled(ParamIndex::DCA1_ENABLED),
            dca_volume: value(ParamIndex::DCA1_VOLUME),
            dca_env: env(
                ParamIndex::DCA1_ATTACK,
                ParamIndex::DCA1_DECAY1,
                ParamIndex::DCA1_LEVEL2,
                ParamIndex::DCA1_DECAY2,
            ),

            fxsend: fxsend * fxsend,
        }
    }
}

/// A drum kit element: the sample and settings played by one MIDI note.
pub struct Element {
    note: u8,
    params: Arc<ParamTable>,
    sample: Arc<SampleData>,
    ports: Box<[Port]>,
    wave: Wavetable,
    state: ElementState,
    sample_key: SampleKey,
    volume: Ramp<1>,
    /// Left gain, right gain and position.
    panning: Ramp<3>,
    width: Ramp<1>,
}

impl Element {
    pub(super) fn new(note: u8, params: Arc<ParamTable>, sample_rate: u32, tempo: f32) -> Element {
        let table = params.element(note);
        let ports: Box<[Port]> = ParamIndex::ALL[..ELEMENT_PARAMS]
            .iter()
            .map(|param| Port::new(table.live(*param)))
            .collect();
        let value = |param: ParamIndex| ports[param.index()].value();

        let wave = Wavetable::new(
            WaveShape::from_param(value(ParamIndex::LFO1_SHAPE)),
            value(ParamIndex::LFO1_WIDTH),
        );
        let sample = Arc::new(SampleData::new());
        let state = ElementState::read(&ports, sample_rate, tempo, &sample);
        let pan = value(ParamIndex::OUT1_PANNING);
        let (left, right) = pan_gains(pan);
        let volume = Ramp::new([value(ParamIndex::OUT1_VOLUME)]);
        let width = Ramp::new([value(ParamIndex::OUT1_WIDTH)]);
        let sample_key = SampleKey::read(table);

        Element {
            note,
            params,
            sample,
            ports,
            wave,
            state,
            sample_key,
            volume,
            panning: Ramp::new([left, right, pan]),
            width,
        }
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn sample(&self) -> &SampleData {
        &self.sample
    }

    pub fn sample_file(&self) -> Option<&Path> {
        self.sample.path()
    }

    pub fn param_value(&self, param: ParamIndex, slot: ParamSlot) -> f32 {
        self.params.element(self.note).value(param, slot)
    }

    /// Sets an element parameter. Live changes are picked up, and smoothed,
    /// by the next processed block.
    pub fn set_param_value(&self, param: ParamIndex, value: f32, slot: ParamSlot) {
        self.params.element(self.note).set_value(param, value, slot);
    }

    /// Copies the live parameters into a bank.
    pub fn store_bank(&self, bank: Bank) {
        self.params.element(self.note).store_bank(bank);
    }

    /// Makes a bank live.
    pub fn recall_bank(&self, bank: Bank) {
        self.params.element(self.note).recall_bank(bank);
    }

    pub fn swap_banks(&self) {
        self.params.element(self.note).swap_banks();
    }

    pub(super) fn set_sample(&mut self, sample: Arc<SampleData>) -> Arc<SampleData> {
        mem::replace(&mut self.sample, sample)
    }

    pub(super) fn sample_arc(&self) -> &Arc<SampleData> {
        &self.sample
    }

    /// Records the current sample parameters as applied.
    pub(super) fn mark_sample_synced(&mut self) {
        self.sample_key = SampleKey::read(self.params.element(self.note));
    }

    /// Follows parameters written since the last block. Returns whether the
    /// sample needs rebuilding.
    pub(super) fn sync(&mut self) -> bool {
        let table = self.params.element(self.note);
        for (param, port) in ParamIndex::ALL.iter().zip(self.ports.iter_mut()) {
            port.follow(*param, table.live(*param));
        }
        let key = SampleKey::read(table);
        if key != self.sample_key {
            self.sample_key = key;
            return true;
        }
        false
    }

    /// Prepares the block's settings and output ramps.
    pub(super) fn update(
        &mut self,
        sample_rate: u32,
        tempo: f32,
        ctl_volume: f32,
        ctl_panning: f32,
        nframes: usize,
    ) {
        let ports = &self.ports;
        let value = |param: ParamIndex| ports[param.index()].value();

        self.wave.reset(
            WaveShape::from_param(value(ParamIndex::LFO1_SHAPE)),
            value(ParamIndex::LFO1_WIDTH),
        );
        self.state = ElementState::read(ports, sample_rate, tempo, &self.sample);

        let pan = (value(ParamIndex::OUT1_PANNING) + ctl_panning).clamp(-1.0, 1.0);
        let (left, right) = pan_gains(pan);
        self.volume
            .process([value(ParamIndex::OUT1_VOLUME) * ctl_volume], nframes);
        self.panning.process([left, right, pan], nframes);
        self.width.process([value(ParamIndex::OUT1_WIDTH)], nframes);
    }

    /// Advances parameter smoothing past a processed block.
    pub(super) fn tick(&mut self, nframes: usize) {
        for port in self.ports.iter_mut() {
            port.tick(nframes as u32);
        }
    }

    pub(super) fn state(&self) -> &ElementState {
        &self.state
    }

    pub(super) fn wave(&self) -> &Wavetable {
        &self.wave
    }

    /// Volume at frame `n` of the block.
    #[inline]
    pub(super) fn volume(&self, n: usize) -> f32 {
        self.volume.value(0, n)
    }

    /// Left and right gains at frame `n` of the block.
    #[inline]
    pub(super) fn pan_gains(&self, n: usize) -> (f32, f32) {
        (self.panning.value(0, n), self.panning.value(1, n))
    }

    /// Pan position at frame `n` of the block.
    #[inline]
    pub(super) fn pan_position(&self, n: usize) -> f32 {
        self.panning.value(2, n)
    }

    #[inline]
    pub(super) fn width(&self, n: usize) -> f32 {
        self.width.value(0, n)
    }
}
