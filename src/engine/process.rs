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
use crossbeam_channel::TrySendError;
use tracing::warn;

use crate::{
    dsp::{pan_gains, sigmoid_1, EnvStage, Envelope},
    fx::FxParams,
    params::{ParamIndex, ELEMENT_PARAMS, NUM_NOTES},
};

use super::{element::Element, voice::Voice, Controllers, Engine};

/// How far the LFO and the modulation wheel can bend a voice's pitch.
const PITCH_SCALE: f32 = 0.5;

/// Settings shared by every voice in a block.
struct BlockState<'a> {
    ctl: &'a Controllers,
    sample_rate: f32,
    modwheel: f32,
    pressure: f32,
}

impl Engine {
    /// Renders a cycle. The input is passed through to the output of the
    /// same index, with the kit mixed into the first two outputs (or folded
    /// into the only one). Cycles longer than the buffer size are processed
    /// in blocks.
    pub fn process(&mut self, ins: &[&[f32]], outs: &mut [&mut [f32]], nframes: usize) {
        let nframes = outs.iter().fold(nframes, |n, out| n.min(out.len()));
        let mut offset = 0;
        while offset < nframes {
            let n = (nframes - offset).min(self.buffer_size);
            self.process_block(ins, outs, offset, n);
            offset += n;
        }
    }

    fn process_block(
        &mut self,
        ins: &[&[f32]],
        outs: &mut [&mut [f32]],
        offset: usize,
        nframes: usize,
    ) {
        for (k, out) in outs.iter_mut().enumerate() {
            let out = &mut out[offset..offset + nframes];
            match ins.get(k).and_then(|input| input.get(offset..offset + nframes)) {
                Some(input) => out.copy_from_slice(input),
                None => out.fill(0.0),
            }
        }
        for buffer in self.dry.iter_mut().chain(self.send.iter_mut()) {
            buffer[..nframes].fill(0.0);
        }

        while let Ok((note, velocity)) = self.direct_rx.try_recv() {
            if velocity > 0 {
                self.note_on(note, velocity);
            } else {
                self.note_off(note);
            }
        }

        self.sync_block(nframes);
        self.render_voices(nframes);
        self.mix(outs, offset, nframes);

        for port in self.globals.iter_mut() {
            port.tick(nframes as u32);
        }
        for element in self.elements.iter_mut().flatten() {
            element.tick(nframes);
        }
    }

    /// Swaps in rebuilt samples and follows parameter changes.
    fn sync_block(&mut self, nframes: usize) {
        while let Ok(update) = self.sample_inbox.try_recv() {
            let slot = usize::from(update.note);
            let element = self.elements[slot]
                .as_deref_mut()
                .filter(|_| self.serials[slot] == update.serial);
            let retired = match element {
                Some(element) => element.set_sample(update.sample),
                // Built from a base sample that has since been replaced.
                None => update.sample,
            };
            // The worker drains the trash before each update it sends, so
            // the trash holds at most as many samples as the update queue.
            if let Err(TrySendError::Full(retired)) = self.trash.try_send(retired) {
                warn!(
                    note = update.note,
                    "Trash queue is full, freeing sample in audio thread"
                );
                drop(retired);
            }
        }

        for (param, port) in ParamIndex::ALL[ELEMENT_PARAMS..]
            .iter()
            .zip(self.globals.iter_mut())
        {
            port.follow(*param, self.params.global(*param));
        }

        for note in 0..NUM_NOTES {
            let Some(element) = self.elements[note].as_deref_mut() else {
                continue;
            };
            if element.sync() {
                self.sample_sched.schedule(note as i32);
            }
            element.update(
                self.sample_rate,
                self.tempo,
                self.ctl.volume,
                self.ctl.panning,
                nframes,
            );
        }
    }

    fn render_voices(&mut self, nframes: usize) {
        let modwheel = self.global(ParamIndex::DEF1_MODWHEEL) * self.ctl.modwheel;
        let pressure = self.global(ParamIndex::DEF1_PRESSURE);
        let block = BlockState {
            ctl: &self.ctl,
            sample_rate: self.sample_rate as f32,
            modwheel,
            pressure,
        };

        let [dry_left, dry_right] = &mut self.dry;
        let [send_left, send_right] = &mut self.send;
        let mut dry = [&mut dry_left[..nframes], &mut dry_right[..nframes]];
        let mut send = [&mut send_left[..nframes], &mut send_right[..nframes]];

        let mut cursor = self.voices.head();
        while let Some(i) = cursor {
            cursor = self.voices.next_of(i);
            let voice = self.voices.get_mut(i);
            let alive = match self.elements[usize::from(voice.note)].as_deref() {
                Some(element) => render_voice(voice, element, &block, &mut dry, &mut send),
                None => false,
            };
            if !alive {
                let (note, group) = (usize::from(voice.note), usize::from(voice.group));
                if self.notes[note] == Some(i as u16) {
                    self.notes[note] = None;
                }
                if self.groups[group] == Some(i as u16) {
                    self.groups[group] = None;
                }
                self.voices.free(i);
            }
        }
    }

    /// Runs the effects on the send, folds everything into the outputs and
    /// applies the output dynamics.
    fn mix(&mut self, outs: &mut [&mut [f32]], offset: usize, nframes: usize) {
        let globals = &self.globals;
        let params = FxParams::new(
            |param| globals[param.index() - ELEMENT_PARAMS].value(),
            self.tempo,
        );
        let [send_left, send_right] = &mut self.send;
        self.fx
            .process(&mut send_left[..nframes], &mut send_right[..nframes], &params);

        let left = self.dry[0][..nframes].iter().zip(&self.send[0][..nframes]);
        let right = self.dry[1][..nframes].iter().zip(&self.send[1][..nframes]);
        match &mut *outs {
            [] => {}
            [mono] => {
                let out = &mut mono[offset..offset + nframes];
                for ((x, (dl, sl)), (dr, sr)) in out.iter_mut().zip(left).zip(right) {
                    *x += 0.5 * (dl + sl + dr + sr);
                }
            }
            [out_left, out_right, ..] => {
                let out = &mut out_left[offset..offset + nframes];
                for (x, (d, s)) in out.iter_mut().zip(left) {
                    *x += d + s;
                }
                let out = &mut out_right[offset..offset + nframes];
                for (x, (d, s)) in out.iter_mut().zip(right) {
                    *x += d + s;
                }
            }
        }

        let compress = self.global(ParamIndex::DYN1_COMPRESS) > 0.5;
        let limiter = self.global(ParamIndex::DYN1_LIMITER) > 0.5;
        self.fx.dynamics(outs, offset, nframes, compress, limiter);
    }
}

/// Moves every envelope whose stage ran out into its next stage.
fn advance_stages(voice: &mut Voice, element: &Element) {
    let state = element.state();
    let envelopes = [
        (&mut voice.dca, &state.dca_env),
        (&mut voice.dcf, &state.dcf_env),
        (&mut voice.lfo_env, &state.lfo_env),
    ];
    for (env, params) in envelopes {
        if env.is_stage_done() {
            env.next(params, &state.times);
        }
    }
}

/// The frames until the next envelope stage boundary.
fn frames_to_boundary(voice: &Voice, limit: usize) -> usize {
    [&voice.dca, &voice.dcf, &voice.lfo_env]
        .into_iter()
        .filter(|env| env.running())
        .map(Envelope::frames)
        .fold(limit, |n, frames| n.min(frames as usize))
        .max(1)
}

/// Renders a voice into the dry and send buffers. Returns false once the
/// voice is done.
fn render_voice(
    voice: &mut Voice,
    element: &Element,
    block: &BlockState,
    dry: &mut [&mut [f32]; 2],
    send: &mut [&mut [f32]; 2],
) -> bool {
    let state = element.state();
    let sample = element.sample();
    let wave = element.wave();
    let nframes = dry[0].len();

    if state.dcf_enabled {
        for filter in voice.filters.iter_mut() {
            if filter.slope() != state.slope || filter.kind() != state.kind {
                filter.reset(state.slope, state.kind);
            }
        }
    }

    let pitch_depth = state.lfo_pitch + block.modwheel;
    let pressure = 1.0 + block.pressure * block.ctl.pressure.max(voice.pre);
    let fx = state.fxsend;

    let mut n = 0;
    while n < nframes {
        advance_stages(voice, element);
        if voice.dca.stage() == EnvStage::End || voice.gen.is_over(sample) {
            return false;
        }

        let end = n + frames_to_boundary(voice, nframes - n);
        for j in n..end {
            let lfo = if state.lfo_enabled {
                let env = voice.lfo_env.tick();
                let freq = state.lfo_freq * (1.0 + 0.5 * state.sweep * env);
                voice.lfo.sample(wave, freq, block.sample_rate) * env
            } else {
                0.0
            };

            let mut left = voice.gen.value(sample, 0);
            let mut right = voice.gen.value(sample, 1);
            let freq = voice.gen_freq
                * block.ctl.pitchbend
                * (1.0 + PITCH_SCALE * pitch_depth * lfo).max(0.0);
            voice.gen.next(sample, freq);

            if state.dcf_enabled {
                let env = voice.dcf.tick();
                let env_mix = 1.0 + state.envelope * (env - 1.0);
                let cutoff = sigmoid_1(state.cutoff * env_mix * (1.0 + state.lfo_cutoff * lfo));
                let reso = sigmoid_1(state.reso * env_mix * (1.0 + state.lfo_reso * lfo));
                left = voice.filters[0].output(left, cutoff, reso);
                right = voice.filters[1].output(right, cutoff, reso);
            }

            let amp = voice.dca.tick()
                * state.dca_volume
                * voice.vel
                * pressure
                * (1.0 + state.lfo_volume * lfo)
                * element.volume(j);

            let mid = 0.5 * (left + right);
            let side = 0.5 * (left - right) * (1.0 + element.width(j));
            let (left, right) = (mid + side, mid - side);

            let (gain_left, gain_right) = if state.lfo_panning != 0.0 {
                pan_gains(element.pan_position(j) + state.lfo_panning * lfo)
            } else {
                element.pan_gains(j)
            };
            let left = left * gain_left * amp;
            let right = right * gain_right * amp;

            dry[0][j] += left * (1.0 - fx);
            dry[1][j] += right * (1.0 - fx);
            send[0][j] += left * fx;
            send[1][j] += right * fx;
        }
        n = end;
    }

    advance_stages(voice, element);
    voice.dca.stage() != EnvStage::End && !voice.gen.is_over(sample)
}
