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
use midly::{live::LiveEvent, MidiMessage};

use crate::{controls::Controls, params::ParamIndex, programs::Programs};

use super::Engine;

/// The length of a message starting with the given status byte, or 0 for a
/// byte that does not start one.
fn message_len(status: u8) -> usize {
    match status {
        0x80..=0xbf | 0xe0..=0xef | 0xf2 => 3,
        0xc0..=0xdf | 0xf1 | 0xf3 => 2,
        0xf4..=0xff => 1,
        _ => 0,
    }
}

impl Engine {
    /// Interprets a buffer of complete MIDI messages. Running status is not
    /// supported, and system messages are skipped.
    pub fn process_midi(&mut self, data: &[u8]) {
        let mut rest = data;
        while let Some(&status) = rest.first() {
            if status == 0xf0 {
                let end = rest.iter().position(|b| *b == 0xf7).unwrap_or(rest.len() - 1);
                rest = &rest[end + 1..];
                continue;
            }
            let len = message_len(status);
            if len == 0 {
                rest = &rest[1..];
                continue;
            }
            if rest.len() < len {
                break;
            }
            let (message, tail) = rest.split_at(len);
            rest = tail;
            if let Ok(LiveEvent::Midi { channel, message }) = LiveEvent::parse(message) {
                self.handle_midi_message(channel.as_int(), message);
            }
        }
    }

    /// Handles a channel message. Channels are 0 based.
    pub fn handle_midi_message(&mut self, channel: u8, message: MidiMessage) {
        let filter = self.global(ParamIndex::DEF1_CHANNEL).round() as u8;
        if filter > 0 && filter != channel + 1 {
            return;
        }

        match message {
            MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                self.note_on(key.as_int(), vel.as_int())
            }
            MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                self.note_off(key.as_int())
            }
            MidiMessage::Aftertouch { key, vel } => {
                if let Some(i) = self.notes[usize::from(key.as_int())] {
                    self.voices.get_mut(usize::from(i)).pre = f32::from(vel.as_int()) / 127.0;
                }
            }
            MidiMessage::ChannelAftertouch { vel } => {
                self.ctl.pressure = f32::from(vel.as_int()) / 127.0;
            }
            MidiMessage::PitchBend { bend } => {
                let bend = (f32::from(bend.0.as_int()) - 8192.0) / 8192.0;
                self.ctl.pitchbend = (self.global(ParamIndex::DEF1_PITCHBEND) * bend).exp2();
            }
            MidiMessage::ProgramChange { program } => {
                let bank = (u16::from(self.ctl.bank_msb) << 7) | u16::from(self.ctl.bank_lsb);
                self.programs_sched
                    .schedule(Programs::encode(bank, program.as_int()));
            }
            MidiMessage::Controller { controller, value } => {
                self.controller(channel, controller.as_int(), value.as_int())
            }
        }
    }

    fn controller(&mut self, channel: u8, cc: u8, value: u8) {
        let normalized = f32::from(value) / 127.0;
        match cc {
            0x00 => self.ctl.bank_msb = value,
            0x20 => self.ctl.bank_lsb = value,
            0x01 => self.ctl.modwheel = normalized,
            0x07 => self.ctl.volume = normalized,
            0x0a => self.ctl.panning = (f32::from(value) - 64.0) / 64.0,
            0x40 => self.set_sustain(value >= 64),
            0x42 => self.set_sostenuto(value >= 64),
            0x78 => self.all_sound_off(),
            0x79 => self.all_controllers_off(),
            0x7b => self.all_notes_off(),
            _ => {
                self.controls_sched
                    .schedule(Controls::encode(channel + 1, cc, value));
            }
        }
    }

    pub(super) fn note_on(&mut self, key: u8, velocity: u8) {
        let key = key & 0x7f;
        let slot = usize::from(key);
        let Some(element) = self.elements[slot].as_deref() else {
            return;
        };
        let low = self.global(ParamIndex::KEY1_LOW);
        let high = self.global(ParamIndex::KEY1_HIGH);
        let note = f32::from(key);
        if note < low || note > high {
            return;
        }
        let freq = self.tuning.note_to_pitch(key);
        if freq <= 0.0 {
            return;
        }
        let state = *element.state();

        // Retrigger.
        if let Some(previous) = self.notes[slot].take() {
            if self.global(ParamIndex::DEF1_NOTEOFF) > 0.5 {
                self.release_voice_fast(usize::from(previous));
            }
        }

        // Choke.
        let group = usize::from(state.group);
        if group > 0 {
            if let Some(previous) = self.groups[group].take() {
                let previous = usize::from(previous);
                if self.voices.is_active(previous) {
                    self.release_voice_fast(previous);
                }
            }
        }

        let Some(element) = self.elements[slot].as_deref() else {
            return;
        };
        let Some(i) = self.voices.alloc() else {
            return;
        };

        let velocity = (f32::from(velocity & 0x7f) / 127.0).powi(2);
        let gain = 1.0 - self.global(ParamIndex::DEF1_VELOCITY) * (1.0 - velocity);
        let voice = self.voices.get_mut(i);
        voice.note = key;
        voice.group = state.group;
        voice.vel = gain;
        voice.pre = 0.0;
        voice.sustain = false;
        voice.sostenuto = false;
        voice.gen.start(element.sample());
        voice.gen_freq = freq * ((12.0 * state.coarse + state.fine) / 12.0).exp2();
        voice.lfo.reset();

        let envelopes = [
            (&mut voice.dca, state.dca_enabled, &state.dca_env),
            (&mut voice.dcf, state.dcf_enabled, &state.dcf_env),
            (&mut voice.lfo_env, state.lfo_enabled, &state.lfo_env),
        ];
        for (env, enabled, params) in envelopes {
            if enabled {
                env.start(params, &state.times);
            } else {
                env.idle();
            }
        }
        for filter in voice.filters.iter_mut() {
            filter.reset(state.slope, state.kind);
        }

        self.notes[slot] = Some(i as u16);
        if group > 0 {
            self.groups[group] = Some(i as u16);
        }
        self.midi_in_sched.schedule(i32::from(key));
    }

    pub(super) fn note_off(&mut self, key: u8) {
        if self.global(ParamIndex::DEF1_NOTEOFF) <= 0.5 {
            return;
        }
        let slot = usize::from(key & 0x7f);
        let Some(i) = self.notes[slot] else {
            return;
        };
        let i = usize::from(i);
        let voice = self.voices.get_mut(i);
        if self.ctl.sustain || voice.sostenuto {
            voice.sustain = true;
        } else {
            self.release_voice(i);
        }
    }
}
