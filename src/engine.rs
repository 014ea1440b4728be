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
//! The drum kit engine: elements, voices and the per-block audio loop.

mod bank;
mod direct;
mod element;
mod midi;
mod process;
mod voice;

use std::{
    path::Path,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
};

use crossbeam_channel::{Receiver, Sender};
use tracing::{info, warn};

pub use bank::SampleTask;
pub use direct::{DirectNotes, DIRECT_NOTES_SIZE};
pub use element::Element;
pub use voice::NUM_VOICES;

use crate::{
    controls::{Controls, ControlsTask},
    dsp::{note_frequency, EnvTimes},
    fx::EffectsBus,
    params::{ParamIndex, ParamSlot, ParamTable, Port, ELEMENT_PARAMS, NUM_NOTES},
    programs::Programs,
    sample::{SampleData, SampleError},
    sched::{InstanceId, Notifier, NotifierHandle, Sched, SchedService, Task},
    tuning::Tuning,
};

use self::{
    bank::{build_sample, SampleBank, SampleUpdate},
    voice::VoicePool,
};

/// The default largest block processed at once.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// The default host tempo, in beats per minute.
pub const DEFAULT_TEMPO: f32 = 120.0;

/// Room for rebuilt and retired samples in flight between the worker and
/// the audio thread.
const SAMPLE_QUEUE_SIZE: usize = 2 * NUM_NOTES;

/// Channel wide MIDI controller state.
#[derive(Debug, Clone, Copy)]
struct Controllers {
    /// Pitch multiplier.
    pitchbend: f32,
    modwheel: f32,
    pressure: f32,
    volume: f32,
    panning: f32,
    sustain: bool,
    sostenuto: bool,
    bank_msb: u8,
    bank_lsb: u8,
}

impl Default for Controllers {
    fn default() -> Self {
        Controllers {
            pitchbend: 1.0,
            modwheel: 0.0,
            pressure: 0.0,
            volume: 1.0,
            panning: 0.0,
            sustain: false,
            sostenuto: false,
            bank_msb: 0,
            bank_lsb: 0,
        }
    }
}

/// Interleaved PCM as handed to [`Engine::set_sample_pcm`], kept so that
/// the sample can be resampled again on a rate change.
struct PcmSource {
    interleaved: Vec<f32>,
    channels: usize,
    sample_rate: u32,
}

/// A polyphonic drum kit. Every MIDI note can hold an [`Element`], which
/// plays a sample through its own envelopes, filter and LFO into a shared
/// effects bus.
///
/// [`Engine::process`] and [`Engine::process_midi`] are real-time safe.
/// Everything else is meant for control threads, and slow work triggered
/// from the audio thread is handed to the scheduler worker.
pub struct Engine {
    /// Tells this engine's notifications apart from other engines'.
    instance: InstanceId,
    /// The scheduler worker service.
    service: SchedService,
    sample_rate: u32,
    /// The number of output channels.
    channels: usize,
    /// The largest block processed at once.
    buffer_size: usize,
    /// The host tempo, followed by tempo synced LFOs and the delay.
    tempo: f32,
    /// Every parameter value, shared with the scheduler worker and controls.
    params: Arc<ParamTable>,
    /// The smoothed global parameters.
    globals: Box<[Port]>,
    /// Elements by note.
    elements: Vec<Option<Box<Element>>>,
    /// The note of the element that element parameters address, or -1.
    current: Arc<AtomicI32>,
    voices: VoicePool,
    /// The voice each note last started.
    notes: [Option<u16>; NUM_NOTES],
    /// The voice each choke group last started.
    groups: [Option<u16>; NUM_NOTES],
    ctl: Controllers,
    tuning: Tuning,
    direct: DirectNotes,
    direct_rx: Receiver<(u8, u8)>,
    fx: EffectsBus,
    /// Voice output kept out of the effects.
    dry: [Vec<f32>; 2],
    /// Voice output sent through the effects.
    send: [Vec<f32>; 2],
    /// Base samples as loaded.
    bank: Arc<SampleBank>,
    /// The bank serial each element's sample was built from.
    serials: [u64; NUM_NOTES],
    /// Native rate PCM of samples not loaded from a file.
    pcm: Vec<Option<PcmSource>>,
    sample_inbox: Receiver<SampleUpdate>,
    /// Replaced samples, freed by the worker.
    trash: Sender<Arc<SampleData>>,
    programs: Arc<Programs>,
    controls: Arc<Controls>,
    sample_sched: Arc<Sched>,
    programs_sched: Arc<Sched>,
    controls_sched: Arc<Sched>,
    midi_in_sched: Arc<Sched>,
}

impl Engine {
    /// Creates an engine on the process wide scheduler service.
    pub fn new(sample_rate: u32, channels: usize) -> Engine {
        Engine::with_service(SchedService::shared(), sample_rate, channels)
    }

    /// Creates an engine whose deferred work runs on the given service.
    pub fn with_service(service: SchedService, sample_rate: u32, channels: usize) -> Engine {
        let sample_rate = sample_rate.max(1);
        let instance = InstanceId::next();
        let params = Arc::new(ParamTable::new());
        let bank = Arc::new(SampleBank::new());
        let programs = Arc::new(Programs::new());
        let controls = Arc::new(Controls::new());
        let current = Arc::new(AtomicI32::new(-1));
        let (direct, direct_rx) = DirectNotes::channel();
        let (updates, sample_inbox) = crossbeam_channel::bounded(SAMPLE_QUEUE_SIZE);
        let (trash, trash_rx) = crossbeam_channel::bounded(SAMPLE_QUEUE_SIZE);

        let sample_sched = Sched::new(
            &service,
            instance,
            Task::Sample(SampleTask::new(bank.clone(), params.clone(), updates, trash_rx)),
        );
        let programs_sched = Sched::new(&service, instance, Task::Programs(programs.clone()));
        let controller_sched = Sched::new(&service, instance, Task::Controller);
        let controls_sched = Sched::new(
            &service,
            instance,
            Task::Controls(ControlsTask::new(
                controls.clone(),
                params.clone(),
                current.clone(),
                controller_sched,
            )),
        );
        let midi_in_sched = Sched::new(&service, instance, Task::MidiIn);

        let globals = ParamIndex::ALL[ELEMENT_PARAMS..]
            .iter()
            .map(|param| Port::new(params.global(*param)))
            .collect();

        info!(sample_rate, channels, "Creating kit engine");

        Engine {
            instance,
            service,
            sample_rate,
            channels,
            buffer_size: DEFAULT_BUFFER_SIZE,
            tempo: DEFAULT_TEMPO,
            params,
            globals,
            elements: (0..NUM_NOTES).map(|_| None).collect(),
            current,
            voices: VoicePool::new(sample_rate),
            notes: [None; NUM_NOTES],
            groups: [None; NUM_NOTES],
            ctl: Controllers::default(),
            tuning: Tuning::default(),
            direct,
            direct_rx,
            fx: EffectsBus::new(sample_rate, channels),
            dry: [vec![0.0; DEFAULT_BUFFER_SIZE], vec![0.0; DEFAULT_BUFFER_SIZE]],
            send: [vec![0.0; DEFAULT_BUFFER_SIZE], vec![0.0; DEFAULT_BUFFER_SIZE]],
            bank,
            serials: [0; NUM_NOTES],
            pcm: (0..NUM_NOTES).map(|_| None).collect(),
            sample_inbox,
            trash,
            programs,
            controls,
            sample_sched,
            programs_sched,
            controls_sched,
            midi_in_sched,
        }
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Changes the sample rate. Every voice is stopped, the effects are
    /// rebuilt and samples are reloaded from their files or their PCM.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        let sample_rate = sample_rate.max(1);
        if sample_rate == self.sample_rate {
            return;
        }
        info!(from = self.sample_rate, to = sample_rate, "Changing sample rate");
        self.sample_rate = sample_rate;
        self.all_sound_off();
        self.voices.set_sample_rate(sample_rate);
        self.fx.set_sample_rate(sample_rate);

        for note in 0..NUM_NOTES as u8 {
            // A failed reload is logged and leaves the element silent.
            if let Some(path) = self.sample_file(note).map(Path::to_path_buf) {
                let _ = self.set_sample_file(note, &path);
            } else if let Some(pcm) = self.pcm[usize::from(note)].take() {
                let _ =
                    self.set_sample_pcm(note, &pcm.interleaved, pcm.channels, pcm.sample_rate);
            }
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn set_channels(&mut self, channels: usize) {
        self.channels = channels;
        self.fx.set_channels(channels);
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Sets the largest block processed at once. Longer cycles are split.
    pub fn set_buffer_size(&mut self, buffer_size: usize) {
        let buffer_size = buffer_size.max(1);
        self.buffer_size = buffer_size;
        for buffer in self.dry.iter_mut().chain(self.send.iter_mut()) {
            buffer.resize(buffer_size, 0.0);
        }
    }

    pub fn tempo(&self) -> f32 {
        self.tempo
    }

    pub fn set_tempo(&mut self, bpm: f32) {
        if bpm.is_finite() && bpm > 0.0 {
            self.tempo = bpm;
        }
    }

    /// The shared parameter table.
    pub fn params(&self) -> &Arc<ParamTable> {
        &self.params
    }

    /// Gets a parameter. Element parameters are read from the current
    /// element and read as their default when there is none.
    pub fn param_value(&self, param: ParamIndex) -> f32 {
        if !param.is_element() {
            return self.params.global(param);
        }
        match self.current_element() {
            Some(note) => self.params.element(note).live(param),
            None => param.default_value(),
        }
    }

    /// Sets a parameter. Element parameters are written to the current
    /// element and ignored when there is none.
    pub fn set_param_value(&self, param: ParamIndex, value: f32) {
        if !param.is_element() {
            self.params.set_global(param, value);
        } else if let Some(note) = self.current_element() {
            self.params
                .element(note)
                .set_value(param, value, ParamSlot::Live);
        }
    }

    /// The note of the element that element parameters address.
    pub fn current_element(&self) -> Option<u8> {
        u8::try_from(self.current.load(Ordering::Acquire))
            .ok()
            .filter(|note| usize::from(*note) < NUM_NOTES)
    }

    pub fn set_current_element(&self, note: Option<u8>) {
        let current = note.map(|note| i32::from(note & 0x7f)).unwrap_or(-1);
        self.current.store(current, Ordering::Release);
    }

    /// Adds the element for a note with default parameters and no sample,
    /// or returns the existing one.
    pub fn add_element(&mut self, note: u8) -> &mut Element {
        let note = note & 0x7f;
        let slot = usize::from(note);
        if self.elements[slot].is_none() {
            self.params.element(note).reset(note);
            self.serials[slot] = self.bank.set(note, None);
        }
        let (params, sample_rate, tempo) = (self.params.clone(), self.sample_rate, self.tempo);
        self.elements[slot]
            .get_or_insert_with(|| Box::new(Element::new(note, params, sample_rate, tempo)))
    }

    pub fn element(&self, note: u8) -> Option<&Element> {
        self.elements.get(usize::from(note))?.as_deref()
    }

    pub fn element_mut(&mut self, note: u8) -> Option<&mut Element> {
        self.elements.get_mut(usize::from(note))?.as_deref_mut()
    }

    /// The notes that hold an element, in order.
    pub fn element_notes(&self) -> impl Iterator<Item = u8> + '_ {
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, element)| element.is_some())
            .map(|(note, _)| note as u8)
    }

    /// Removes an element and silences its voices.
    pub fn remove_element(&mut self, note: u8) -> bool {
        let slot = usize::from(note & 0x7f);
        if self.elements[slot].is_none() {
            return false;
        }
        self.free_voices_of(note & 0x7f);
        self.elements[slot] = None;
        self.pcm[slot] = None;
        self.serials[slot] = self.bank.set(note & 0x7f, None);
        if self.current_element() == Some(note & 0x7f) {
            self.set_current_element(None);
        }
        true
    }

    pub fn clear_elements(&mut self) {
        self.all_sound_off();
        for note in 0..NUM_NOTES as u8 {
            self.remove_element(note);
        }
    }

    /// Loads an element's sample from a file, adding the element when
    /// needed. On failure the element is left silent.
    pub fn set_sample_file(&mut self, note: u8, path: &Path) -> Result<(), SampleError> {
        let note = note & 0x7f;
        let mut base = SampleData::new();
        match base.open(path, note_frequency(note), self.sample_rate) {
            Ok(()) => {
                self.install_sample(note, Some(base));
                Ok(())
            }
            Err(e) => {
                warn!(note, path = %path.display(), err = %e, "Unable to load sample");
                self.install_sample(note, None);
                Err(e)
            }
        }
    }

    /// Loads an element's sample from interleaved PCM, adding the element
    /// when needed.
    pub fn set_sample_pcm(
        &mut self,
        note: u8,
        interleaved: &[f32],
        channels: usize,
        sample_rate: u32,
    ) -> Result<(), SampleError> {
        let note = note & 0x7f;
        let mut base = SampleData::new();
        match base.open_pcm(
            interleaved,
            channels,
            sample_rate,
            note_frequency(note),
            self.sample_rate,
        ) {
            Ok(()) => {
                self.install_sample(note, Some(base));
                self.pcm[usize::from(note)] = Some(PcmSource {
                    interleaved: interleaved.to_vec(),
                    channels,
                    sample_rate,
                });
                Ok(())
            }
            Err(e) => {
                warn!(note, err = %e, "Unable to load sample PCM");
                self.install_sample(note, None);
                Err(e)
            }
        }
    }

    /// Removes an element's sample, leaving the element silent.
    pub fn clear_sample(&mut self, note: u8) {
        if self.element(note).is_some() {
            self.install_sample(note & 0x7f, None);
        }
    }

    fn install_sample(&mut self, note: u8, base: Option<SampleData>) {
        self.add_element(note);
        self.free_voices_of(note);

        let base = base.map(Arc::new);
        let slot = usize::from(note);
        self.pcm[slot] = None;
        self.serials[slot] = self.bank.set(note, base.clone());
        let sample = match base {
            Some(base) => {
                let sample = build_sample(&base, self.params.element(note));
                info!(
                    note,
                    path = ?sample.path(),
                    frames = sample.nframes(),
                    channels = sample.channels(),
                    "Loaded sample"
                );
                sample
            }
            None => SampleData::new(),
        };
        if let Some(element) = self.elements[slot].as_deref_mut() {
            element.set_sample(Arc::new(sample));
            element.mark_sample_synced();
        }
    }

    /// The file an element's sample was loaded from.
    pub fn sample_file(&self, note: u8) -> Option<&Path> {
        self.element(note)?.sample_file()
    }

    /// Sets an element's offset range in frames of its loaded sample and
    /// rebuilds the sample right away.
    pub fn set_offset_range(&mut self, note: u8, start: usize, end: usize) {
        let note = note & 0x7f;
        let Some((base, _)) = self.bank.get(note) else {
            return;
        };
        let nframes = base.nframes().max(1) as f32;
        let params = self.params.element(note);
        params.set_value(ParamIndex::GEN1_OFFSET_1, start as f32 / nframes, ParamSlot::Live);
        params.set_value(ParamIndex::GEN1_OFFSET_2, end as f32 / nframes, ParamSlot::Live);

        let sample = build_sample(&base, params);
        if let Some(element) = self.elements[usize::from(note)].as_deref_mut() {
            element.set_sample(Arc::new(sample));
            element.mark_sample_synced();
        }
    }

    /// The number of sounding voices.
    pub fn active_voice_count(&self) -> usize {
        self.voices.active_count()
    }

    /// Silences everything and returns controllers, effects and parameter
    /// smoothing to rest.
    pub fn reset(&mut self) {
        self.all_sound_off();
        self.ctl = Controllers::default();
        self.fx.reset();
        for (param, port) in ParamIndex::ALL[ELEMENT_PARAMS..]
            .iter()
            .zip(self.globals.iter_mut())
        {
            port.reset(self.params.global(*param));
        }
    }

    /// Stops every voice at once.
    pub fn all_sound_off(&mut self) {
        self.voices.reset();
        self.notes = [None; NUM_NOTES];
        self.groups = [None; NUM_NOTES];
    }

    /// Releases every voice.
    pub fn all_notes_off(&mut self) {
        let mut cursor = self.voices.head();
        while let Some(i) = cursor {
            cursor = self.voices.next_of(i);
            self.release_voice(i);
        }
        self.notes = [None; NUM_NOTES];
    }

    /// Returns pitch bend, modulation, pressure and the pedals to rest.
    pub fn all_controllers_off(&mut self) {
        self.ctl.pitchbend = 1.0;
        self.ctl.modwheel = 0.0;
        self.ctl.pressure = 0.0;
        self.set_sostenuto(false);
        self.set_sustain(false);
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    /// Replaces the note to frequency map. Sounding voices keep their pitch.
    pub fn set_tuning(&mut self, tuning: Tuning) {
        info!(description = tuning.description(), "Setting tuning");
        self.tuning = tuning;
    }

    pub fn programs(&self) -> &Arc<Programs> {
        &self.programs
    }

    pub fn controls(&self) -> &Arc<Controls> {
        &self.controls
    }

    /// A handle for playing notes from other threads.
    pub fn direct_notes(&self) -> DirectNotes {
        self.direct.clone()
    }

    /// Queues a note for the next block, a zero velocity releasing it.
    /// Returns false when the queue is full.
    pub fn direct_note_on(&self, note: u8, velocity: u8) -> bool {
        self.direct.note_on(note, velocity)
    }

    /// Registers an observer of this engine's processed work.
    pub fn register_notifier(&self, notifier: Arc<dyn Notifier>) -> NotifierHandle {
        self.service.register_notifier(self.instance, notifier)
    }

    #[inline]
    fn global(&self, param: ParamIndex) -> f32 {
        self.globals[param.index() - ELEMENT_PARAMS].value()
    }

    /// Moves a voice into its release and unmaps its note.
    fn release_voice(&mut self, i: usize) {
        let note = self.voices.get(i).note;
        let voice = self.voices.get_mut(i);
        match self.elements[usize::from(note)].as_deref() {
            Some(element) => voice.release(element.state()),
            None => voice.release_fast(&EnvTimes::new(self.sample_rate, 0.0, 0)),
        }
        voice.sostenuto = false;
        if self.notes[usize::from(note)] == Some(i as u16) {
            self.notes[usize::from(note)] = None;
        }
    }

    /// Fast releases a voice with its own element's envelope times.
    fn release_voice_fast(&mut self, i: usize) {
        let note = usize::from(self.voices.get(i).note);
        let times = match self.elements[note].as_deref() {
            Some(element) => element.state().times,
            None => EnvTimes::new(self.sample_rate, 0.0, 0),
        };
        self.voices.get_mut(i).release_fast(&times);
    }

    /// Returns a voice to the pool and clears the maps that point at it.
    fn free_voice(&mut self, i: usize) {
        let voice = self.voices.get(i);
        let (note, group) = (usize::from(voice.note), usize::from(voice.group));
        if self.notes[note] == Some(i as u16) {
            self.notes[note] = None;
        }
        if self.groups[group] == Some(i as u16) {
            self.groups[group] = None;
        }
        self.voices.free(i);
    }

    fn free_voices_of(&mut self, note: u8) {
        let mut cursor = self.voices.head();
        while let Some(i) = cursor {
            cursor = self.voices.next_of(i);
            if self.voices.get(i).note == note {
                self.free_voice(i);
            }
        }
    }

    /// Presses or lifts the sustain pedal. Lifting it releases the voices it
    /// held, unless the sostenuto pedal still holds them.
    fn set_sustain(&mut self, sustain: bool) {
        let lifted = self.ctl.sustain && !sustain;
        self.ctl.sustain = sustain;
        if lifted {
            self.release_held();
        }
    }

    /// Presses or lifts the sostenuto pedal. Pressing it holds the notes that
    /// are down.
    fn set_sostenuto(&mut self, sostenuto: bool) {
        if sostenuto == self.ctl.sostenuto {
            return;
        }
        self.ctl.sostenuto = sostenuto;
        let mut cursor = self.voices.head();
        while let Some(i) = cursor {
            cursor = self.voices.next_of(i);
            let note = usize::from(self.voices.get(i).note);
            let down = self.notes[note] == Some(i as u16);
            let voice = self.voices.get_mut(i);
            if sostenuto {
                voice.sostenuto = down && !voice.sustain;
            } else {
                voice.sostenuto = false;
            }
        }
        if !sostenuto {
            self.release_held();
        }
    }

    /// Releases sustained voices that no pedal holds anymore.
    fn release_held(&mut self) {
        if self.ctl.sustain {
            return;
        }
        let mut cursor = self.voices.head();
        while let Some(i) = cursor {
            cursor = self.voices.next_of(i);
            let voice = self.voices.get(i);
            if voice.sustain && !voice.sostenuto {
                self.release_voice(i);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crossbeam_channel::Receiver;

    use super::*;
    use crate::{
        controls::{ControlKey, ControlMapping},
        dsp::EnvStage,
        sched::{ChannelNotifier, SchedKind},
        testutil::audio_test_utils::{generate_sine, peak},
    };

    const RATE: u32 = 48000;

    fn engine() -> Engine {
        let mut engine = Engine::with_service(SchedService::new(), RATE, 2);
        engine.set_buffer_size(256);
        engine
    }

    fn add_drum(engine: &mut Engine, note: u8, seconds: f32) {
        let pcm = generate_sine(440.0, RATE, seconds);
        engine.set_sample_pcm(note, &pcm, 1, RATE).expect("load pcm");
    }

    fn run(engine: &mut Engine, nframes: usize) -> [Vec<f32>; 2] {
        let mut left = vec![0.0; nframes];
        let mut right = vec![0.0; nframes];
        engine.process(
            &[],
            &mut [left.as_mut_slice(), right.as_mut_slice()],
            nframes,
        );
        [left, right]
    }

    /// Lets parameter writes through their smoothing ramps.
    fn settle(engine: &mut Engine) {
        run(engine, 64);
        run(engine, 64);
    }

    fn wait_for(rx: &Receiver<(SchedKind, i32)>, kind: SchedKind) -> i32 {
        loop {
            match rx.recv_timeout(Duration::from_secs(3)) {
                Ok((received, id)) if received == kind => return id,
                Ok(_) => {}
                Err(e) => panic!("no {:?} notification: {}", kind, e),
            }
        }
    }

    #[test]
    fn test_voice_plays_and_returns() {
        let mut engine = engine();
        add_drum(&mut engine, 36, 0.1);
        assert_eq!(engine.element_notes().collect::<Vec<_>>(), vec![36]);

        engine.process_midi(&[0x90, 36, 127]);
        assert_eq!(engine.active_voice_count(), 1);

        let [left, right] = run(&mut engine, 1024);
        assert!(peak(&left) > 0.01);
        assert!(peak(&right) > 0.01);
        assert_eq!(engine.active_voice_count(), 1);

        // The sample is 4800 frames long.
        run(&mut engine, 8192);
        assert_eq!(engine.active_voice_count(), 0);
        assert_eq!(engine.voices.free_count(), NUM_VOICES);
        assert_eq!(engine.notes[36], None);

        let [left, _] = run(&mut engine, 256);
        assert_eq!(peak(&left), 0.0);
    }

    #[test]
    fn test_same_note_retrigger() {
        let mut engine = engine();
        add_drum(&mut engine, 36, 1.0);
        engine.process_midi(&[0x90, 36, 100, 0x90, 36, 100]);
        assert_eq!(engine.active_voice_count(), 2);
        assert_eq!(engine.voices.get(0).dca.stage(), EnvStage::Decay2);
        assert_eq!(engine.notes[36], Some(1));

        run(&mut engine, 256);
        assert_eq!(engine.active_voice_count(), 1);
        assert_eq!(engine.voices.head(), Some(1));
    }

    #[test]
    fn test_retrigger_without_note_off_and_pool_bound() {
        let mut engine = engine();
        add_drum(&mut engine, 36, 1.0);
        engine.set_param_value(ParamIndex::DEF1_NOTEOFF, 0.0);
        settle(&mut engine);

        for _ in 0..NUM_VOICES + 6 {
            engine.process_midi(&[0x90, 36, 100]);
        }
        assert_eq!(engine.active_voice_count(), NUM_VOICES);
        assert_eq!(engine.voices.free_count(), 0);

        // Note offs are ignored, and nothing was released.
        engine.process_midi(&[0x80, 36, 0]);
        run(&mut engine, 256);
        assert_eq!(engine.active_voice_count(), NUM_VOICES);
        assert!(engine
            .voices
            .active()
            .all(|i| engine.voices.get(i).dca.stage() != EnvStage::Decay2));
    }

    #[test]
    fn test_choke_group() {
        let mut engine = engine();
        add_drum(&mut engine, 42, 1.0);
        add_drum(&mut engine, 46, 1.0);
        for note in [42, 46] {
            engine
                .element(note)
                .expect("element")
                .set_param_value(ParamIndex::GEN1_GROUP, 1.0, ParamSlot::Live);
        }
        settle(&mut engine);

        engine.process_midi(&[0x90, 46, 100]);
        engine.process_midi(&[0x90, 42, 100]);
        assert_eq!(engine.active_voice_count(), 2);
        assert_eq!(engine.groups[1], Some(1));

        run(&mut engine, 256);
        assert_eq!(engine.active_voice_count(), 1);
        let survivor = engine.voices.head().expect("voice");
        assert_eq!(engine.voices.get(survivor).note, 42);
        assert_eq!(engine.notes[46], None);
    }

    #[test]
    fn test_group_change_does_not_pass_through_other_groups() {
        let mut engine = engine();
        engine.set_buffer_size(8);
        add_drum(&mut engine, 38, 1.0);
        add_drum(&mut engine, 40, 1.0);
        engine
            .element(38)
            .expect("element")
            .set_param_value(ParamIndex::GEN1_GROUP, 1.0, ParamSlot::Live);
        settle(&mut engine);

        engine.process_midi(&[0x90, 38, 100]);
        let snare = usize::from(engine.notes[38].expect("voice"));

        engine
            .element(40)
            .expect("element")
            .set_param_value(ParamIndex::GEN1_GROUP, 3.0, ParamSlot::Live);
        run(&mut engine, 8);
        let element = engine.elements[40].as_deref().expect("element");
        assert_eq!(element.state().group, 3);

        engine.process_midi(&[0x90, 40, 100]);
        assert_ne!(engine.voices.get(snare).dca.stage(), EnvStage::Decay2);
        assert_eq!(engine.groups[1], Some(snare as u16));
        assert_eq!(engine.groups[3], engine.notes[40]);
    }

    #[test]
    fn test_choke_uses_choked_voice_times() {
        let mut engine = engine();
        add_drum(&mut engine, 42, 1.0);
        add_drum(&mut engine, 46, 1.0);
        for (note, envtime) in [(42, 0.0), (46, 0.5)] {
            let element = engine.element(note).expect("element");
            element.set_param_value(ParamIndex::GEN1_GROUP, 1.0, ParamSlot::Live);
            element.set_param_value(ParamIndex::GEN1_ENVTIME, envtime, ParamSlot::Live);
        }
        settle(&mut engine);

        engine.process_midi(&[0x90, 46, 100]);
        let open = usize::from(engine.notes[46].expect("voice"));
        engine.process_midi(&[0x90, 42, 100]);

        let times = engine.elements[46].as_deref().expect("element").state().times;
        let dca = &engine.voices.get(open).dca;
        assert_eq!(dca.stage(), EnvStage::Decay2);
        assert_eq!(dca.frames(), times.min_frames2);
    }

    #[test]
    fn test_note_off_and_sustain() {
        let mut engine = engine();
        add_drum(&mut engine, 36, 1.0);

        engine.process_midi(&[0x90, 36, 100]);
        run(&mut engine, 64);
        engine.process_midi(&[0xb0, 64, 127, 0x80, 36, 0]);
        let voice = engine.voices.get(0);
        assert!(voice.sustain);
        assert_eq!(voice.dca.stage(), EnvStage::Decay1);

        engine.process_midi(&[0xb0, 64, 0]);
        assert_eq!(engine.voices.get(0).dca.stage(), EnvStage::Decay2);
        assert_eq!(engine.notes[36], None);

        // A note off without a voice does nothing.
        engine.process_midi(&[0x80, 38, 0]);
        assert_eq!(engine.active_voice_count(), 1);
    }

    #[test]
    fn test_sostenuto() {
        let mut engine = engine();
        add_drum(&mut engine, 36, 1.0);
        add_drum(&mut engine, 38, 1.0);

        engine.process_midi(&[0x90, 36, 100]);
        engine.process_midi(&[0xb0, 66, 127]);
        engine.process_midi(&[0x90, 38, 100]);
        engine.process_midi(&[0x80, 36, 0, 0x80, 38, 0]);
        assert_eq!(engine.voices.get(0).dca.stage(), EnvStage::Attack);
        assert_eq!(engine.voices.get(1).dca.stage(), EnvStage::Decay2);

        engine.process_midi(&[0xb0, 66, 0]);
        assert_eq!(engine.voices.get(0).dca.stage(), EnvStage::Decay2);
    }

    #[test]
    fn test_key_range_and_channel() {
        let mut engine = engine();
        add_drum(&mut engine, 36, 1.0);

        engine.set_param_value(ParamIndex::KEY1_LOW, 40.0);
        settle(&mut engine);
        engine.process_midi(&[0x90, 36, 100]);
        assert_eq!(engine.active_voice_count(), 0);

        engine.set_param_value(ParamIndex::KEY1_LOW, 0.0);
        engine.set_param_value(ParamIndex::DEF1_CHANNEL, 10.0);
        settle(&mut engine);
        engine.process_midi(&[0x90, 36, 100]);
        assert_eq!(engine.active_voice_count(), 0);
        engine.process_midi(&[0x99, 36, 100]);
        assert_eq!(engine.active_voice_count(), 1);

        // Notes without an element are ignored.
        engine.process_midi(&[0x99, 37, 100]);
        assert_eq!(engine.active_voice_count(), 1);
    }

    #[test]
    fn test_velocity_and_pitch_bend() {
        let mut engine = engine();
        add_drum(&mut engine, 36, 1.0);

        engine.process_midi(&[0x90, 36, 127]);
        assert!((engine.voices.get(0).vel - 1.0).abs() < 1e-6);
        engine.process_midi(&[0xb0, 120, 0]);
        engine.process_midi(&[0x90, 36, 1]);
        // The default velocity sensitivity keeps soft notes audible.
        let vel = engine.voices.get(0).vel;
        assert!(vel > 0.79 && vel < 0.81);

        engine.process_midi(&[0xe0, 0x00, 0x40]);
        assert_eq!(engine.ctl.pitchbend, 1.0);
        engine.process_midi(&[0xe0, 0x00, 0x00]);
        assert!((engine.ctl.pitchbend - (-0.2f32).exp2()).abs() < 1e-6);
        engine.process_midi(&[0xb0, 121, 0]);
        assert_eq!(engine.ctl.pitchbend, 1.0);
    }

    #[test]
    fn test_all_sound_off_and_remove() {
        let mut engine = engine();
        add_drum(&mut engine, 36, 1.0);
        add_drum(&mut engine, 38, 1.0);

        engine.process_midi(&[0x90, 36, 100, 0x90, 38, 100]);
        assert_eq!(engine.active_voice_count(), 2);
        engine.process_midi(&[0xb0, 123, 0]);
        assert_eq!(engine.active_voice_count(), 2);
        assert_eq!(engine.notes[36], None);
        engine.process_midi(&[0xb0, 120, 0]);
        assert_eq!(engine.active_voice_count(), 0);
        assert_eq!(engine.voices.free_count(), NUM_VOICES);

        engine.process_midi(&[0x90, 36, 100, 0x90, 38, 100]);
        assert!(engine.remove_element(36));
        assert!(!engine.remove_element(36));
        assert_eq!(engine.active_voice_count(), 1);
        engine.process_midi(&[0x90, 36, 100]);
        assert_eq!(engine.active_voice_count(), 1);

        engine.clear_elements();
        assert_eq!(engine.active_voice_count(), 0);
        assert_eq!(engine.element_notes().count(), 0);
    }

    #[test]
    fn test_direct_notes() {
        let mut engine = engine();
        add_drum(&mut engine, 36, 1.0);
        let notes = engine.direct_notes();
        assert!(notes.note_on(36, 100));
        assert_eq!(engine.active_voice_count(), 0);

        run(&mut engine, 64);
        assert_eq!(engine.active_voice_count(), 1);

        assert!(notes.note_off(36));
        run(&mut engine, 64);
        assert_eq!(engine.voices.get(0).dca.stage(), EnvStage::Decay2);

        // The released voice keeps fading next to the new one.
        assert!(engine.direct_note_on(36, 90));
        run(&mut engine, 64);
        assert_eq!(engine.active_voice_count(), 2);
    }

    #[test]
    fn test_passthrough() {
        let mut engine = engine();
        engine.set_param_value(ParamIndex::DYN1_LIMITER, 0.0);
        settle(&mut engine);

        let input = generate_sine(100.0, RATE, 0.01);
        let nframes = input.len();
        let mut outs = vec![vec![1.0; nframes]; 3];
        {
            let mut outs: Vec<&mut [f32]> = outs.iter_mut().map(Vec::as_mut_slice).collect();
            engine.process(&[input.as_slice(), input.as_slice()], &mut outs, nframes);
        }
        assert_eq!(outs[0], input);
        assert_eq!(outs[1], input);
        // Missing inputs are silent.
        assert!(outs[2].iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_mono_output() {
        let mut engine = engine();
        add_drum(&mut engine, 36, 1.0);
        engine.process_midi(&[0x90, 36, 127]);
        let mut out = vec![0.0; 512];
        engine.process(&[], &mut [out.as_mut_slice()], 512);
        assert!(peak(&out) > 0.01);
    }

    #[test]
    fn test_block_splitting() {
        let mut engine = engine();
        engine.set_buffer_size(100);
        add_drum(&mut engine, 36, 1.0);
        engine.process_midi(&[0x90, 36, 127]);
        let [left, _] = run(&mut engine, 1000);
        assert!(peak(&left[900..]) > 0.01);
    }

    #[test]
    fn test_offset_range() {
        let mut engine = engine();
        add_drum(&mut engine, 36, 0.1);
        engine.set_offset_range(36, 100, 200);

        let element = engine.element(36).expect("element");
        assert_eq!(element.sample().offset_start(), 100);
        assert_eq!(element.sample().offset_end(), 200);
        let start = element.param_value(ParamIndex::GEN1_OFFSET_1, ParamSlot::Live);
        assert!((start - 100.0 / 4800.0).abs() < 1e-6);

        // Applied synchronously, so no rebuild is scheduled.
        let sample_before = Arc::as_ptr(engine.element(36).expect("element").sample_arc());
        run(&mut engine, 64);
        let sample_after = Arc::as_ptr(engine.element(36).expect("element").sample_arc());
        assert_eq!(sample_before, sample_after);
    }

    #[test]
    fn test_bad_sample_file() {
        let mut engine = engine();
        let dir = tempfile::tempdir().expect("tempdir");
        let result = engine.set_sample_file(36, &dir.path().join("missing.wav"));
        assert!(result.is_err());
        let element = engine.element(36).expect("element");
        assert!(element.sample().is_empty());

        engine.process_midi(&[0x90, 36, 127]);
        run(&mut engine, 256);
        assert_eq!(engine.active_voice_count(), 0);
    }

    #[test]
    fn test_sample_file() {
        let mut engine = engine();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("kick.wav");
        crate::testutil::write_wav(&path, vec![generate_sine(60.0, RATE, 0.2)], RATE)
            .expect("write wav");

        engine.set_sample_file(36, &path).expect("load");
        assert_eq!(engine.sample_file(36), Some(path.as_path()));
        assert_eq!(engine.element(36).expect("element").sample().nframes(), 9600);

        engine.set_sample_rate(24000);
        let sample = engine.element(36).expect("element").sample();
        assert_eq!(sample.sample_rate(), 24000);
        assert!((sample.nframes() as i64 - 4800).abs() < 8);
    }

    #[test]
    fn test_sample_pcm_follows_rate_change() {
        let mut engine = engine();
        add_drum(&mut engine, 36, 0.1);
        assert_eq!(engine.element(36).expect("element").sample().nframes(), 4800);
        let ratio = engine.element(36).expect("element").sample().ratio();

        engine.set_sample_rate(24000);
        let sample = engine.element(36).expect("element").sample();
        assert_eq!(sample.sample_rate(), 24000);
        assert!((sample.nframes() as i64 - 2400).abs() < 8);
        // The read head still covers the same time per output frame.
        assert!((sample.ratio() - ratio).abs() < 1e-3 * ratio);

        // And back, from the native PCM rather than the resampled copy.
        engine.set_sample_rate(RATE);
        let sample = engine.element(36).expect("element").sample();
        assert_eq!(sample.sample_rate(), RATE);
        assert_eq!(sample.nframes(), 4800);

        // A cleared sample stays cleared.
        engine.clear_sample(36);
        engine.set_sample_rate(24000);
        assert!(engine.element(36).expect("element").sample().is_empty());
    }

    #[test]
    fn test_sample_rebuild_on_worker() {
        let mut engine = engine();
        let (notifier, rx) = ChannelNotifier::channel();
        let _handle = engine.register_notifier(Arc::new(notifier));
        add_drum(&mut engine, 36, 0.1);

        engine.process_midi(&[0x90, 36, 100]);
        assert_eq!(wait_for(&rx, SchedKind::MidiIn), 36);

        engine
            .element(36)
            .expect("element")
            .set_param_value(ParamIndex::GEN1_REVERSE, 1.0, ParamSlot::Live);
        run(&mut engine, 64);
        assert_eq!(wait_for(&rx, SchedKind::Sample), 36);

        run(&mut engine, 64);
        assert!(engine.element(36).expect("element").sample().is_reverse());
    }

    #[test]
    fn test_program_change() {
        let mut engine = engine();
        let (notifier, rx) = ChannelNotifier::channel();
        let _handle = engine.register_notifier(Arc::new(notifier));
        engine.programs().add_bank(130, "Bank");
        engine.programs().add_program(130, 5, "Rock", None);

        engine.process_midi(&[0xb0, 0, 1, 0xb0, 32, 2, 0xc0, 5]);
        assert_eq!(wait_for(&rx, SchedKind::Programs), Programs::encode(130, 5));
        assert_eq!(engine.programs().current(), Some((130, 5)));
        assert_eq!(
            engine.programs().current_program().map(|p| p.name().to_string()),
            Some("Rock".to_string())
        );
    }

    #[test]
    fn test_mapped_controller() {
        let mut engine = engine();
        let (notifier, rx) = ChannelNotifier::channel();
        let _handle = engine.register_notifier(Arc::new(notifier));
        add_drum(&mut engine, 36, 0.1);
        engine.set_current_element(Some(36));
        engine.controls().add(
            ControlKey { channel: 0, cc: 74 },
            ControlMapping {
                param: ParamIndex::DCF1_CUTOFF,
                invert: false,
            },
        );

        engine.process_midi(&[0xb3, 74, 0]);
        assert_eq!(
            wait_for(&rx, SchedKind::Controller),
            ParamIndex::DCF1_CUTOFF.index() as i32
        );
        assert_eq!(engine.param_value(ParamIndex::DCF1_CUTOFF), 0.0);

        // Channel controllers are not forwarded.
        engine.process_midi(&[0xb0, 7, 64]);
        assert!((engine.ctl.volume - 64.0 / 127.0).abs() < 1e-6);
    }

    #[test]
    fn test_current_element_params() {
        let engine = engine();
        assert_eq!(engine.current_element(), None);
        assert_eq!(
            engine.param_value(ParamIndex::DCA1_VOLUME),
            ParamIndex::DCA1_VOLUME.default_value()
        );
        // Without a current element, element writes go nowhere.
        engine.set_param_value(ParamIndex::DCA1_VOLUME, 0.1);

        engine.set_current_element(Some(36));
        engine.set_param_value(ParamIndex::DCA1_VOLUME, 0.1);
        assert_eq!(engine.param_value(ParamIndex::DCA1_VOLUME), 0.1);
        engine.set_param_value(ParamIndex::REV1_WET, 2.0);
        assert_eq!(engine.param_value(ParamIndex::REV1_WET), 1.0);
    }
}
