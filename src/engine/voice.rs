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
use super::element::ElementState;
use crate::dsp::{EnvTimes, Envelope, Filter, Generator, Oscillator};

/// The number of voices that can sound at once.
pub const NUM_VOICES: usize = 64;

/// One sounding note.
pub(super) struct Voice {
    pub note: u8,
    pub group: u8,
    pub vel: f32,
    pub pre: f32,
    /// Released while the sustain or sostenuto pedal held it.
    pub sustain: bool,
    /// Held by the sostenuto pedal.
    pub sostenuto: bool,
    pub gen: Generator,
    pub gen_freq: f32,
    pub lfo: Oscillator,
    pub dca: Envelope,
    pub dcf: Envelope,
    pub lfo_env: Envelope,
    pub filters: [Filter; 2],
}

impl Voice {
    fn new(sample_rate: u32) -> Voice {
        Voice {
            note: 0,
            group: 0,
            vel: 0.0,
            pre: 0.0,
            sustain: false,
            sostenuto: false,
            gen: Generator::default(),
            gen_freq: 0.0,
            lfo: Oscillator::default(),
            dca: Envelope::default(),
            dcf: Envelope::default(),
            lfo_env: Envelope::default(),
            filters: [Filter::new(sample_rate), Filter::new(sample_rate)],
        }
    }

    /// Moves every envelope into its release.
    pub fn release(&mut self, state: &ElementState) {
        self.dca.note_off(&state.dca_env, &state.times);
        self.dcf.note_off(&state.dcf_env, &state.times);
        self.lfo_env.note_off(&state.lfo_env, &state.times);
        self.sustain = false;
    }

    /// Moves every envelope into the shortest release, for retriggers and
    /// choke groups.
    pub fn release_fast(&mut self, times: &EnvTimes) {
        self.dca.note_off_fast(times);
        self.dcf.note_off_fast(times);
        self.lfo_env.note_off_fast(times);
        self.sustain = false;
    }
}

/// A fixed arena of voices. Free voices sit on a stack, sounding ones on a
/// doubly linked play list threaded through the arena by index.
pub(super) struct VoicePool {
    voices: Box<[Voice]>,
    free: Vec<u16>,
    prev: Box<[Option<u16>]>,
    next: Box<[Option<u16>]>,
    head: Option<u16>,
    tail: Option<u16>,
    active: usize,
}

impl VoicePool {
    pub fn new(sample_rate: u32) -> VoicePool {
        VoicePool {
            voices: (0..NUM_VOICES).map(|_| Voice::new(sample_rate)).collect(),
            // Lowest indices are handed out first.
            free: (0..NUM_VOICES as u16).rev().collect(),
            prev: vec![None; NUM_VOICES].into_boxed_slice(),
            next: vec![None; NUM_VOICES].into_boxed_slice(),
            head: None,
            tail: None,
            active: 0,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        for voice in self.voices.iter_mut() {
            voice.filters.iter_mut().for_each(|f| f.set_sample_rate(sample_rate));
        }
    }

    /// Takes a voice off the free stack and appends it to the play list.
    pub fn alloc(&mut self) -> Option<usize> {
        let index = self.free.pop()?;
        let i = index as usize;
        self.prev[i] = self.tail;
        self.next[i] = None;
        match self.tail {
            Some(tail) => self.next[tail as usize] = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.active += 1;
        Some(i)
    }

    /// Unlinks a sounding voice and returns it to the free stack.
    pub fn free(&mut self, i: usize) {
        if !self.is_active(i) {
            return;
        }
        let (prev, next) = (self.prev[i], self.next[i]);
        match prev {
            Some(prev) => self.next[prev as usize] = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.prev[next as usize] = prev,
            None => self.tail = prev,
        }
        self.prev[i] = None;
        self.next[i] = None;
        self.free.push(i as u16);
        self.active -= 1;
    }

    /// Frees every voice.
    pub fn reset(&mut self) {
        while let Some(head) = self.head {
            self.free(head as usize);
        }
    }

    pub fn is_active(&self, i: usize) -> bool {
        i < NUM_VOICES && (self.head == Some(i as u16) || self.prev[i].is_some())
    }

    pub fn head(&self) -> Option<usize> {
        self.head.map(usize::from)
    }

    pub fn next_of(&self, i: usize) -> Option<usize> {
        self.next[i].map(usize::from)
    }

    pub fn active_count(&self) -> usize {
        self.active
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn get(&self, i: usize) -> &Voice {
        &self.voices[i]
    }

    pub fn get_mut(&mut self, i: usize) -> &mut Voice {
        &mut self.voices[i]
    }

    /// The sounding voices in play order.
    pub fn active(&self) -> ActiveVoices<'_> {
        ActiveVoices {
            pool: self,
            cursor: self.head(),
        }
    }
}

pub(super) struct ActiveVoices<'a> {
    pool: &'a VoicePool,
    cursor: Option<usize>,
}

impl Iterator for ActiveVoices<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let i = self.cursor?;
        self.cursor = self.pool.next_of(i);
        Some(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_lists(pool: &VoicePool) {
        let active: Vec<usize> = pool.active().collect();
        assert_eq!(active.len(), pool.active_count());
        assert_eq!(pool.free_count() + pool.active_count(), NUM_VOICES);
        for window in active.windows(2) {
            assert_eq!(pool.next_of(window[0]), Some(window[1]));
        }
        for i in active {
            assert!(!pool.free.contains(&(i as u16)));
        }
    }

    #[test]
    fn test_alloc_is_bounded() {
        let mut pool = VoicePool::new(48000);
        let mut taken = Vec::new();
        while let Some(i) = pool.alloc() {
            taken.push(i);
            check_lists(&pool);
        }
        assert_eq!(taken.len(), NUM_VOICES);
        assert_eq!(taken, (0..NUM_VOICES).collect::<Vec<_>>());
        assert_eq!(pool.alloc(), None);
        assert_eq!(pool.active_count(), NUM_VOICES);
    }

    #[test]
    fn test_free_keeps_order() {
        let mut pool = VoicePool::new(48000);
        for _ in 0..5 {
            pool.alloc();
        }
        pool.free(2);
        pool.free(0);
        pool.free(4);
        check_lists(&pool);
        assert_eq!(pool.active().collect::<Vec<_>>(), vec![1, 3]);

        // Freeing twice is harmless.
        pool.free(2);
        check_lists(&pool);

        // Freed voices are reused last in, first out, at the end of the list.
        assert_eq!(pool.alloc(), Some(4));
        assert_eq!(pool.active().collect::<Vec<_>>(), vec![1, 3, 4]);
        check_lists(&pool);

        pool.reset();
        check_lists(&pool);
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.head(), None);
    }

    #[test]
    fn test_churn() {
        let mut pool = VoicePool::new(48000);
        for round in 0..1000usize {
            if round % 3 == 2 {
                if let Some(i) = pool.active().nth(round % 7) {
                    pool.free(i);
                }
            } else {
                pool.alloc();
            }
            check_lists(&pool);
        }
    }
}
