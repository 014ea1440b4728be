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

/// Shortest envelope time, in milliseconds.
const MIN_ENV_MSECS: f32 = 0.5;

/// Longest envelope time, in milliseconds.
const MAX_ENV_MSECS: f32 = 5000.0;

/// Envelope stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvStage {
    #[default]
    Idle,
    Attack,
    Decay1,
    Decay2,
    End,
}

/// The four envelope controls, all normalized to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvParams {
    pub attack: f32,
    pub decay1: f32,
    pub level2: f32,
    pub decay2: f32,
}

/// Stage lengths in frames, shared by all envelopes of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvTimes {
    pub min_frames1: u32,
    pub min_frames2: u32,
    pub max_frames: u32,
}

impl EnvTimes {
    /// Derives stage lengths from the element's envelope time. An envelope
    /// time below the minimum follows the playable length of the sample
    /// instead.
    pub fn new(sample_rate: u32, envtime: f32, sample_frames: usize) -> EnvTimes {
        let srate_ms = 0.001 * sample_rate as f32;

        let mut envtime_msecs = MAX_ENV_MSECS * envtime;
        if envtime_msecs < MIN_ENV_MSECS {
            envtime_msecs = 0.5 * sample_frames as f32 / srate_ms.max(f32::EPSILON);
            if envtime_msecs < MIN_ENV_MSECS {
                envtime_msecs = 4.0 * MIN_ENV_MSECS;
            }
        }

        let min_frames1 = ((srate_ms * MIN_ENV_MSECS) as u32).max(1);
        let min_frames2 = 4 * min_frames1;
        let max_frames = ((srate_ms * envtime_msecs) as u32).max(min_frames2);

        EnvTimes {
            min_frames1,
            min_frames2,
            max_frames,
        }
    }

    fn frames(&self, time: f32, min_frames: u32) -> u32 {
        ((time * time * self.max_frames as f32) as u32).max(min_frames)
    }
}

/// A three segment envelope: attack to full scale, decay to the sustain
/// level, then decay to silence. Each segment is the quadratic ease
/// `c1 * p * (2 - p) + c0` over a phase `p` running from 0 to 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct Envelope {
    stage: EnvStage,
    running: bool,
    phase: f32,
    delta: f32,
    value: f32,
    c1: f32,
    c0: f32,
    frames: u32,
}

impl Envelope {
    pub fn start(&mut self, params: &EnvParams, times: &EnvTimes) {
        self.stage = EnvStage::Attack;
        self.running = true;
        self.frames = times.frames(params.attack, times.min_frames1);
        self.phase = 0.0;
        self.delta = 1.0 / self.frames as f32;
        self.value = 0.0;
        self.c1 = 1.0;
        self.c0 = 0.0;
    }

    /// Moves to the following stage once the current one is done.
    pub fn next(&mut self, params: &EnvParams, times: &EnvTimes) {
        match self.stage {
            EnvStage::Attack => {
                self.stage = EnvStage::Decay1;
                self.frames = times.frames(params.decay1, times.min_frames2);
                self.begin(params.level2 - self.value, self.value);
            }
            EnvStage::Decay1 => {
                self.stage = EnvStage::Decay2;
                self.frames = times.frames(params.decay2, times.min_frames2);
                self.begin(-self.value, self.value);
            }
            EnvStage::Decay2 => {
                self.stage = EnvStage::End;
                self.running = false;
                self.frames = 0;
                self.phase = 0.0;
                self.delta = 0.0;
                self.value = 0.0;
                self.c1 = 0.0;
                self.c0 = 0.0;
            }
            EnvStage::Idle | EnvStage::End => {}
        }
    }

    fn begin(&mut self, c1: f32, c0: f32) {
        self.phase = 0.0;
        self.delta = 1.0 / self.frames as f32;
        self.c1 = c1;
        self.c0 = c0;
    }

    /// Advances one frame and returns the value.
    #[inline]
    pub fn tick(&mut self) -> f32 {
        if self.running && self.frames > 0 {
            self.phase += self.delta;
            self.value = self.c1 * self.phase * (2.0 - self.phase) + self.c0;
            self.frames -= 1;
        }
        self.value
    }

    /// Releases from the current value.
    pub fn note_off(&mut self, params: &EnvParams, times: &EnvTimes) {
        if self.running && self.stage != EnvStage::Decay2 {
            self.stage = EnvStage::Decay2;
            self.frames = times.frames(params.decay2, times.min_frames2);
            self.begin(-self.value, self.value);
        }
    }

    /// Releases from the current value as quickly as allowed. An idle
    /// envelope is released from full scale, so that disabled modules can
    /// still be choked.
    pub fn note_off_fast(&mut self, times: &EnvTimes) {
        if self.running || self.stage == EnvStage::Idle {
            self.running = true;
            self.stage = EnvStage::Decay2;
            self.frames = times.min_frames2;
            self.begin(-self.value, self.value);
        }
    }

    /// Holds a constant full scale, for disabled modules.
    pub fn idle(&mut self) {
        *self = Envelope {
            value: 1.0,
            ..Default::default()
        };
    }

    /// Whether the current stage has no frames left and is waiting on
    /// [`Envelope::next`].
    #[inline]
    pub fn is_stage_done(&self) -> bool {
        self.running && self.frames == 0
    }

    pub fn stage(&self) -> EnvStage {
        self.stage
    }

    pub fn running(&self) -> bool {
        self.running
    }

    /// Frames left in the current stage.
    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: EnvParams = EnvParams {
        attack: 0.1,
        decay1: 0.2,
        level2: 0.5,
        decay2: 0.3,
    };

    fn times() -> EnvTimes {
        EnvTimes::new(48000, 0.2, 0)
    }

    fn run_stage(env: &mut Envelope) -> u32 {
        let mut n = 0;
        while env.frames() > 0 {
            env.tick();
            n += 1;
        }
        n
    }

    #[test]
    fn test_env_times() {
        let times = EnvTimes::new(48000, 0.2, 0);
        assert_eq!(times.min_frames1, 24);
        assert_eq!(times.min_frames2, 96);
        assert_eq!(times.max_frames, 48000);

        // Automatic time follows half the sample length.
        let times = EnvTimes::new(48000, 0.0, 96000);
        assert_eq!(times.max_frames, 48000);

        // An empty sample still gets usable envelopes.
        let times = EnvTimes::new(48000, 0.0, 0);
        assert_eq!(times.max_frames, 96);
    }

    #[test]
    fn test_stage_walk() {
        let times = times();
        let mut env = Envelope::default();
        assert_eq!(env.stage(), EnvStage::Idle);

        env.start(&PARAMS, &times);
        assert_eq!(env.stage(), EnvStage::Attack);
        assert_eq!(env.frames(), 480);
        assert_eq!(run_stage(&mut env), 480);
        assert!((env.value() - 1.0).abs() < 1e-3);
        assert!(env.is_stage_done());

        env.next(&PARAMS, &times);
        assert_eq!(env.stage(), EnvStage::Decay1);
        assert_eq!(run_stage(&mut env), 1920);
        assert!((env.value() - 0.5).abs() < 1e-3);

        env.next(&PARAMS, &times);
        assert_eq!(env.stage(), EnvStage::Decay2);
        assert_eq!(run_stage(&mut env), 4320);
        assert!(env.value().abs() < 1e-3);

        env.next(&PARAMS, &times);
        assert_eq!(env.stage(), EnvStage::End);
        assert!(!env.running());
        assert_eq!(env.tick(), 0.0);
    }

    #[test]
    fn test_attack_is_monotonic() {
        let mut env = Envelope::default();
        env.start(&PARAMS, &times());
        let mut last = 0.0;
        while env.frames() > 0 {
            let value = env.tick();
            assert!(value >= last);
            last = value;
        }
    }

    #[test]
    fn test_stage_lengths_are_monotonic_with_floor() {
        let times = times();
        let mut last = 0;
        for i in 0..=100 {
            let attack = i as f32 / 100.0;
            let mut env = Envelope::default();
            env.start(
                &EnvParams {
                    attack,
                    ..PARAMS
                },
                &times,
            );
            assert!(env.frames() >= times.min_frames1);
            assert!(env.frames() >= last);
            last = env.frames();
        }
        assert_eq!(last, times.max_frames);
    }

    #[test]
    fn test_note_off() {
        let times = times();
        let mut env = Envelope::default();
        env.start(&PARAMS, &times);
        for _ in 0..240 {
            env.tick();
        }
        let value = env.value();
        assert!(value > 0.0 && value < 1.0);

        env.note_off(&PARAMS, &times);
        assert_eq!(env.stage(), EnvStage::Decay2);
        assert_eq!(env.frames(), 4320);
        // Releasing again does not restart the release.
        env.tick();
        env.note_off(&PARAMS, &times);
        assert_eq!(env.frames(), 4319);

        // The release starts where the envelope was.
        let first = env.value();
        assert!(first <= value && first > value * 0.99);
    }

    #[test]
    fn test_note_off_fast() {
        let times = times();
        let mut env = Envelope::default();
        env.start(&PARAMS, &times);
        run_stage(&mut env);
        env.next(&PARAMS, &times);
        env.next(&PARAMS, &times);

        env.note_off_fast(&times);
        assert_eq!(env.stage(), EnvStage::Decay2);
        assert_eq!(env.frames(), times.min_frames2);
        assert_eq!(run_stage(&mut env), times.min_frames2);
        assert!(env.value().abs() < 1e-3);
    }

    #[test]
    fn test_idle() {
        let mut env = Envelope::default();
        env.idle();
        assert!(!env.running());
        assert_eq!(env.tick(), 1.0);
        assert_eq!(env.tick(), 1.0);
        assert!(!env.is_stage_done());

        // A fast release still fades an idle envelope out.
        let times = times();
        env.note_off_fast(&times);
        assert_eq!(env.stage(), EnvStage::Decay2);
        assert_eq!(run_stage(&mut env), times.min_frames2);
        assert!(env.value().abs() < 1e-3);
        env.next(&PARAMS, &times);
        assert_eq!(env.stage(), EnvStage::End);

        // A plain release leaves it alone.
        let mut env = Envelope::default();
        env.idle();
        env.note_off(&PARAMS, &times);
        assert_eq!(env.stage(), EnvStage::Idle);
    }
}
