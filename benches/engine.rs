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
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kitsynth::{
    engine::{Engine, NUM_VOICES},
    params::{ParamIndex, ParamSlot},
};

const SAMPLE_RATE: u32 = 48000;
const BLOCK: usize = 256;
const FIRST_NOTE: u8 = 30;

fn generate_test_audio(duration_seconds: f32, sample_rate: u32) -> Vec<f32> {
    let num_samples = (duration_seconds * sample_rate as f32) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            0.3 * (2.0 * std::f32::consts::PI * 110.0 * t).sin()
                + 0.2 * (2.0 * std::f32::consts::PI * 220.0 * t).sin()
        })
        .collect()
}

/// A kit of `voices` elements with every module switched on.
fn kit(voices: usize) -> Engine {
    let mut engine = Engine::new(SAMPLE_RATE, 2);
    engine.set_buffer_size(BLOCK);
    let audio = generate_test_audio(10.0, SAMPLE_RATE);
    for note in FIRST_NOTE..FIRST_NOTE + voices as u8 {
        engine
            .set_sample_pcm(note, &audio, 1, SAMPLE_RATE)
            .expect("load sample");
        let element = engine.add_element(note);
        for param in [
            ParamIndex::DCF1_ENABLED,
            ParamIndex::LFO1_ENABLED,
            ParamIndex::DCA1_ENABLED,
        ] {
            element.set_param_value(param, 1.0, ParamSlot::Live);
        }
        element.set_param_value(ParamIndex::LFO1_PITCH, 0.2, ParamSlot::Live);
        element.set_param_value(ParamIndex::OUT1_FXSEND, 0.5, ParamSlot::Live);
    }
    engine.set_param_value(ParamIndex::REV1_WET, 0.3);
    engine
}

fn trigger(engine: &mut Engine, voices: usize) {
    for note in FIRST_NOTE..FIRST_NOTE + voices as u8 {
        engine.process_midi(&[0x90, note, 100]);
    }
}

fn benchmark_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_block");

    for voices in [1, 16, NUM_VOICES] {
        let mut engine = kit(voices);
        let mut left = vec![0.0; BLOCK];
        let mut right = vec![0.0; BLOCK];
        trigger(&mut engine, voices);

        group.bench_with_input(BenchmarkId::from_parameter(voices), &voices, |b, &voices| {
            b.iter(|| {
                if engine.active_voice_count() < voices {
                    trigger(&mut engine, voices);
                }
                engine.process(
                    &[],
                    &mut [left.as_mut_slice(), right.as_mut_slice()],
                    black_box(BLOCK),
                );
                black_box(left[0])
            })
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_block);
criterion_main!(benches);
