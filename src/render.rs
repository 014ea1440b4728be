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
//! Offline rendering of Standard MIDI Files through a kit.

use std::{fs, io, path::Path, time::Duration};

use hound::{SampleFormat, WavSpec, WavWriter};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use tracing::{debug, info};

use crate::engine::Engine;

/// Microseconds per quarter note until the file says otherwise.
const DEFAULT_TEMPO_US: u32 = 500_000;

/// Output below this level counts as silence when trimming the tail.
const SILENCE: f32 = 1.0e-4;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("MIDI file error: {0}")]
    Midi(#[from] midly::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Rendering needs a stereo engine, got {0} channels")]
    Channels(usize),
}

/// A tempo change or a channel message, at an absolute time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderEventKind {
    /// Microseconds per quarter note.
    Tempo(u32),
    Midi { channel: u8, message: MidiMessage },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderEvent {
    /// Seconds from the start of the file.
    pub time: f64,
    pub kind: RenderEventKind,
}

/// Reads all tracks of a MIDI file into one time ordered event list.
pub fn read_midi_file(path: &Path) -> Result<Vec<RenderEvent>, RenderError> {
    let buf: Vec<u8> = fs::read(path)?;
    let events = parse_midi(&buf)?;
    info!(
        file = ?path,
        events = events.len(),
        length = events.last().map(|e| e.time).unwrap_or(0.0),
        "Read MIDI file"
    );
    Ok(events)
}

/// Parses MIDI file contents into one time ordered event list.
pub fn parse_midi(data: &[u8]) -> Result<Vec<RenderEvent>, RenderError> {
    let smf = Smf::parse(data)?;

    // Merge the tracks on ticks first. Ties keep track order.
    let mut ticked: Vec<(u64, RenderEventKind)> = Vec::new();
    for track in &smf.tracks {
        let mut tick: u64 = 0;
        for event in track {
            tick += u64::from(event.delta.as_int());
            match &event.kind {
                TrackEventKind::Midi { channel, message } => ticked.push((
                    tick,
                    RenderEventKind::Midi {
                        channel: channel.as_int(),
                        message: *message,
                    },
                )),
                TrackEventKind::Meta(MetaMessage::Tempo(us)) => {
                    ticked.push((tick, RenderEventKind::Tempo(us.as_int())))
                }
                _ => {}
            }
        }
    }
    ticked.sort_by_key(|(tick, _)| *tick);

    let events = match smf.header.timing {
        Timing::Metrical(ppq) => {
            let ppq = f64::from(ppq.as_int().max(1));
            let mut tempo = f64::from(DEFAULT_TEMPO_US);
            let mut last_tick = 0;
            let mut time = 0.0;
            ticked
                .into_iter()
                .map(|(tick, kind)| {
                    time += (tick - last_tick) as f64 * tempo / ppq / 1.0e6;
                    last_tick = tick;
                    if let RenderEventKind::Tempo(us) = kind {
                        tempo = f64::from(us.max(1));
                    }
                    RenderEvent { time, kind }
                })
                .collect()
        }
        Timing::Timecode(fps, ticks_per_frame) => {
            // Timecode ticks are absolute, tempo events only reach the engine.
            let ticks_per_second = f64::from(fps.as_f32()) * f64::from(ticks_per_frame.max(1));
            ticked
                .into_iter()
                .map(|(tick, kind)| RenderEvent {
                    time: tick as f64 / ticks_per_second,
                    kind,
                })
                .collect()
        }
    };

    Ok(events)
}

/// Drives an engine through an event list and collects its stereo output.
pub struct Renderer {
    block_size: usize,
    max_tail: Duration,
}

impl Renderer {
    pub fn new(block_size: usize, max_tail: Duration) -> Renderer {
        Renderer {
            block_size: block_size.max(1),
            max_tail,
        }
    }

    /// Renders the events, then keeps going until the voices and effects die
    /// away or the tail runs out. Events land on the first frame at or after
    /// their time.
    pub fn render(
        &self,
        engine: &mut Engine,
        events: &[RenderEvent],
    ) -> Result<[Vec<f32>; 2], RenderError> {
        if engine.channels() != 2 {
            return Err(RenderError::Channels(engine.channels()));
        }

        let sample_rate = f64::from(engine.sample_rate());
        let mut out: [Vec<f32>; 2] = [Vec::new(), Vec::new()];
        let mut left = vec![0.0; self.block_size];
        let mut right = vec![0.0; self.block_size];
        let mut pos: usize = 0;
        let mut next = 0;

        while next < events.len() {
            while let Some(event) = events.get(next) {
                if ((event.time * sample_rate).round().max(0.0) as usize) > pos {
                    break;
                }
                match event.kind {
                    RenderEventKind::Tempo(us) => engine.set_tempo(60.0e6 / us.max(1) as f32),
                    RenderEventKind::Midi { channel, message } => {
                        engine.handle_midi_message(channel, message)
                    }
                }
                next += 1;
            }

            let nframes = match events.get(next) {
                Some(event) => {
                    let frame = (event.time * sample_rate).round().max(0.0) as usize;
                    (frame - pos).min(self.block_size)
                }
                None => 0,
            };
            if nframes > 0 {
                render_block(engine, &mut left, &mut right, nframes, &mut out);
                pos += nframes;
            }
        }

        let max_tail = (self.max_tail.as_secs_f64() * sample_rate) as usize;
        let mut tail = 0;
        while tail < max_tail {
            let nframes = self.block_size.min(max_tail - tail);
            let peak = render_block(engine, &mut left, &mut right, nframes, &mut out);
            tail += nframes;
            if engine.active_voice_count() == 0 && peak < SILENCE {
                break;
            }
        }
        debug!(frames = pos, tail, "Rendered events");

        Ok(out)
    }
}

/// Runs one block and appends it, returning its peak level.
fn render_block(
    engine: &mut Engine,
    left: &mut [f32],
    right: &mut [f32],
    nframes: usize,
    out: &mut [Vec<f32>; 2],
) -> f32 {
    let left = &mut left[..nframes];
    let right = &mut right[..nframes];
    engine.process(&[], &mut [&mut *left, &mut *right], nframes);
    out[0].extend_from_slice(left);
    out[1].extend_from_slice(right);
    left.iter()
        .chain(right.iter())
        .fold(0.0, |peak, x| peak.max(x.abs()))
}

/// Writes interleaved 32-bit float stereo.
pub fn write_wav(path: &Path, channels: &[Vec<f32>; 2], sample_rate: u32) -> Result<(), RenderError> {
    let mut writer = WavWriter::create(
        path,
        WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        },
    )?;
    for (l, r) in channels[0].iter().zip(channels[1].iter()) {
        writer.write_sample(*l)?;
        writer.write_sample(*r)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Renders a MIDI file through the engine into a WAV file, returning the
/// number of frames written.
pub fn render_file(
    engine: &mut Engine,
    midi_file: &Path,
    wav_file: &Path,
    renderer: &Renderer,
) -> Result<usize, RenderError> {
    let events = read_midi_file(midi_file)?;
    let channels = renderer.render(engine, &events)?;
    write_wav(wav_file, &channels, engine.sample_rate())?;

    let frames = channels[0].len();
    info!(
        file = ?wav_file,
        frames,
        seconds = frames as f64 / f64::from(engine.sample_rate()),
        "Rendered"
    );
    Ok(frames)
}
