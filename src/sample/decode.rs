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
use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::debug;

use super::error::SampleError;

/// A fully decoded audio file, one buffer per channel.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl DecodedAudio {
    /// Splits interleaved PCM into per-channel buffers.
    pub fn from_interleaved(
        interleaved: &[f32],
        channels: usize,
        sample_rate: u32,
    ) -> Result<DecodedAudio, SampleError> {
        if channels == 0 {
            return Err(SampleError::InvalidChannels(channels));
        }

        let nframes = interleaved.len() / channels;
        let mut planar = vec![Vec::with_capacity(nframes); channels];
        for frame in interleaved.chunks_exact(channels) {
            for (channel, sample) in planar.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }

        Ok(DecodedAudio {
            sample_rate,
            channels: planar,
        })
    }

    pub fn nframes(&self) -> usize {
        self.channels.first().map(|channel| channel.len()).unwrap_or(0)
    }
}

/// Decodes the given audio file (WAV, FLAC, OGG, MP3 and anything else
/// symphonia supports) into memory.
pub fn decode_file(path: &Path) -> Result<DecodedAudio, SampleError> {
    // Include the path in the error so the user sees which file failed.
    let file = File::open(path).map_err(|e| {
        SampleError::IoError(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let file_path = path.to_string_lossy().to_string();
    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();
    let probed = get_probe()
        .format(&hint, mss, &fmt_opts, &meta_opts)
        .map_err(|e| SampleError::DecodeFailed(format!("'{}': {}", file_path, e)))?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| SampleError::NoTrack(file_path.clone()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let decoder_opts: DecoderOptions = Default::default();
    let mut decoder = get_codecs()
        .make(&params, &decoder_opts)
        .map_err(|e| SampleError::DecodeFailed(format!("'{}': {}", file_path, e)))?;

    let mut sample_rate = params.sample_rate.unwrap_or(0);
    let mut channels: Vec<Vec<f32>> = Vec::new();
    let mut sample_buffer: Option<SampleBuffer<f32>> = None;

    while let Some(packet) = next_packet(format_reader.as_mut(), decoder.as_mut())? {
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                // A corrupt packet is skipped rather than failing the sample.
                debug!(path = file_path, err = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(SampleError::AudioError(e)),
        };

        let spec = *decoded.spec();
        let count = spec.channels.count();
        if count == 0 || decoded.frames() == 0 {
            continue;
        }
        if channels.is_empty() {
            channels = vec![Vec::new(); count];
            sample_rate = spec.rate;
        }

        let required = decoded.capacity() * count;
        if sample_buffer
            .as_ref()
            .map_or(true, |buffer| buffer.capacity() < required)
        {
            sample_buffer = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }
        let Some(buffer) = sample_buffer.as_mut() else {
            continue;
        };
        buffer.copy_interleaved_ref(decoded);

        for frame in buffer.samples().chunks_exact(count) {
            for (channel, sample) in channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
    }

    if channels.is_empty() || channels[0].is_empty() || sample_rate == 0 {
        return Err(SampleError::Empty);
    }

    Ok(DecodedAudio {
        sample_rate,
        channels,
    })
}

/// Reads the next packet, resetting the decoder when the stream asks for it.
/// Returns `None` at the end of the stream.
fn next_packet(
    format_reader: &mut dyn FormatReader,
    decoder: &mut dyn Decoder,
) -> Result<Option<Packet>, SampleError> {
    loop {
        match format_reader.next_packet() {
            Ok(packet) => return Ok(Some(packet)),
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None);
            }
            // Some decoders return DecodeError at EOF instead of IoError.
            Err(SymphoniaError::DecodeError(_)) => return Ok(None),
            Err(e) => return Err(SampleError::AudioError(e)),
        }
    }
}
