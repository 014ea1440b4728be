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
use rubato::{
    SincFixedIn, SincInterpolationParameters, SincInterpolationType, VecResampler, WindowFunction,
};
use tracing::debug;

use super::decode::DecodedAudio;
use super::error::SampleError;

/// Input block size for the sinc resampler.
const INPUT_BLOCK_SIZE: usize = 1024;

/// Resamples decoded audio to the target rate. Audio already at the target
/// rate is returned untouched.
pub fn resample(audio: DecodedAudio, target_rate: u32) -> Result<DecodedAudio, SampleError> {
    let source_rate = audio.sample_rate;
    let nframes = audio.nframes();
    if source_rate == target_rate || nframes == 0 {
        return Ok(audio);
    }
    if source_rate == 0 || target_rate == 0 {
        return Err(SampleError::ResamplingFailed(
            source_rate,
            target_rate,
            "zero sample rate".to_string(),
        ));
    }

    let channels = audio.channels.len();
    let failed = |e: &dyn std::fmt::Display| {
        SampleError::ResamplingFailed(source_rate, target_rate, e.to_string())
    };

    let sinc_params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        oversampling_factor: 128,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = target_rate as f64 / source_rate as f64;
    let mut resampler =
        SincFixedIn::<f32>::new(ratio, 1.0, sinc_params, INPUT_BLOCK_SIZE, channels)
            .map_err(|e| failed(&e))?;

    // The resampler's output lags its input; the lag is trimmed off the front
    // so the transient of a hit stays at frame zero.
    let delay = resampler.output_delay();
    let expected = (nframes as f64 * ratio).ceil() as usize;

    let mut scratch = resampler.output_buffer_allocate(true);
    let mut input: Vec<Vec<f32>> = vec![Vec::with_capacity(INPUT_BLOCK_SIZE); channels];
    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); channels];
    let mut position = 0;

    while output[0].len() < expected + delay {
        let needed = resampler.input_frames_next();
        let taken = needed.min(nframes - position);
        for (input, channel) in input.iter_mut().zip(&audio.channels) {
            input.clear();
            input.extend_from_slice(&channel[position..position + taken]);
        }
        position += taken;

        let (_, nbr_out) = if taken == needed {
            resampler.process_into_buffer(&input, &mut scratch, None)
        } else if taken > 0 {
            resampler.process_partial_into_buffer(Some(&input as &[Vec<f32>]), &mut scratch, None)
        } else {
            // Flush the tail out of the resampler.
            resampler.process_partial_into_buffer(None, &mut scratch, None)
        }
        .map_err(|e| failed(&e))?;

        if nbr_out == 0 && taken == 0 {
            break;
        }
        for (output, scratch) in output.iter_mut().zip(&scratch) {
            output.extend_from_slice(&scratch[..nbr_out]);
        }
    }

    for channel in output.iter_mut() {
        channel.drain(..delay.min(channel.len()));
        channel.truncate(expected);
    }

    debug!(
        source_rate,
        target_rate,
        frames_in = nframes,
        frames_out = output[0].len(),
        "Resampled sample"
    );

    Ok(DecodedAudio {
        sample_rate: target_rate,
        channels: output,
    })
}
