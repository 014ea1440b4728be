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
//! The standalone live host: a cpal output stream that owns the engine, fed
//! by a midir input port.

use std::{
    error::Error,
    fmt, io,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use midir::{MidiInput, MidiInputConnection};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    config::KitConfig,
    engine::Engine,
    programs::Programs,
    sched::{ChannelNotifier, SchedKind},
};

/// Raw MIDI messages waiting for the audio callback.
const MIDI_QUEUE_SIZE: usize = 1024;

/// Largest block handed to the engine from one callback.
const HOST_BLOCK_SIZE: usize = 2048;

/// A cpal output device.
pub struct Device {
    name: String,
    host_id: cpal::HostId,
    max_channels: u16,
    device: cpal::Device,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

impl Device {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lists output devices on every available host.
    pub fn list() -> Result<Vec<Device>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.output_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let Ok(configs) = device.supported_output_configs() else {
                    continue;
                };
                let max_channels = configs.map(|config| config.channels()).max().unwrap_or(0);
                if max_channels > 0 {
                    devices.push(Device {
                        name: device.name()?,
                        host_id,
                        max_channels,
                        device,
                    });
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Finds an output device by name, or the default output device.
    pub fn get(name: Option<&str>) -> Result<Device, Box<dyn Error>> {
        match name {
            Some(name) => Device::list()?
                .into_iter()
                .find(|device| device.name.trim() == name)
                .ok_or_else(|| format!("no device found with name {}", name).into()),
            None => {
                let host = cpal::default_host();
                let device = host
                    .default_output_device()
                    .ok_or("no default output device")?;
                let max_channels = device.default_output_config()?.channels();
                Ok(Device {
                    name: device.name()?,
                    host_id: host.id(),
                    max_channels,
                    device,
                })
            }
        }
    }
}

/// Lists MIDI input port names.
pub fn list_midi_inputs() -> Result<Vec<String>, Box<dyn Error>> {
    let input = MidiInput::new("kitsynth input listing")?;
    let mut names = input
        .ports()
        .iter()
        .map(|port| input.port_name(port))
        .collect::<Result<Vec<_>, _>>()?;
    names.sort();
    Ok(names)
}

/// Connects to a MIDI input port whose name contains `name`, forwarding raw
/// messages into the channel. A full channel drops messages.
fn connect_midi(
    name: &str,
    sender: Sender<Vec<u8>>,
) -> Result<MidiInputConnection<()>, Box<dyn Error>> {
    let input = MidiInput::new("kitsynth input")?;
    let port = input
        .ports()
        .into_iter()
        .find(|port| {
            input
                .port_name(port)
                .map(|port_name| port_name.contains(name))
                .unwrap_or(false)
        })
        .ok_or_else(|| format!("no MIDI input found with name {}", name))?;

    info!(port = name, "Listening for MIDI input");
    let connection = input.connect(
        &port,
        "kitsynth input watcher",
        move |_, raw_event, _| {
            if sender.try_send(Vec::from(raw_event)).is_err() {
                warn!("MIDI input queue full, dropping event");
            }
        },
        (),
    )?;
    Ok(connection)
}

/// Runs the audio callback: drains pending MIDI, then renders interleaved
/// output in blocks. The engine is skipped with silence while a kit loads.
fn render_interleaved(
    engine: &Mutex<Engine>,
    midi: &Receiver<Vec<u8>>,
    left: &mut [f32],
    right: &mut [f32],
    data: &mut [f32],
    channels: usize,
) {
    data.fill(0.0);
    let Some(mut engine) = engine.try_lock() else {
        return;
    };

    while let Ok(message) = midi.try_recv() {
        engine.process_midi(&message);
    }

    let channels = channels.max(1);
    for chunk in data.chunks_mut(channels * left.len()) {
        let nframes = chunk.len() / channels;
        let left = &mut left[..nframes];
        let right = &mut right[..nframes];
        if channels == 1 {
            engine.process(&[], &mut [&mut *left], nframes);
        } else {
            engine.process(&[], &mut [&mut *left, &mut *right], nframes);
        }
        for (i, frame) in chunk.chunks_mut(channels).enumerate() {
            frame[0] = left[i];
            if channels > 1 {
                frame[1] = right[i];
            }
        }
    }
}

/// Plays a kit live until stdin closes or reads `q`.
pub struct Host {
    engine: Arc<Mutex<Engine>>,
    kit: PathBuf,
    device: Device,
    midi_device: Option<String>,
}

impl Host {
    /// Loads the kit into a new engine set up for the device.
    pub fn new(
        kit: &Path,
        device: Option<&str>,
        midi_device: Option<&str>,
    ) -> Result<Host, Box<dyn Error>> {
        let device = Device::get(device)?;
        let supported = device.device.default_output_config()?;
        if supported.sample_format() != cpal::SampleFormat::F32 {
            return Err(format!(
                "device {} does not support float output ({:?})",
                device.name,
                supported.sample_format()
            )
            .into());
        }

        let sample_rate = supported.sample_rate();
        let channels = usize::from(supported.channels()).min(2);
        let mut engine = Engine::new(sample_rate, channels);
        load_kit(&mut engine, kit)?;

        Ok(Host {
            engine: Arc::new(Mutex::new(engine)),
            kit: kit.to_path_buf(),
            device,
            midi_device: midi_device.map(str::to_string),
        })
    }

    pub fn run(&self) -> Result<(), Box<dyn Error>> {
        let supported = self.device.device.default_output_config()?;
        let config = cpal::StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };
        let device_channels = usize::from(config.channels);

        let (midi_tx, midi_rx) = bounded::<Vec<u8>>(MIDI_QUEUE_SIZE);
        let _connection = match &self.midi_device {
            Some(name) => Some(connect_midi(name, midi_tx)?),
            None => None,
        };

        let (notifier, notifications) = ChannelNotifier::channel();
        let (_handle, programs) = {
            let engine = self.engine.lock();
            (
                engine.register_notifier(Arc::new(notifier)),
                engine.programs().clone(),
            )
        };

        let engine = self.engine.clone();
        let mut left = vec![0.0; HOST_BLOCK_SIZE];
        let mut right = vec![0.0; HOST_BLOCK_SIZE];
        let stream = self.device.device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                render_interleaved(
                    &engine,
                    &midi_rx,
                    &mut left,
                    &mut right,
                    data,
                    device_channels,
                );
            },
            |err| error!("CPAL output stream error: {}", err),
            None,
        )?;
        stream.play()?;
        info!(
            device = %self.device,
            kit = ?self.kit,
            sample_rate = config.sample_rate,
            "Playing kit, enter q or close stdin to stop"
        );

        let quit = stdin_quit();
        loop {
            select! {
                recv(notifications) -> notification => {
                    let Ok((kind, id)) = notification else {
                        break;
                    };
                    debug!(?kind, id, "Engine notification");
                    if kind == SchedKind::Programs {
                        self.load_program(&programs, id);
                    }
                }
                recv(quit) -> _ => break,
            }
        }

        info!("Stopping");
        Ok(())
    }

    /// Loads the kit of a newly selected program.
    fn load_program(&self, programs: &Programs, id: i32) {
        let (bank, prog) = Programs::decode(id);
        let Some(program) = programs.current_program() else {
            return;
        };
        let Some(kit) = program.kit() else {
            info!(bank, prog, "Program has no kit");
            return;
        };

        let mut engine = self.engine.lock();
        engine.all_sound_off();
        if let Err(e) = load_kit(&mut engine, kit) {
            error!(err = %e, kit = ?kit, "Unable to load program kit");
        }
    }
}

fn load_kit(engine: &mut Engine, path: &Path) -> Result<usize, Box<dyn Error>> {
    let kit = KitConfig::deserialize(path)?;
    let base = path.parent().unwrap_or(Path::new("."));
    Ok(kit.apply(engine, base)?)
}

/// Fires once stdin reaches EOF or a line reading `q`.
fn stdin_quit() -> Receiver<()> {
    let (tx, rx) = bounded(1);
    thread::spawn(move || {
        let mut line = String::new();
        loop {
            line.clear();
            match io::stdin().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) if line.trim() == "q" => break,
                Ok(_) => {}
            }
        }
        let _ = tx.send(());
    });
    rx
}
