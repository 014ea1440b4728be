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
use std::{
    error::Error,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{crate_version, Parser, Subcommand};
use kitsynth::{
    config::KitConfig,
    engine::{Engine, DEFAULT_BUFFER_SIZE},
    render::{render_file, Renderer},
};
use tracing_subscriber::EnvFilter;

/// How long a render keeps going after the last event, at most.
const MAX_RENDER_TAIL: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A sample-based drum kit synthesizer."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Loads and verifies a kit, listing its elements.
    Kit {
        /// The path to the kit document.
        path: PathBuf,
    },
    /// Renders a MIDI file through a kit into a WAV file.
    Render {
        /// The path to the kit document.
        kit: PathBuf,
        /// The Standard MIDI File to render.
        midi_file: PathBuf,
        /// The WAV file to write.
        output: PathBuf,
        /// The output sample rate.
        #[arg(short, long, default_value_t = 48000)]
        sample_rate: u32,
        /// The largest block rendered at once.
        #[arg(short, long, default_value_t = DEFAULT_BUFFER_SIZE)]
        block_size: usize,
    },
    /// Lists the available audio output devices.
    #[cfg(feature = "host")]
    Devices {},
    /// Lists the available MIDI input devices.
    #[cfg(feature = "host")]
    MidiDevices {},
    /// Plays a kit live through an audio device.
    #[cfg(feature = "host")]
    Play {
        /// The path to the kit document.
        kit: PathBuf,
        /// The device name to play through. Defaults to the system default.
        #[arg(short, long)]
        device: Option<String>,
        /// Part of the name of the MIDI input to listen to.
        #[arg(short, long)]
        midi_device: Option<String>,
    },
}

fn load_kit(path: &Path, engine: &mut Engine) -> Result<KitConfig, Box<dyn Error>> {
    let kit = KitConfig::deserialize(path)?;
    kit.apply(engine, path.parent().unwrap_or(Path::new(".")))?;
    Ok(kit)
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Kit { path } => {
            let mut engine = Engine::new(48000, 2);
            let kit = load_kit(&path, &mut engine)?;

            println!("Kit: {}", kit.name());
            if kit.elements().is_empty() {
                println!("No elements found.");
                return Ok(());
            }

            println!("Elements (count: {}):", kit.elements().len());
            for note in engine.element_notes() {
                let Some(element) = engine.element(note) else {
                    continue;
                };
                match element.sample_file() {
                    Some(file) if !element.sample().is_empty() => println!(
                        "- {}: {} ({} frames)",
                        note,
                        file.display(),
                        element.sample().nframes()
                    ),
                    Some(file) => println!("- {}: {} (not loaded)", note, file.display()),
                    None => println!("- {}: no sample", note),
                }
            }

            for bank in engine.programs().banks() {
                println!("\nBank {} ({}):", bank.id(), bank.name());
                for program in bank.programs() {
                    println!("- {}: {}", program.id(), program.name());
                }
            }
        }
        Commands::Render {
            kit,
            midi_file,
            output,
            sample_rate,
            block_size,
        } => {
            let mut engine = Engine::new(sample_rate, 2);
            engine.set_buffer_size(block_size);
            load_kit(&kit, &mut engine)?;
            let frames = render_file(
                &mut engine,
                &midi_file,
                &output,
                &Renderer::new(block_size, MAX_RENDER_TAIL),
            )?;
            println!(
                "Wrote {} ({:.2}s)",
                output.display(),
                frames as f64 / f64::from(sample_rate)
            );
        }
        #[cfg(feature = "host")]
        Commands::Devices {} => {
            let devices = kitsynth::host::Device::list()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        #[cfg(feature = "host")]
        Commands::MidiDevices {} => {
            let devices = kitsynth::host::list_midi_inputs()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        #[cfg(feature = "host")]
        Commands::Play {
            kit,
            device,
            midi_device,
        } => {
            let host = kitsynth::host::Host::new(&kit, device.as_deref(), midi_device.as_deref())?;
            host.run()?;
        }
    }

    Ok(())
}
