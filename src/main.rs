//! `sushi`: wires the core engine, the event dispatcher/controller, the MIDI
//! dispatcher, and one Audio Frontend variant together behind a small CLI.
//! Everything interesting lives in the library crates; this binary is
//! config loading, logging setup, and wiring (SPEC_FULL §10).

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sushi_core::config::EngineConfig;
use sushi_core::Result;
use sushi_dispatch::{Controller, EventDispatcher};
use sushi_engine::AudioEngine;
use sushi_frontend::offline::{OfflineFrontend, OfflineFrontendConfig};
use sushi_frontend::AudioFrontend;
use sushi_midi::{MidiDispatcher, NullOutputPort};
use tracing::info;

#[derive(Parser)]
#[command(name = "sushi")]
#[command(author, version, about = "Headless, multi-track, plugin-hosting real-time audio engine", long_about = None)]
struct Cli {
    /// TOML engine configuration file. Falls back to built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured sample rate.
    #[arg(long)]
    sample_rate: Option<f32>,

    /// Run the file-driven offline frontend against this input WAV instead
    /// of opening a realtime device.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Output WAV path for the offline frontend.
    #[arg(long, default_value = "sushi_output.wav")]
    output: PathBuf,

    /// Force the offline frontend even without --input (drives silence).
    #[arg(long)]
    offline: bool,

    /// Force the realtime device frontend.
    #[arg(long, conflicts_with = "offline")]
    realtime: bool,

    /// With --offline and no --input, run a fixed number of silent chunks
    /// instead of reading a file (SPEC_FULL §11 "dummy_mode").
    #[arg(long, default_value_t = 0)]
    dummy_chunks: usize,
}

fn load_engine_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = std::fs::read_to_string(path)?;
    toml::from_str(&text).map_err(|e| sushi_core::Error::InvalidConfig(e.to_string()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let mut config = load_engine_config(cli.config.as_ref())?;
    if let Some(sample_rate) = cli.sample_rate {
        config.sample_rate = sample_rate;
    }

    let (mut engine, handle) = AudioEngine::new(config, 2);
    engine.enable_realtime(true);

    let dispatcher = Arc::new(EventDispatcher::new(handle.clone(), Duration::from_millis(2)));
    let controller = Controller::new(handle.clone(), dispatcher.clone());
    // Kept alive for the process lifetime: future control frontends (gRPC/OSC,
    // both non-goals here) would sit behind this same `Controller`, and real
    // MIDI hardware would replace `NullOutputPort` with `HardwareOutputPort`.
    let _midi = MidiDispatcher::new(handle.clone(), dispatcher.clone(), Box::new(NullOutputPort));
    info!(tracks = controller.get_all_tracks().len(), "engine wired up");

    let run_offline = cli.offline || cli.input.is_some();
    info!(offline = run_offline, realtime_requested = cli.realtime, "selecting audio frontend");

    if run_offline {
        let offline_config = OfflineFrontendConfig {
            input_path: cli.input.clone(),
            output_path: cli.output.clone(),
            channels: 2,
            dummy_mode: cli.input.is_none(),
            dummy_chunk_count: cli.dummy_chunks.max(if cli.input.is_none() { 16 } else { 0 }),
        };
        let mut frontend = OfflineFrontend::new(engine, offline_config);
        frontend.init()?;
        frontend.run()?;
        frontend.cleanup();
        info!(output = %cli.output.display(), "offline run complete");
    } else {
        run_device_frontend(engine, handle)?;
    }

    Ok(())
}

#[cfg(feature = "device")]
fn run_device_frontend(engine: AudioEngine, handle: sushi_engine::EngineHandle) -> Result<()> {
    use sushi_frontend::device::{DeviceFrontend, DeviceFrontendConfig};
    use std::io::Read;

    let mut frontend = DeviceFrontend::new(engine, handle, DeviceFrontendConfig::default());
    frontend.init()?;
    frontend.run()?;
    info!("realtime stream running, press enter to stop");
    let _ = std::io::stdin().read(&mut [0u8]);
    frontend.cleanup();
    Ok(())
}

#[cfg(not(feature = "device"))]
fn run_device_frontend(_engine: AudioEngine, _handle: sushi_engine::EngineHandle) -> Result<()> {
    Err(sushi_core::Error::NotImplemented(
        "realtime device frontend was built without the `device` feature".into(),
    ))
}
