//! camgrab: discover a camera, configure it for a profile and grab frames

use std::path::PathBuf;

use camgrab::input::StdinInput;
use camgrab::pipeline::run_session;
use camgrab::process::offline;
use camgrab::sdk::sim::{SimDevice, SimulatedSdk};
use camgrab::sdk::TransportKind;
use camgrab::{display, Config, Profile};
use clap::{Parser, Subcommand};
use color_eyre::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Capture profile, overrides the configuration file
    #[arg(long, value_enum)]
    profile: Option<Profile>,

    /// Stop after this many fetch attempts
    #[arg(long)]
    frames: Option<u64>,

    /// Camera index; skips the selection prompt
    #[arg(long)]
    device: Option<usize>,

    /// Save processed frames to this directory
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Open a preview window
    #[arg(long)]
    window: bool,

    /// Trigger each frame by software instead of free running
    #[arg(long)]
    software_trigger: bool,

    /// Write the configured camera settings to this file
    #[arg(long)]
    save_settings: Option<PathBuf>,

    /// Apply camera settings from this file
    #[arg(long)]
    load_settings: Option<PathBuf>,

    /// Write frames with missing packets to this image file
    #[arg(long)]
    error_dump: Option<PathBuf>,

    /// Number of simulated cameras on the network
    #[arg(long, default_value_t = 2)]
    sim_devices: u8,

    /// Simulate colour sensors
    #[arg(long)]
    sim_color: bool,

    /// Simulated cameras lack double rate
    #[arg(long)]
    sim_no_dr: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Demodulate a saved double-rate frame
    Demodulate {
        input: PathBuf,
        output: PathBuf,
        /// The frame comes from a colour sensor
        #[arg(long)]
        color: bool,
        /// Frame width, needed for raw input
        #[arg(long)]
        width: Option<u32>,
    },
}

impl Cli {
    fn config(&self) -> camgrab::Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(profile) = self.profile {
            config.capture.profile = profile;
        }
        if let Some(frames) = self.frames {
            config.stream.max_frames = Some(frames);
        }
        if let Some(dir) = &self.save_dir {
            config.display.save_dir = Some(dir.clone());
        }
        config.display.window |= self.window;
        config.capture.software_trigger |= self.software_trigger;
        if let Some(path) = &self.save_settings {
            config.capture.save_settings = Some(path.clone());
        }
        if let Some(path) = &self.load_settings {
            config.capture.load_settings = Some(path.clone());
        }
        if let Some(path) = &self.error_dump {
            config.stream.error_dump = Some(path.clone());
        }
        Ok(config)
    }

    /// Cameras alternate between the network and bus transports.
    fn simulated_sdk(&self) -> SimulatedSdk {
        let devices = (0..self.sim_devices)
            .map(|i| {
                let transport = if i % 2 == 0 {
                    TransportKind::Network
                } else {
                    TransportKind::Bus
                };
                let device = if self.sim_color {
                    SimDevice::color(i, transport)
                } else {
                    SimDevice::mono(i, transport)
                };
                device.with_double_rate(!self.sim_no_dr)
            })
            .collect();
        SimulatedSdk::new(devices)
    }
}

fn run(cli: &Cli) -> camgrab::Result<()> {
    if let Some(Command::Demodulate {
        input,
        output,
        color,
        width,
    }) = &cli.command
    {
        offline::demodulate_file(input, output, *color, *width)?;
        return Ok(());
    }

    let config = cli.config()?;
    let sinks = display::build_sinks(&config)?;
    let mut sdk = cli.simulated_sdk();
    let mut input = StdinInput::new();

    let summary = run_session(&mut sdk, &mut input, &config, cli.device, sinks, None)?;
    info!(
        "{} frames processed in {} fetch attempts ({} incomplete)",
        summary.frames_processed, summary.attempts, summary.frames_incomplete
    );
    Ok(())
}

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("camgrab=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("camgrab launching...");
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        println!("{}", e);
        std::process::exit(-1);
    }

    info!("camgrab shutting down");
    Ok(())
}
