pub mod capture;
pub mod display;
pub mod error;
pub mod input;
pub mod pipeline;
pub mod process;
pub mod sdk;
pub mod utils;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use capture::{FrameMeta, Image, PixelFormat};
pub use error::{Error, Result};

/// Ring buffer capacity used by every sample profile
pub const DEFAULT_BUFFER_COUNT: usize = 100;

/// System configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub stream: StreamConfig,
    pub processing: ProcessingConfig,
    pub display: DisplayConfig,
}

/// What a run configures on the camera and does with each frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    /// Mono8, double rate disabled, no processing
    #[default]
    Mono,
    /// Mono8, one frame saved to disk
    SingleShot,
    /// Mono8 with double rate: demodulate, resize, equalise
    #[serde(rename = "mono-dr")]
    #[value(name = "mono-dr")]
    MonoDoubleRate,
    /// Colour sensor with double rate: demodulate, debayer, resize, gamma
    #[serde(rename = "color-dr")]
    #[value(name = "color-dr")]
    ColorDoubleRate,
}

impl Profile {
    pub fn double_rate(self) -> bool {
        matches!(self, Profile::MonoDoubleRate | Profile::ColorDoubleRate)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub profile: Profile,
    /// Exposure time in microseconds, clamped to the camera's range
    pub exposure_us: Option<f64>,
    /// Heartbeat timeout written right after connecting
    pub heartbeat_ms: Option<u64>,
    /// Trigger every frame with a `TriggerSoftware` command
    pub software_trigger: bool,
    /// Write the configured camera's settings to this file
    pub save_settings: Option<PathBuf>,
    /// Apply a settings file after configuring (and after saving)
    pub load_settings: Option<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            profile: Profile::Mono,
            exposure_us: None,
            heartbeat_ms: None,
            software_trigger: false,
            save_settings: None,
            load_settings: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub buffer_count: usize,
    pub fetch_timeout_ms: u64,
    /// Stop after this many fetch attempts
    pub max_frames: Option<u64>,
    /// Stop when a key is pressed on stdin
    pub stop_on_key: bool,
    /// Frames with missing packets are written here instead of processed
    pub error_dump: Option<PathBuf>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_count: DEFAULT_BUFFER_COUNT,
            fetch_timeout_ms: 1000,
            max_frames: None,
            stop_on_key: true,
            error_dump: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Gamma applied to colour frames; `None` disables the correction
    pub gamma: Option<f64>,
    pub equalize: bool,
    pub color_histogram_bins: usize,
    pub mono_histogram_bins: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            gamma: Some(process::gamma::DEFAULT_GAMMA),
            equalize: true,
            color_histogram_bins: 64,
            mono_histogram_bins: 128,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Width frames are resized to for display
    pub width: u32,
    /// Open a preview window (needs the `sdl-display` feature)
    pub window: bool,
    pub print_statistics: bool,
    /// Directory for saved frames; saving is off when unset
    pub save_dir: Option<PathBuf>,
    /// Save one of every N processed frames
    pub save_every: u32,
    pub file_prefix: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 600,
            window: false,
            print_statistics: true,
            save_dir: None,
            save_every: 100,
            file_prefix: "MV1".into(),
        }
    }
}

impl Config {
    /// Defaults, then an optional TOML file, then `CAMGRAB_*` environment
    /// variables (`__` separates sections, e.g. `CAMGRAB_STREAM__BUFFER_COUNT`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix("CAMGRAB")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }
}
