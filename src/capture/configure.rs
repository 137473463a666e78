//! Camera configuration per profile
//!
//! Double rate is checked and set before pixel format and geometry: the
//! camera only accepts DR-compatible sizes once the mode is settled.

use std::time::Duration;

use tracing::{info, instrument, warn};

use super::frame::PixelFormat;
use super::settings;
use crate::error::{Error, Result};
use crate::sdk::Camera;
use crate::{CaptureConfig, Profile};

pub const DOUBLE_RATE: &str = "DoubleRate_Enable";
pub const WINDOW_WIDTH: &str = "Window_W";
pub const TRIGGER_MODE: &str = "TriggerMode";
pub const TRIGGER_SOURCE: &str = "TriggerSource";
pub const TRIGGER_SOFTWARE: &str = "TriggerSoftware";

/// Pixel format name fragments tried in order on colour sensors
const COLOR_FORMAT_PREFERENCE: [&str; 2] = ["Bayer", "RGB"];

/// Geometry and format the camera reported back after configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfiguredCamera {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// Width of a frame after demodulation
    pub output_width: u32,
    pub color: bool,
    pub double_rate: bool,
    /// Frames only arrive after a `TriggerSoftware` command
    pub software_trigger: bool,
}

#[instrument(skip_all, fields(camera = %camera.info().label(), profile = ?config.profile))]
pub fn configure<C: Camera>(camera: &mut C, config: &CaptureConfig) -> Result<ConfiguredCamera> {
    if let Some(ms) = config.heartbeat_ms {
        camera
            .set_heartbeat_timeout(Duration::from_millis(ms))
            .map_err(|e| Error::feature("DeviceHeartbeat", e))?;
    }

    let color = camera.is_color().map_err(|e| Error::feature("IsColor", e))?;
    if config.profile == Profile::ColorDoubleRate && !color {
        return Err(Error::Capability(
            "To run this sample select a color camera".into(),
        ));
    }

    let mut double_rate = set_double_rate(camera, config.profile)?;

    let format = match config.profile {
        Profile::ColorDoubleRate => select_color_format(camera)?,
        _ => PixelFormat::Mono8,
    };
    camera
        .feature_enum_set("PixelFormat", format.name())
        .map_err(|e| Error::feature("PixelFormat", e))?;

    for name in ["Width", "Height"] {
        let params = camera.feature_params(name).map_err(|e| Error::feature(name, e))?;
        camera
            .feature_int_set(name, params.max)
            .map_err(|e| Error::feature(name, e))?;
    }

    if let Some(exposure) = config.exposure_us {
        set_exposure(camera, exposure)?;
    }

    if config.software_trigger {
        enable_software_trigger(camera)?;
    }

    if let Some(path) = &config.save_settings {
        settings::save_settings(camera, path)?;
    }
    if let Some(path) = &config.load_settings {
        settings::load_settings(camera, path)?;
        if double_rate || config.profile.double_rate() {
            double_rate = camera.feature_bool(DOUBLE_RATE).map_err(|e| Error::feature(DOUBLE_RATE, e))?;
        }
    }

    let width = read_dimension(camera, "Width")?;
    let height = read_dimension(camera, "Height")?;
    let format: PixelFormat = camera
        .feature_enum("PixelFormat")
        .map_err(|e| Error::feature("PixelFormat", e))?
        .parse()?;
    let output_width = if camera.has_feature(WINDOW_WIDTH).map_err(|e| Error::feature(WINDOW_WIDTH, e))? {
        read_dimension(camera, WINDOW_WIDTH)?
    } else {
        width
    };
    let software_trigger = software_trigger_armed(camera)?;

    info!(
        "configured {}x{} {} (output width {}, double rate {}, software trigger {})",
        width, height, format, output_width, double_rate, software_trigger
    );
    Ok(ConfiguredCamera {
        format,
        width,
        height,
        output_width,
        color,
        double_rate,
        software_trigger,
    })
}

/// Enable or disable double rate as the profile needs. Returns whether it
/// ended up enabled.
fn set_double_rate<C: Camera>(camera: &mut C, profile: Profile) -> Result<bool> {
    let present = camera.has_feature(DOUBLE_RATE).map_err(|e| Error::feature(DOUBLE_RATE, e))?;
    if !present {
        if profile.double_rate() {
            return Err(Error::Capability("To run this sample select a DR camera".into()));
        }
        return Ok(false);
    }
    let enable = profile.double_rate();
    camera
        .feature_bool_set(DOUBLE_RATE, enable)
        .map_err(|e| Error::feature(DOUBLE_RATE, e))?;
    Ok(enable)
}

/// First enumerated format matching the preference list that we can decode.
/// A pattern can match several entries (`BayerRG12`, `BayerRG8`); each is
/// tried in enumeration order.
fn select_color_format<C: Camera>(camera: &C) -> Result<PixelFormat> {
    let params = camera
        .feature_params("PixelFormat")
        .map_err(|e| Error::feature("PixelFormat", e))?;
    let names = (0..params.enumeration_count)
        .map(|i| camera.feature_enum_name("PixelFormat", i))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::feature("PixelFormat", e))?;

    COLOR_FORMAT_PREFERENCE
        .iter()
        .find_map(|pattern| {
            names
                .iter()
                .filter(|name| name.contains(pattern))
                .find_map(|name| name.parse::<PixelFormat>().ok())
        })
        .ok_or_else(|| {
            Error::Capability(format!(
                "camera offers no supported Bayer or RGB pixel format (has {})",
                names.join(", ")
            ))
        })
}

fn enable_software_trigger<C: Camera>(camera: &mut C) -> Result<()> {
    if !camera.has_feature(TRIGGER_MODE).map_err(|e| Error::feature(TRIGGER_MODE, e))? {
        return Err(Error::Capability("camera has no trigger mode".into()));
    }
    camera
        .feature_enum_set(TRIGGER_MODE, "On")
        .map_err(|e| Error::feature(TRIGGER_MODE, e))?;
    camera
        .feature_enum_set(TRIGGER_SOURCE, "Software")
        .map_err(|e| Error::feature(TRIGGER_SOURCE, e))
}

fn software_trigger_armed<C: Camera>(camera: &C) -> Result<bool> {
    if !camera.has_feature(TRIGGER_MODE).map_err(|e| Error::feature(TRIGGER_MODE, e))? {
        return Ok(false);
    }
    let mode = camera.feature_enum(TRIGGER_MODE).map_err(|e| Error::feature(TRIGGER_MODE, e))?;
    let source = camera
        .feature_enum(TRIGGER_SOURCE)
        .map_err(|e| Error::feature(TRIGGER_SOURCE, e))?;
    Ok(mode == "On" && source == "Software")
}

fn set_exposure<C: Camera>(camera: &mut C, requested: f64) -> Result<()> {
    let params = camera
        .feature_params("ExposureTime")
        .map_err(|e| Error::feature("ExposureTime", e))?;
    let exposure = requested.clamp(params.float_min, params.float_max);
    if exposure != requested {
        warn!(
            "exposure {}us outside [{}, {}], using {}us",
            requested, params.float_min, params.float_max, exposure
        );
    }
    camera
        .feature_float_set("ExposureTime", exposure)
        .map_err(|e| Error::feature("ExposureTime", e))?;
    let applied = camera
        .feature_float("ExposureTime")
        .map_err(|e| Error::feature("ExposureTime", e))?;
    info!("exposure time {}us", applied);
    Ok(())
}

fn read_dimension<C: Camera>(camera: &C, name: &str) -> Result<u32> {
    let value = camera.feature_int(name).map_err(|e| Error::feature(name, e))?;
    u32::try_from(value).map_err(|_| Error::InvalidParameter(format!("{} = {}", name, value)))
}
