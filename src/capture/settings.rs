//! Camera settings files
//!
//! A settings file is a flat TOML table mapping each writable feature to its
//! value. Features that fix the frame geometry are applied first, in the
//! order the camera needs them.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::configure::DOUBLE_RATE;
use crate::error::{Error, Result};
use crate::sdk::{Camera, FeatureKind};

const APPLY_FIRST: [&str; 4] = [DOUBLE_RATE, "PixelFormat", "Width", "Height"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

pub type Settings = BTreeMap<String, FeatureValue>;

/// Current value of every writable feature
pub fn read_settings<C: Camera>(camera: &C) -> Result<Settings> {
    let features = camera.feature_list().map_err(|e| Error::feature("features", e))?;
    let mut settings = Settings::new();
    for feature in features.into_iter().filter(|f| f.writable) {
        let name = feature.name.as_str();
        let value = match feature.kind {
            FeatureKind::Bool => camera.feature_bool(name).map(FeatureValue::Bool),
            FeatureKind::Int => camera.feature_int(name).map(FeatureValue::Int),
            FeatureKind::Float => camera.feature_float(name).map(FeatureValue::Float),
            FeatureKind::Enum => camera.feature_enum(name).map(FeatureValue::Text),
            FeatureKind::Command => continue,
        }
        .map_err(|e| Error::feature(name, e))?;
        settings.insert(feature.name, value);
    }
    Ok(settings)
}

pub fn apply_settings<C: Camera>(camera: &mut C, settings: &Settings) -> Result<()> {
    let kinds: BTreeMap<String, FeatureKind> = camera
        .feature_list()
        .map_err(|e| Error::feature("features", e))?
        .into_iter()
        .map(|f| (f.name, f.kind))
        .collect();

    let first = APPLY_FIRST.iter().filter_map(|name| settings.get_key_value(*name));
    let rest = settings.iter().filter(|(name, _)| !APPLY_FIRST.contains(&name.as_str()));
    for (name, value) in first.chain(rest) {
        let Some(kind) = kinds.get(name) else {
            return Err(Error::Settings(format!("camera has no feature {}", name)));
        };
        apply_one(camera, name, *kind, value)?;
        debug!("{} = {:?}", name, value);
    }
    Ok(())
}

fn apply_one<C: Camera>(camera: &mut C, name: &str, kind: FeatureKind, value: &FeatureValue) -> Result<()> {
    let written = match (kind, value) {
        (FeatureKind::Bool, FeatureValue::Bool(v)) => camera.feature_bool_set(name, *v),
        (FeatureKind::Int, FeatureValue::Int(v)) => camera.feature_int_set(name, *v),
        (FeatureKind::Float, FeatureValue::Float(v)) => camera.feature_float_set(name, *v),
        (FeatureKind::Float, FeatureValue::Int(v)) => camera.feature_float_set(name, *v as f64),
        (FeatureKind::Enum, FeatureValue::Text(v)) => camera.feature_enum_set(name, v),
        (kind, value) => {
            return Err(Error::Settings(format!(
                "{} is a {:?} feature, file has {:?}",
                name, kind, value
            )))
        }
    };
    written.map_err(|e| Error::feature(name, e))
}

pub fn save_settings<C: Camera>(camera: &C, path: &Path) -> Result<()> {
    let settings = read_settings(camera)?;
    let text = toml::to_string(&settings).map_err(|e| Error::Settings(e.to_string()))?;
    std::fs::write(path, text)?;
    info!("saved {} camera settings to {}", settings.len(), path.display());
    Ok(())
}

pub fn load_settings<C: Camera>(camera: &mut C, path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)?;
    let settings: Settings = toml::from_str(&text)
        .map_err(|e| Error::Settings(format!("{}: {}", path.display(), e)))?;
    apply_settings(camera, &settings)?;
    info!("loaded {} camera settings from {}", settings.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::sim::{SimCamera, SimDevice, SimulatedSdk};
    use crate::sdk::{CameraSdk, TransportKind};

    fn connect(device: SimDevice) -> (SimulatedSdk, SimCamera) {
        let mut sdk = SimulatedSdk::new(vec![device]);
        let found = sdk.discover().unwrap();
        let camera = sdk.connect(&found[0]).unwrap();
        (sdk, camera)
    }

    #[test]
    fn snapshot_skips_read_only_and_commands() {
        let (_sdk, cam) = connect(SimDevice::color(0, TransportKind::Network));
        let settings = read_settings(&cam).unwrap();
        assert_eq!(settings["Width"], FeatureValue::Int(512));
        assert_eq!(settings["PixelFormat"], FeatureValue::Text("Mono8".into()));
        assert_eq!(settings[DOUBLE_RATE], FeatureValue::Bool(false));
        assert_eq!(settings["ExposureTime"], FeatureValue::Float(1000.0));
        assert!(!settings.contains_key("Window_W"));
        assert!(!settings.contains_key("TriggerSoftware"));
    }

    #[test]
    fn file_round_trip_restores_camera() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera.toml");

        let (_sdk, mut cam) = connect(SimDevice::color(0, TransportKind::Network));
        cam.feature_bool_set(DOUBLE_RATE, true).unwrap();
        cam.feature_enum_set("PixelFormat", "BayerRG8").unwrap();
        cam.feature_int_set("Width", 1024).unwrap();
        cam.feature_float_set("ExposureTime", 2500.5).unwrap();
        save_settings(&cam, &path).unwrap();

        let (sdk, mut fresh) = connect(SimDevice::color(0, TransportKind::Network));
        load_settings(&mut fresh, &path).unwrap();
        assert_eq!(read_settings(&fresh).unwrap(), read_settings(&cam).unwrap());
        assert_eq!(fresh.feature_int("Window_W").unwrap(), 1024);

        let order: Vec<_> = sdk.log().feature_writes.into_iter().map(|(n, _)| n).collect();
        assert_eq!(&order[..4], &[DOUBLE_RATE, "PixelFormat", "Width", "Height"]);
    }

    #[test]
    fn integer_exposure_is_accepted() {
        let (_sdk, mut cam) = connect(SimDevice::mono(0, TransportKind::Bus));
        let settings: Settings = toml::from_str("ExposureTime = 2000\nWidth = 64").unwrap();
        apply_settings(&mut cam, &settings).unwrap();
        assert_eq!(cam.feature_float("ExposureTime").unwrap(), 2000.0);
        assert_eq!(cam.feature_int("Width").unwrap(), 64);
    }

    #[test]
    fn mismatched_or_unknown_entries_are_rejected() {
        let (_sdk, mut cam) = connect(SimDevice::mono(0, TransportKind::Bus));
        let wrong: Settings = toml::from_str("Width = \"wide\"").unwrap();
        assert!(matches!(apply_settings(&mut cam, &wrong), Err(Error::Settings(_))));

        let unknown: Settings = toml::from_str("Gain = 3.0").unwrap();
        assert!(matches!(apply_settings(&mut cam, &unknown), Err(Error::Settings(_))));
    }

    #[test]
    fn unreadable_file_is_a_settings_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "Width = [").unwrap();
        let (_sdk, mut cam) = connect(SimDevice::mono(0, TransportKind::Bus));
        assert!(matches!(load_settings(&mut cam, &path), Err(Error::Settings(_))));
    }
}
