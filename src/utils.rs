use std::io::Write;

use tracing::info;

use crate::error::{Error, Result};
use crate::input::InputSource;
use crate::sdk::{CameraSdk, DeviceDescriptor, SdkError};

/// Discover cameras on every transport, print them and pick one.
///
/// With `preselected` set the prompt is skipped, but the index is checked
/// against the discovered list the same way.
pub fn select_device<K, I>(sdk: &mut K, input: &mut I, preselected: Option<usize>) -> Result<DeviceDescriptor>
where
    K: CameraSdk,
    I: InputSource,
{
    info!("Discovering cameras...");
    let devices = sdk.discover().map_err(|e| match e.code {
        SdkError::NO_CAMERAS_FOUND => Error::NoCameras,
        _ => Error::Discovery(e),
    })?;
    if devices.is_empty() {
        return Err(Error::NoCameras);
    }

    for (i, device) in devices.iter().enumerate() {
        println!("[{}]\t{}", i, device);
    }

    let index = match preselected {
        Some(index) => index,
        None => {
            print!("Select camera: ");
            std::io::stdout().flush()?;
            parse_selection(&input.read_line()?)?
        }
    };

    let device = devices
        .get(index)
        .cloned()
        .ok_or_else(|| Error::Selection("Selected camera out of range".into()))?;
    info!("Selected {}", device.label());
    Ok(device)
}

pub fn parse_selection(line: &str) -> Result<usize> {
    line.trim()
        .parse()
        .map_err(|_| Error::Selection("Error parsing input, not a number".into()))
}
