use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Frame metadata, filled in by the stream when a slot is delivered
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMeta {
    /// Device frame counter
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Device timestamp, relative to acquisition start
    pub timestamp: Duration,
    /// Packets the transport lost for this frame; non-zero frames are not processed
    pub missing_packets: u32,
}

impl FrameMeta {
    /// Expected payload size in bytes
    pub fn payload_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.channels()
    }
}

/// Pixel formats we support, named after their GenICam `PixelFormat` entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Mono8,
    BayerRG8,
    BayerGB8,
    BayerGR8,
    BayerBG8,
    Rgb8,
    Bgr8,
}

/// Colour of a single colour-filter-array site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfaColor {
    Red,
    Green,
    Blue,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 7] = [
        PixelFormat::Mono8,
        PixelFormat::BayerRG8,
        PixelFormat::BayerGB8,
        PixelFormat::BayerGR8,
        PixelFormat::BayerBG8,
        PixelFormat::Rgb8,
        PixelFormat::Bgr8,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PixelFormat::Mono8 => "Mono8",
            PixelFormat::BayerRG8 => "BayerRG8",
            PixelFormat::BayerGB8 => "BayerGB8",
            PixelFormat::BayerGR8 => "BayerGR8",
            PixelFormat::BayerBG8 => "BayerBG8",
            PixelFormat::Rgb8 => "RGB8",
            PixelFormat::Bgr8 => "BGR8",
        }
    }

    /// Bytes per pixel
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            _ => 1,
        }
    }

    pub fn is_bayer(self) -> bool {
        matches!(
            self,
            PixelFormat::BayerRG8
                | PixelFormat::BayerGB8
                | PixelFormat::BayerGR8
                | PixelFormat::BayerBG8
        )
    }

    /// Filter colour at `(x, y)` of a Bayer mosaic; `None` for non-Bayer formats.
    pub fn cfa_color(self, x: usize, y: usize) -> Option<CfaColor> {
        // The pattern names the top-left 2x2 cell, row by row.
        let cell = match self {
            PixelFormat::BayerRG8 => [CfaColor::Red, CfaColor::Green, CfaColor::Green, CfaColor::Blue],
            PixelFormat::BayerGB8 => [CfaColor::Green, CfaColor::Blue, CfaColor::Red, CfaColor::Green],
            PixelFormat::BayerGR8 => [CfaColor::Green, CfaColor::Red, CfaColor::Blue, CfaColor::Green],
            PixelFormat::BayerBG8 => [CfaColor::Blue, CfaColor::Green, CfaColor::Green, CfaColor::Red],
            _ => return None,
        };
        Some(cell[(y % 2) * 2 + (x % 2)])
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PixelFormat::ALL
            .into_iter()
            .find(|fmt| fmt.name() == s)
            .ok_or_else(|| Error::UnknownFormat(s.to_string()))
    }
}

/// An owned, tightly packed 8-bit image
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl Image {
    /// Zero-filled image
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let len = width as usize * height as usize * format.channels();
        Self {
            width,
            height,
            format,
            data: vec![0; len],
        }
    }

    /// Wrap existing pixel data, checking its length against the geometry
    pub fn from_raw(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * format.channels();
        if data.len() != expected {
            return Err(Error::InvalidParameter(format!(
                "{}x{} {} needs {} bytes, got {}",
                width,
                height,
                format,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    pub fn stride(&self) -> usize {
        self.width as usize * self.channels()
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_buffer_is_an_invalid_parameter() {
        let err = Image::from_raw(4, 2, PixelFormat::Rgb8, vec![0; 8]).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(msg) if msg.contains("needs 24 bytes")));
    }

    #[test]
    fn bayer_12_bit_is_not_decodable() {
        assert!(matches!("BayerRG12".parse::<PixelFormat>(), Err(Error::UnknownFormat(_))));
        assert_eq!("BayerRG8".parse::<PixelFormat>().unwrap(), PixelFormat::BayerRG8);
    }
}
