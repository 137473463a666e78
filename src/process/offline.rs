//! Demodulating double-rate frames saved to disk
//!
//! Input is either an 8-bit image file or raw sensor bytes (`.raw`, `.dr1`)
//! whose width must be given. Colour frames are treated as RGGB mosaics and
//! debayered unless the output is raw too.

use std::path::Path;

use tracing::info;

use super::{convert, debayer, demodulate};
use crate::capture::{Image, PixelFormat};
use crate::error::{Error, Result};

fn is_raw(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("raw") || ext.eq_ignore_ascii_case("dr1"))
}

fn read_encoded(path: &Path, format: PixelFormat, raw_width: Option<u32>) -> Result<Image> {
    if !is_raw(path) {
        let gray = image::open(path)?.into_luma8();
        let (width, height) = gray.dimensions();
        return Image::from_raw(width, height, format, gray.into_raw());
    }
    let width = raw_width
        .filter(|&w| w > 0)
        .ok_or_else(|| Error::InvalidParameter(format!("{} needs a frame width", path.display())))?;
    let data = std::fs::read(path)?;
    if data.is_empty() || data.len() % width as usize != 0 {
        return Err(Error::InvalidParameter(format!(
            "{} holds {} bytes, not whole rows of {}",
            path.display(),
            data.len(),
            width
        )));
    }
    let height = (data.len() / width as usize) as u32;
    Image::from_raw(width, height, format, data)
}

/// Demodulate `input` into `output` and return the written image.
pub fn demodulate_file(input: &Path, output: &Path, color: bool, raw_width: Option<u32>) -> Result<Image> {
    let format = if color {
        PixelFormat::BayerRG8
    } else {
        PixelFormat::Mono8
    };
    let encoded = read_encoded(input, format, raw_width)?;
    let mut image = demodulate::demodulate(&encoded, encoded.width, color)?;

    if is_raw(output) {
        std::fs::write(output, &image.data)?;
    } else {
        if color {
            image = debayer::debayer(&image)?;
        }
        convert::to_dynamic(&image)?.save(output)?;
    }
    info!(
        "demodulated {} ({}x{}) into {}",
        input.display(),
        image.width,
        image.height,
        output.display()
    );
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32, format: PixelFormat) -> Image {
        let data = (0..width * height).map(|i| (i * 7 % 256) as u8).collect();
        Image::from_raw(width, height, format, data).unwrap()
    }

    #[test]
    fn mono_bitmap_is_restored() {
        let dir = tempfile::tempdir().unwrap();
        let (input, output) = (dir.path().join("image_0_mod.bmp"), dir.path().join("image_0_demod.png"));
        let original = gradient(16, 4, PixelFormat::Mono8);
        let encoded = demodulate::modulate(&original, false).unwrap();
        convert::to_dynamic(&encoded).unwrap().save(&input).unwrap();

        let written = demodulate_file(&input, &output, false, None).unwrap();
        assert_eq!(written, original);
        let reread = image::open(&output).unwrap().into_luma8();
        assert_eq!(reread.into_raw(), original.data);
    }

    #[test]
    fn raw_color_stays_a_mosaic() {
        let dir = tempfile::tempdir().unwrap();
        let (input, output) = (dir.path().join("frame.dr1"), dir.path().join("image.raw"));
        let original = gradient(16, 4, PixelFormat::BayerRG8);
        std::fs::write(&input, demodulate::modulate(&original, true).unwrap().data).unwrap();

        demodulate_file(&input, &output, true, Some(16)).unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), original.data);
    }

    #[test]
    fn color_bitmap_is_debayered() {
        let dir = tempfile::tempdir().unwrap();
        let (input, output) = (dir.path().join("in.png"), dir.path().join("out.png"));
        let encoded = demodulate::modulate(&gradient(8, 4, PixelFormat::BayerRG8), true).unwrap();
        convert::to_dynamic(&encoded).unwrap().save(&input).unwrap();

        let written = demodulate_file(&input, &output, true, None).unwrap();
        assert_eq!(written.format, PixelFormat::Rgb8);
        assert_eq!(image::open(&output).unwrap().into_rgb8().dimensions(), (8, 4));
    }

    #[test]
    fn raw_input_needs_whole_rows() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("frame.raw");
        std::fs::write(&input, vec![0u8; 30]).unwrap();
        let output = dir.path().join("out.png");

        assert!(matches!(
            demodulate_file(&input, &output, false, None),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            demodulate_file(&input, &output, false, Some(16)),
            Err(Error::InvalidParameter(_))
        ));
        // 30 bytes as 3 rows of 10: 10 is no multiple of 4 for colour.
        assert!(matches!(
            demodulate_file(&input, &output, true, Some(10)),
            Err(Error::Demodulate(_))
        ));
    }
}
