//! Double-rate demodulation
//!
//! A double-rate frame carries two sub-frames side by side in every row. The
//! left half holds the even output columns and the right half the odd ones.
//! Colour sensors move columns in pairs instead, so each sub-frame keeps the
//! 2x2 Bayer phase intact.

use crate::capture::Image;
use crate::error::{Error, Result};

/// Column in the encoded row that holds output column `x`.
fn encoded_column(x: usize, width: usize, color: bool) -> usize {
    let half = width / 2;
    if color {
        let pair = x / 2;
        let offset = (pair / 2) * 2 + x % 2;
        if pair % 2 == 0 {
            offset
        } else {
            half + offset
        }
    } else if x % 2 == 0 {
        x / 2
    } else {
        half + x / 2
    }
}

fn check_width(width: u32, color: bool) -> Result<()> {
    let multiple = if color { 4 } else { 2 };
    if width == 0 || width % multiple != 0 {
        return Err(Error::Demodulate(format!(
            "width {} is not a multiple of {}",
            width, multiple
        )));
    }
    Ok(())
}

fn remap(src: &Image, color: bool, to_encoded: bool) -> Image {
    let width = src.width as usize;
    let ch = src.channels();
    let mut dst = Image::new(src.width, src.height, src.format);
    let stride = src.stride();

    for (src_row, dst_row) in src
        .data
        .chunks_exact(stride)
        .zip(dst.data.chunks_exact_mut(stride))
    {
        for x in 0..width {
            let enc = encoded_column(x, width, color);
            let (from, to) = if to_encoded { (x, enc) } else { (enc, x) };
            dst_row[to * ch..(to + 1) * ch].copy_from_slice(&src_row[from * ch..(from + 1) * ch]);
        }
    }
    dst
}

/// Reconstruct the full frame from a double-rate encoded frame.
///
/// `output_width` is the demodulated width the camera reports (`Window_W`);
/// it must match the encoded width.
pub fn demodulate(encoded: &Image, output_width: u32, color: bool) -> Result<Image> {
    if encoded.width != output_width {
        return Err(Error::Demodulate(format!(
            "encoded width {} does not match output width {}",
            encoded.width, output_width
        )));
    }
    check_width(encoded.width, color)?;
    Ok(remap(encoded, color, false))
}

/// Encode a full frame the way a double-rate camera transmits it.
pub fn modulate(image: &Image, color: bool) -> Result<Image> {
    check_width(image.width, color)?;
    Ok(remap(image, color, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PixelFormat;

    fn ramp(width: u32, height: u32, format: PixelFormat) -> Image {
        let data = (0..width * height).map(|i| (i % 251) as u8).collect();
        Image::from_raw(width, height, format, data).unwrap()
    }

    #[test]
    fn mono_sub_frames_interleave() {
        // Left sub-frame carries even columns, right sub-frame odd columns.
        let encoded = Image::from_raw(4, 1, PixelFormat::Mono8, vec![10, 30, 20, 40]).unwrap();
        let out = demodulate(&encoded, 4, false).unwrap();
        assert_eq!(out.data, vec![10, 20, 30, 40]);
    }

    #[test]
    fn color_sub_frames_keep_bayer_pairs() {
        let encoded = Image::from_raw(
            8,
            1,
            PixelFormat::BayerRG8,
            vec![1, 2, 5, 6, 3, 4, 7, 8],
        )
        .unwrap();
        let out = demodulate(&encoded, 8, true).unwrap();
        assert_eq!(out.data, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn demodulate_reverses_modulate() {
        for (format, color) in [(PixelFormat::Mono8, false), (PixelFormat::BayerGR8, true)] {
            let image = ramp(16, 6, format);
            let encoded = modulate(&image, color).unwrap();
            assert_ne!(encoded, image);
            assert_eq!(demodulate(&encoded, 16, color).unwrap(), image);
        }
    }

    #[test]
    fn rejects_width_mismatch() {
        let encoded = ramp(8, 2, PixelFormat::Mono8);
        assert!(matches!(
            demodulate(&encoded, 16, false),
            Err(Error::Demodulate(_))
        ));
    }

    #[test]
    fn color_needs_multiple_of_four() {
        let encoded = ramp(6, 2, PixelFormat::BayerRG8);
        assert!(demodulate(&encoded, 6, true).is_err());
        assert!(demodulate(&encoded, 6, false).is_ok());
    }
}
