//! Bilinear debayering of 8-bit Bayer mosaics to RGB8

use crate::capture::frame::CfaColor;
use crate::capture::{Image, PixelFormat};
use crate::error::{Error, Result};

/// Mirror an out-of-range coordinate back inside `[0, len)` without repeating
/// the edge sample. Keeps the parity, so the mirrored site has the same filter
/// colour as the one it stands in for.
fn reflect(i: isize, len: usize) -> usize {
    let len = len as isize;
    let r = if i < 0 {
        -i
    } else if i >= len {
        2 * (len - 1) - i
    } else {
        i
    };
    r as usize
}

fn channel_index(color: CfaColor) -> usize {
    match color {
        CfaColor::Red => 0,
        CfaColor::Green => 1,
        CfaColor::Blue => 2,
    }
}

/// Bilinear interpolation: each missing channel is the mean of the same-colour
/// sites in the 3x3 neighbourhood.
pub fn debayer(mosaic: &Image) -> Result<Image> {
    let format = mosaic.format;
    if !format.is_bayer() {
        return Err(Error::Debayer(format!("{} is not a Bayer format", format)));
    }
    let (width, height) = (mosaic.width as usize, mosaic.height as usize);
    if width < 2 || height < 2 {
        return Err(Error::Debayer(format!(
            "{}x{} is too small to debayer",
            width, height
        )));
    }

    let mut out = Image::new(mosaic.width, mosaic.height, PixelFormat::Rgb8);
    for y in 0..height {
        for x in 0..width {
            let mut sum = [0u32; 3];
            let mut count = [0u32; 3];
            for dy in -1isize..=1 {
                for dx in -1isize..=1 {
                    let sx = reflect(x as isize + dx, width);
                    let sy = reflect(y as isize + dy, height);
                    // Invariant: Bayer formats always have a CFA colour.
                    let Some(color) = format.cfa_color(sx, sy) else {
                        continue;
                    };
                    let c = channel_index(color);
                    sum[c] += mosaic.data[sy * width + sx] as u32;
                    count[c] += 1;
                }
            }

            let own = format.cfa_color(x, y).map(channel_index);
            let dst = &mut out.data[(y * width + x) * 3..(y * width + x) * 3 + 3];
            for c in 0..3 {
                dst[c] = if own == Some(c) {
                    mosaic.data[y * width + x]
                } else if count[c] > 0 {
                    ((sum[c] + count[c] / 2) / count[c]) as u8
                } else {
                    0
                };
            }
        }
    }
    Ok(out)
}
