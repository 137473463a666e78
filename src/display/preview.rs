//! Preview layout: the processed frame and its adjusted copy side by side,
//! with the histogram drawn as bars underneath.

use crate::capture::{Image, PixelFormat};
use crate::error::Result;
use crate::process::{convert, Histogram, Processed};

/// Height of the histogram strip in pixels
pub const HISTOGRAM_HEIGHT: u32 = 100;

fn to_rgb(image: &Image) -> Result<Image> {
    match image.format {
        PixelFormat::Rgb8 => Ok(image.clone()),
        PixelFormat::Bgr8 => {
            let mut rgb = image.clone();
            convert::swap_red_blue(&mut rgb)?;
            Ok(rgb)
        }
        // Mono and raw Bayer are shown as grey.
        _ => Image::from_raw(
            image.width,
            image.height,
            PixelFormat::Rgb8,
            image.data.iter().flat_map(|&v| [v, v, v]).collect(),
        ),
    }
}

/// Compose one RGB8 preview frame.
pub fn compose(processed: &Processed) -> Result<Image> {
    let panels = std::iter::once(&processed.image)
        .chain(processed.adjusted.as_ref())
        .map(to_rgb)
        .collect::<Result<Vec<_>>>()?;
    let width: u32 = panels.iter().map(|p| p.width).sum();
    let frame_height = panels.iter().map(|p| p.height).max().unwrap_or(0);
    let strip = if processed.histogram.is_some() {
        HISTOGRAM_HEIGHT
    } else {
        0
    };

    let mut canvas = Image::new(width, frame_height + strip, PixelFormat::Rgb8);
    let stride = canvas.stride();
    let mut left = 0;
    for panel in &panels {
        for (y, row) in panel.data.chunks_exact(panel.stride().max(1)).enumerate() {
            let start = y * stride + left * 3;
            canvas.data[start..start + row.len()].copy_from_slice(row);
        }
        left += panel.width as usize;
    }

    if let Some(hist) = &processed.histogram {
        let bgr = processed.image.format == PixelFormat::Bgr8;
        draw_histogram(&mut canvas, frame_height, hist, bgr);
    }
    Ok(canvas)
}

/// Bars scaled so the fullest bin of any channel spans the strip. Colour
/// channels are drawn in their own colour and add up where they overlap.
fn draw_histogram(canvas: &mut Image, top: u32, hist: &Histogram, bgr: bool) {
    let width = canvas.width as usize;
    let stride = canvas.stride();
    let peak = (0..hist.channel_count())
        .map(|c| hist.peak(c).1)
        .fold(0.0, f64::max);
    if peak <= 0.0 || width == 0 {
        return;
    }

    let single = hist.channel_count() == 1;
    for c in 0..hist.channel_count() {
        let component = match (single, bgr) {
            (true, _) => None,
            (false, true) => Some(2 - c.min(2)),
            (false, false) => Some(c.min(2)),
        };
        let freqs = hist.channel(c);
        for x in 0..width {
            let bin = x * hist.bins() / width;
            let bar = (freqs[bin] / peak * HISTOGRAM_HEIGHT as f64).round() as u32;
            for row in 0..bar.min(HISTOGRAM_HEIGHT) {
                let y = (top + HISTOGRAM_HEIGHT - 1 - row) as usize;
                let px = &mut canvas.data[y * stride + x * 3..y * stride + x * 3 + 3];
                match component {
                    Some(i) => px[i] = 255,
                    None => px.fill(255),
                }
            }
        }
    }
}
