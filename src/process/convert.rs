use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageBuffer, RgbImage};

use crate::capture::{Image, PixelFormat};
use crate::error::{Error, Result};

/// Swap the red and blue channels, turning RGB8 into BGR8 and back.
pub fn swap_red_blue(image: &mut Image) -> Result<()> {
    let target = match image.format {
        PixelFormat::Rgb8 => PixelFormat::Bgr8,
        PixelFormat::Bgr8 => PixelFormat::Rgb8,
        other => return Err(Error::UnsupportedFormat(other)),
    };
    for px in image.data.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
    image.format = target;
    Ok(())
}

/// Display geometry for a frame: fixed width, height from the aspect ratio.
pub fn display_size(width: u32, height: u32, display_width: u32) -> (u32, u32) {
    if width == 0 {
        return (display_width, 0);
    }
    let aspect = height as f64 / width as f64;
    let h = (display_width as f64 * aspect) as u32;
    (display_width, h.max(1))
}

/// Resample to `width` x `height`, keeping the pixel format.
pub fn resize(image: &Image, width: u32, height: u32) -> Result<Image> {
    if image.width == width && image.height == height {
        return Ok(image.clone());
    }
    let data = match image.channels() {
        1 => {
            let buf: GrayImage = ImageBuffer::from_raw(image.width, image.height, image.data.clone())
                .ok_or_else(|| Error::InvalidParameter("frame buffer too small".into()))?;
            imageops::resize(&buf, width, height, FilterType::Triangle).into_raw()
        }
        3 => {
            // Channel order does not matter to the filter, so BGR8 passes through as RGB.
            let buf: RgbImage = ImageBuffer::from_raw(image.width, image.height, image.data.clone())
                .ok_or_else(|| Error::InvalidParameter("frame buffer too small".into()))?;
            imageops::resize(&buf, width, height, FilterType::Triangle).into_raw()
        }
        _ => return Err(Error::UnsupportedFormat(image.format)),
    };
    Image::from_raw(width, height, image.format, data)
}

/// Convert to an `image` crate buffer for encoding. BGR8 is reordered to RGB.
pub fn to_dynamic(image: &Image) -> Result<DynamicImage> {
    let mut owned = image.clone();
    if owned.format == PixelFormat::Bgr8 {
        swap_red_blue(&mut owned)?;
    }
    let (w, h) = (owned.width, owned.height);
    let too_small = || Error::InvalidParameter("frame buffer too small".into());
    Ok(match owned.channels() {
        1 => DynamicImage::ImageLuma8(GrayImage::from_raw(w, h, owned.data).ok_or_else(too_small)?),
        _ => DynamicImage::ImageRgb8(RgbImage::from_raw(w, h, owned.data).ok_or_else(too_small)?),
    })
}
