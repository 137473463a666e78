//! Post-fetch frame transforms
//!
//! Order: demodulate, debayer, RGB to BGR, resize to display size, then gamma
//! or histogram equalisation. The histogram is taken from the full-size frame
//! before resizing.

use std::time::Instant;

use tracing::{debug, instrument};

use crate::capture::{FrameMeta, Image, PixelFormat};
use crate::error::Result;
use crate::{Profile, ProcessingConfig};

pub mod convert;
pub mod debayer;
pub mod demodulate;
pub mod gamma;
pub mod histogram;
pub mod offline;

pub use gamma::GammaLut;
pub use histogram::Histogram;

/// Result of processing one frame
#[derive(Debug, Clone)]
pub struct Processed {
    /// The frame as it should be shown
    pub image: Image,
    /// Gamma-corrected or equalised copy, for profiles that produce one
    pub adjusted: Option<Image>,
    /// Histogram of the full-size frame, for profiles that keep one
    pub histogram: Option<Histogram>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Adjust {
    None,
    Gamma,
    Equalize,
}

/// Transform chain for one run, built once after configuration.
#[derive(Debug)]
pub struct Processor {
    /// `Some((output_width, color))` when frames are double-rate encoded
    demodulate: Option<(u32, bool)>,
    debayer: bool,
    reorder_bgr: bool,
    display_width: Option<u32>,
    adjust: Adjust,
    gamma: Option<GammaLut>,
    histogram: Option<Histogram>,
}

impl Processor {
    /// `output_width` is the demodulated width, `color` whether the sensor is a
    /// colour sensor (colour sensors encode double-rate frames in column pairs).
    pub fn new(
        profile: Profile,
        config: &ProcessingConfig,
        display_width: u32,
        output_width: u32,
        color: bool,
    ) -> Result<Self> {
        let processor = match profile {
            Profile::Mono | Profile::SingleShot => Self {
                demodulate: None,
                debayer: false,
                reorder_bgr: false,
                display_width: None,
                adjust: Adjust::None,
                gamma: None,
                histogram: None,
            },
            Profile::MonoDoubleRate => Self {
                demodulate: Some((output_width, color)),
                debayer: false,
                reorder_bgr: false,
                display_width: Some(display_width),
                adjust: if config.equalize {
                    Adjust::Equalize
                } else {
                    Adjust::None
                },
                gamma: None,
                histogram: Some(Histogram::new(config.mono_histogram_bins, 1)?),
            },
            Profile::ColorDoubleRate => Self {
                demodulate: Some((output_width, color)),
                debayer: true,
                reorder_bgr: true,
                display_width: Some(display_width),
                adjust: match config.gamma {
                    Some(_) => Adjust::Gamma,
                    None => Adjust::None,
                },
                gamma: config.gamma.map(GammaLut::new).transpose()?,
                histogram: Some(Histogram::new(config.color_histogram_bins, 3)?),
            },
        };
        Ok(processor)
    }

    pub fn histogram(&self) -> Option<&Histogram> {
        self.histogram.as_ref()
    }

    /// Run the chain over one fetched frame. `data` is only borrowed; the
    /// caller keeps ownership of the slot.
    #[instrument(level = "trace", skip(self, data), fields(seq = meta.sequence))]
    pub fn process(&mut self, meta: &FrameMeta, data: &[u8]) -> Result<Processed> {
        let start = Instant::now();
        let mut image = Image::from_raw(meta.width, meta.height, meta.format, data.to_vec())?;

        if let Some((width, color)) = self.demodulate {
            image = demodulate::demodulate(&image, width, color)?;
        }
        if self.debayer && image.format.is_bayer() {
            image = debayer::debayer(&image)?;
        }
        if self.reorder_bgr && image.format == PixelFormat::Rgb8 {
            convert::swap_red_blue(&mut image)?;
        }
        if let Some(hist) = self.histogram.as_mut() {
            hist.update(&image);
        }
        if let Some(display_width) = self.display_width {
            let (w, h) = convert::display_size(image.width, image.height, display_width);
            image = convert::resize(&image, w, h)?;
        }

        let adjusted = match (self.adjust, &self.gamma) {
            (Adjust::Gamma, Some(lut)) => {
                let mut copy = image.clone();
                lut.apply(&mut copy);
                Some(copy)
            }
            (Adjust::Equalize, _) if image.channels() == 1 => {
                let mut copy = image.clone();
                histogram::equalize(&mut copy);
                Some(copy)
            }
            _ => None,
        };

        let elapsed = start.elapsed();
        metrics::histogram!("process_time_us").record(elapsed.as_micros() as f64);
        debug!(
            "processed frame {} -> {}x{} {} in {:?}",
            meta.sequence, image.width, image.height, image.format, elapsed
        );

        Ok(Processed {
            image,
            adjusted,
            histogram: self.histogram.clone(),
        })
    }
}
