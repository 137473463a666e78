use crate::capture::Image;
use crate::error::{Error, Result};

pub const DEFAULT_GAMMA: f64 = 2.0;

/// Gamma correction lookup table, built once and applied per frame.
#[derive(Debug, Clone)]
pub struct GammaLut {
    table: [u8; 256],
}

impl GammaLut {
    pub fn new(gamma: f64) -> Result<Self> {
        if !(gamma.is_finite() && gamma > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "gamma must be positive, got {}",
                gamma
            )));
        }
        let inv = 1.0 / gamma;
        let mut table = [0u8; 256];
        for (v, entry) in table.iter_mut().enumerate() {
            *entry = (255.0 * (v as f64 / 255.0).powf(inv)).round() as u8;
        }
        Ok(Self { table })
    }

    pub fn table(&self) -> &[u8; 256] {
        &self.table
    }

    pub fn apply(&self, image: &mut Image) {
        for px in image.data.iter_mut() {
            *px = self.table[*px as usize];
        }
    }
}
