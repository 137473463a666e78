use crate::capture::Image;
use crate::error::{Error, Result};

/// Per-channel histogram, normalised by the pixel count of the last update.
#[derive(Debug, Clone)]
pub struct Histogram {
    bins: usize,
    channels: Vec<Vec<f64>>,
}

impl Histogram {
    pub fn new(bins: usize, channels: usize) -> Result<Self> {
        if bins == 0 || bins > 256 {
            return Err(Error::InvalidParameter(format!(
                "histogram bins must be in 1..=256, got {}",
                bins
            )));
        }
        Ok(Self {
            bins,
            channels: vec![vec![0.0; bins]; channels.max(1)],
        })
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    fn bin_of(&self, v: u8) -> usize {
        v as usize * self.bins / 256
    }

    /// Recompute from `image`. Each channel's frequencies sum to 1.
    pub fn update(&mut self, image: &Image) {
        let ch = image.channels();
        if self.channels.len() != ch {
            self.channels = vec![vec![0.0; self.bins]; ch];
        }
        let mut counts = vec![vec![0u64; self.bins]; ch];
        for px in image.data.chunks_exact(ch) {
            for (c, &v) in px.iter().enumerate() {
                counts[c][self.bin_of(v)] += 1;
            }
        }
        let total = image.pixel_count().max(1) as f64;
        for (freqs, counts) in self.channels.iter_mut().zip(counts) {
            for (f, n) in freqs.iter_mut().zip(counts) {
                *f = n as f64 / total;
            }
        }
    }

    pub fn channel(&self, index: usize) -> &[f64] {
        &self.channels[index]
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Index and frequency of the fullest bin of a channel
    pub fn peak(&self, index: usize) -> (usize, f64) {
        self.channels[index]
            .iter()
            .copied()
            .enumerate()
            .fold((0, 0.0), |best, (i, f)| if f > best.1 { (i, f) } else { best })
    }
}

/// Spread the grey levels of a single-channel image over the full range.
pub fn equalize(image: &mut Image) {
    if image.channels() != 1 || image.data.is_empty() {
        return;
    }
    let mut hist = [0u64; 256];
    for &v in &image.data {
        hist[v as usize] += 1;
    }
    let total = image.data.len() as u64;
    let Some(first) = hist.iter().position(|&n| n > 0) else {
        return;
    };
    if hist[first] == total {
        // One grey level only, nothing to spread.
        return;
    }

    let scale = 255.0 / (total - hist[first]) as f64;
    let mut lut = [0u8; 256];
    let mut cdf = 0u64;
    for v in first..256 {
        cdf += hist[v];
        lut[v] = ((cdf - hist[first]) as f64 * scale).round().min(255.0) as u8;
    }
    for v in image.data.iter_mut() {
        *v = lut[*v as usize];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PixelFormat;

    #[test]
    fn uniform_image_concentrates_in_one_bin() {
        let image = Image::from_raw(8, 4, PixelFormat::Mono8, vec![77; 32]).unwrap();
        let mut hist = Histogram::new(64, 1).unwrap();
        hist.update(&image);
        let nonzero: Vec<_> = hist.channel(0).iter().filter(|&&f| f > 0.0).collect();
        assert_eq!(nonzero.len(), 1);
        assert_eq!(hist.peak(0), (77 * 64 / 256, 1.0));
    }

    #[test]
    fn frequencies_sum_to_one_per_channel() {
        let data: Vec<u8> = (0..300u32).map(|i| (i * 7 % 256) as u8).collect();
        let image = Image::from_raw(10, 10, PixelFormat::Bgr8, data).unwrap();
        let mut hist = Histogram::new(64, 3).unwrap();
        hist.update(&image);
        for c in 0..3 {
            let sum: f64 = hist.channel(c).iter().sum();
            assert!((sum - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn extreme_values_land_in_end_bins() {
        let image = Image::from_raw(2, 1, PixelFormat::Mono8, vec![0, 255]).unwrap();
        let mut hist = Histogram::new(128, 1).unwrap();
        hist.update(&image);
        assert_eq!(hist.channel(0)[0], 0.5);
        assert_eq!(hist.channel(0)[127], 0.5);
    }

    #[test]
    fn rejects_bad_bin_count() {
        assert!(Histogram::new(0, 1).is_err());
        assert!(Histogram::new(257, 1).is_err());
    }

    #[test]
    fn equalize_stretches_to_full_range() {
        let mut image = Image::from_raw(4, 1, PixelFormat::Mono8, vec![100, 101, 102, 103]).unwrap();
        equalize(&mut image);
        assert_eq!(image.data[0], 0);
        assert_eq!(image.data[3], 255);
        assert!(image.data.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn equalize_leaves_flat_image_alone() {
        let mut image = Image::from_raw(3, 1, PixelFormat::Mono8, vec![9, 9, 9]).unwrap();
        equalize(&mut image);
        assert_eq!(image.data, vec![9, 9, 9]);
    }
}
