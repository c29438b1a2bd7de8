use ndarray::Array2;

use crate::image::{Pixel, RgbImage, NUM_CHANNELS};

pub type PixelFloat = [f32; NUM_CHANNELS];

/// Floating-point working image for compositing. Channels are 0.0 to 1.0.
#[derive(Clone, Debug)]
pub struct ImageFloat {
    pub data: Array2<PixelFloat>,
}

impl ImageFloat {
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            data: Array2::from_elem((height, width), [0.0; NUM_CHANNELS]),
        }
    }

    pub fn from_rgb(image: &RgbImage) -> Self {
        Self {
            data: image.data.mapv(|p| {
                let mut out = [0.0f32; NUM_CHANNELS];
                for c in 0..NUM_CHANNELS {
                    out[c] = p[c] as f32 / 255.0;
                }
                out
            }),
        }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn to_rgb(&self) -> RgbImage {
        RgbImage::new(self.data.mapv(|p| {
            let mut out: Pixel = [0; NUM_CHANNELS];
            for c in 0..NUM_CHANNELS {
                out[c] = (p[c].clamp(0.0, 1.0) * 255.0).round() as u8;
            }
            out
        }))
    }
}

pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Where `value` sits between `min` and `max`, clamped to 0.0 to 1.0.
pub fn inverse_lerp(value: f32, min: f32, max: f32) -> f32 {
    if (max - min).abs() < f32::EPSILON {
        1.0
    } else {
        ((value - min) / (max - min)).clamp(0.0, 1.0)
    }
}

/// Blend `src` into `dest` by `alpha`: 0 leaves `dest`, 1 replaces it.
pub fn blend_into(dest: &mut PixelFloat, src: &PixelFloat, alpha: f32) {
    for c in 0..NUM_CHANNELS {
        dest[c] += (src[c] - dest[c]) * alpha;
    }
}
