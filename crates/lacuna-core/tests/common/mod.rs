use ndarray::Array2;

use lacuna_core::image::{Pixel, RgbImage};
use lacuna_core::mask::MaskLod;

/// Small deterministic generator so tests never depend on an RNG crate.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_u8(&mut self) -> u8 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) as u8
    }
}

pub fn solid_image(width: usize, height: usize, pixel: Pixel) -> RgbImage {
    RgbImage::filled(width, height, pixel)
}

pub fn noise_image(width: usize, height: usize, seed: u64) -> RgbImage {
    let mut lcg = Lcg::new(seed);
    let mut data = Array2::from_elem((height, width), [0u8; 3]);
    for y in 0..height {
        for x in 0..width {
            data[[y, x]] = [lcg.next_u8(), lcg.next_u8(), lcg.next_u8()];
        }
    }
    RgbImage::new(data)
}

/// A grayscale mask: known (255) everywhere except an unknown (0) hole.
pub fn hole_mask_gray(
    width: usize,
    height: usize,
    hole_left: usize,
    hole_top: usize,
    hole_width: usize,
    hole_height: usize,
) -> Array2<u8> {
    let mut gray = Array2::from_elem((height, width), 255u8);
    for y in hole_top..hole_top + hole_height {
        for x in hole_left..hole_left + hole_width {
            gray[[y, x]] = 0;
        }
    }
    gray
}

pub fn hole_mask(
    width: usize,
    height: usize,
    hole_left: usize,
    hole_top: usize,
    hole_width: usize,
    hole_height: usize,
) -> MaskLod {
    let gray = hole_mask_gray(width, height, hole_left, hole_top, hole_width, hole_height);
    MaskLod::from_gray(&gray, width, height).expect("mask matches image dimensions")
}
