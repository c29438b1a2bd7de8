use ndarray::Array2;

use crate::error::{LacunaError, Result};
use crate::mask::{MaskPyramid, MaskValue};
use crate::scale::Scalable;

pub const NUM_CHANNELS: usize = 3;

/// One 8-bit RGB pixel.
pub type Pixel = [u8; NUM_CHANNELS];

/// An 8-bit RGB image.
/// Pixel data is row-major, shape = (height, width).
#[derive(Clone, Debug)]
pub struct RgbImage {
    pub data: Array2<Pixel>,
}

impl RgbImage {
    pub fn new(data: Array2<Pixel>) -> Self {
        Self { data }
    }

    /// A width x height image filled with a single pixel value.
    pub fn filled(width: usize, height: usize, pixel: Pixel) -> Self {
        Self {
            data: Array2::from_elem((height, width), pixel),
        }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn validate(&self) -> Result<()> {
        let (h, w) = self.data.dim();
        if w == 0 || h == 0 {
            return Err(LacunaError::InvalidImage("empty image".into()));
        }
        if w > crate::consts::IMAGE_DIMENSION_MAX || h > crate::consts::IMAGE_DIMENSION_MAX {
            return Err(LacunaError::InvalidImage(format!(
                "{}x{} exceeds the {} pixel side limit",
                w,
                h,
                crate::consts::IMAGE_DIMENSION_MAX
            )));
        }
        Ok(())
    }
}

/// The coarse-to-fine image stack. Depth 0 holds the input image untouched;
/// each deeper level halves both sides by averaging 2x2 parent blocks,
/// counting only pixels whose mask cell is `Known` at the parent level.
pub struct ImagePyramid {
    resolutions: Vec<Option<RgbImage>>,
    depth: usize,
}

impl ImagePyramid {
    pub fn new(input: RgbImage) -> Self {
        Self {
            resolutions: vec![Some(input)],
            depth: 0,
        }
    }

    /// The image at the current scale depth.
    pub fn current(&self) -> &RgbImage {
        self.resolutions[self.depth]
            .as_ref()
            .expect("current image resolution is always present")
    }

    pub fn width(&self) -> usize {
        self.current().width()
    }

    pub fn height(&self) -> usize {
        self.current().height()
    }

    /// Push a half-resolution level. The mask pyramid must still be at this
    /// level's depth: unknown parent pixels are excluded from the average,
    /// and only the parent mask can tell them apart.
    pub fn scale_down(&mut self, mask: &MaskPyramid) {
        debug_assert_eq!(mask.depth(), self.depth);

        if self.depth == self.resolutions.len() - 1 {
            let scaled = scaled_down(self.current(), mask);
            self.resolutions.push(Some(scaled));
        }
        self.depth += 1;
        debug_assert!(self.resolutions[self.depth].is_some());
    }
}

impl Scalable for ImagePyramid {
    fn scale_up(&mut self) {
        debug_assert!(self.depth > 0);
        // This resolution will not be revisited; release its pixels.
        self.resolutions[self.depth] = None;
        self.depth -= 1;
    }

    fn depth(&self) -> usize {
        self.depth
    }
}

/// Average each 2x2 block of `image` into one pixel of the result, skipping
/// contributions whose mask value is not `Known`. A block with no known
/// pixels stays zero; its coincident mask cell scales down to `Unknown`, so
/// it is never sampled.
fn scaled_down(image: &RgbImage, mask: &MaskPyramid) -> RgbImage {
    let other_w = image.width();
    let other_h = image.height();
    let w = other_w / 2;
    let h = other_h / 2;
    debug_assert!(w > 0 && h > 0);

    let mut data = Array2::from_elem((h, w), [0u8; NUM_CHANNELS]);
    for y in 0..h {
        for x in 0..w {
            let mut sum = [0.0f32; NUM_CHANNELS];
            let mut contributors = 0.0f32;

            for (dy, dx) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
                let oy = y * 2 + dy;
                let ox = x * 2 + dx;
                if ox >= other_w || oy >= other_h {
                    continue;
                }
                if mask.value(ox as i32, oy as i32) == MaskValue::Known {
                    contributors += 1.0;
                    let p = image.data[[oy, ox]];
                    for c in 0..NUM_CHANNELS {
                        sum[c] += p[c] as f32;
                    }
                }
            }

            if contributors > 0.0 {
                let mut p = [0u8; NUM_CHANNELS];
                for c in 0..NUM_CHANNELS {
                    p[c] = (sum[c] / contributors).round().min(255.0) as u8;
                }
                data[[y, x]] = p;
            }
        }
    }

    RgbImage::new(data)
}
