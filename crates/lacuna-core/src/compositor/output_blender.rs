use ndarray::Array2;

use crate::compositor::image_float::{blend_into, ImageFloat};
use crate::image::NUM_CHANNELS;
use crate::mask::{MaskLod, MaskValue};
use crate::settings::OutputBlenderKind;

/// Box-blur half-width used to soften the mask edge.
const BLEND_SIZE: usize = 2;
const SOFT_MASK_NUM_SAMPLES: usize = BLEND_SIZE * 2 + 1;

/// Merges the blended patches image into the output.
pub enum OutputBlender {
    /// Alpha-blend through a soft mask: the hard unknown/known mask run
    /// through a two-pass box blur, clamped so unknown cells stay fully
    /// patch-covered.
    SoftMask,
    /// Write patch pixels wherever the hard mask is unknown.
    None,
    /// Diagnostic: write the soft mask itself as grayscale.
    DebugSoftMaskIntensity,
}

impl OutputBlender {
    pub fn create(kind: OutputBlenderKind) -> Self {
        match kind {
            OutputBlenderKind::SoftMask => OutputBlender::SoftMask,
            OutputBlenderKind::None => OutputBlender::None,
            OutputBlenderKind::DebugSoftMaskIntensity => OutputBlender::DebugSoftMaskIntensity,
        }
    }

    pub fn blend(&self, mask: &MaskLod, patches_blended: &ImageFloat, out: &mut ImageFloat) {
        debug_assert_eq!(patches_blended.data.dim(), out.data.dim());

        match self {
            OutputBlender::SoftMask => {
                let soft_mask = create_soft_mask(mask, out.width(), out.height());
                for ((dest, src), &alpha) in out
                    .data
                    .iter_mut()
                    .zip(patches_blended.data.iter())
                    .zip(soft_mask.iter())
                {
                    blend_into(dest, src, 1.0 - alpha);
                }
            }
            OutputBlender::None => {
                let (h, w) = out.data.dim();
                for y in 0..h {
                    for x in 0..w {
                        if mask.value(x as i32, y as i32) == MaskValue::Unknown {
                            out.data[[y, x]] = patches_blended.data[[y, x]];
                        }
                    }
                }
            }
            OutputBlender::DebugSoftMaskIntensity => {
                let soft_mask = create_soft_mask(mask, out.width(), out.height());
                for (dest, &alpha) in out.data.iter_mut().zip(soft_mask.iter()) {
                    *dest = [alpha; NUM_CHANNELS];
                }
            }
        }
    }
}

fn mask_alpha(mask: &MaskLod, x: i32, y: i32) -> f32 {
    if mask.value(x, y) == MaskValue::Unknown {
        0.0
    } else {
        1.0
    }
}

/// Running box-window over the last `SOFT_MASK_NUM_SAMPLES` samples.
struct Samples {
    samples: [f32; SOFT_MASK_NUM_SAMPLES],
    sum: f32,
    next: usize,
}

impl Samples {
    fn new(first: f32) -> Self {
        Self {
            samples: [first; SOFT_MASK_NUM_SAMPLES],
            sum: first * SOFT_MASK_NUM_SAMPLES as f32,
            next: 0,
        }
    }

    fn add(&mut self, sample: f32) {
        self.sum -= self.samples[self.next];
        self.samples[self.next] = sample;
        self.sum += sample;
        self.next = (self.next + 1) % SOFT_MASK_NUM_SAMPLES;
    }

    fn blend(&self) -> f32 {
        self.sum / SOFT_MASK_NUM_SAMPLES as f32
    }
}

/// Per-pixel alpha in 0.0 to 1.0: the hard mask softened by a horizontal
/// then vertical box blur, with every unknown cell clamped to zero so patch
/// content fully covers it.
fn create_soft_mask(mask: &MaskLod, width: usize, height: usize) -> Array2<f32> {
    let mut out = Array2::from_elem((height, width), 1.0f32);

    // Horizontal blur, clamped by the hard alpha.
    for y in 0..height {
        let mut samples = Samples::new(mask_alpha(mask, 0, y as i32));
        for lead_edge in 0..width + BLEND_SIZE {
            let sample_x = lead_edge.min(width - 1);
            samples.add(mask_alpha(mask, sample_x as i32, y as i32));

            if lead_edge >= BLEND_SIZE {
                let x = lead_edge - BLEND_SIZE;
                let hard = mask_alpha(mask, x as i32, y as i32);
                out[[y, x]] = hard.min(samples.blend());
            }
        }
    }

    // Vertical blur over the horizontal result.
    for x in 0..width {
        let mut samples = Samples::new(mask_alpha(mask, x as i32, 0));
        for lead_edge in 0..height + BLEND_SIZE {
            let sample_y = lead_edge.min(height - 1);
            samples.add(out[[sample_y, x]]);

            if lead_edge >= BLEND_SIZE {
                let y = lead_edge - BLEND_SIZE;
                out[[y, x]] *= samples.blend();
            }
        }
    }

    out
}
