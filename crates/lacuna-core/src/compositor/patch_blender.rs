use ndarray::Array2;

use crate::compositor::image_float::{inverse_lerp, lerp, ImageFloat};
use crate::image::NUM_CHANNELS;
use crate::patches::Patch;
use crate::settings::{PatchBlenderKind, Settings};

/// Feather fall-off depth on each patch side, as a fraction of the side.
const FEATHER_SIDE_PERCENTAGE: f32 = 0.10;
const ALPHA_OF_LOWEST_PRIORITY_PATCH: f32 = 0.66;
const ALPHA_OF_HIGHEST_PRIORITY_PATCH: f32 = 1.0;

/// Accumulates patches into the blended working image.
pub enum PatchBlender {
    /// Weighted accumulation: each patch contributes by its priority-scaled
    /// alpha and a feathered edge mask; `finish` renormalizes per pixel.
    Priority {
        priority_lowest: f32,
        priority_highest: f32,
        feather_alpha: Array2<f32>,
        weight_sum: Array2<f32>,
    },
    /// Each patch overwrites whatever is under it.
    None,
}

impl PatchBlender {
    pub fn create(
        kind: PatchBlenderKind,
        settings: &Settings,
        patches: &[Patch],
        image_width: usize,
        image_height: usize,
    ) -> Self {
        match kind {
            PatchBlenderKind::None => PatchBlender::None,
            PatchBlenderKind::Priority => {
                // Patches arrive sorted in ascending priority.
                let priority_lowest = patches.first().map_or(0.0, |p| p.priority);
                let priority_highest = patches.last().map_or(1.0, |p| p.priority);

                PatchBlender::Priority {
                    priority_lowest,
                    priority_highest,
                    feather_alpha: build_feather_alpha(settings),
                    weight_sum: Array2::zeros((image_height, image_width)),
                }
            }
        }
    }

    pub fn blend(&mut self, patch: &Patch, patch_image: &ImageFloat, out: &mut ImageFloat) {
        let image_w = out.width() as i32;
        let image_h = out.height() as i32;
        let patch_w = patch_image.width() as i32;
        let patch_h = patch_image.height() as i32;

        // Clip the patch against the output rectangle.
        let col_start = (-patch.dest_left).max(0);
        let row_start = (-patch.dest_top).max(0);
        let col_end = patch_w.min(image_w - patch.dest_left);
        let row_end = patch_h.min(image_h - patch.dest_top);

        match self {
            PatchBlender::None => {
                for row in row_start..row_end {
                    for col in col_start..col_end {
                        let dest_y = (patch.dest_top + row) as usize;
                        let dest_x = (patch.dest_left + col) as usize;
                        out.data[[dest_y, dest_x]] = patch_image.data[[row as usize, col as usize]];
                    }
                }
            }
            PatchBlender::Priority {
                priority_lowest,
                priority_highest,
                feather_alpha,
                weight_sum,
            } => {
                let patch_weight = inverse_lerp(patch.priority, *priority_lowest, *priority_highest);
                let patch_alpha = lerp(
                    ALPHA_OF_LOWEST_PRIORITY_PATCH,
                    ALPHA_OF_HIGHEST_PRIORITY_PATCH,
                    patch_weight,
                );

                for row in row_start..row_end {
                    for col in col_start..col_end {
                        let dest_y = (patch.dest_top + row) as usize;
                        let dest_x = (patch.dest_left + col) as usize;
                        let pixel_weight =
                            patch_alpha * feather_alpha[[row as usize, col as usize]];

                        let src = patch_image.data[[row as usize, col as usize]];
                        let dest = &mut out.data[[dest_y, dest_x]];
                        for c in 0..NUM_CHANNELS {
                            dest[c] += src[c] * pixel_weight;
                        }
                        weight_sum[[dest_y, dest_x]] += pixel_weight;
                    }
                }
            }
        }
    }

    /// Divide each accumulated pixel by its weight sum.
    pub fn finish(self, out: &mut ImageFloat) {
        if let PatchBlender::Priority { weight_sum, .. } = self {
            for (dest, &weight) in out.data.iter_mut().zip(weight_sum.iter()) {
                if weight > 0.0 {
                    for c in 0..NUM_CHANNELS {
                        dest[c] /= weight;
                    }
                }
            }
        }
    }
}

/// Per-cell feather alpha: full in the patch interior, fading toward every
/// edge over the feather depth. The zero-alpha boundary sits one pixel
/// outside the patch so no cell weighs exactly nothing.
fn build_feather_alpha(settings: &Settings) -> Array2<f32> {
    let patch_w = settings.patch_width as usize;
    let patch_h = settings.patch_height as usize;
    let feather_w = patch_w as f32 * FEATHER_SIDE_PERCENTAGE;
    let feather_h = patch_h as f32 * FEATHER_SIDE_PERCENTAGE;

    let mut alpha = Array2::from_elem((patch_h, patch_w), 1.0f32);
    for y in 0..patch_h {
        let top = inverse_lerp(y as f32, -1.0, feather_h);
        let bottom = inverse_lerp(y as f32, patch_h as f32, (patch_h - 1) as f32 - feather_h);
        for x in 0..patch_w {
            let left = inverse_lerp(x as f32, -1.0, feather_w);
            let right = inverse_lerp(x as f32, patch_w as f32, (patch_w - 1) as f32 - feather_w);
            let value = top * bottom * left * right;
            debug_assert!(value > 0.0 && value <= 1.0);
            alpha[[y, x]] = value;
        }
    }
    alpha
}
