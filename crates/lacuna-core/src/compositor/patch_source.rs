use crate::compositor::image_float::{ImageFloat, PixelFloat};
use crate::patches::Patch;
use crate::settings::{PatchSourceKind, Settings};

/// Produces each patch's pixel block. One scratch patch image is reused
/// across calls.
pub enum PatchSource {
    /// Pixels copied from the input image at the solved source rectangle.
    Normal { patch_image: ImageFloat },
    /// Solid rainbow fill keyed to compositing order: red is the earliest
    /// (least confident) patch, violet the latest.
    DebugPatchOrder { patch_image: ImageFloat },
}

impl PatchSource {
    pub fn create(kind: PatchSourceKind, settings: &Settings) -> Self {
        let patch_image = ImageFloat::zeros(
            settings.patch_width as usize,
            settings.patch_height as usize,
        );
        match kind {
            PatchSourceKind::Normal => PatchSource::Normal { patch_image },
            PatchSourceKind::DebugPatchOrder => PatchSource::DebugPatchOrder { patch_image },
        }
    }

    pub fn get(
        &mut self,
        source_image: &ImageFloat,
        patch: &Patch,
        patch_index: usize,
        patches_total: usize,
    ) -> &ImageFloat {
        match self {
            PatchSource::Normal { patch_image } => {
                let (ph, pw) = patch_image.data.dim();
                for y in 0..ph {
                    for x in 0..pw {
                        patch_image.data[[y, x]] = source_image.data[[
                            (patch.src_top as usize) + y,
                            (patch.src_left as usize) + x,
                        ]];
                    }
                }
                patch_image
            }
            PatchSource::DebugPatchOrder { patch_image } => {
                let alpha = if patches_total > 1 {
                    patch_index as f32 / (patches_total - 1) as f32
                } else {
                    0.0
                };
                let rgb = rainbow_color(alpha);
                patch_image.data.fill(rgb);
                patch_image
            }
        }
    }
}

/// Map 0.0-1.0 onto a red-to-violet rainbow.
fn rainbow_color(alpha: f32) -> PixelFloat {
    const REF_COLORS: [PixelFloat; 7] = [
        [1.00, 0.00, 0.00], // red
        [1.00, 0.65, 0.00], // orange
        [1.00, 1.00, 0.00], // yellow
        [0.00, 0.50, 0.00], // green
        [0.00, 0.00, 1.00], // blue
        [0.30, 0.00, 0.51], // indigo
        [0.93, 0.51, 0.93], // violet
    ];

    let step = 1.0 / (REF_COLORS.len() - 1) as f32;
    let segment = ((alpha / step) as usize).min(REF_COLORS.len() - 2);
    let low = REF_COLORS[segment];
    let high = REF_COLORS[segment + 1];
    let blend = (alpha - segment as f32 * step) / step;

    [
        low[0] + blend * (high[0] - low[0]),
        low[1] + blend * (high[1] - low[1]),
        low[2] + blend * (high[2] - low[2]),
    ]
}
