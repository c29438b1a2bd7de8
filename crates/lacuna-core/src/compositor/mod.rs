//! Applies solved patches to the output image.
//!
//! Three plug-replaceable roles, each a small closed set chosen from the
//! settings: how patch pixels are obtained ([`patch_source::PatchSource`]),
//! how overlapping patches combine ([`patch_blender::PatchBlender`]), and
//! how the blended patches merge back into the original image
//! ([`output_blender::OutputBlender`]).

pub mod image_float;
pub mod output_blender;
pub mod patch_blender;
pub mod patch_source;

use crate::compositor::image_float::ImageFloat;
use crate::compositor::output_blender::OutputBlender;
use crate::compositor::patch_blender::PatchBlender;
use crate::compositor::patch_source::PatchSource;
use crate::error::{LacunaError, Result};
use crate::image::RgbImage;
use crate::mask::MaskLod;
use crate::patches::Patch;
use crate::settings::Settings;

pub struct CompositorInput<'a> {
    /// Solved patches in ascending priority order.
    pub patches: &'a [Patch],
    pub image: &'a RgbImage,
    pub mask: &'a MaskLod,
    pub settings: &'a Settings,
}

/// Blend every patch into a float working image, then merge that into a
/// copy of the input and convert back to 8-bit.
pub fn compose(input: &CompositorInput) -> Result<RgbImage> {
    let image_w = input.image.width();
    let image_h = input.image.height();

    let mut output_float = ImageFloat::from_rgb(input.image);
    let mut patches_blended = ImageFloat::zeros(image_w, image_h);

    if !input.patches.is_empty() {
        let mut source = PatchSource::create(input.settings.compositor_patch_source, input.settings);
        let mut blender = PatchBlender::create(
            input.settings.compositor_patch_blender,
            input.settings,
            input.patches,
            image_w,
            image_h,
        );

        let total = input.patches.len();
        for (index, patch) in input.patches.iter().enumerate() {
            validate_patch(patch, input)?;
            let patch_image = source.get(&output_float, patch, index, total);
            blender.blend(patch, patch_image, &mut patches_blended);
        }
        blender.finish(&mut patches_blended);
    }

    let output = OutputBlender::create(input.settings.compositor_output_blender);
    output.blend(input.mask, &patches_blended, &mut output_float);

    Ok(output_float.to_rgb())
}

/// Source rectangles must lie inside the image; a bad patches stream is the
/// only way to violate that.
fn validate_patch(patch: &Patch, input: &CompositorInput) -> Result<()> {
    let ok = patch.src_left >= 0
        && patch.src_top >= 0
        && patch.src_left + input.settings.patch_width <= input.image.width() as i32
        && patch.src_top + input.settings.patch_height <= input.image.height() as i32;
    if ok {
        Ok(())
    } else {
        Err(LacunaError::InvalidPatchesStream(format!(
            "patch source ({}, {}) is out of bounds",
            patch.src_left, patch.src_top
        )))
    }
}
