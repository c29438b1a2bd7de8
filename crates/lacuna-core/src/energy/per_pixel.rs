use crate::consts::ENERGY_MIN;
use crate::energy::{clamp_to_max_boundary, clamp_to_min_boundary, BatchParams, Energy};
use crate::image::RgbImage;
use crate::mask::{MaskLod, MaskValue};

/// Most energy a single pixel pair can contribute: a full-range difference
/// in all three channels.
const MAX_ENERGY_PER_PIXEL: u32 = 255 * 255 * 3;

/// How many pixels a 32-bit bucket can absorb before it must be flushed
/// into the 64-bit total. Accumulating in 32-bit keeps the inner loop off
/// 64-bit adds.
const MAX_PIXELS_PER_BUCKET: i32 = (u32::MAX / MAX_ENERGY_PER_PIXEL) as i32;

/// SSD between window A (from `params`) and window B at (b_left, b_top),
/// both read from `image`. Windows are clipped together against the image
/// rectangle. With `params.a_masked`, pixels whose A-side mask cell is not
/// known contribute zero.
pub fn calculate(
    image: &RgbImage,
    mask: &MaskLod,
    params: &BatchParams,
    b_left: i32,
    b_top: i32,
) -> Energy {
    let image_w = image.width() as i32;
    let image_h = image.height() as i32;

    let mut a_left = params.a_left;
    let mut a_top = params.a_top;
    let mut b_left = b_left;
    let mut b_top = b_top;
    let mut width = params.width;
    let mut height = params.height;

    clamp_to_min_boundary(&mut a_left, &mut b_left, &mut width, 0);
    clamp_to_min_boundary(&mut a_top, &mut b_top, &mut height, 0);
    clamp_to_max_boundary(a_left, b_left, &mut width, image_w);
    clamp_to_max_boundary(a_top, b_top, &mut height, image_h);

    if width <= 0 || height <= 0 {
        return ENERGY_MIN;
    }

    let masked = params.a_masked;
    let mut total: Energy = 0;
    let mut bucket: u32 = 0;
    let mut pixels_in_bucket: i32 = 0;

    for y in 0..height {
        let ay = (a_top + y) as usize;
        let by = (b_top + y) as usize;

        let mut x = 0;
        while x < width {
            let strip = (MAX_PIXELS_PER_BUCKET - pixels_in_bucket).min(width - x);
            for i in x..x + strip {
                let ax = (a_left + i) as usize;
                let bx = (b_left + i) as usize;

                if masked && mask.value(ax as i32, ay as i32) != MaskValue::Known {
                    continue;
                }

                let a = image.data[[ay, ax]];
                let b = image.data[[by, bx]];
                let dr = a[0] as i32 - b[0] as i32;
                let dg = a[1] as i32 - b[1] as i32;
                let db = a[2] as i32 - b[2] as i32;
                bucket += (dr * dr + dg * dg + db * db) as u32;
            }
            pixels_in_bucket += strip;
            x += strip;

            if pixels_in_bucket == MAX_PIXELS_PER_BUCKET {
                total += bucket as Energy;
                bucket = 0;
                pixels_in_bucket = 0;
            }
        }
    }

    total + bucket as Energy
}
