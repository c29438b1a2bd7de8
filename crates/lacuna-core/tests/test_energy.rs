mod common;

use lacuna_core::energy::fft::FftCalculator;
use lacuna_core::energy::per_pixel;
use lacuna_core::energy::wsst::Wsst;
use lacuna_core::energy::{BatchParams, Energy, EnergyContext};
use lacuna_core::image::RgbImage;
use lacuna_core::mask::{MaskLod, MaskValue};
use lacuna_core::settings::Settings;

fn pixel_norm_squared(image: &RgbImage, x: i32, y: i32, mask: Option<&MaskLod>) -> Energy {
    if x < 0 || y < 0 || x >= image.width() as i32 || y >= image.height() as i32 {
        return 0;
    }
    if let Some(mask) = mask {
        if mask.value(x, y) != MaskValue::Known {
            return 0;
        }
    }
    let p = image.data[[y as usize, x as usize]];
    let (r, g, b) = (p[0] as Energy, p[1] as Energy, p[2] as Energy);
    r * r + g * g + b * b
}

fn brute_force_window_sum(
    image: &RgbImage,
    mask: Option<&MaskLod>,
    left: i32,
    top: i32,
    width: i32,
    height: i32,
) -> Energy {
    let mut sum = 0;
    for y in top..top + height {
        for x in left..left + width {
            sum += pixel_norm_squared(image, x, y, mask);
        }
    }
    sum
}

#[test]
fn test_wsst_matches_brute_force() {
    let image = common::noise_image(20, 12, 7);
    let table = Wsst::new(&image, 4, 4);

    for top in -4..=4 {
        for left in -4..=12 {
            // Negative origins are only valid at block alignment.
            if (left < 0 && left != -4) || (top < 0 && top != -4) {
                continue;
            }
            let expected = brute_force_window_sum(&image, None, left, top, 8, 8);
            assert_eq!(
                table.calculate(left, top, 8, 8),
                expected,
                "window at ({left}, {top})"
            );
        }
    }
}

#[test]
fn test_masked_wsst_skips_unknown_pixels() {
    let image = common::noise_image(20, 12, 11);
    let mask = common::hole_mask(20, 12, 6, 3, 5, 5);
    let table = Wsst::new_masked(&image, &mask, 4, 4);

    for top in 0..=4 {
        for left in 0..=12 {
            let expected = brute_force_window_sum(&image, Some(&mask), left, top, 8, 8);
            assert_eq!(
                table.calculate(left, top, 8, 8),
                expected,
                "window at ({left}, {top})"
            );
        }
    }
}

#[test]
fn test_per_pixel_self_identity() {
    let image = common::noise_image(32, 32, 3);
    let mask = common::hole_mask(32, 32, 12, 12, 8, 8);
    for (left, top) in [(0, 0), (5, 9), (24, 24)] {
        let params = BatchParams::new(1, 8, 8, left, top, false);
        assert_eq!(per_pixel::calculate(&image, &mask, &params, left, top), 0);
    }
}

#[test]
fn test_per_pixel_symmetry() {
    let image = common::noise_image(32, 32, 5);
    let mask = common::hole_mask(32, 32, 12, 12, 8, 8);
    for (a, b) in [((0, 0), (10, 14)), ((3, 7), (20, 2)), ((24, 24), (1, 9))] {
        let forward = BatchParams::new(1, 8, 8, a.0, a.1, false);
        let backward = BatchParams::new(1, 8, 8, b.0, b.1, false);
        assert_eq!(
            per_pixel::calculate(&image, &mask, &forward, b.0, b.1),
            per_pixel::calculate(&image, &mask, &backward, a.0, a.1)
        );
    }
}

#[test]
fn test_per_pixel_clips_windows_together() {
    let image = common::noise_image(16, 16, 13);
    let mask = common::hole_mask(16, 16, 4, 4, 4, 4);

    // A starts out of bounds; both windows shift and shrink identically, so
    // comparing a window against itself still yields zero.
    let params = BatchParams::new(1, 8, 8, -3, -3, false);
    assert_eq!(per_pixel::calculate(&image, &mask, &params, -3, -3), 0);

    // Fully out-of-range span collapses to empty.
    let params = BatchParams::new(1, 8, 8, 40, 40, false);
    assert_eq!(per_pixel::calculate(&image, &mask, &params, 40, 40), 0);
}

#[test]
fn test_per_pixel_masked_side_contributes_zero() {
    let image = common::noise_image(32, 32, 17);
    let mask = common::hole_mask(32, 32, 8, 8, 8, 8);

    // Window A fully inside the hole: masked energy must be zero no matter
    // how different B is.
    let params = BatchParams::new(1, 8, 8, 8, 8, true);
    assert_eq!(per_pixel::calculate(&image, &mask, &params, 20, 20), 0);

    // Unmasked, the same windows differ.
    let params = BatchParams::new(1, 8, 8, 8, 8, false);
    assert!(per_pixel::calculate(&image, &mask, &params, 20, 20) > 0);
}

#[test]
fn test_fft_matches_per_pixel() {
    let image = common::noise_image(32, 32, 42);
    let mask = common::hole_mask(32, 32, 10, 10, 9, 9);
    let settings = Settings::with_lattice_gap(4, 4);
    let ctx = EnergyContext {
        image: &image,
        mask: &mask,
        settings: &settings,
    };

    let mut fft = FftCalculator::new(&ctx);

    for a_masked in [false, true] {
        for a_top in [0, 6, 12, 18, 24] {
            for a_left in [0, 6, 12, 18, 24] {
                let params = BatchParams::new(25, 8, 8, a_left, a_top, a_masked);
                fft.batch_open(params, &ctx);

                for b_top in [0, 6, 12, 18, 24] {
                    for b_left in [0, 6, 12, 18, 24] {
                        let expected =
                            per_pixel::calculate(&image, &mask, &params, b_left, b_top);
                        let actual = fft.calculate(b_left, b_top);
                        assert!(
                            (actual - expected).abs() <= 10,
                            "a=({a_left},{a_top}) b=({b_left},{b_top}) masked={a_masked}: \
                             fft {actual} vs per-pixel {expected}"
                        );
                    }
                }

                fft.batch_close();
            }
        }
    }
}

#[test]
fn test_fft_queued_handles_are_insertion_indices() {
    let image = common::noise_image(32, 32, 23);
    let mask = common::hole_mask(32, 32, 10, 10, 8, 8);
    let settings = Settings::with_lattice_gap(4, 4);
    let ctx = EnergyContext {
        image: &image,
        mask: &mask,
        settings: &settings,
    };

    let mut fft = FftCalculator::new(&ctx);
    let params = BatchParams::new(4, 8, 8, 0, 0, false);
    fft.batch_open(params, &ctx);

    let positions = [(0, 0), (8, 8), (16, 4), (24, 24)];
    for (i, &(bl, bt)) in positions.iter().enumerate() {
        assert_eq!(fft.queue(bl, bt), i);
    }
    fft.process();
    for (i, &(bl, bt)) in positions.iter().enumerate() {
        let expected = per_pixel::calculate(&image, &mask, &params, bl, bt);
        assert!((fft.result(i) - expected).abs() <= 10);
    }
    fft.batch_close();
}
