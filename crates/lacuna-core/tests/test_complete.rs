mod common;

use std::io::Cursor;

use lacuna_core::settings::{OutputBlenderKind, PatchBlenderKind};
use lacuna_core::{complete, LacunaError, MaskLod, Settings};

#[test]
fn test_solid_gray_fills_with_gray() {
    let gray = [128u8, 128, 128];
    let image = common::solid_image(64, 64, gray);
    let mask = common::hole_mask(64, 64, 24, 24, 16, 16);

    let mut settings = Settings::for_image(64, 64);
    settings.num_iterations = 2;

    let output = complete(&settings, &image, &mask, None, None).unwrap();
    assert!(!output.patches.is_empty());

    for y in 0..64 {
        for x in 0..64 {
            assert_eq!(
                output.image.data[[y, x]],
                gray,
                "pixel ({x}, {y}) is not gray"
            );
        }
    }
}

#[test]
fn test_two_tone_fill_stays_pure() {
    // Left half red, right half blue, hole centered on the seam. Every
    // filled pixel is copied from a known window, so only the two pure
    // colors may appear.
    let red = [255u8, 0, 0];
    let blue = [0u8, 0, 255];
    let mut image = common::solid_image(128, 64, red);
    for y in 0..64 {
        for x in 64..128 {
            image.data[[y, x]] = blue;
        }
    }
    let mask = common::hole_mask(128, 64, 56, 24, 16, 16);

    let mut settings = Settings::for_image(128, 64);
    settings.num_iterations = 2;
    settings.compositor_patch_blender = PatchBlenderKind::None;
    settings.compositor_output_blender = OutputBlenderKind::None;

    let output = complete(&settings, &image, &mask, None, None).unwrap();

    for y in 0..64 {
        for x in 0..128 {
            let pixel = output.image.data[[y, x]];
            let in_hole = (56..72).contains(&x) && (24..40).contains(&y);
            if in_hole {
                assert!(
                    pixel == red || pixel == blue,
                    "pixel ({x}, {y}) = {pixel:?} is neither pure color"
                );
            } else {
                assert_eq!(pixel, image.data[[y, x]], "known pixel ({x}, {y}) changed");
            }
        }
    }
}

#[test]
fn test_known_region_is_untouched_with_hard_blend() {
    let image = common::noise_image(100, 100, 77);
    let mask = common::hole_mask(100, 100, 40, 40, 10, 10);

    let mut settings = Settings::for_image(100, 100);
    settings.num_iterations = 2;
    settings.low_resolution_passes_max = 0;
    settings.compositor_output_blender = OutputBlenderKind::None;

    let output = complete(&settings, &image, &mask, None, None).unwrap();

    for y in 0..100 {
        for x in 0..100 {
            let in_hole = (40..50).contains(&x) && (40..50).contains(&y);
            if !in_hole {
                assert_eq!(
                    output.image.data[[y, x]],
                    image.data[[y, x]],
                    "pixel ({x}, {y}) outside the hole changed"
                );
            }
        }
    }
}

#[test]
fn test_soft_mask_leaves_distant_known_pixels_alone() {
    let image = common::noise_image(80, 80, 21);
    let mask = common::hole_mask(80, 80, 32, 32, 16, 16);

    let mut settings = Settings::for_image(80, 80);
    settings.num_iterations = 2;

    let output = complete(&settings, &image, &mask, None, None).unwrap();

    // The soft mask feathers a few pixels outward; anything further from
    // the hole than the blur reach must be bit-identical.
    for y in 0..80i32 {
        for x in 0..80i32 {
            let near_hole = x >= 32 - 5 && x < 48 + 5 && y >= 32 - 5 && y < 48 + 5;
            if !near_hole {
                assert_eq!(
                    output.image.data[[y as usize, x as usize]],
                    image.data[[y as usize, x as usize]],
                    "pixel ({x}, {y}) far from the hole changed"
                );
            }
        }
    }
}

#[test]
fn test_patches_round_trip_reproduces_output() {
    let red = [255u8, 0, 0];
    let blue = [0u8, 0, 255];
    let mut image = common::solid_image(128, 64, red);
    for y in 0..64 {
        for x in 64..128 {
            image.data[[y, x]] = blue;
        }
    }
    let mask = common::hole_mask(128, 64, 56, 24, 16, 16);

    let mut settings = Settings::for_image(128, 64);
    settings.num_iterations = 2;

    // Solve once, recording the patches.
    let mut recorded = Vec::new();
    let direct = complete(&settings, &image, &mask, None, Some(&mut recorded)).unwrap();

    // Composite again from the recorded stream alone.
    let mut reader = Cursor::new(&recorded);
    let replayed = complete(&settings, &image, &mask, Some(&mut reader), None).unwrap();

    assert_eq!(replayed.patches, direct.patches);
    assert_eq!(replayed.image.data, direct.image.data);
}

#[test]
fn test_low_resolution_passes_produce_previews() {
    let image = common::noise_image(110, 110, 31);
    let mask = common::hole_mask(110, 110, 51, 51, 8, 8);

    let mut settings = Settings::for_image(110, 110);
    settings.num_iterations = 1;
    settings.low_resolution_passes_max = lacuna_core::consts::LOW_RESOLUTION_PASSES_AUTO;
    settings.debug_low_resolution_passes = true;

    let output = complete(&settings, &image, &mask, None, None).unwrap();

    // 110 halves once before hitting the minimum image side.
    assert_eq!(output.pass_images.len(), 1);
    assert_eq!(output.pass_images[0].width(), 55);
    assert_eq!(output.pass_images[0].height(), 55);
    assert!(!output.patches.is_empty());
}

#[test]
fn test_mask_size_mismatch_is_rejected() {
    let image = common::solid_image(64, 64, [10, 20, 30]);
    let mask = common::hole_mask(32, 32, 8, 8, 8, 8);
    let settings = Settings::for_image(64, 64);

    let result = complete(&settings, &image, &mask, None, None);
    assert!(matches!(result, Err(LacunaError::InvalidMask(_))));
}

#[test]
fn test_invalid_settings_are_rejected() {
    let image = common::solid_image(64, 64, [10, 20, 30]);
    let mask = common::hole_mask(64, 64, 24, 24, 16, 16);

    let mut settings = Settings::for_image(64, 64);
    settings.num_iterations = 0;

    let result = complete(&settings, &image, &mask, None, None);
    assert!(matches!(result, Err(LacunaError::InvalidSettings(_))));
}

#[test]
fn test_gray_mask_decoding_via_complete() {
    // Bytes nearest 255 are known, nearest 0 unknown; the completion only
    // needs the hole to be recognized as unknown.
    let gray = [200u8, 200, 200];
    let image = common::solid_image(64, 64, gray);

    let mut bytes = common::hole_mask_gray(64, 64, 24, 24, 16, 16);
    for value in bytes.iter_mut() {
        *value = match *value {
            0 => 40,
            _ => 220,
        };
    }
    let mask = MaskLod::from_gray(&bytes, 64, 64).unwrap();

    let mut settings = Settings::for_image(64, 64);
    settings.num_iterations = 2;

    let output = complete(&settings, &image, &mask, None, None).unwrap();
    for y in 0..64 {
        for x in 0..64 {
            assert_eq!(output.image.data[[y, x]], gray);
        }
    }
}
